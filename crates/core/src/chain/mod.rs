//! Unattended playback of a sequence of preset cross-fades.
//!
//! The sequencer owns the chain bookkeeping only. The interpolation session,
//! preset store, live state and event queue it drives are borrowed for the
//! duration of each call through a [`ChainContext`].

use serde::{Deserialize, Serialize};

use crate::{
    events::{EngineEvent, EventQueue, SkipDirection},
    interpolation::{InterpolationSession, SessionStatus},
    presets::PresetStore,
    timeline::Millis,
    LiveState, ReactiveError, Result,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOptions {
    #[serde(rename = "loop")]
    pub loop_chain: bool,
    pub shuffle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Read-only view of the chain position for observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainProgress {
    /// Zero-based index of the step being played.
    pub current_step: usize,
    pub total_steps: usize,
    pub step_progress: f32,
    pub time_remaining_ms: Millis,
    pub paused: bool,
}

impl ChainProgress {
    /// Fraction of the whole pass that has been played, in `[0, 1]`.
    pub fn overall(&self) -> f32 {
        if self.total_steps == 0 {
            return 0.0;
        }
        ((self.current_step as f32 + self.step_progress) / self.total_steps as f32).clamp(0.0, 1.0)
    }
}

/// Collaborators a chain operation reads and writes.
pub struct ChainContext<'a> {
    pub session: &'a mut InterpolationSession,
    pub presets: &'a dyn PresetStore,
    pub live: &'a mut LiveState,
    pub events: &'a mut EventQueue,
}

#[derive(Debug, Clone)]
pub struct ChainSequencer {
    order: Vec<String>,
    current_index: usize,
    duration_ms: Millis,
    options: ChainOptions,
    status: ChainStatus,
    step_start: Millis,
    paused_at: Option<Millis>,
    paused_fraction: f64,
    rng: fastrand::Rng,
}

impl Default for ChainSequencer {
    fn default() -> Self {
        Self::with_rng(fastrand::Rng::new())
    }
}

impl ChainSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequencer whose shuffles are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(fastrand::Rng::with_seed(seed))
    }

    fn with_rng(rng: fastrand::Rng) -> Self {
        Self {
            order: Vec::new(),
            current_index: 0,
            duration_ms: 0.0,
            options: ChainOptions::default(),
            status: ChainStatus::Stopped,
            step_start: 0.0,
            paused_at: None,
            paused_fraction: 0.0,
            rng,
        }
    }

    pub fn status(&self) -> ChainStatus {
        self.status
    }

    /// Running or paused.
    pub fn is_active(&self) -> bool {
        self.status != ChainStatus::Stopped
    }

    pub fn is_paused(&self) -> bool {
        self.status == ChainStatus::Paused
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Working order of the chain, after any shuffle.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn duration_ms(&self) -> Millis {
        self.duration_ms
    }

    pub fn options(&self) -> ChainOptions {
        self.options
    }

    pub fn current_preset(&self) -> Option<&str> {
        self.order.get(self.current_index).map(String::as_str)
    }

    /// Starts a chain towards `presets[0]`, replacing any chain in flight.
    /// Rejected without side effects when fewer than two presets are given,
    /// a name is unknown, or the duration is not positive.
    pub fn start(
        &mut self,
        presets: &[String],
        duration_ms: Millis,
        options: ChainOptions,
        now: Millis,
        ctx: &mut ChainContext<'_>,
    ) -> Result<()> {
        if presets.len() < 2 {
            tracing::warn!(count = presets.len(), "chain needs at least two presets");
            return Err(ReactiveError::invalid("a chain needs at least two presets"));
        }
        if !(duration_ms.is_finite() && duration_ms > 0.0) {
            tracing::warn!(duration_ms, "rejecting chain with non-positive step duration");
            return Err(ReactiveError::invalid("chain step duration must be positive"));
        }
        if let Some(missing) = presets.iter().find(|name| !ctx.presets.contains(name)) {
            tracing::warn!(preset = %missing, "chain references unknown preset");
            return Err(ReactiveError::MissingPreset(missing.clone()));
        }

        ctx.session.cancel();
        self.order = presets.to_vec();
        if options.shuffle {
            self.shuffle_order();
        }
        self.current_index = 0;
        self.duration_ms = duration_ms;
        self.options = options;
        self.status = ChainStatus::Running;
        self.clear_pause();

        tracing::info!(
            presets = ?self.order,
            duration_ms,
            loop_chain = options.loop_chain,
            shuffle = options.shuffle,
            "chain started"
        );
        ctx.events.push(EngineEvent::ChainStarted {
            presets: self.order.clone(),
            duration_ms,
            loop_chain: options.loop_chain,
            shuffle: options.shuffle,
        });
        self.begin_step(now, ctx);
        Ok(())
    }

    /// Drives the current step and advances when its duration has elapsed.
    /// Does nothing while stopped or paused.
    pub fn update(&mut self, now: Millis, ctx: &mut ChainContext<'_>) {
        if self.status != ChainStatus::Running {
            return;
        }

        if ctx.session.update(ctx.live, now) == SessionStatus::Completed {
            ctx.events.push(EngineEvent::InterpolationComplete);
        }

        if now - self.step_start >= self.duration_ms {
            self.advance(now, ctx);
        }
    }

    pub fn pause(&mut self, now: Millis, events: &mut EventQueue) -> Result<()> {
        if self.status != ChainStatus::Running {
            tracing::warn!(status = ?self.status, "pause ignored, chain is not running");
            return Err(ReactiveError::state("chain is not running"));
        }
        self.paused_at = Some(now);
        self.paused_fraction = self.fraction_at(now);
        self.status = ChainStatus::Paused;
        tracing::info!(step = self.current_index, fraction = self.paused_fraction, "chain paused");
        events.push(EngineEvent::ChainPaused);
        Ok(())
    }

    /// Continues exactly where the pause left off: the elapsed time of the
    /// step is rebuilt from the fraction recorded at pause time.
    pub fn resume(&mut self, now: Millis, ctx: &mut ChainContext<'_>) -> Result<()> {
        if self.status != ChainStatus::Paused {
            tracing::warn!(status = ?self.status, "resume ignored, chain is not paused");
            return Err(ReactiveError::state("chain is not paused"));
        }
        let new_start = now - self.paused_fraction * self.duration_ms;
        ctx.session.shift_start(new_start - self.step_start);
        self.step_start = new_start;
        self.status = ChainStatus::Running;
        self.clear_pause();
        tracing::info!(step = self.current_index, "chain resumed");
        ctx.events.push(EngineEvent::ChainResumed);
        Ok(())
    }

    pub fn skip_next(&mut self, now: Millis, ctx: &mut ChainContext<'_>) -> Result<()> {
        self.skip(SkipDirection::Next, now, ctx)
    }

    pub fn skip_prev(&mut self, now: Millis, ctx: &mut ChainContext<'_>) -> Result<()> {
        self.skip(SkipDirection::Previous, now, ctx)
    }

    /// Jumps to the neighbouring step and starts a fresh transition from the
    /// state currently on screen. Wraps around only for looping chains.
    pub fn skip(
        &mut self,
        direction: SkipDirection,
        now: Millis,
        ctx: &mut ChainContext<'_>,
    ) -> Result<()> {
        if self.status == ChainStatus::Stopped {
            tracing::warn!(?direction, "skip ignored, no chain is active");
            return Err(ReactiveError::state("no chain is active"));
        }
        let last = self.order.len().saturating_sub(1);
        self.current_index = match direction {
            SkipDirection::Next if self.current_index < last => self.current_index + 1,
            SkipDirection::Next if self.options.loop_chain => 0,
            SkipDirection::Next => last,
            SkipDirection::Previous if self.current_index > 0 => self.current_index - 1,
            SkipDirection::Previous if self.options.loop_chain => last,
            SkipDirection::Previous => 0,
        };

        ctx.session.cancel();
        self.status = ChainStatus::Running;
        self.clear_pause();

        let preset = self.current_preset().unwrap_or_default().to_string();
        tracing::info!(?direction, preset = %preset, step = self.current_index, "chain skipped");
        ctx.events.push(EngineEvent::ChainSkipped { direction, preset });
        self.begin_step(now, ctx);
        Ok(())
    }

    /// Stops the chain and forgets it. The live state keeps whatever was on
    /// screen at the moment of the call.
    pub fn stop(&mut self, session: &mut InterpolationSession, events: &mut EventQueue) -> bool {
        if self.status == ChainStatus::Stopped && self.order.is_empty() {
            return false;
        }
        session.cancel();
        self.order.clear();
        self.current_index = 0;
        self.status = ChainStatus::Stopped;
        self.clear_pause();
        tracing::info!("chain stopped");
        events.push(EngineEvent::ChainStopped);
        true
    }

    /// Rewinds to the first step without playing it. The preset order is
    /// kept so progress still reports the chain length.
    pub fn reset(&mut self, session: &mut InterpolationSession, events: &mut EventQueue) {
        session.cancel();
        self.current_index = 0;
        self.status = ChainStatus::Stopped;
        self.clear_pause();
        tracing::info!("chain reset");
        events.push(EngineEvent::ChainReset);
    }

    pub fn progress(&self, now: Millis) -> ChainProgress {
        let total_steps = self.order.len();
        let step_progress = match self.status {
            ChainStatus::Stopped => 0.0,
            ChainStatus::Paused => self.paused_fraction,
            ChainStatus::Running => self.fraction_at(now),
        };
        let time_remaining_ms = if self.status == ChainStatus::Stopped {
            0.0
        } else {
            let later_steps = total_steps.saturating_sub(self.current_index + 1) as f64;
            (1.0 - step_progress) * self.duration_ms + later_steps * self.duration_ms
        };

        ChainProgress {
            current_step: self.current_index,
            total_steps,
            step_progress: step_progress as f32,
            time_remaining_ms,
            paused: self.status == ChainStatus::Paused,
        }
    }

    fn fraction_at(&self, now: Millis) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        let fraction = (now - self.step_start) / self.duration_ms;
        if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn advance(&mut self, now: Millis, ctx: &mut ChainContext<'_>) {
        let next = self.current_index + 1;
        if next < self.order.len() {
            self.current_index = next;
            let preset = self.order[next].clone();
            tracing::debug!(step = next, total = self.order.len(), preset = %preset, "chain step complete");
            ctx.events.push(EngineEvent::ChainStepComplete {
                current_step: next,
                total_steps: self.order.len(),
                next: preset,
            });
            self.begin_step(now, ctx);
        } else if self.options.loop_chain {
            if self.options.shuffle {
                self.shuffle_order();
            }
            self.current_index = 0;
            tracing::debug!(presets = ?self.order, "chain loop restarted");
            ctx.events.push(EngineEvent::ChainLoopRestarted {
                presets: self.order.clone(),
            });
            self.begin_step(now, ctx);
        } else {
            self.status = ChainStatus::Stopped;
            self.clear_pause();
            tracing::info!("chain finished");
            ctx.events.push(EngineEvent::ChainFinished);
        }
    }

    /// Starts the transition of the current step. A preset that disappeared
    /// from the store since the chain started only skips its own transition;
    /// the step still lasts its full duration.
    fn begin_step(&mut self, now: Millis, ctx: &mut ChainContext<'_>) {
        self.step_start = now;
        let Some(name) = self.order.get(self.current_index) else {
            return;
        };
        match ctx.presets.load(name) {
            Some(target) => ctx.session.start(ctx.live, target, self.duration_ms, now),
            None => {
                tracing::warn!(preset = %name, "chain step aborted, preset no longer exists");
                ctx.session.cancel();
            }
        }
    }

    /// Uniform Fisher-Yates permutation of the working order.
    fn shuffle_order(&mut self) {
        for i in (1..self.order.len()).rev() {
            let j = self.rng.usize(..=i);
            self.order.swap(i, j);
        }
    }

    fn clear_pause(&mut self) {
        self.paused_at = None;
        self.paused_fraction = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryPresetStore, MorphTarget, StateSnapshot, WeightVector};

    struct Harness {
        session: InterpolationSession,
        presets: MemoryPresetStore,
        live: LiveState,
        events: EventQueue,
    }

    impl Harness {
        fn new() -> Self {
            let mut presets = MemoryPresetStore::new();
            for (name, target) in [
                ("A", MorphTarget::Sphere),
                ("B", MorphTarget::Cube),
                ("C", MorphTarget::Pyramid),
            ] {
                presets.save(name, StateSnapshot::baseline().with_weights(WeightVector::only(target)));
            }
            Self {
                session: InterpolationSession::default(),
                presets,
                live: LiveState::default(),
                events: EventQueue::new(),
            }
        }

        fn ctx(&mut self) -> ChainContext<'_> {
            ChainContext {
                session: &mut self.session,
                presets: &self.presets,
                live: &mut self.live,
                events: &mut self.events,
            }
        }

        fn drain(&mut self) -> Vec<EngineEvent> {
            self.events.drain().collect()
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn looping() -> ChainOptions {
        ChainOptions {
            loop_chain: true,
            shuffle: false,
        }
    }

    #[test]
    fn rejects_short_chains_and_unknown_presets() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);

        let err = chain
            .start(&names(&["A"]), 100.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidInput(_)));

        let err = chain
            .start(&names(&["A", "Z"]), 100.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap_err();
        assert!(matches!(err, ReactiveError::MissingPreset(name) if name == "Z"));

        assert!(chain
            .start(&names(&["A", "B"]), 0.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .is_err());

        assert_eq!(chain.status(), ChainStatus::Stopped);
        assert!(h.drain().is_empty());
        assert!(!h.session.is_active());
    }

    #[test]
    fn advances_and_finishes_without_loop() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["B", "C"]), 100.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap();

        chain.update(100.0, &mut h.ctx());
        assert_eq!(chain.current_index(), 1);
        assert_eq!(h.live.params.morph_weights, WeightVector::only(MorphTarget::Cube));

        chain.update(200.0, &mut h.ctx());
        assert_eq!(chain.status(), ChainStatus::Stopped);
        assert_eq!(h.live.params.morph_weights, WeightVector::only(MorphTarget::Pyramid));

        let events = h.drain();
        assert!(matches!(events.first(), Some(EngineEvent::ChainStarted { .. })));
        assert!(events.contains(&EngineEvent::ChainStepComplete {
            current_step: 1,
            total_steps: 2,
            next: "C".to_string(),
        }));
        assert_eq!(events.last(), Some(&EngineEvent::ChainFinished));
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == EngineEvent::InterpolationComplete)
                .count(),
            2
        );
    }

    #[test]
    fn loops_back_to_first_step() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["A", "B", "C"]), 100.0, looping(), 0.0, &mut h.ctx())
            .unwrap();

        for step in 1..=3 {
            chain.update(step as f64 * 100.0, &mut h.ctx());
        }
        assert_eq!(chain.current_index(), 0);
        assert_eq!(chain.order(), names(&["A", "B", "C"]).as_slice());
        assert!(h
            .drain()
            .contains(&EngineEvent::ChainLoopRestarted { presets: names(&["A", "B", "C"]) }));
    }

    #[test]
    fn pause_freezes_the_transition() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["B", "C"]), 1000.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap();
        chain.update(400.0, &mut h.ctx());
        chain.pause(400.0, &mut h.events).unwrap();
        let frozen = h.live.params.clone();

        chain.update(900.0, &mut h.ctx());
        assert_eq!(h.live.params, frozen);
        assert!(chain.pause(900.0, &mut h.events).is_err());

        let progress = chain.progress(5000.0);
        assert!(progress.paused);
        assert!((progress.step_progress - 0.4).abs() < 1e-6);
        assert!((progress.time_remaining_ms - 1600.0).abs() < 1e-6);

        chain.resume(5000.0, &mut h.ctx()).unwrap();
        assert!(chain.resume(5000.0, &mut h.ctx()).is_err());
        let progress = chain.progress(5000.0);
        assert!(!progress.paused);
        assert!((progress.step_progress - 0.4).abs() < 1e-6);
    }

    #[test]
    fn skip_wraps_only_when_looping() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["A", "B", "C"]), 100.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap();

        chain.skip_prev(10.0, &mut h.ctx()).unwrap();
        assert_eq!(chain.current_index(), 0);
        chain.skip_next(20.0, &mut h.ctx()).unwrap();
        chain.skip_next(30.0, &mut h.ctx()).unwrap();
        chain.skip_next(40.0, &mut h.ctx()).unwrap();
        assert_eq!(chain.current_index(), 2);

        let mut looping_chain = ChainSequencer::with_seed(1);
        looping_chain
            .start(&names(&["A", "B", "C"]), 100.0, looping(), 0.0, &mut h.ctx())
            .unwrap();
        looping_chain.skip_prev(10.0, &mut h.ctx()).unwrap();
        assert_eq!(looping_chain.current_index(), 2);
        looping_chain.skip_next(20.0, &mut h.ctx()).unwrap();
        assert_eq!(looping_chain.current_index(), 0);
    }

    #[test]
    fn skip_clears_pause_and_starts_from_screen_state() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["B", "C"]), 1000.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap();
        chain.update(500.0, &mut h.ctx());
        chain.pause(500.0, &mut h.events).unwrap();
        let on_screen = h.live.params.clone();

        chain.skip_next(800.0, &mut h.ctx()).unwrap();
        assert_eq!(chain.status(), ChainStatus::Running);
        assert_eq!(h.live.params, on_screen);

        chain.update(800.0, &mut h.ctx());
        assert_eq!(h.live.params, on_screen);
        assert!(h.drain().contains(&EngineEvent::ChainSkipped {
            direction: SkipDirection::Next,
            preset: "C".to_string(),
        }));
    }

    #[test]
    fn stop_and_reset_leave_live_state_alone() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["B", "C"]), 1000.0, looping(), 0.0, &mut h.ctx())
            .unwrap();
        chain.update(300.0, &mut h.ctx());
        let mid = h.live.params.clone();

        chain.reset(&mut h.session, &mut h.events);
        assert_eq!(h.live.params, mid);
        assert_eq!(chain.status(), ChainStatus::Stopped);
        assert_eq!(chain.progress(400.0).total_steps, 2);
        assert!(chain.skip_next(400.0, &mut h.ctx()).is_err());

        chain
            .start(&names(&["B", "C"]), 1000.0, looping(), 500.0, &mut h.ctx())
            .unwrap();
        chain.update(800.0, &mut h.ctx());
        let mid = h.live.params.clone();
        assert!(chain.stop(&mut h.session, &mut h.events));
        chain.update(1500.0, &mut h.ctx());
        assert_eq!(h.live.params, mid);
        assert_eq!(chain.progress(1500.0).total_steps, 0);
        assert!(!chain.stop(&mut h.session, &mut h.events));
    }

    #[test]
    fn deleted_preset_only_aborts_its_own_step() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["B", "C", "A"]), 100.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap();
        h.presets.delete("C");

        chain.update(100.0, &mut h.ctx());
        assert_eq!(chain.current_index(), 1);
        assert!(!h.session.is_active());
        assert_eq!(h.live.params.morph_weights, WeightVector::only(MorphTarget::Cube));

        chain.update(200.0, &mut h.ctx());
        assert_eq!(chain.current_index(), 2);
        assert!(h.session.is_active());
    }

    #[test]
    fn progress_reports_remaining_time() {
        let mut h = Harness::new();
        let mut chain = ChainSequencer::with_seed(1);
        chain
            .start(&names(&["A", "B", "C"]), 1000.0, ChainOptions::default(), 0.0, &mut h.ctx())
            .unwrap();

        let progress = chain.progress(250.0);
        assert_eq!(progress.current_step, 0);
        assert_eq!(progress.total_steps, 3);
        assert_eq!(progress.step_progress, 0.25);
        assert_eq!(progress.time_remaining_ms, 2750.0);
        assert!((progress.overall() - 0.25 / 3.0).abs() < 1e-6);
    }
}
