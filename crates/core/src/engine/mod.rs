use std::fmt;

use crate::{
    analysis::{BandEnergyExtractor, SpectrumAnalyser},
    audio::AudioHandoff,
    blend::WeightBlender,
    chain::{ChainContext, ChainOptions, ChainProgress, ChainSequencer},
    config::EngineConfig,
    envelope::EnvelopeFollower,
    events::{EngineEvent, EventQueue},
    interpolation::{InterpolationSession, SessionStatus},
    mapping::{ControllerMap, ParameterPath, ParameterUpdate},
    presets::{ChainDefinition, ChainLibrary, MemoryPresetStore, PresetStore},
    timeline::Millis,
    BandEnergies, LiveState, ReactiveError, Result, StateSnapshot,
};

/// Owns every engine component and the live state they write.
///
/// Two tickers drive it from the host thread: [`Self::audio_tick`] whenever
/// a new analysis frame is available and [`Self::render_tick`] once per
/// displayed frame. Nothing here blocks or performs I/O.
pub struct ReactiveEngine<S: PresetStore = MemoryPresetStore> {
    config: EngineConfig,
    analyser: SpectrumAnalyser,
    extractor: BandEnergyExtractor,
    follower: EnvelopeFollower,
    blender: WeightBlender,
    session: InterpolationSession,
    chain: ChainSequencer,
    presets: S,
    chains: ChainLibrary,
    controllers: ControllerMap,
    events: EventQueue,
    live: LiveState,
    last_audio_tick: Option<Millis>,
}

impl ReactiveEngine<MemoryPresetStore> {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_store(config, MemoryPresetStore::new())
    }
}

impl<S: PresetStore> ReactiveEngine<S> {
    pub fn with_store(config: EngineConfig, presets: S) -> Result<Self> {
        config.validate()?;

        let mut live = LiveState::default();
        live.audio_enabled = config.blend.audio_enabled;
        live.audio_gain = config.blend.audio_gain;

        tracing::debug!(
            fft_size = config.audio.fft_size,
            easing = ?config.interpolation.easing,
            "engine created"
        );

        Ok(Self {
            analyser: SpectrumAnalyser::new(&config.audio),
            extractor: BandEnergyExtractor::new(),
            follower: EnvelopeFollower::new(config.envelope.clone()),
            blender: WeightBlender::new(),
            session: InterpolationSession::new(config.interpolation.easing),
            chain: ChainSequencer::new(),
            presets,
            chains: ChainLibrary::new(),
            controllers: ControllerMap::new(),
            events: EventQueue::new(),
            live,
            last_audio_tick: None,
            config,
        })
    }

    /// Makes chain shuffles reproducible.
    pub fn with_chain_seed(mut self, seed: u64) -> Self {
        self.chain = ChainSequencer::with_seed(seed);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn live(&self) -> &LiveState {
        &self.live
    }

    pub fn presets(&self) -> &S {
        &self.presets
    }

    pub fn presets_mut(&mut self) -> &mut S {
        &mut self.presets
    }

    pub fn chains(&self) -> &ChainLibrary {
        &self.chains
    }

    pub fn chains_mut(&mut self) -> &mut ChainLibrary {
        &mut self.chains
    }

    pub fn controllers(&self) -> &ControllerMap {
        &self.controllers
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerMap {
        &mut self.controllers
    }

    pub fn chain(&self) -> &ChainSequencer {
        &self.chain
    }

    pub fn session(&self) -> &InterpolationSession {
        &self.session
    }

    pub fn envelope(&self) -> &EnvelopeFollower {
        &self.follower
    }

    /// Yields every event published since the previous drain.
    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.events.drain()
    }

    // ---- audio tick ----

    /// Consumes one analysis frame given as a byte spectrum plus the matching
    /// time-domain block.
    pub fn audio_tick(&mut self, spectrum: &[u8], samples: &[f32], now: Millis) -> BandEnergies {
        let raw = self.extractor.extract(spectrum, samples);
        self.feed_bands(raw, now)
    }

    /// Consumes a raw PCM block, running the spectrum analysis first.
    pub fn audio_tick_pcm(&mut self, samples: &[f32], now: Millis) -> Result<BandEnergies> {
        let spectrum = self.analyser.process(samples)?;
        let raw = self.extractor.extract(spectrum, samples);
        Ok(self.feed_bands(raw, now))
    }

    /// Feeds the newest frame of a cross-thread handoff, if any.
    pub fn poll_audio(&mut self, handoff: &AudioHandoff, now: Millis) -> Result<Option<BandEnergies>> {
        Ok(handoff
            .take_latest()?
            .map(|raw| self.feed_bands(raw, now)))
    }

    /// Runs already-extracted band energies through the envelope follower.
    /// The follower keeps tracking while audio is off.
    pub fn feed_bands(&mut self, raw: BandEnergies, now: Millis) -> BandEnergies {
        let dt = match self.last_audio_tick {
            Some(last) => now - last,
            None => f64::from(self.config.envelope.reference_frame_ms),
        };
        if dt > 0.0 {
            self.last_audio_tick = Some(now);
        }

        let envelope = self.follower.update(raw, dt);
        self.publish_envelope();
        envelope
    }

    /// Copies the follower output into the live state, zeroed while audio
    /// reactivity is off.
    fn publish_envelope(&mut self) {
        if self.live.audio_enabled {
            self.live.envelope = self.follower.output().sanitized();
            self.live.beat_pulse = self.follower.beat_pulse();
        } else {
            self.live.envelope = BandEnergies::ZERO;
            self.live.beat_pulse = 0.0;
        }
    }

    // ---- render tick ----

    /// Advances the chain (or a standalone transition) and republishes the
    /// final weights.
    pub fn render_tick(&mut self, now: Millis) {
        if self.chain.is_active() {
            let (chain, mut ctx) = self.split();
            chain.update(now, &mut ctx);
        } else if self.session.update(&mut self.live, now) == SessionStatus::Completed {
            tracing::debug!("interpolation complete");
            self.events.push(EngineEvent::InterpolationComplete);
        }
        self.publish_weights();
    }

    fn publish_weights(&mut self) {
        let live = &mut self.live;
        live.final_weights = self.blender.compute_final(
            &live.params.morph_weights,
            live.audio_enabled,
            &live.envelope,
            live.audio_gain,
        );
        live.audio_weights = self.blender.audio_weights();
    }

    fn split(&mut self) -> (&mut ChainSequencer, ChainContext<'_>) {
        (
            &mut self.chain,
            ChainContext {
                session: &mut self.session,
                presets: &self.presets,
                live: &mut self.live,
                events: &mut self.events,
            },
        )
    }

    // ---- audio settings ----

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        if self.live.audio_enabled != enabled {
            tracing::info!(enabled, "audio reactivity toggled");
        }
        self.live.audio_enabled = enabled;
        self.publish_envelope();
        self.publish_weights();
    }

    pub fn set_audio_gain(&mut self, gain: f32) -> Result<()> {
        if !(gain.is_finite() && gain >= 0.0) {
            tracing::warn!(gain, "rejecting audio gain");
            return Err(ReactiveError::invalid(format!("audio gain {gain} is not usable")));
        }
        self.live.audio_gain = gain;
        self.config.blend.audio_gain = gain;
        self.publish_weights();
        Ok(())
    }

    // ---- presets ----

    /// Stores the current parameters under `name`.
    pub fn save_preset(&mut self, name: &str) -> Result<()> {
        let snapshot = self.live.snapshot();
        self.save_preset_snapshot(name, snapshot)
    }

    pub fn save_preset_snapshot(&mut self, name: &str, snapshot: StateSnapshot) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            tracing::warn!("rejecting preset with empty name");
            return Err(ReactiveError::invalid("preset name is empty"));
        }
        self.presets.save(name, snapshot);
        tracing::info!(preset = %name, "preset saved");
        Ok(())
    }

    pub fn delete_preset(&mut self, name: &str) -> bool {
        self.presets.delete(name)
    }

    /// Moves towards a stored preset. Interpolates when interpolation is
    /// enabled, otherwise jumps. A running chain is stopped first.
    pub fn load_preset(&mut self, name: &str, now: Millis) -> Result<()> {
        let Some(target) = self.presets.load(name) else {
            tracing::warn!(preset = %name, "cannot load unknown preset");
            return Err(ReactiveError::MissingPreset(name.to_string()));
        };

        if self.chain.is_active() {
            self.chain.stop(&mut self.session, &mut self.events);
        }

        if self.config.interpolation.enabled {
            let duration = self.config.interpolation.duration_ms;
            tracing::info!(preset = %name, duration_ms = duration, "interpolating to preset");
            self.session.start(&self.live, target, duration, now);
        } else {
            tracing::info!(preset = %name, "preset loaded");
            self.session.cancel();
            self.live.params = target;
        }
        self.publish_weights();
        Ok(())
    }

    pub fn set_interpolation_enabled(&mut self, enabled: bool) {
        self.config.interpolation.enabled = enabled;
    }

    /// Returns every parameter to its neutral value and stops anything that
    /// was animating them.
    pub fn reset_to_baseline(&mut self) {
        if self.chain.is_active() {
            self.chain.stop(&mut self.session, &mut self.events);
        }
        self.session.cancel();
        self.live.reset_to_baseline();
        self.publish_weights();
    }

    // ---- parameter edits ----

    /// Writes a parameter edit. Edits to snapshot fields cancel the
    /// transition in flight so it cannot overwrite them.
    pub fn apply_parameter(&mut self, update: ParameterUpdate) -> Result<()> {
        if !update.value.is_finite() {
            tracing::warn!(path = ?update.path, "rejecting non-finite parameter value");
            return Err(ReactiveError::invalid("parameter value must be finite"));
        }

        match update.path {
            ParameterPath::AudioGain => return self.set_audio_gain(update.value),
            ParameterPath::InterpolationDuration => {
                self.config.interpolation.duration_ms = f64::from(update.value.max(0.0));
            }
            ParameterPath::ChainDuration => {
                if update.value <= 0.0 {
                    return Err(ReactiveError::invalid("chain step duration must be positive"));
                }
                self.config.chain.duration_ms = f64::from(update.value);
            }
            _ => {
                if self.session.cancel() {
                    tracing::debug!(path = ?update.path, "parameter edit cancelled transition");
                }
                update.apply_to(&mut self.live.params);
                self.publish_weights();
            }
        }
        Ok(())
    }

    /// Routes a decoded control-change event through the controller table.
    /// Returns the applied update, or `None` for unbound controllers.
    pub fn handle_controller(&mut self, controller: u8, value: u8) -> Result<Option<ParameterUpdate>> {
        let Some(update) = self.controllers.resolve(controller, value) else {
            tracing::debug!(controller, value, "unbound controller");
            return Ok(None);
        };
        self.apply_parameter(update)?;
        Ok(Some(update))
    }

    // ---- chains ----

    /// Starts a chain with the configured step duration, loop and shuffle.
    pub fn start_chain(&mut self, presets: &[String], now: Millis) -> Result<()> {
        let options = ChainOptions {
            loop_chain: self.config.chain.loop_chain,
            shuffle: self.config.chain.shuffle,
        };
        let duration = self.config.chain.duration_ms;
        self.start_chain_with(presets, duration, options, now)
    }

    pub fn start_chain_with(
        &mut self,
        presets: &[String],
        duration_ms: Millis,
        options: ChainOptions,
        now: Millis,
    ) -> Result<()> {
        let (chain, mut ctx) = self.split();
        chain.start(presets, duration_ms, options, now, &mut ctx)?;
        self.publish_weights();
        Ok(())
    }

    pub fn save_chain(&mut self, name: &str, definition: ChainDefinition) -> Result<()> {
        self.chains.save(name, definition)
    }

    pub fn start_saved_chain(&mut self, name: &str, now: Millis) -> Result<()> {
        let Some(definition) = self.chains.get(name).cloned() else {
            tracing::warn!(chain = %name, "cannot start unknown chain");
            return Err(ReactiveError::invalid(format!("unknown chain `{name}`")));
        };
        let options = ChainOptions {
            loop_chain: definition.loop_chain,
            shuffle: definition.shuffle,
        };
        self.start_chain_with(&definition.presets, definition.duration_ms, options, now)
    }

    pub fn pause_chain(&mut self, now: Millis) -> Result<()> {
        self.chain.pause(now, &mut self.events)
    }

    pub fn resume_chain(&mut self, now: Millis) -> Result<()> {
        let (chain, mut ctx) = self.split();
        chain.resume(now, &mut ctx)
    }

    pub fn skip_next(&mut self, now: Millis) -> Result<()> {
        let (chain, mut ctx) = self.split();
        chain.skip_next(now, &mut ctx)
    }

    pub fn skip_prev(&mut self, now: Millis) -> Result<()> {
        let (chain, mut ctx) = self.split();
        chain.skip_prev(now, &mut ctx)
    }

    /// Returns whether a chain was active.
    pub fn stop_chain(&mut self) -> bool {
        self.chain.stop(&mut self.session, &mut self.events)
    }

    pub fn reset_chain(&mut self) {
        self.chain.reset(&mut self.session, &mut self.events);
    }

    pub fn chain_progress(&self, now: Millis) -> ChainProgress {
        self.chain.progress(now)
    }
}

impl<S: PresetStore> fmt::Debug for ReactiveEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEngine")
            .field("analyser", &self.analyser)
            .field("chain", &self.chain.status())
            .field("session_active", &self.session.is_active())
            .field("presets", &self.presets.list().len())
            .field("pending_events", &self.events.len())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MorphTarget, WeightVector};

    const FRAME: Millis = 1000.0 / 60.0;

    fn engine() -> ReactiveEngine {
        let mut engine = ReactiveEngine::new(EngineConfig::default()).unwrap();
        for (name, target) in [("A", MorphTarget::Sphere), ("B", MorphTarget::Cube)] {
            engine
                .save_preset_snapshot(
                    name,
                    StateSnapshot::baseline().with_weights(WeightVector::only(target)),
                )
                .unwrap();
        }
        engine
    }

    #[test]
    fn load_preset_interpolates_and_reports_completion() {
        let mut engine = engine();
        engine.load_preset("B", 0.0).unwrap();

        engine.render_tick(1000.0);
        assert_eq!(
            engine.live().params.morph_weights.as_array(),
            &[0.5, 0.5, 0.0, 0.0]
        );

        engine.render_tick(2000.0);
        assert_eq!(engine.live().params.morph_weights, WeightVector::only(MorphTarget::Cube));
        let events: Vec<_> = engine.drain_events().collect();
        assert_eq!(events, vec![EngineEvent::InterpolationComplete]);
    }

    #[test]
    fn load_preset_jumps_when_interpolation_disabled() {
        let mut engine = engine();
        engine.set_interpolation_enabled(false);
        engine.load_preset("B", 0.0).unwrap();
        assert_eq!(engine.live().final_weights, WeightVector::only(MorphTarget::Cube));
        assert!(!engine.session().is_active());
    }

    #[test]
    fn unknown_preset_changes_nothing() {
        let mut engine = engine();
        engine.load_preset("B", 0.0).unwrap();
        engine.render_tick(500.0);
        let before = engine.live().clone();

        let err = engine.load_preset("nope", 600.0).unwrap_err();
        assert!(matches!(err, ReactiveError::MissingPreset(_)));
        assert_eq!(engine.live(), &before);
        assert!(engine.session().is_active());
    }

    #[test]
    fn parameter_edit_cancels_transition() {
        let mut engine = engine();
        engine.load_preset("B", 0.0).unwrap();
        engine.render_tick(500.0);

        let update = engine.handle_controller(5, 127).unwrap().unwrap();
        assert_eq!(update.path, ParameterPath::Scale);
        assert!(!engine.session().is_active());

        let frozen = engine.live().params.clone();
        engine.render_tick(1500.0);
        assert_eq!(engine.live().params, frozen);
        assert_eq!(engine.live().params.scale, 3.0);
    }

    #[test]
    fn controller_settings_update_config() {
        let mut engine = engine();
        engine.handle_controller(13, 0).unwrap();
        assert_eq!(engine.config().interpolation.duration_ms, 100.0);

        engine.handle_controller(12, 127).unwrap();
        assert_eq!(engine.live().audio_gain, 1.0);

        assert!(engine.handle_controller(90, 1).unwrap().is_none());
    }

    #[test]
    fn audio_feeds_final_weights_until_disabled() {
        let mut engine = engine();
        engine.set_interpolation_enabled(false);
        engine.load_preset("B", 0.0).unwrap();
        engine.apply_parameter(ParameterUpdate {
            path: ParameterPath::MorphWeight(MorphTarget::Cube),
            value: 0.5,
        })
        .unwrap();

        let mut now = 0.0;
        for _ in 0..30 {
            now += FRAME;
            engine.feed_bands(BandEnergies::new(0.9, 0.1, 0.1, 0.5), now);
            engine.render_tick(now);
        }
        assert!(engine.live().audio_weights.sum() > 0.0);
        assert!(engine.live().final_weights.get(MorphTarget::Sphere) > 0.0);

        engine.set_audio_enabled(false);
        assert_eq!(engine.live().final_weights, engine.live().params.morph_weights);
        assert_eq!(engine.live().audio_weights, WeightVector::ZERO);
        assert_eq!(engine.live().envelope, BandEnergies::ZERO);

        let envelope = engine.feed_bands(BandEnergies::new(0.9, 0.9, 0.9, 0.9), now + FRAME);
        assert!(envelope.bass > 0.0);
        assert_eq!(engine.live().envelope, BandEnergies::ZERO);
        assert_eq!(engine.live().beat_pulse, 0.0);
    }

    #[test]
    fn pcm_ticks_drive_the_envelope() {
        let mut engine = engine();
        let block: Vec<f32> = (0..2048)
            .map(|i| (2.0 * std::f32::consts::PI * 110.0 * i as f32 / 48_000.0).sin())
            .collect();

        let mut now = 0.0;
        for _ in 0..19 {
            now += FRAME;
            engine.audio_tick_pcm(&block, now).unwrap();
        }
        let last = engine.audio_tick_pcm(&block, now + FRAME).unwrap();
        assert!(last.bass > 0.0);
        assert!(last.level > 0.0);
        assert_eq!(engine.live().envelope, last);
    }

    #[test]
    fn loading_a_preset_stops_the_chain() {
        let mut engine = engine();
        engine
            .start_chain(&["A".to_string(), "B".to_string()], 0.0)
            .unwrap();
        assert!(engine.chain().is_active());

        engine.load_preset("A", 10.0).unwrap();
        assert!(!engine.chain().is_active());
        assert!(engine
            .drain_events()
            .any(|event| event == EngineEvent::ChainStopped));
    }

    #[test]
    fn saved_chains_start_by_name() {
        let mut engine = engine();
        engine
            .save_chain(
                "set",
                ChainDefinition {
                    presets: vec!["A".to_string(), "B".to_string()],
                    duration_ms: 400.0,
                    loop_chain: true,
                    shuffle: false,
                },
            )
            .unwrap();

        engine.start_saved_chain("set", 0.0).unwrap();
        assert_eq!(engine.chain().duration_ms(), 400.0);
        assert!(engine.chain().options().loop_chain);
        assert!(engine.start_saved_chain("other", 0.0).is_err());
    }

    #[test]
    fn handoff_frames_reach_the_live_state() {
        let mut engine = engine();
        let handoff = AudioHandoff::new();
        assert!(engine.poll_audio(&handoff, 10.0).unwrap().is_none());

        handoff.publish(BandEnergies::new(0.5, 0.5, 0.5, 0.5)).unwrap();
        let envelope = engine.poll_audio(&handoff, 20.0).unwrap().unwrap();
        assert!(envelope.bass > 0.0);
        assert_eq!(engine.live().envelope, envelope);
    }

    #[test]
    fn reset_to_baseline_stops_everything() {
        let mut engine = engine();
        engine.load_preset("B", 0.0).unwrap();
        engine.render_tick(300.0);

        engine.reset_to_baseline();
        assert!(!engine.session().is_active());
        assert_eq!(engine.live().params, StateSnapshot::baseline());
    }
}
