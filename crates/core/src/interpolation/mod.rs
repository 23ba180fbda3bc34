use serde::{Deserialize, Serialize};

use crate::{timeline::Millis, Interpolate, LiveState, StateSnapshot};

/// Easing curve applied to the linear progress of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    #[default]
    CubicInOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

/// Result of advancing a session by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionStatus {
    /// No transition in flight; nothing was written.
    Idle,
    /// The live state was written at the given linear progress.
    Running(f32),
    /// The target was written exactly and the session is idle again.
    Completed,
}

#[derive(Debug, Clone)]
struct Transition {
    start: StateSnapshot,
    target: StateSnapshot,
    start_time: Millis,
    duration_ms: Millis,
    progress: f32,
}

impl Transition {
    fn progress_at(&self, now: Millis) -> Option<f32> {
        if !(self.duration_ms.is_finite() && self.duration_ms > 0.0) {
            return Some(1.0);
        }
        let t = ((now - self.start_time) / self.duration_ms).clamp(0.0, 1.0) as f32;
        t.is_finite().then_some(t)
    }
}

/// Cross-fades the live parameters from where they were when the session
/// started towards a target snapshot. At most one transition is in flight;
/// starting another discards the previous one.
#[derive(Debug, Clone, Default)]
pub struct InterpolationSession {
    easing: Easing,
    transition: Option<Transition>,
}

impl InterpolationSession {
    pub fn new(easing: Easing) -> Self {
        Self {
            easing,
            transition: None,
        }
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    pub fn is_active(&self) -> bool {
        self.transition.is_some()
    }

    /// Linear progress written by the last update, `None` when idle.
    pub fn progress(&self) -> Option<f32> {
        self.transition.as_ref().map(|transition| transition.progress)
    }

    pub fn target(&self) -> Option<&StateSnapshot> {
        self.transition.as_ref().map(|transition| &transition.target)
    }

    /// Begins a transition from the current live parameters. A zero or
    /// negative duration jumps to the target on the next update.
    pub fn start(&mut self, live: &LiveState, target: StateSnapshot, duration_ms: Millis, now: Millis) {
        if self.transition.is_some() {
            tracing::debug!("replacing in-flight interpolation");
        }
        self.transition = Some(Transition {
            start: live.snapshot(),
            target,
            start_time: now,
            duration_ms,
            progress: 0.0,
        });
    }

    /// Writes the eased blend for `now` into `live`.
    pub fn update(&mut self, live: &mut LiveState, now: Millis) -> SessionStatus {
        let Some(transition) = self.transition.as_mut() else {
            return SessionStatus::Idle;
        };

        let Some(t) = transition.progress_at(now) else {
            return SessionStatus::Running(transition.progress);
        };
        let t = t.max(transition.progress);
        transition.progress = t;

        if t >= 1.0 {
            if let Some(done) = self.transition.take() {
                live.params = done.target;
            }
            return SessionStatus::Completed;
        }

        live.params = transition
            .start
            .lerp(&transition.target, self.easing.apply(t));
        SessionStatus::Running(t)
    }

    /// Stops immediately without writing anything further.
    pub fn cancel(&mut self) -> bool {
        self.transition.take().is_some()
    }

    /// Shifts the transition's start time, e.g. to discount a paused span.
    pub fn shift_start(&mut self, delta_ms: Millis) {
        if let Some(transition) = self.transition.as_mut() {
            if delta_ms.is_finite() {
                transition.start_time += delta_ms;
            }
        }
    }
}
