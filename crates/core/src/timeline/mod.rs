/// Millisecond timestamps used by every tick of the engine.
pub type Millis = f64;

/// Simulated frame clock. Hosts with a real clock pass their own timestamps
/// to the engine; tests and the command line demo advance this one instead.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaybackClock {
    now_ms: Millis,
}

impl PlaybackClock {
    pub fn start_at(now_ms: Millis) -> Self {
        Self { now_ms }
    }

    pub fn now_ms(&self) -> Millis {
        self.now_ms
    }

    pub fn reset(&mut self) {
        self.now_ms = 0.0;
    }

    /// Moves the clock forward. Negative or non-finite deltas are ignored so
    /// the clock stays monotonic.
    pub fn advance(&mut self, delta_ms: Millis) -> Millis {
        if delta_ms.is_finite() && delta_ms > 0.0 {
            self.now_ms += delta_ms;
        }
        self.now_ms
    }
}
