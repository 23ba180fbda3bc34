use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Direction of a manual chain skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipDirection {
    Next,
    Previous,
}

/// Notifications published by the engine. Hosts drain them once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ChainStarted {
        presets: Vec<String>,
        duration_ms: f64,
        #[serde(rename = "loop")]
        loop_chain: bool,
        shuffle: bool,
    },
    ChainStepComplete {
        current_step: usize,
        total_steps: usize,
        next: String,
    },
    ChainLoopRestarted {
        presets: Vec<String>,
    },
    ChainFinished,
    ChainPaused,
    ChainResumed,
    ChainSkipped {
        direction: SkipDirection,
        preset: String,
    },
    ChainStopped,
    ChainReset,
    InterpolationComplete,
}

/// FIFO of pending events.
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    pending: VecDeque<EngineEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: EngineEvent) {
        tracing::trace!(?event, "engine event");
        self.pending.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes and yields every pending event in publication order.
    pub fn drain(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.pending.drain(..)
    }
}
