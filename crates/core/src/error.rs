/// Result alias that carries the custom [`ReactiveError`] type.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// Free-form message, mostly used for poisoned locks and FFT failures.
    #[error("{0}")]
    Message(String),
    /// A caller supplied arguments the engine refuses to act on. Engine state
    /// is left exactly as it was before the call.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A preset name could not be resolved in the preset store.
    #[error("unknown preset `{0}`")]
    MissingPreset(String),
    /// The operation is not valid in the current state (for example resuming
    /// a chain that is not paused).
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn state<T: Into<String>>(msg: T) -> Self {
        Self::InvalidState(msg.into())
    }
}

impl From<&str> for ReactiveError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ReactiveError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
