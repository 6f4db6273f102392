/// Result alias that carries the custom [`MetronomeError`] type.
pub type Result<T> = std::result::Result<T, MetronomeError>;

/// Common error type for the core crate.
///
/// None of these cross the public playback surface: the controller logs them
/// and keeps running in a degraded mode.
#[derive(Debug, thiserror::Error)]
pub enum MetronomeError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// No sound-rendering engine could be created on this host.
    #[error("audio engine unavailable: {0}")]
    EngineUnavailable(String),
    /// The engine refused to resume, typically until the user interacts.
    #[error("audio engine is suspended")]
    EngineSuspended,
    #[error("audio engine has been closed")]
    EngineClosed,
    /// The lock-free voice queue between scheduler and renderer is full.
    #[error("voice queue is full")]
    QueueFull,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("wake lock unavailable: {0}")]
    WakeLock(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl MetronomeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for MetronomeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MetronomeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
