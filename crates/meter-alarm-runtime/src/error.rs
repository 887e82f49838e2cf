use thiserror::Error;

/// Errors surfaced by the alarm actor handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Alarm actor channel closed")]
    ChannelClosed,

    #[error("Alarm actor dropped the reply for session {0}")]
    ReplyDropped(u64),
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
