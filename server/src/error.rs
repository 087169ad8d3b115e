use thiserror::Error;

/// Session-level refusals. The messages double as the wire codes sent in
/// `Packet::SessionError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session_full")]
    SessionFull,
    #[error("session_not_found")]
    SessionNotFound,
    #[error("session_ended")]
    SessionEnded,
    #[error("already_in_session")]
    AlreadyInSession,
    #[error("not_in_session")]
    NotInSession,
    #[error("session_in_progress")]
    SessionInProgress,
    #[error("session_not_ready")]
    SessionNotReady,
    #[error("session_not_active")]
    SessionNotActive,
    #[error("server_at_capacity")]
    ServerAtCapacity,
    #[error("already_queued")]
    AlreadyQueued,
    #[error("queue_timeout")]
    QueueTimeout,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet codec error: {0}")]
    Codec(#[from] bincode::Error),
}
