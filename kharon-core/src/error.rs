use std::io;

/// Shared fatal/recoverable error type for every Kharon stage.
///
/// Stages absorb recoverable variants themselves (one log line, continue);
/// `KharonError` is what crosses a stage boundary on configuration or
/// protocol failure, and what `scheduler::hard_exit` logs before tripping
/// every stage's `DONE` bit.
#[derive(thiserror::Error, Debug)]
pub enum KharonError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("producer queue exhausted its arena (capacity {capacity})")]
    ArenaExhausted { capacity: usize },

    #[error("monotonicity violation: {0}")]
    Invariant(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("i/o error")]
    Io(#[from] io::Error),

    #[error("channel receive error")]
    Recv(#[from] channellib::RecvError),
}

impl KharonError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        KharonError::Configuration(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        KharonError::Invariant(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        KharonError::Protocol(msg.into())
    }

    /// True for errors that the caller must treat as fatal (configuration,
    /// invariant violations) rather than absorb-and-continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KharonError::Configuration(_)
                | KharonError::ArenaExhausted { .. }
                | KharonError::Invariant(_)
        )
    }
}
