use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Connection closed by broker")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Broker error: {0}")]
    Remote(String),
}
