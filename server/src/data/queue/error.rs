//! Message queue error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue configuration error: {0}")]
    Config(String),

    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("consumer group error: {0}")]
    ConsumerGroup(String),

    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("queue operation failed: {0}")]
    Operation(String),

    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

impl QueueError {
    /// True when the failure is about the backend being momentarily
    /// unreachable rather than about the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QueueError::Connection(_) | QueueError::Redis(_) | QueueError::Pool(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_not_found_display() {
        let err = QueueError::StreamNotFound("subscription:abc".to_string());
        assert_eq!(err.to_string(), "stream not found: subscription:abc");
    }

    #[test]
    fn config_error_is_not_transient() {
        let err = QueueError::Config("redis_url required".to_string());
        assert!(!err.is_transient());
    }
}
