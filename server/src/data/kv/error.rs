//! KV store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("kv configuration error: {0}")]
    Config(String),

    #[error("kv connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("kv operation failed: {0}")]
    Operation(String),

    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

impl KvError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KvError::Connection(_) | KvError::Redis(_) | KvError::Pool(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = KvError::Config("redis_url required".to_string());
        assert_eq!(err.to_string(), "kv configuration error: redis_url required");
    }

    #[test]
    fn operation_error_is_not_transient() {
        let err = KvError::Operation("bad key".to_string());
        assert!(!err.is_transient());
    }
}
