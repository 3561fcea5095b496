//! Errors raised by the lock and attach stores

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Store unreachable, or no pooled connection available in time
    #[error("store connection error: {0}")]
    ConnectionError(String),

    /// The store answered but the command failed
    #[error("store command failed: {0}")]
    CommandError(String),
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_io_error() || err.is_timeout() {
            CacheError::ConnectionError(err.to_string())
        } else {
            CacheError::CommandError(err.to_string())
        }
    }
}

#[cfg(feature = "cache")]
impl From<bb8::RunError<redis::RedisError>> for CacheError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(err) => err.into(),
            bb8::RunError::TimedOut => {
                CacheError::ConnectionError("timed out waiting for a pooled connection".to_string())
            }
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
