/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the failure is worth retrying at per-pair or per-channel granularity.
    ///
    /// Lock timeouts, serialization failures and dropped connections surface as
    /// database or cache errors; bad input never heals on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db)) => {
                // 40001 serialization_failure, 40P01 deadlock_detected, 55P03 lock_not_available
                matches!(db.code().as_deref(), Some("40001" | "40P01" | "55P03"))
            }
            AppError::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed,
            ) => true,
            AppError::Cache(e) => e.is_timeout() || e.is_connection_dropped(),
            _ => false,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
