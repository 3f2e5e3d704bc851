use thiserror::Error;

/// Errors that can occur when interacting with the checkout stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back into a domain value.
    #[error("Corrupt {entity} row: {reason}")]
    Corrupt {
        entity: &'static str,
        reason: String,
    },

    /// The store refused to start work, e.g. because it is shutting down.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn corrupt(entity: &'static str, reason: impl std::fmt::Display) -> Self {
        StoreError::Corrupt {
            entity,
            reason: reason.to_string(),
        }
    }

    /// Returns true if retrying the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StoreError::Unavailable(_) => true,
            StoreError::Migration(_) | StoreError::Corrupt { .. } => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
