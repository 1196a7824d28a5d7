//! Connections to the three logical stores.
//!
//! The primary store is owned by this service and is read-write. The billing
//! and staff stores belong to other systems and are only ever read; handles for
//! them cannot express a write.

mod federator;
mod handle;

pub use federator::{ConnectionFederator, FederationConfig, StoreSettings};
pub use handle::{
    ensure_read_only, ReadOnlyCollection, ReadOnlyHandle, ReadWriteHandle, StoreHandle,
};

use mongodb::error::{ErrorKind, WriteFailure};
use serde::Serialize;
use std::{fmt, future::Future, time::Duration};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreName {
    Primary,
    Billing,
    Staff,
}

impl StoreName {
    pub const ALL: [StoreName; 3] = [StoreName::Primary, StoreName::Billing, StoreName::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::Primary => "primary",
            StoreName::Billing => "billing",
            StoreName::Staff => "staff",
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            StoreName::Primary => Capability::ReadWrite,
            StoreName::Billing | StoreName::Staff => Capability::ReadOnly,
        }
    }

    /// Environment variable holding this store's connection string.
    pub fn uri_env_key(&self) -> &'static str {
        match self {
            StoreName::Primary => "PRIMARY_MONGODB_URI",
            StoreName::Billing => "BILLING_MONGODB_URI",
            StoreName::Staff => "STAFF_MONGODB_URI",
        }
    }

    fn index(&self) -> usize {
        match self {
            StoreName::Primary => 0,
            StoreName::Billing => 1,
            StoreName::Staff => 2,
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    Closed,
}

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("no connection string configured for the {0} store (set {key})", key = .0.uri_env_key())]
    MissingUri(StoreName),

    #[error("{store} store is read-only; refusing command `{command}`")]
    ReadOnlyViolation { store: StoreName, command: String },

    #[error("{0} store connection has been closed")]
    Closed(StoreName),

    #[error("failed to initialize the {store} store client: {source}")]
    Connect {
        store: StoreName,
        source: mongodb::error::Error,
    },

    #[error("{0} store did not respond in time")]
    Timeout(StoreName),

    #[error("{store} store operation failed: {source}")]
    Query {
        store: StoreName,
        source: mongodb::error::Error,
    },
}

impl FederationError {
    pub fn store(&self) -> StoreName {
        match self {
            FederationError::MissingUri(store)
            | FederationError::Closed(store)
            | FederationError::Timeout(store) => *store,
            FederationError::ReadOnlyViolation { store, .. }
            | FederationError::Connect { store, .. }
            | FederationError::Query { store, .. } => *store,
        }
    }

    /// Misconfiguration or misuse, as opposed to a store being unreachable.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FederationError::MissingUri(_)
                | FederationError::ReadOnlyViolation { .. }
                | FederationError::Closed(_)
                | FederationError::Connect { .. }
        )
    }

    pub fn is_duplicate_key(&self) -> bool {
        match self {
            FederationError::Query { source, .. } => is_duplicate_key(source),
            _ => false,
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        ErrorKind::Command(e) => e.code == 11000,
        _ => false,
    }
}

/// Run a store call under the configured deadline.
pub async fn timed<T, F>(store: StoreName, limit: Duration, fut: F) -> Result<T, FederationError>
where
    F: Future<Output = Result<T, mongodb::error::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(FederationError::Query { store, source }),
        Err(_) => Err(FederationError::Timeout(store)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert_eq!(StoreName::Primary.capability(), Capability::ReadWrite);
        assert_eq!(StoreName::Billing.capability(), Capability::ReadOnly);
        assert_eq!(StoreName::Staff.capability(), Capability::ReadOnly);
    }

    #[test]
    fn test_missing_uri_message_names_variable() {
        let err = FederationError::MissingUri(StoreName::Billing);
        assert!(err.to_string().contains("BILLING_MONGODB_URI"));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_timed_reports_timeout() {
        let result: Result<(), _> = timed(
            StoreName::Staff,
            Duration::from_millis(20),
            std::future::pending::<Result<(), mongodb::error::Error>>(),
        )
        .await;

        assert!(matches!(result, Err(FederationError::Timeout(StoreName::Staff))));
    }
}
