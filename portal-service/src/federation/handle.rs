use futures::TryStreamExt;
use mongodb::{
    bson::{Bson, Document},
    options::{CountOptions, FindOneOptions, FindOptions},
    Collection, Database,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{timed, FederationError, StoreName};

/// Commands a read-only handle may pass through `run_command`.
const READ_COMMANDS: &[&str] = &[
    "aggregate",
    "buildinfo",
    "collstats",
    "count",
    "dbstats",
    "distinct",
    "explain",
    "find",
    "getmore",
    "hello",
    "ismaster",
    "killcursors",
    "listcollections",
    "listindexes",
    "ping",
];

const WRITING_STAGES: &[&str] = &["$out", "$merge"];

/// Handle for a store this service owns.
#[derive(Clone, Debug)]
pub struct ReadWriteHandle {
    store: StoreName,
    database: Database,
    timeout: Duration,
}

impl ReadWriteHandle {
    pub(super) fn new(store: StoreName, database: Database, timeout: Duration) -> Self {
        Self {
            store,
            database,
            timeout,
        }
    }

    pub fn store(&self) -> StoreName {
        self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

/// Handle for a store owned by another system.
///
/// There is no way to get a raw `Collection` out of this type, and the only
/// untyped entry point refuses anything not on the read allow-list.
#[derive(Clone, Debug)]
pub struct ReadOnlyHandle {
    store: StoreName,
    database: Database,
    timeout: Duration,
}

impl ReadOnlyHandle {
    pub(super) fn new(store: StoreName, database: Database, timeout: Duration) -> Self {
        Self {
            store,
            database,
            timeout,
        }
    }

    pub fn store(&self) -> StoreName {
        self.store
    }

    pub fn collection<T>(&self, name: &str) -> ReadOnlyCollection<T> {
        ReadOnlyCollection {
            store: self.store,
            inner: self.database.collection(name),
            timeout: self.timeout,
        }
    }

    /// Run a database command after checking it cannot write.
    pub async fn run_command(&self, command: Document) -> Result<Document, FederationError> {
        ensure_read_only(self.store, &command)?;
        timed(
            self.store,
            self.timeout,
            self.database.run_command(command, None),
        )
        .await
    }
}

/// Capability-typed result of [`super::ConnectionFederator::get`].
#[derive(Clone, Debug)]
pub enum StoreHandle {
    ReadWrite(ReadWriteHandle),
    ReadOnly(ReadOnlyHandle),
}

/// Query-only view of a collection.
#[derive(Clone, Debug)]
pub struct ReadOnlyCollection<T> {
    store: StoreName,
    inner: Collection<T>,
    timeout: Duration,
}

impl<T> ReadOnlyCollection<T>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    pub async fn find(
        &self,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<T>, FederationError> {
        let options = options.into();
        timed(self.store, self.timeout, async {
            let cursor = self.inner.find(filter, options).await?;
            cursor.try_collect::<Vec<T>>().await
        })
        .await
    }

    pub async fn find_one(
        &self,
        filter: Document,
        options: impl Into<Option<FindOneOptions>>,
    ) -> Result<Option<T>, FederationError> {
        timed(
            self.store,
            self.timeout,
            self.inner.find_one(filter, options),
        )
        .await
    }

    pub async fn count_documents(
        &self,
        filter: Document,
        options: impl Into<Option<CountOptions>>,
    ) -> Result<u64, FederationError> {
        timed(
            self.store,
            self.timeout,
            self.inner.count_documents(filter, options),
        )
        .await
    }
}

/// Reject any command that could modify `store`. No I/O happens here.
pub fn ensure_read_only(store: StoreName, command: &Document) -> Result<(), FederationError> {
    let violation = |command: &str| FederationError::ReadOnlyViolation {
        store,
        command: command.to_string(),
    };

    let name = command.keys().next().ok_or_else(|| violation("<empty>"))?;
    let lowered = name.to_ascii_lowercase();

    if !READ_COMMANDS.contains(&lowered.as_str()) {
        return Err(violation(name));
    }

    if lowered == "aggregate" {
        if let Ok(pipeline) = command.get_array("pipeline") {
            let writes = pipeline.iter().any(|stage| match stage {
                Bson::Document(stage) => stage.keys().any(|k| WRITING_STAGES.contains(&k.as_str())),
                _ => false,
            });
            if writes {
                return Err(violation("aggregate with $out/$merge"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_mutating_commands_are_rejected() {
        let commands = [
            doc! { "insert": "invoices", "documents": [{ "x": 1 }] },
            doc! { "update": "invoices", "updates": [] },
            doc! { "delete": "invoices", "deletes": [] },
            doc! { "findAndModify": "doctors", "query": {} },
            doc! { "drop": "doctors" },
            doc! { "createIndexes": "doctors", "indexes": [] },
            doc! { "dropDatabase": 1 },
            doc! {},
        ];

        for cmd in commands {
            let err = ensure_read_only(StoreName::Billing, &cmd).unwrap_err();
            assert!(
                matches!(err, FederationError::ReadOnlyViolation { store: StoreName::Billing, .. }),
                "expected rejection for {:?}",
                cmd
            );
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn test_aggregate_with_output_stage_is_rejected() {
        let cmd = doc! {
            "aggregate": "invoices",
            "pipeline": [{ "$match": {} }, { "$merge": { "into": "copy" } }],
            "cursor": {}
        };
        assert!(ensure_read_only(StoreName::Billing, &cmd).is_err());

        let cmd = doc! {
            "aggregate": "invoices",
            "pipeline": [{ "$match": { "status": "open" } }],
            "cursor": {}
        };
        assert!(ensure_read_only(StoreName::Billing, &cmd).is_ok());
    }

    #[test]
    fn test_queries_are_allowed() {
        assert!(ensure_read_only(StoreName::Staff, &doc! { "find": "doctors" }).is_ok());
        assert!(ensure_read_only(StoreName::Staff, &doc! { "ping": 1 }).is_ok());
        assert!(ensure_read_only(StoreName::Staff, &doc! { "listCollections": 1 }).is_ok());
    }

    #[tokio::test]
    async fn test_handle_rejects_write_without_network() {
        // Nothing listens on this port; a command that reached the network
        // would block on server selection instead of failing immediately.
        let client = mongodb::Client::with_uri_str("mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=5000")
            .await
            .unwrap();
        let handle = ReadOnlyHandle::new(
            StoreName::Billing,
            client.database("billing"),
            Duration::from_secs(5),
        );

        let started = std::time::Instant::now();
        let result = handle
            .run_command(doc! { "delete": "invoices", "deletes": [{ "q": {}, "limit": 0 }] })
            .await;

        assert!(matches!(result, Err(FederationError::ReadOnlyViolation { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
