use mongodb::{bson::doc, options::ClientOptions, Client, Database};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{
    handle::{ReadOnlyHandle, ReadWriteHandle, StoreHandle},
    timed, Capability, ConnectionState, FederationError, StoreName,
};

/// Connection settings for one store. A missing URI is only an error once the
/// store is actually used.
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    pub uri: Option<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct FederationConfig {
    pub primary: StoreSettings,
    pub billing: StoreSettings,
    pub staff: StoreSettings,
    pub timeout: Duration,
}

impl FederationConfig {
    fn settings(&self, store: StoreName) -> &StoreSettings {
        match store {
            StoreName::Primary => &self.primary,
            StoreName::Billing => &self.billing,
            StoreName::Staff => &self.staff,
        }
    }
}

enum SlotState {
    Uninitialized,
    Connected { client: Client, database: Database },
    Closed,
}

struct Slot {
    store: StoreName,
    settings: StoreSettings,
    state: Mutex<SlotState>,
}

/// Process-wide registry of store connections.
///
/// Each store is connected on first use and cached until [`close_all`].
/// The per-slot lock is held across initialization, so concurrent first
/// callers share one client.
///
/// [`close_all`]: ConnectionFederator::close_all
pub struct ConnectionFederator {
    slots: Vec<Slot>,
    timeout: Duration,
}

impl ConnectionFederator {
    pub fn new(config: FederationConfig) -> Self {
        let slots = StoreName::ALL
            .iter()
            .map(|store| Slot {
                store: *store,
                settings: config.settings(*store).clone(),
                state: Mutex::new(SlotState::Uninitialized),
            })
            .collect();

        Self {
            slots,
            timeout: config.timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn slot(&self, store: StoreName) -> &Slot {
        &self.slots[store.index()]
    }

    async fn database(&self, store: StoreName) -> Result<Database, FederationError> {
        let slot = self.slot(store);
        let mut state = slot.state.lock().await;

        match &*state {
            SlotState::Connected { database, .. } => return Ok(database.clone()),
            SlotState::Closed => return Err(FederationError::Closed(store)),
            SlotState::Uninitialized => {}
        }

        let uri = slot
            .settings
            .uri
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(FederationError::MissingUri(store))?;

        let client = self.connect(slot.store, uri).await?;
        let database = client.database(&slot.settings.database);
        tracing::info!(
            store = %store,
            database = %slot.settings.database,
            "Store connection initialized"
        );

        *state = SlotState::Connected {
            client,
            database: database.clone(),
        };
        Ok(database)
    }

    async fn connect(&self, store: StoreName, uri: &str) -> Result<Client, FederationError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|source| FederationError::Connect { store, source })?;
        options.app_name = Some(format!("portal-service-{}", store));
        options.server_selection_timeout = Some(self.timeout);
        options.connect_timeout = Some(self.timeout);

        Client::with_options(options).map_err(|source| {
            tracing::error!(store = %store, error = %source, "Failed to create store client");
            FederationError::Connect { store, source }
        })
    }

    /// Capability-typed handle for any store.
    pub async fn get(&self, store: StoreName) -> Result<StoreHandle, FederationError> {
        let database = self.database(store).await?;
        Ok(match store.capability() {
            Capability::ReadWrite => {
                StoreHandle::ReadWrite(ReadWriteHandle::new(store, database, self.timeout))
            }
            Capability::ReadOnly => {
                StoreHandle::ReadOnly(ReadOnlyHandle::new(store, database, self.timeout))
            }
        })
    }

    pub async fn primary(&self) -> Result<ReadWriteHandle, FederationError> {
        let database = self.database(StoreName::Primary).await?;
        Ok(ReadWriteHandle::new(StoreName::Primary, database, self.timeout))
    }

    pub async fn billing(&self) -> Result<ReadOnlyHandle, FederationError> {
        let database = self.database(StoreName::Billing).await?;
        Ok(ReadOnlyHandle::new(StoreName::Billing, database, self.timeout))
    }

    pub async fn staff(&self) -> Result<ReadOnlyHandle, FederationError> {
        let database = self.database(StoreName::Staff).await?;
        Ok(ReadOnlyHandle::new(StoreName::Staff, database, self.timeout))
    }

    pub async fn state(&self, store: StoreName) -> ConnectionState {
        match &*self.slot(store).state.lock().await {
            SlotState::Uninitialized => ConnectionState::Uninitialized,
            SlotState::Connected { .. } => ConnectionState::Connected,
            SlotState::Closed => ConnectionState::Closed,
        }
    }

    /// Round-trip a `ping` to the store, connecting it first if needed.
    pub async fn ping(&self, store: StoreName) -> Result<(), FederationError> {
        let database = self.database(store).await?;
        timed(store, self.timeout, database.run_command(doc! { "ping": 1 }, None)).await?;
        Ok(())
    }

    /// Close every initialized client. Safe to call more than once; any later
    /// `get` fails with [`FederationError::Closed`].
    pub async fn close_all(&self) {
        for slot in &self.slots {
            let previous = {
                let mut state = slot.state.lock().await;
                std::mem::replace(&mut *state, SlotState::Closed)
            };

            if let SlotState::Connected { client, .. } = previous {
                client.shutdown().await;
                tracing::info!(store = %slot.store, "Store connection closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(primary: Option<&str>) -> FederationConfig {
        FederationConfig {
            primary: StoreSettings {
                uri: primary.map(str::to_string),
                database: "portal".into(),
            },
            billing: StoreSettings {
                uri: None,
                database: "billing".into(),
            },
            staff: StoreSettings {
                uri: Some("   ".into()),
                database: "staff".into(),
            },
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_missing_read_only_uri_does_not_block_primary() {
        let federator = ConnectionFederator::new(config(Some("mongodb://127.0.0.1:1")));

        let err = federator.billing().await.unwrap_err();
        assert!(matches!(err, FederationError::MissingUri(StoreName::Billing)));
        let err = federator.staff().await.unwrap_err();
        assert!(matches!(err, FederationError::MissingUri(StoreName::Staff)));

        assert!(federator.primary().await.is_ok());
        assert_eq!(
            federator.state(StoreName::Primary).await,
            ConnectionState::Connected
        );
        assert_eq!(
            federator.state(StoreName::Billing).await,
            ConnectionState::Uninitialized
        );

        federator.close_all().await;
    }

    #[tokio::test]
    async fn test_get_returns_capability_typed_handles() {
        let federator = ConnectionFederator::new(config(Some("mongodb://127.0.0.1:1")));

        let handle = federator.get(StoreName::Primary).await.unwrap();
        assert!(matches!(handle, StoreHandle::ReadWrite(_)));

        federator.close_all().await;
    }

    #[tokio::test]
    async fn test_close_all_is_idempotent_and_final() {
        let federator = ConnectionFederator::new(config(Some("mongodb://127.0.0.1:1")));
        federator.primary().await.unwrap();

        federator.close_all().await;
        federator.close_all().await;

        for store in StoreName::ALL {
            assert_eq!(federator.state(store).await, ConnectionState::Closed);
        }
        assert!(matches!(
            federator.primary().await,
            Err(FederationError::Closed(StoreName::Primary))
        ));
    }

    #[tokio::test]
    async fn test_missing_primary_uri_fails_at_first_use() {
        let federator = ConnectionFederator::new(config(None));
        let err = federator.primary().await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("PRIMARY_MONGODB_URI"));
    }
}
