// # Memory Store
//
// In-memory implementation of ProvisioningStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Used by the
// test suites and for dry runs against a sandbox fabric account.
//
// ## Crash Behavior
//
// - All rows are lost on restart/crash
// - No recovery possible (state is in-memory only)

use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::tables::Tables;
use crate::Error;
use crate::model::{
    Connector, LanDescriptor, Location, LocationFull, Reservation, ReservationDraft, Site,
    SiteDraft,
};
use crate::traits::store::{ProvisioningStore, StoreFactory};

/// In-memory store implementation
///
/// All tables live behind one RwLock, so every method observes a consistent
/// snapshot.
///
/// # Example
///
/// ```rust,no_run
/// use storenet_core::model::Location;
/// use storenet_core::store::MemoryStore;
/// use storenet_core::ProvisioningStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///     let location = store
///         .upsert_location(Location::new("1042", "Store 1042", "Store"))
///         .await?;
///
///     let found = store.location_by_code("1042").await?;
///     assert_eq!(found.map(|l| l.id), Some(location.id));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reservation rows
    pub async fn reservation_count(&self) -> usize {
        self.inner.read().await.reservations.len()
    }

    /// Number of site rows
    pub async fn site_count(&self) -> usize {
        self.inner.read().await.sites.len()
    }

    /// Drop every row
    pub async fn clear(&self) {
        *self.inner.write().await = Tables::default();
    }
}

#[async_trait]
impl ProvisioningStore for MemoryStore {
    async fn get_location(&self, id: Uuid) -> Result<Option<Location>, Error> {
        Ok(self.inner.read().await.get_location(id))
    }

    async fn location_by_code(&self, code: &str) -> Result<Option<Location>, Error> {
        self.inner.read().await.location_by_code(code)
    }

    async fn locations_by_type(&self, label: &str) -> Result<Vec<Location>, Error> {
        Ok(self.inner.read().await.locations_by_type(label))
    }

    async fn upsert_location(&self, location: Location) -> Result<Location, Error> {
        Ok(self.inner.write().await.upsert_location(location))
    }

    async fn set_location_addressing(
        &self,
        id: Uuid,
        ip_schema: Vec<Ipv4Net>,
        aptos_network: Option<Ipv4Net>,
    ) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .set_location_addressing(id, ip_schema, aptos_network)
    }

    async fn location_full(&self, id: Uuid) -> Result<Option<LocationFull>, Error> {
        Ok(self.inner.read().await.location_full(id))
    }

    async fn get_connector(&self, id: &str) -> Result<Option<Connector>, Error> {
        Ok(self.inner.read().await.get_connector(id))
    }

    async fn connector_by_serial(&self, serial: &str) -> Result<Option<Connector>, Error> {
        Ok(self.inner.read().await.connector_by_serial(serial))
    }

    async fn update_connector(&self, connector: &Connector) -> Result<(), Error> {
        self.inner.write().await.update_connector(connector)
    }

    async fn upsert_connector(&self, connector: Connector) -> Result<Connector, Error> {
        Ok(self.inner.write().await.upsert_connector(connector))
    }

    async fn site_for_location(&self, location_id: Uuid) -> Result<Option<Site>, Error> {
        Ok(self.inner.read().await.site_for_location(location_id))
    }

    async fn insert_site(&self, draft: SiteDraft) -> Result<Site, Error> {
        self.inner.write().await.insert_site(draft)
    }

    async fn update_site_lans(&self, site_id: Uuid, lans: Vec<LanDescriptor>) -> Result<(), Error> {
        self.inner.write().await.update_site_lans(site_id, lans)
    }

    async fn delete_site(&self, site_id: Uuid) -> Result<(), Error> {
        self.inner.write().await.delete_site(site_id);
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, Error> {
        Ok(self.inner.read().await.get_reservation(id))
    }

    async fn reservation_by_mac(&self, mac: &str) -> Result<Option<Reservation>, Error> {
        Ok(self.inner.read().await.reservation_by_mac(mac))
    }

    async fn reservations_for_site(&self, mwan_site_id: &str) -> Result<Vec<Reservation>, Error> {
        Ok(self.inner.read().await.reservations_for_site(mwan_site_id))
    }

    async fn insert_reservation(&self, draft: ReservationDraft) -> Result<Reservation, Error> {
        self.inner.write().await.insert_reservation(draft)
    }

    async fn delete_reservation(&self, id: Uuid) -> Result<(), Error> {
        self.inner.write().await.delete_reservation(id);
        Ok(())
    }

    async fn delete_reservations_for_site(&self, mwan_site_id: &str) -> Result<usize, Error> {
        Ok(self
            .inner
            .write()
            .await
            .delete_reservations_for_site(mwan_site_id))
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store
        Ok(())
    }
}

/// Factory for [`MemoryStore`]
#[derive(Debug, Default)]
pub struct MemoryStoreFactory;

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn create(
        &self,
        _config: &serde_json::Value,
    ) -> Result<Box<dyn ProvisioningStore>, Error> {
        Ok(Box::new(MemoryStore::new()))
    }
}
