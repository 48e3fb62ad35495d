// # Provisioning Store Trait
//
// Defines the interface to the local relational store: the single source of
// truth once a workflow step has persisted to it.
//
// ## Implementations
//
// - `MemoryStore`: tables held in memory
// - `FileStore`: JSON document with atomic writes and backup recovery
//
// Each method is one row-level read or write; the store offers no
// multi-row transaction.

use async_trait::async_trait;
use ipnet::Ipv4Net;
use uuid::Uuid;

use crate::model::{
    Connector, LanDescriptor, Location, LocationFull, Reservation, ReservationDraft, Site,
    SiteDraft,
};

/// Trait for local store implementations
///
/// All methods must be safe to call concurrently. Lookups return `Ok(None)`
/// for a missing row; updates of a missing row fail with
/// [`crate::Error::NotFound`].
#[async_trait]
pub trait ProvisioningStore: Send + Sync {
    /// Get a location by id
    async fn get_location(&self, id: Uuid) -> Result<Option<Location>, crate::Error>;

    /// Get a location by its 4-character code
    async fn location_by_code(&self, code: &str) -> Result<Option<Location>, crate::Error>;

    /// All locations with the given type label, ordered by code
    async fn locations_by_type(&self, label: &str) -> Result<Vec<Location>, crate::Error>;

    /// Insert a location, or update the row with the same code
    ///
    /// On conflict the existing id is kept.
    async fn upsert_location(&self, location: Location) -> Result<Location, crate::Error>;

    /// Set the address assignment of a location
    async fn set_location_addressing(
        &self,
        id: Uuid,
        ip_schema: Vec<Ipv4Net>,
        aptos_network: Option<Ipv4Net>,
    ) -> Result<(), crate::Error>;

    /// Location with its connectors, site and the site's reservations
    async fn location_full(&self, id: Uuid) -> Result<Option<LocationFull>, crate::Error>;

    /// Get a connector by fabric id
    async fn get_connector(&self, id: &str) -> Result<Option<Connector>, crate::Error>;

    /// Get a connector by hardware serial
    async fn connector_by_serial(&self, serial: &str) -> Result<Option<Connector>, crate::Error>;

    /// Overwrite an existing connector row
    async fn update_connector(&self, connector: &Connector) -> Result<(), crate::Error>;

    /// Insert a connector, or update the row with the same serial
    async fn upsert_connector(&self, connector: Connector) -> Result<Connector, crate::Error>;

    /// The site of a location, if provisioned
    async fn site_for_location(&self, location_id: Uuid) -> Result<Option<Site>, crate::Error>;

    /// Insert a site row
    ///
    /// Fails with [`crate::Error::AlreadyExists`] if the location already has
    /// a site.
    async fn insert_site(&self, draft: SiteDraft) -> Result<Site, crate::Error>;

    /// Replace the LAN list of a site
    async fn update_site_lans(
        &self,
        site_id: Uuid,
        lans: Vec<LanDescriptor>,
    ) -> Result<(), crate::Error>;

    /// Delete a site row (no-op if missing)
    async fn delete_site(&self, site_id: Uuid) -> Result<(), crate::Error>;

    /// Get a reservation by id
    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, crate::Error>;

    /// Get the reservation of a normalised MAC
    async fn reservation_by_mac(&self, mac: &str) -> Result<Option<Reservation>, crate::Error>;

    /// Reservations on a fabric site
    async fn reservations_for_site(
        &self,
        mwan_site_id: &str,
    ) -> Result<Vec<Reservation>, crate::Error>;

    /// Insert a reservation row
    ///
    /// Fails with [`crate::Error::AlreadyExists`] if the MAC is reserved.
    async fn insert_reservation(
        &self,
        draft: ReservationDraft,
    ) -> Result<Reservation, crate::Error>;

    /// Delete a reservation row (no-op if missing)
    async fn delete_reservation(&self, id: Uuid) -> Result<(), crate::Error>;

    /// Delete every reservation on a fabric site and return how many went
    async fn delete_reservations_for_site(
        &self,
        mwan_site_id: &str,
    ) -> Result<usize, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing stores from configuration
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Create a store from its configuration block
    async fn create(
        &self,
        config: &serde_json::Value,
    ) -> Result<Box<dyn ProvisioningStore>, crate::Error>;
}
