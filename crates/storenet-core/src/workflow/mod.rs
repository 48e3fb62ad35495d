//! Multi-system workflows
//!
//! Each workflow drives the fabric control plane, the DNS provider and the
//! local store through a fixed sequence of steps. Steps run strictly one
//! after another: every step needs the identifiers returned by the one
//! before it (site id, connector id, LAN id).
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │ WorkflowContext  │
//!                 └──────────────────┘
//!                          │
//!      ┌───────────────────┼───────────────────┐
//!      ▼                   ▼                   ▼
//! ┌───────────┐     ┌─────────────┐     ┌──────────────────┐
//! │ FabricApi │     │   DnsApi    │     │ProvisioningStore │
//! └───────────┘     └─────────────┘     └──────────────────┘
//! ```
//!
//! Nothing here retries. There is no cross-system transaction, so a failure
//! part-way leaves the systems diverged; see [`SiteProvisioner`] for the
//! optional compensation stage and [`SiteDecommissioner`] for manual cleanup.

pub mod events;
pub mod location_assigner;
pub mod reservation_manager;
pub mod site_decommissioner;
pub mod site_provisioner;

pub use events::{EventSink, WorkflowEvent};
pub use location_assigner::{AssignmentReport, LocationAddressAssigner, secure_network_for_code};
pub use reservation_manager::ReservationManager;
pub use site_decommissioner::{DecommissionReport, DecommissionStep, SiteDecommissioner};
pub use site_provisioner::{ProvisionJournal, ProvisionStage, SiteProvisioner};

use std::sync::Arc;

use crate::config::StorenetConfig;
use crate::error::Result;
use crate::model::{Location, Site};
use crate::traits::{DnsApi, FabricApi, ProvisioningStore};
use crate::Error;
use uuid::Uuid;

/// Handles shared by every workflow
#[derive(Clone)]
pub struct WorkflowContext {
    pub fabric: Arc<dyn FabricApi>,
    pub dns: Arc<dyn DnsApi>,
    pub store: Arc<dyn ProvisioningStore>,
    pub config: Arc<StorenetConfig>,
    pub events: EventSink,
}

impl WorkflowContext {
    pub fn new(
        fabric: Arc<dyn FabricApi>,
        dns: Arc<dyn DnsApi>,
        store: Arc<dyn ProvisioningStore>,
        config: StorenetConfig,
    ) -> Self {
        Self {
            fabric,
            dns,
            store,
            config: Arc::new(config),
            events: EventSink::disabled(),
        }
    }

    /// Attach an event sink
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub(crate) async fn require_location(&self, location_id: Uuid) -> Result<Location> {
        self.store
            .get_location(location_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Location {}", location_id)))
    }

    pub(crate) async fn require_site(&self, location: &Location) -> Result<Site> {
        self.store
            .site_for_location(location.id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Site for location {}", location.code)))
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("fabric", &self.fabric.backend_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
