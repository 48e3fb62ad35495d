// # storenet-core
//
// Core library for provisioning store WAN connectivity.
//
// ## Architecture Overview
//
// - **address**: subnet arithmetic and DHCP reservation slots (pure)
// - **traits**: interfaces to the fabric control plane, the DNS provider and
//   the local store
// - **workflow**: site provisioning/decommissioning, reservations and fleet
//   address assignment, driven over those interfaces
// - **actions**: the control surface operator tooling calls into
// - **registry**: backend factories selected by configuration
// - **store**: memory and file implementations of the local store

pub mod actions;
pub mod address;
pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;
pub mod traits;
pub mod workflow;

// Re-export core types for convenience
pub use actions::{Action, ActionOutcome, ControlSurface};
pub use address::{DeviceClass, SubnetLedger};
pub use api::{ApiEnvelope, ApiMessage, ApiOutcome};
pub use config::{
    AddressingConfig, DnsConfig, FabricConfig, ProvisioningConfig, StoreConfig, StorenetConfig,
};
pub use error::{Error, Result};
pub use registry::BackendRegistry;
pub use store::{FileStore, MemoryStore};
pub use traits::{DnsApi, FabricApi, FabricBackend, FabricBackendFactory, ProvisioningStore};
pub use workflow::{
    EventSink, LocationAddressAssigner, ReservationManager, SiteDecommissioner, SiteProvisioner,
    WorkflowContext, WorkflowEvent,
};
