//! Interfaces to the external systems of record
//!
//! - [`FabricApi`]: remote network-fabric control plane
//! - [`DnsApi`]: DNS provider
//! - [`ProvisioningStore`]: local relational store

pub mod dns;
pub mod fabric;
pub mod store;

pub use dns::{DnsApi, DnsRecord, DnsRecordRequest};
pub use fabric::{
    ConnectorUpdate, FabricApi, FabricBackend, FabricBackendFactory, RemoteSite, SiteRequest,
    WanRequest,
};
pub use store::{ProvisioningStore, StoreFactory};
