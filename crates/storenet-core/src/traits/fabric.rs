// # Fabric API Trait
//
// Defines the interface to the remote network-fabric control plane: sites,
// WAN uplinks, LANs and connector activation.
//
// ## Implementations
//
// - Cloudflare Magic WAN: `storenet-fabric-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use storenet_core::{FabricApi, SiteRequest};
//
// let site_id = fabric
//     .create_site(&SiteRequest {
//         name: "DTLR-1042".into(),
//         description: "Store 1042".into(),
//         connector_id: "c0ffee".into(),
//     })
//     .await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{LanConfig, LanDescriptor, WanDescriptor};

/// Body of a site creation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRequest {
    /// Derived site name, e.g. `DTLR-1042`
    pub name: String,
    /// Location name
    pub description: String,
    pub connector_id: String,
}

/// A site as listed by the fabric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSite {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub connector_id: Option<String>,
}

/// Body of a connector activation/deactivation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorUpdate {
    pub activated: bool,
    pub notes: String,
}

/// Body of a WAN creation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WanRequest {
    pub site_id: String,
    pub name: String,
    pub physport: u8,
    pub priority: u32,
    pub vlan_tag: u16,
}

/// Trait for fabric control-plane clients
///
/// Each method is a single request/response. Implementations never retry;
/// a response with `success=false` or a non-2xx status is returned as
/// [`crate::Error::UpstreamRejected`].
///
/// # Thread Safety
///
/// Implementations must be usable from several workflows at once.
#[async_trait]
pub trait FabricApi: Send + Sync {
    /// Create a site and return its fabric id
    async fn create_site(&self, request: &SiteRequest) -> Result<String, crate::Error>;

    /// List every site on the account
    async fn list_sites(&self) -> Result<Vec<RemoteSite>, crate::Error>;

    /// Delete a site and everything attached to it
    async fn delete_site(&self, site_id: &str) -> Result<(), crate::Error>;

    /// Activate or deactivate a connector
    async fn update_connector(
        &self,
        connector_id: &str,
        update: &ConnectorUpdate,
    ) -> Result<(), crate::Error>;

    /// Create a WAN uplink on a site
    async fn create_wan(
        &self,
        site_id: &str,
        request: &WanRequest,
    ) -> Result<WanDescriptor, crate::Error>;

    /// Create a LAN on a site
    async fn create_lan(
        &self,
        site_id: &str,
        config: &LanConfig,
    ) -> Result<LanDescriptor, crate::Error>;

    /// Read the current state of a LAN
    async fn get_lan(&self, site_id: &str, lan_id: &str) -> Result<LanDescriptor, crate::Error>;

    /// Replace a LAN's configuration
    ///
    /// The fabric has no partial update for reservations; `config` must be
    /// the full writable LAN object.
    async fn update_lan(
        &self,
        site_id: &str,
        lan_id: &str,
        config: &LanConfig,
    ) -> Result<LanDescriptor, crate::Error>;

    /// List the LANs of a site
    async fn list_lans(&self, site_id: &str) -> Result<Vec<LanDescriptor>, crate::Error>;

    /// Backend name (for logging)
    fn backend_name(&self) -> &'static str;
}

/// Fabric and DNS clients built from one backend configuration
#[derive(Clone)]
pub struct FabricBackend {
    pub fabric: std::sync::Arc<dyn FabricApi>,
    pub dns: std::sync::Arc<dyn crate::traits::DnsApi>,
}

/// Helper trait for constructing fabric backends from configuration
pub trait FabricBackendFactory: Send + Sync {
    /// Create the fabric and DNS clients
    fn create(
        &self,
        fabric: &crate::config::FabricConfig,
        dns: &crate::config::DnsConfig,
    ) -> Result<FabricBackend, crate::Error>;
}
