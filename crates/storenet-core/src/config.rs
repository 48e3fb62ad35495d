//! Configuration types for storenet
//!
//! This module defines all configuration structures used throughout the crate.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Main storenet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorenetConfig {
    /// Fabric control-plane backend
    pub fabric: FabricConfig,

    /// Local store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Address plan
    #[serde(default)]
    pub addressing: AddressingConfig,

    /// Provisioning naming and behaviour
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// DNS zone settings
    #[serde(default)]
    pub dns: DnsConfig,
}

impl StorenetConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.fabric.validate()?;
        self.store.validate()?;
        self.addressing.validate()?;
        self.provisioning.validate()?;
        self.dns.validate()?;
        Ok(())
    }
}

/// Fabric backend configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FabricConfig {
    /// Cloudflare Magic WAN
    Cloudflare {
        /// Account that owns the sites
        account_id: String,
        /// Value of the `X-Auth-Email` header
        auth_email: String,
        /// Value of the `X-Auth-Key` header
        auth_key: String,
        /// API base URL
        #[serde(default = "default_api_base")]
        api_base: String,
    },

    /// Custom backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl FabricConfig {
    /// Validate the fabric configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FabricConfig::Cloudflare {
                account_id,
                auth_email,
                auth_key,
                api_base,
            } => {
                if account_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare account id cannot be empty"));
                }
                if auth_email.is_empty() || auth_key.is_empty() {
                    return Err(crate::Error::config(
                        "Cloudflare auth email and key are both required",
                    ));
                }
                if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "Cloudflare API base must be an http(s) URL, got '{}'",
                        api_base
                    )));
                }
                Ok(())
            }
            FabricConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom fabric factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom fabric config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            FabricConfig::Cloudflare { .. } => "cloudflare",
            FabricConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        FabricConfig::Cloudflare {
            account_id: String::new(),
            auth_email: String::new(),
            auth_key: String::new(),
            api_base: default_api_base(),
        }
    }
}

impl fmt::Debug for FabricConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FabricConfig::Cloudflare {
                account_id,
                auth_email,
                api_base,
                ..
            } => f
                .debug_struct("Cloudflare")
                .field("account_id", account_id)
                .field("auth_email", auth_email)
                .field("auth_key", &"<REDACTED>")
                .field("api_base", api_base)
                .finish(),
            FabricConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<REDACTED>")
                .finish(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

/// Local store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the store document
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            StoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Fleet address plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressingConfig {
    /// Block store /24s are carved from; the walk starts at its written address
    #[serde(default = "default_store_base")]
    pub store_base: Ipv4Net,

    /// Range every store block must stay inside
    #[serde(default = "default_private_range")]
    pub private_range: Ipv4Net,

    /// Prefix length of a store block
    #[serde(default = "default_store_prefix")]
    pub store_prefix: u8,

    /// Location codes at or above this use `secure_base_high`
    #[serde(default = "default_secure_threshold")]
    pub secure_threshold: u32,

    /// Secure network template for high codes; the third octet is replaced
    #[serde(default = "default_secure_base_high")]
    pub secure_base_high: Ipv4Net,

    /// Secure network template for low codes
    #[serde(default = "default_secure_base_low")]
    pub secure_base_low: Ipv4Net,

    /// Type label of locations that receive an address plan
    #[serde(default = "default_location_type")]
    pub location_type: String,
}

impl AddressingConfig {
    /// Validate the address plan
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.store_prefix < self.store_base.prefix_len() || self.store_prefix > 30 {
            return Err(crate::Error::config(format!(
                "Store prefix /{} must lie between /{} and /30",
                self.store_prefix,
                self.store_base.prefix_len()
            )));
        }
        if !self.private_range.contains(&self.store_base.addr()) {
            return Err(crate::Error::config(format!(
                "Store base {} lies outside private range {}",
                self.store_base, self.private_range
            )));
        }
        for base in [&self.secure_base_high, &self.secure_base_low] {
            if base.prefix_len() < 24 {
                return Err(crate::Error::config(format!(
                    "Secure network template {} must be /24 or longer",
                    base
                )));
            }
        }
        if self.location_type.is_empty() {
            return Err(crate::Error::config("Location type label cannot be empty"));
        }
        Ok(())
    }
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            store_base: default_store_base(),
            private_range: default_private_range(),
            store_prefix: default_store_prefix(),
            secure_threshold: default_secure_threshold(),
            secure_base_high: default_secure_base_high(),
            secure_base_low: default_secure_base_low(),
            location_type: default_location_type(),
        }
    }
}

fn net(addr: [u8; 4], prefix: u8) -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::from(addr), prefix).unwrap_or_else(|_| Ipv4Net::from(Ipv4Addr::from(addr)))
}

fn default_store_base() -> Ipv4Net {
    net([172, 17, 0, 0], 12)
}

fn default_private_range() -> Ipv4Net {
    net([172, 16, 0, 0], 12)
}

fn default_store_prefix() -> u8 {
    24
}

fn default_secure_threshold() -> u32 {
    3000
}

fn default_secure_base_high() -> Ipv4Net {
    net([10, 66, 0, 192], 26)
}

fn default_secure_base_low() -> Ipv4Net {
    net([10, 67, 0, 192], 26)
}

fn default_location_type() -> String {
    "Store".to_string()
}

/// Naming and behaviour of the provisioning workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Site names are `<prefix>-<location code>`
    #[serde(default = "default_site_prefix")]
    pub site_prefix: String,

    /// Connector description/notes while unattached
    #[serde(default = "default_connector_note")]
    pub connector_note: String,

    /// Location code recorded on unattached connectors
    #[serde(default = "default_available_code")]
    pub available_code: String,

    /// DNS server handed out by LAN DHCP servers
    #[serde(default = "default_lan_dns_server")]
    pub lan_dns_server: Ipv4Addr,

    /// Undo completed provisioning steps when a later step fails
    #[serde(default)]
    pub rollback_on_failure: bool,

    /// Capacity of the workflow event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ProvisioningConfig {
    /// Validate the provisioning settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.site_prefix.is_empty() {
            return Err(crate::Error::config("Site prefix cannot be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Site name for a location code
    pub fn site_name(&self, code: &str) -> String {
        format!("{}-{}", self.site_prefix, code)
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            site_prefix: default_site_prefix(),
            connector_note: default_connector_note(),
            available_code: default_available_code(),
            lan_dns_server: default_lan_dns_server(),
            rollback_on_failure: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_site_prefix() -> String {
    "DTLR".to_string()
}

fn default_connector_note() -> String {
    "DTLR".to_string()
}

fn default_available_code() -> String {
    "Available".to_string()
}

fn default_lan_dns_server() -> Ipv4Addr {
    Ipv4Addr::new(1, 1, 1, 1)
}

fn default_event_channel_capacity() -> usize {
    100
}

/// DNS zone settings for device records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Zone holding device records
    #[serde(default)]
    pub zone_id: String,

    /// Zone apex, used for printer aliases
    #[serde(default = "default_domain")]
    pub domain: String,

    /// TTL of device `A` records
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// First tag put on every device record
    #[serde(default = "default_tag_base")]
    pub tag_base: String,
}

impl DnsConfig {
    /// Validate the DNS settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domain.is_empty() {
            return Err(crate::Error::config("DNS domain cannot be empty"));
        }
        if self.ttl == 0 {
            return Err(crate::Error::config("DNS TTL must be > 0"));
        }
        Ok(())
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            zone_id: String::new(),
            domain: default_domain(),
            ttl: default_ttl(),
            tag_base: default_tag_base(),
        }
    }
}

fn default_domain() -> String {
    "dtlronline.com".to_string()
}

fn default_ttl() -> u32 {
    3600
}

fn default_tag_base() -> String {
    "dtlronline".to_string()
}
