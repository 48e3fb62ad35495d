//! Records shared by the workflows, the local store and the fabric client
//!
//! Local rows ([`Location`], [`Connector`], [`Site`], [`Reservation`]) mirror
//! what the local store persists. Fabric descriptors ([`WanDescriptor`],
//! [`LanDescriptor`]) are what the control plane returns; a site keeps the
//! last known copy of its LANs so reservations can be computed locally.

use crate::address::DeviceClass;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use uuid::Uuid;

/// VLAN tag of the secure LAN that hosts device reservations
pub const SECURE_VLAN_TAG: u16 = 100;

/// Length of a location code used as a lookup key
pub const LOCATION_CODE_LEN: usize = 4;

/// Check that a location code can be used as a lookup key
pub fn validate_location_code(code: &str) -> Result<()> {
    if code.trim().chars().count() != LOCATION_CODE_LEN {
        return Err(Error::invalid_input(format!(
            "Location code '{}' must be exactly {} characters",
            code, LOCATION_CODE_LEN
        )));
    }
    Ok(())
}

/// A retail location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    /// Globally unique store code, e.g. `1042`
    pub code: String,
    pub name: String,
    /// Location type label, e.g. `Store` or `Warehouse`
    pub location_type: String,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub address_city: Option<String>,
    #[serde(default)]
    pub address_state: Option<String>,
    #[serde(default)]
    pub address_zip_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Assigned store blocks; at most one /24 today
    #[serde(default)]
    pub ip_schema: Vec<Ipv4Net>,
    /// Secure-VLAN /26 derived from the location code
    #[serde(default)]
    pub aptos_network: Option<Ipv4Net>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Location {
    /// Create a location with only identity fields set
    pub fn new(code: impl Into<String>, name: impl Into<String>, location_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            location_type: location_type.into(),
            address_line1: None,
            address_line2: None,
            address_city: None,
            address_state: None,
            address_zip_code: None,
            latitude: None,
            longitude: None,
            ip_schema: Vec::new(),
            aptos_network: None,
            tenant_id: None,
            updated_at: None,
        }
    }

    /// The store /24 used for the regular VLANs
    pub fn store_block(&self) -> Option<&Ipv4Net> {
        self.ip_schema.first()
    }
}

/// Whether a connector is currently carrying a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Active,
    Inactive,
}

/// A physical connector appliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    /// Fabric connector identifier
    pub id: String,
    /// Hardware serial number (unique)
    pub serial: String,
    pub active_device: ConnectorStatus,
    /// Attached location code, or the "available" sentinel
    pub location_code: String,
    /// Attached location; `None` means the connector is in the available pool
    #[serde(default)]
    pub location_id: Option<Uuid>,
    /// Site name while attached, default note otherwise
    pub description: String,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Connector {
    /// A connector in the available pool
    pub fn available(
        id: impl Into<String>,
        serial: impl Into<String>,
        available_code: &str,
        default_note: &str,
    ) -> Self {
        Self {
            id: id.into(),
            serial: serial.into(),
            active_device: ConnectorStatus::Inactive,
            location_code: available_code.to_string(),
            location_id: None,
            description: default_note.to_string(),
            tenant_id: None,
            deleted_at: None,
            updated_at: None,
        }
    }

    /// Whether the connector is attached to a location
    pub fn is_attached(&self) -> bool {
        self.location_id.is_some()
    }

    /// Attach to a location under the given site name
    pub fn attach(&mut self, location: &Location, site_name: &str, at: DateTime<Utc>) {
        self.location_id = Some(location.id);
        self.location_code = location.code.clone();
        self.description = site_name.to_string();
        self.active_device = ConnectorStatus::Active;
        self.deleted_at = None;
        self.updated_at = Some(at);
    }

    /// Return to the available pool and mark soft-deleted
    pub fn detach(&mut self, available_code: &str, default_note: &str, at: DateTime<Utc>) {
        self.location_id = None;
        self.location_code = available_code.to_string();
        self.description = default_note.to_string();
        self.active_device = ConnectorStatus::Inactive;
        self.deleted_at = Some(at);
        self.updated_at = Some(at);
    }
}

/// A WAN uplink as created on the fabric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WanDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub site_id: String,
    pub name: String,
    pub physport: u8,
    pub priority: u32,
    #[serde(default)]
    pub vlan_tag: u16,
}

/// DHCP server settings of a LAN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DhcpServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_pool_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_pool_end: Option<String>,
    /// MAC (lowercase, colon separated) -> reserved address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Static addressing block of a LAN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticAddressing {
    /// Gateway address with prefix, e.g. `10.0.5.1/26`
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_server: Option<DhcpServer>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// NAT settings of a LAN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanNat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_prefix: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// LAN fields owned by the fabric, never sent on update
pub const READ_ONLY_LAN_FIELDS: &[&str] = &["id", "site_id"];

/// Writable LAN settings, as sent to the fabric on create and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanConfig {
    pub name: String,
    pub physport: u8,
    #[serde(default)]
    pub vlan_tag: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_addressing: Option<StaticAddressing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat: Option<LanNat>,
    /// Fields the fabric returns that storenet does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LanConfig {
    /// Copy without the fields the fabric treats as read-only
    ///
    /// Used as the body of a LAN update. The update replaces the whole LAN,
    /// so every other field (routed subnets, HA link, ...) is sent back as read.
    pub fn writable(&self) -> LanConfig {
        let mut config = self.clone();
        for field in READ_ONLY_LAN_FIELDS {
            config.extra.remove(*field);
        }
        config
    }

    /// Reservation map of the LAN's DHCP server, if present
    pub fn reservations(&self) -> Option<&BTreeMap<String, String>> {
        self.static_addressing
            .as_ref()?
            .dhcp_server
            .as_ref()?
            .reservations
            .as_ref()
    }
}

/// A LAN as stored on the fabric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanDescriptor {
    pub id: String,
    #[serde(flatten)]
    pub config: LanConfig,
}

impl LanDescriptor {
    /// Whether this is the secure (reservation-hosting) LAN
    pub fn is_secure(&self) -> bool {
        self.config.vlan_tag == SECURE_VLAN_TAG
    }
}

/// A provisioned site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Local identity
    pub id: Uuid,
    /// Fabric site identifier
    pub mwan_site_id: String,
    pub connector_id: String,
    pub location_id: Uuid,
    /// Name of the location; the fabric site itself is named `<prefix>-<code>`
    pub name: String,
    #[serde(default)]
    pub location_lat: Option<f64>,
    #[serde(default)]
    pub location_long: Option<f64>,
    #[serde(default)]
    pub mwan_wans: Vec<WanDescriptor>,
    #[serde(default)]
    pub mwan_lans: Vec<LanDescriptor>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    /// The secure LAN (VLAN tag 100)
    pub fn secure_lan(&self) -> Option<&LanDescriptor> {
        self.mwan_lans.iter().find(|lan| lan.is_secure())
    }

    /// LAN list with `lan` swapped in
    ///
    /// Replaces the entry with the same id. A secure LAN with a new id
    /// replaces the old secure LAN. Anything else is appended.
    pub fn lans_with(&self, lan: LanDescriptor) -> Vec<LanDescriptor> {
        let mut lans = self.mwan_lans.clone();
        if let Some(existing) = lans.iter_mut().find(|existing| existing.id == lan.id) {
            *existing = lan;
            return lans;
        }
        if lan.is_secure() {
            lans.retain(|existing| !existing.is_secure());
        }
        lans.push(lan);
        lans
    }
}

/// Fields needed to insert a site row
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDraft {
    pub mwan_site_id: String,
    pub connector_id: String,
    pub location_id: Uuid,
    pub name: String,
    pub location_lat: Option<f64>,
    pub location_long: Option<f64>,
    pub mwan_wans: Vec<WanDescriptor>,
}

/// A device DHCP reservation on a site's secure LAN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub mwan_site_id: String,
    pub mwan_lan_id: String,
    /// Normalised MAC (lowercase, colon separated)
    pub reservations_mac: String,
    pub reservations_ip: Ipv4Addr,
    pub reservations_type: DeviceClass,
    /// DNS label, e.g. `printer-1.s1042`
    pub name: String,
    /// DNS provider record id of the `A` record
    #[serde(default)]
    pub dns_record: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// 1-based index of the device within its class, parsed from the name
    pub fn slot_index(&self) -> Option<u32> {
        let label = self.name.split('.').next()?;
        let (_, index) = label.rsplit_once('-')?;
        index.parse().ok()
    }
}

/// Fields needed to insert a reservation row
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationDraft {
    pub mwan_site_id: String,
    pub mwan_lan_id: String,
    pub reservations_mac: String,
    pub reservations_ip: Ipv4Addr,
    pub reservations_type: DeviceClass,
    pub name: String,
    pub dns_record: Option<String>,
}

/// A location with its related rows, read in one call
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFull {
    pub location: Location,
    pub connectors: Vec<Connector>,
    pub site: Option<Site>,
    pub reservations: Vec<Reservation>,
}

/// A hardware MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    /// Accepts 12 hex digits, optionally separated by `:` or `-`
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_input(format!("Invalid MAC address '{}'", s)));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::invalid_input(format!("Invalid MAC address '{}'", s)))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_normalisation() {
        let bare: MacAddress = "AABBCCDDEEFF".parse().unwrap();
        let dashed: MacAddress = "aa-bb-cc-dd-ee-ff".parse().unwrap();
        assert_eq!(bare, dashed);
        assert_eq!(bare.to_string(), "aa:bb:cc:dd:ee:ff");
        assert!("aabbccddee".parse::<MacAddress>().is_err());
        assert!("zzbbccddeeff".parse::<MacAddress>().is_err());
    }

    #[test]
    fn lan_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "id": "lan-1",
            "site_id": "site-9",
            "name": "SECURE",
            "physport": 1,
            "vlan_tag": 100,
            "ha_link": false,
            "static_addressing": {
                "address": "10.67.42.193/26",
                "dhcp_server": {
                    "dns_server": "1.1.1.1",
                    "dhcp_pool_start": "10.67.42.210",
                    "dhcp_pool_end": "10.67.42.254",
                    "reservations": { "aa:bb:cc:dd:ee:ff": "10.67.42.194" }
                }
            },
            "nat": { "static_prefix": "10.67.42.192/26" }
        });

        let lan: LanDescriptor = serde_json::from_value(raw.clone()).unwrap();
        assert!(lan.is_secure());
        assert_eq!(lan.id, "lan-1");
        assert_eq!(lan.config.extra.get("site_id"), Some(&Value::from("site-9")));
        assert_eq!(lan.config.reservations().unwrap().len(), 1);
        assert_eq!(serde_json::to_value(&lan).unwrap(), raw);

        let body = serde_json::to_value(lan.config.writable()).unwrap();
        assert!(body.get("site_id").is_none());
        assert!(body.get("id").is_none());
        assert_eq!(body["ha_link"], Value::from(false));
        assert_eq!(body["static_addressing"], raw["static_addressing"]);
    }

    #[test]
    fn connector_attach_detach() {
        let location = Location::new("1042", "Store 1042", "Store");
        let mut connector = Connector::available("c-1", "SN1", "Available", "DTLR");
        assert!(!connector.is_attached());

        let now = Utc::now();
        connector.attach(&location, "DTLR-1042", now);
        assert!(connector.is_attached());
        assert_eq!(connector.location_code, "1042");
        assert_eq!(connector.active_device, ConnectorStatus::Active);

        connector.detach("Available", "DTLR", now);
        assert!(!connector.is_attached());
        assert_eq!(connector.location_code, "Available");
        assert_eq!(connector.description, "DTLR");
        assert_eq!(connector.deleted_at, Some(now));
    }

    #[test]
    fn reservation_slot_index_from_name() {
        let reservation = Reservation {
            id: Uuid::new_v4(),
            mwan_site_id: "s".into(),
            mwan_lan_id: "l".into(),
            reservations_mac: "aa:bb:cc:dd:ee:ff".into(),
            reservations_ip: "10.0.0.2".parse().unwrap(),
            reservations_type: DeviceClass::Printer,
            name: "printer-2.s1042".into(),
            dns_record: None,
            created_at: Utc::now(),
        };
        assert_eq!(reservation.slot_index(), Some(2));
    }

    fn lan(id: &str, vlan_tag: u16) -> LanDescriptor {
        LanDescriptor {
            id: id.into(),
            config: LanConfig {
                name: format!("VLAN_{}", vlan_tag),
                physport: 1,
                vlan_tag,
                static_addressing: None,
                nat: None,
                extra: Map::new(),
            },
        }
    }

    #[test]
    fn lans_with_replaces_by_id_then_secure() {
        let site = Site {
            id: Uuid::new_v4(),
            mwan_site_id: "site-1".into(),
            connector_id: "c-1".into(),
            location_id: Uuid::new_v4(),
            name: "DTLR-1042".into(),
            location_lat: None,
            location_long: None,
            mwan_wans: Vec::new(),
            mwan_lans: vec![lan("lan-20", 20), lan("lan-100", 100)],
            created_at: Utc::now(),
        };

        let mut renamed = lan("lan-20", 20);
        renamed.config.name = "VND".into();
        let lans = site.lans_with(renamed);
        assert_eq!(lans.len(), 2);
        assert_eq!(lans[0].config.name, "VND");

        let lans = site.lans_with(lan("lan-100b", 100));
        assert_eq!(lans.len(), 2);
        assert_eq!(lans[1].id, "lan-100b");

        assert_eq!(site.lans_with(lan("lan-40", 40)).len(), 3);
    }

    #[test]
    fn location_codes_must_have_four_characters() {
        assert!(validate_location_code("1042").is_ok());
        assert!(validate_location_code("104").is_err());
        assert!(validate_location_code("10420").is_err());
    }
}
