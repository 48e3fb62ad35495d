// # DNS API Trait
//
// Defines the interface for creating, finding and deleting device records
// at the DNS provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of a record creation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordRequest {
    /// Record value (an address for `A` records)
    pub content: String,
    /// Record name relative to the zone, e.g. `printer-1.s1042`
    pub name: String,
    pub proxied: bool,
    #[serde(rename = "type")]
    pub record_type: String,
    pub comment: String,
    pub tags: Vec<String>,
    pub ttl: u32,
}

/// A record as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub content: String,
}

/// Trait for DNS provider clients
///
/// Same contract as [`crate::FabricApi`]: one request per call, no retries.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Create a record and return its id
    async fn create_record(&self, request: &DnsRecordRequest) -> Result<String, crate::Error>;

    /// Find records with an exact name
    async fn query_records(&self, name: &str) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Delete a record by id
    async fn delete_record(&self, record_id: &str) -> Result<(), crate::Error>;
}
