// # Cloudflare Fabric Backend
//
// Implements `FabricApi` (Magic WAN sites, connectors, WANs, LANs) and
// `DnsApi` (zone DNS records) against the Cloudflare API v4.
//
// ## Behaviour
//
// - One HTTP request per trait call; no retries, no caching
// - Every response is decoded through the `{success, errors, messages,
//   result}` envelope; `success=false` or a non-2xx status becomes
//   `Error::UpstreamRejected` carrying the error list verbatim
// - Transport failures (connect, timeout, unreadable body) become
//   `Error::Http`
// - 30 second timeout per request
//
// ## Security Requirements
//
// - The auth key NEVER appears in logs or Debug output
// - The factory fails fast if credentials are empty
//
// ## API Reference
//
// - Sites: `/accounts/:account_id/magic/sites[/:site_id]`
// - WANs: `/accounts/:account_id/magic/sites/:site_id/wans`
// - LANs: `/accounts/:account_id/magic/sites/:site_id/lans[/:lan_id]`
// - Connectors: `/accounts/:account_id/magic/connectors/:connector_id`
// - DNS records: `/zones/:zone_id/dns_records[/:record_id]`

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use storenet_core::api::{ApiEnvelope, ApiOutcome};
use storenet_core::config::{DnsConfig, FabricConfig};
use storenet_core::model::{LanConfig, LanDescriptor, WanDescriptor};
use storenet_core::traits::{
    ConnectorUpdate, DnsApi, DnsRecord, DnsRecordRequest, FabricApi, FabricBackend,
    FabricBackendFactory, RemoteSite, SiteRequest, WanRequest,
};
use storenet_core::{BackendRegistry, Error, Result};

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const FABRIC: &str = "fabric";
const DNS: &str = "dns";

/// Cloudflare Magic WAN and DNS client
pub struct CloudflareFabric {
    account_id: String,
    zone_id: String,
    auth_email: String,
    /// ⚠️ NEVER log this value
    auth_key: String,
    api_base: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the auth key
impl std::fmt::Debug for CloudflareFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareFabric")
            .field("account_id", &self.account_id)
            .field("zone_id", &self.zone_id)
            .field("auth_email", &self.auth_email)
            .field("auth_key", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl CloudflareFabric {
    /// Create a client
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if a credential is empty, [`Error::Http`] if the
    /// HTTP client cannot be built.
    pub fn new(
        account_id: impl Into<String>,
        zone_id: impl Into<String>,
        auth_email: impl Into<String>,
        auth_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let account_id = account_id.into();
        let zone_id = zone_id.into();
        let auth_email = auth_email.into();
        let auth_key = auth_key.into();

        if account_id.is_empty() {
            return Err(Error::config("Cloudflare account id is required"));
        }
        if zone_id.is_empty() {
            return Err(Error::config("Cloudflare DNS zone id is required"));
        }
        if auth_email.is_empty() || auth_key.is_empty() {
            return Err(Error::config("Cloudflare auth email and key are required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            account_id,
            zone_id,
            auth_email,
            auth_key,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn sites_url(&self) -> String {
        format!("{}/accounts/{}/magic/sites", self.api_base, self.account_id)
    }

    fn site_url(&self, site_id: &str) -> String {
        format!("{}/{}", self.sites_url(), site_id)
    }

    fn lans_url(&self, site_id: &str) -> String {
        format!("{}/lans", self.site_url(site_id))
    }

    fn connector_url(&self, connector_id: &str) -> String {
        format!(
            "{}/accounts/{}/magic/connectors/{}",
            self.api_base, self.account_id, connector_id
        )
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone_id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Content-Type", "application/json")
            .header("X-Auth-Email", &self.auth_email)
            .header("X-Auth-Key", &self.auth_key)
    }

    async fn send(&self, service: &str, action: &str, request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", action, e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: unreadable response: {}", action, e)))?;
        tracing::debug!("{} {} -> {}", service, action, status);
        Ok((status, body))
    }

    /// Perform a call whose envelope must carry a result
    async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        action: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let (status, body) = self.send(service, action, request).await?;
        decode(service, action, status, &body)
    }

    /// Perform a call where only `success` matters
    async fn call_unit(&self, service: &str, action: &str, request: RequestBuilder) -> Result<()> {
        let (status, body) = self.send(service, action, request).await?;
        decode_unit(service, action, status, &body)
    }
}

/// A `result` that is either an object or a list of objects
///
/// WAN and LAN creation answer with a list even for a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::Many(items) => items.into_iter().next(),
            OneOrMany::One(item) => Some(item),
        }
    }
}

fn single<T>(service: &str, action: &str, result: OneOrMany<T>) -> Result<T> {
    result
        .into_first()
        .ok_or_else(|| Error::upstream(service, format!("{}: empty result list", action)))
}

/// Map a non-2xx status to an error, keeping the envelope's error list
fn status_error(service: &str, action: &str, status: StatusCode, body: &str) -> Error {
    let detail = match serde_json::from_str::<ApiEnvelope<Value>>(body) {
        Ok(envelope) if !envelope.errors.is_empty() => {
            serde_json::to_string(&envelope.errors).unwrap_or_else(|_| body.to_string())
        }
        _ => body.to_string(),
    };

    let message = match status.as_u16() {
        401 | 403 => format!(
            "{}: authentication failed, check auth email/key. Status: {} - {}",
            action, status, detail
        ),
        429 => format!("{}: rate limit exceeded. Status: {} - {}", action, status, detail),
        500..=599 => format!("{}: Cloudflare server error: {} - {}", action, status, detail),
        _ => format!("{}: {} - {}", action, status, detail),
    };
    Error::upstream(service, message)
}

fn decode<T: DeserializeOwned>(service: &str, action: &str, status: StatusCode, body: &str) -> Result<T> {
    if !status.is_success() {
        return Err(status_error(service, action, status, body));
    }
    let envelope: ApiEnvelope<T> = serde_json::from_str(body)
        .map_err(|e| Error::http(format!("{}: unexpected response body: {}", action, e)))?;
    envelope.into_outcome().into_result(service, action)
}

fn decode_unit(service: &str, action: &str, status: StatusCode, body: &str) -> Result<()> {
    if !status.is_success() {
        return Err(status_error(service, action, status, body));
    }
    let envelope: ApiEnvelope<Value> = serde_json::from_str(body)
        .map_err(|e| Error::http(format!("{}: unexpected response body: {}", action, e)))?;
    if envelope.success {
        Ok(())
    } else {
        ApiOutcome::<()>::Failure(envelope.errors).into_result(service, action)
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[async_trait]
impl FabricApi for CloudflareFabric {
    async fn create_site(&self, request: &SiteRequest) -> Result<String> {
        tracing::info!("Creating Magic WAN site {}", request.name);
        let created: Created = self
            .call(
                FABRIC,
                "Failed to create site",
                self.request(Method::POST, &self.sites_url()).json(request),
            )
            .await?;
        Ok(created.id)
    }

    async fn list_sites(&self) -> Result<Vec<RemoteSite>> {
        self.call(
            FABRIC,
            "Failed to list sites",
            self.request(Method::GET, &self.sites_url()),
        )
        .await
    }

    async fn delete_site(&self, site_id: &str) -> Result<()> {
        tracing::info!("Deleting Magic WAN site {}", site_id);
        self.call_unit(
            FABRIC,
            "Failed to delete site",
            self.request(Method::DELETE, &self.site_url(site_id)),
        )
        .await
    }

    async fn update_connector(&self, connector_id: &str, update: &ConnectorUpdate) -> Result<()> {
        tracing::info!(
            "Setting connector {} activated={}",
            connector_id,
            update.activated
        );
        self.call_unit(
            FABRIC,
            "Failed to update connector",
            self.request(Method::PUT, &self.connector_url(connector_id))
                .json(update),
        )
        .await
    }

    async fn create_wan(&self, site_id: &str, request: &WanRequest) -> Result<WanDescriptor> {
        let action = "Failed to create WAN";
        let result: OneOrMany<WanDescriptor> = self
            .call(
                FABRIC,
                action,
                self.request(Method::POST, &format!("{}/wans", self.site_url(site_id)))
                    .json(request),
            )
            .await?;
        single(FABRIC, action, result)
    }

    async fn create_lan(&self, site_id: &str, config: &LanConfig) -> Result<LanDescriptor> {
        let action = "Failed to create LAN";
        let result: OneOrMany<LanDescriptor> = self
            .call(
                FABRIC,
                action,
                self.request(Method::POST, &self.lans_url(site_id)).json(config),
            )
            .await?;
        single(FABRIC, action, result)
    }

    async fn get_lan(&self, site_id: &str, lan_id: &str) -> Result<LanDescriptor> {
        self.call(
            FABRIC,
            "Failed to get LAN",
            self.request(Method::GET, &format!("{}/{}", self.lans_url(site_id), lan_id)),
        )
        .await
    }

    async fn update_lan(
        &self,
        site_id: &str,
        lan_id: &str,
        config: &LanConfig,
    ) -> Result<LanDescriptor> {
        tracing::debug!("Updating LAN {} on site {}", lan_id, site_id);
        self.call(
            FABRIC,
            "Failed to update LAN",
            self.request(Method::PUT, &format!("{}/{}", self.lans_url(site_id), lan_id))
                .json(config),
        )
        .await
    }

    async fn list_lans(&self, site_id: &str) -> Result<Vec<LanDescriptor>> {
        self.call(
            FABRIC,
            "Failed to list LANs",
            self.request(Method::GET, &self.lans_url(site_id)),
        )
        .await
    }

    fn backend_name(&self) -> &'static str {
        "cloudflare"
    }
}

#[async_trait]
impl DnsApi for CloudflareFabric {
    async fn create_record(&self, request: &DnsRecordRequest) -> Result<String> {
        tracing::info!(
            "Creating {} record {} -> {}",
            request.record_type,
            request.name,
            request.content
        );
        let created: Created = self
            .call(
                DNS,
                "Failed to create DNS record",
                self.request(Method::POST, &self.records_url()).json(request),
            )
            .await?;
        Ok(created.id)
    }

    async fn query_records(&self, name: &str) -> Result<Vec<DnsRecord>> {
        self.call(
            DNS,
            "Failed to query DNS records",
            self.request(Method::GET, &self.records_url())
                .query(&[("name", name)]),
        )
        .await
    }

    async fn delete_record(&self, record_id: &str) -> Result<()> {
        tracing::info!("Deleting DNS record {}", record_id);
        self.call_unit(
            DNS,
            "Failed to delete DNS record",
            self.request(
                Method::DELETE,
                &format!("{}/{}", self.records_url(), record_id),
            ),
        )
        .await
    }
}

/// Factory for creating Cloudflare backends
pub struct CloudflareFactory;

impl FabricBackendFactory for CloudflareFactory {
    fn create(&self, fabric: &FabricConfig, dns: &DnsConfig) -> Result<FabricBackend> {
        match fabric {
            FabricConfig::Cloudflare {
                account_id,
                auth_email,
                auth_key,
                api_base,
            } => {
                let client = Arc::new(CloudflareFabric::new(
                    account_id.clone(),
                    dns.zone_id.clone(),
                    auth_email.clone(),
                    auth_key.clone(),
                    api_base.clone(),
                )?);
                Ok(FabricBackend {
                    fabric: client.clone(),
                    dns: client,
                })
            }
            _ => Err(Error::config("Invalid config for Cloudflare backend")),
        }
    }
}

/// Register the Cloudflare backend with a registry
///
/// # Example
///
/// ```rust
/// use storenet_core::BackendRegistry;
///
/// let registry = BackendRegistry::with_builtin_stores();
/// storenet_fabric_cloudflare::register(&registry);
/// assert!(registry.has_fabric("cloudflare"));
/// ```
pub fn register(registry: &BackendRegistry) {
    registry.register_fabric("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> CloudflareFabric {
        CloudflareFabric::new(
            "acct",
            "zone",
            "ops@example.com",
            "secret_key_12345",
            "https://api.cloudflare.com/client/v4/",
        )
        .unwrap()
    }

    fn config() -> FabricConfig {
        FabricConfig::Cloudflare {
            account_id: "acct".into(),
            auth_email: "ops@example.com".into(),
            auth_key: "secret".into(),
            api_base: "https://api.cloudflare.com/client/v4".into(),
        }
    }

    #[test]
    fn test_factory_creation() {
        let dns = DnsConfig {
            zone_id: "zone".into(),
            ..Default::default()
        };
        let backend = CloudflareFactory.create(&config(), &dns).unwrap();
        assert_eq!(backend.fabric.backend_name(), "cloudflare");
    }

    #[test]
    fn test_factory_requires_zone() {
        let result = CloudflareFactory.create(&config(), &DnsConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let result = CloudflareFabric::new("acct", "zone", "ops@example.com", "", "https://x");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_auth_key_not_exposed_in_debug() {
        let debug_str = format!("{:?}", client());
        assert!(!debug_str.contains("secret_key_12345"));
        assert!(debug_str.contains("CloudflareFabric"));
    }

    #[test]
    fn test_urls() {
        let cf = client();
        assert_eq!(
            cf.sites_url(),
            "https://api.cloudflare.com/client/v4/accounts/acct/magic/sites"
        );
        assert_eq!(
            cf.lans_url("s1"),
            "https://api.cloudflare.com/client/v4/accounts/acct/magic/sites/s1/lans"
        );
        assert_eq!(
            cf.connector_url("c1"),
            "https://api.cloudflare.com/client/v4/accounts/acct/magic/connectors/c1"
        );
        assert_eq!(
            cf.records_url(),
            "https://api.cloudflare.com/client/v4/zones/zone/dns_records"
        );
    }

    #[test]
    fn test_lan_create_result_list() {
        let body = json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": [{
                "id": "lan-1",
                "site_id": "s1",
                "name": "SECURE",
                "physport": 1,
                "vlan_tag": 100
            }]
        })
        .to_string();

        let result: OneOrMany<LanDescriptor> =
            decode(FABRIC, "create", StatusCode::OK, &body).unwrap();
        let lan = single(FABRIC, "create", result).unwrap();
        assert_eq!(lan.id, "lan-1");
        assert!(lan.is_secure());
    }

    #[test]
    fn test_success_false_carries_errors() {
        let body = json!({
            "success": false,
            "errors": [{ "code": 1002, "message": "WAN physport in use" }],
            "messages": [],
            "result": null
        })
        .to_string();

        let err = decode::<Created>(FABRIC, "Failed to create WAN", StatusCode::OK, &body)
            .unwrap_err();
        match err {
            Error::UpstreamRejected { service, message } => {
                assert_eq!(service, "fabric");
                assert!(message.starts_with("Failed to create WAN: "));
                assert!(message.contains("WAN physport in use"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_status_mapping() {
        let body = json!({
            "success": false,
            "errors": [{ "code": 10000, "message": "Authentication error" }],
            "result": null
        })
        .to_string();

        let err = decode_unit(DNS, "delete", StatusCode::FORBIDDEN, &body).unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
        assert!(err.to_string().contains("Authentication error"));

        let err = decode_unit(DNS, "delete", StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(matches!(err, Error::UpstreamRejected { .. }));
        assert!(err.to_string().contains("<html>"));
    }

    #[test]
    fn test_unreadable_body_is_http_error() {
        let err = decode_unit(DNS, "delete", StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, Error::Http(_)));

        let ok = json!({ "success": true, "errors": [], "result": null }).to_string();
        assert!(decode_unit(DNS, "delete", StatusCode::OK, &ok).is_ok());
    }

    #[test]
    fn test_dns_record_request_wire_shape() {
        let request = DnsRecordRequest {
            content: "10.67.42.194".into(),
            name: "printer-1.s1042".into(),
            proxied: false,
            record_type: "A".into(),
            comment: "Record for printer-1 at 1042".into(),
            tags: vec!["dtlronline".into(), "connector".into(), "device".into(), "1042".into()],
            ttl: 3600,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "A");
        assert_eq!(value["ttl"], 3600);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_upstream_error() {
        let fabric =
            CloudflareFabric::new("acct", "zone", "ops@example.com", "key", "http://127.0.0.1:9")
                .unwrap();
        let err = fabric.list_sites().await.unwrap_err();
        assert!(matches!(err, Error::Http(_)), "{err:?}");
        assert!(err.is_upstream());
    }
}
