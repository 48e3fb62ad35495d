//! Test doubles and common utilities for workflow contract tests
//!
//! The fabric and DNS doubles keep just enough state for the workflows to
//! round-trip (a LAN written with `update_lan` comes back from `get_lan`),
//! log every call in order and can be told to reject the Nth call of an
//! operation.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use storenet_core::error::{Error, Result};
use storenet_core::model::{Connector, LanConfig, LanDescriptor, Location, WanDescriptor};
use storenet_core::traits::{
    ConnectorUpdate, DnsApi, DnsRecord, DnsRecordRequest, FabricApi, ProvisioningStore,
    RemoteSite, SiteRequest, WanRequest,
};
use storenet_core::{MemoryStore, SiteProvisioner, StorenetConfig, WorkflowContext};
use uuid::Uuid;

/// Failure schedule shared by both doubles: operation -> call numbers to reject
#[derive(Debug, Default)]
struct Failures {
    scheduled: HashMap<&'static str, Vec<usize>>,
    counts: HashMap<&'static str, usize>,
}

impl Failures {
    fn fail_on(&mut self, op: &'static str, nth: usize) {
        self.scheduled.entry(op).or_default().push(nth);
    }

    fn check(&mut self, service: &str, op: &'static str) -> Result<()> {
        let count = self.counts.entry(op).or_default();
        *count += 1;
        let n = *count;
        if self
            .scheduled
            .get(op)
            .is_some_and(|calls| calls.contains(&n))
        {
            return Err(Error::upstream(
                service,
                format!(r#"{}: [{{"code":1000,"message":"{} rejected"}}]"#, op, op),
            ));
        }
        Ok(())
    }

    fn count(&self, op: &str) -> usize {
        self.counts.get(op).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct FabricState {
    calls: Vec<String>,
    failures: Failures,
    next_id: usize,
    sites: Vec<RemoteSite>,
    /// (site id, LAN) in creation order
    lans: Vec<(String, LanDescriptor)>,
    connectors: HashMap<String, ConnectorUpdate>,
    update_bodies: Vec<LanConfig>,
}

impl FabricState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn begin(&mut self, op: &'static str, detail: impl Into<String>) -> Result<()> {
        self.calls.push(format!("{} {}", op, detail.into()));
        self.failures.check("fabric", op)
    }
}

/// In-memory fabric control plane
#[derive(Debug, Default)]
pub struct MockFabric {
    state: Mutex<FabricState>,
}

impl MockFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the `nth` (1-based) call of `op`
    pub fn fail_on(&self, op: &'static str, nth: usize) {
        self.state.lock().unwrap().failures.fail_on(op, nth);
    }

    /// Every call so far, as `"<op> <detail>"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Operation names of every call so far
    pub fn ops(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.split_whitespace().next().unwrap_or_default().to_string())
            .collect()
    }

    /// Number of calls of `op`, failed ones included
    pub fn count(&self, op: &str) -> usize {
        self.state.lock().unwrap().failures.count(op)
    }

    pub fn add_remote_site(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next("site");
        state.sites.push(RemoteSite {
            id: id.clone(),
            name: name.to_string(),
            description: None,
            connector_id: None,
        });
        id
    }

    pub fn remote_sites(&self) -> Vec<RemoteSite> {
        self.state.lock().unwrap().sites.clone()
    }

    pub fn lan(&self, site_id: &str, lan_id: &str) -> Option<LanDescriptor> {
        self.state
            .lock()
            .unwrap()
            .lans
            .iter()
            .find(|(site, lan)| site == site_id && lan.id == lan_id)
            .map(|(_, lan)| lan.clone())
    }

    /// Overwrite a stored LAN, e.g. to simulate out-of-band edits
    pub fn put_lan(&self, site_id: &str, lan: LanDescriptor) {
        let mut state = self.state.lock().unwrap();
        match state
            .lans
            .iter_mut()
            .find(|(site, existing)| site == site_id && existing.id == lan.id)
        {
            Some((_, existing)) => *existing = lan,
            None => state.lans.push((site_id.to_string(), lan)),
        }
    }

    pub fn connector(&self, id: &str) -> Option<ConnectorUpdate> {
        self.state.lock().unwrap().connectors.get(id).cloned()
    }

    /// Bodies sent to `update_lan`, in order
    pub fn update_bodies(&self) -> Vec<LanConfig> {
        self.state.lock().unwrap().update_bodies.clone()
    }
}

fn stored_lan(id: String, site_id: &str, config: &LanConfig) -> LanDescriptor {
    let mut config = config.clone();
    config
        .extra
        .insert("site_id".to_string(), Value::from(site_id));
    LanDescriptor { id, config }
}

#[async_trait]
impl FabricApi for MockFabric {
    async fn create_site(&self, request: &SiteRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.begin("create_site", &request.name)?;
        let id = state.next("site");
        state.sites.push(RemoteSite {
            id: id.clone(),
            name: request.name.clone(),
            description: Some(request.description.clone()),
            connector_id: Some(request.connector_id.clone()),
        });
        Ok(id)
    }

    async fn list_sites(&self) -> Result<Vec<RemoteSite>> {
        let mut state = self.state.lock().unwrap();
        state.begin("list_sites", "")?;
        Ok(state.sites.clone())
    }

    async fn delete_site(&self, site_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.begin("delete_site", site_id)?;
        state.sites.retain(|s| s.id != site_id);
        state.lans.retain(|(site, _)| site != site_id);
        Ok(())
    }

    async fn update_connector(&self, connector_id: &str, update: &ConnectorUpdate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.begin(
            "update_connector",
            format!("{} activated={}", connector_id, update.activated),
        )?;
        state
            .connectors
            .insert(connector_id.to_string(), update.clone());
        Ok(())
    }

    async fn create_wan(&self, site_id: &str, request: &WanRequest) -> Result<WanDescriptor> {
        let mut state = self.state.lock().unwrap();
        state.begin("create_wan", &request.name)?;
        Ok(WanDescriptor {
            id: Some(state.next("wan")),
            site_id: site_id.to_string(),
            name: request.name.clone(),
            physport: request.physport,
            priority: request.priority,
            vlan_tag: request.vlan_tag,
        })
    }

    async fn create_lan(&self, site_id: &str, config: &LanConfig) -> Result<LanDescriptor> {
        let mut state = self.state.lock().unwrap();
        state.begin("create_lan", &config.name)?;
        let lan = stored_lan(state.next("lan"), site_id, config);
        state.lans.push((site_id.to_string(), lan.clone()));
        Ok(lan)
    }

    async fn get_lan(&self, site_id: &str, lan_id: &str) -> Result<LanDescriptor> {
        let mut state = self.state.lock().unwrap();
        state.begin("get_lan", lan_id)?;
        state
            .lans
            .iter()
            .find(|(site, lan)| site == site_id && lan.id == lan_id)
            .map(|(_, lan)| lan.clone())
            .ok_or_else(|| Error::upstream("fabric", format!("get_lan: LAN {} not found", lan_id)))
    }

    async fn update_lan(
        &self,
        site_id: &str,
        lan_id: &str,
        config: &LanConfig,
    ) -> Result<LanDescriptor> {
        let mut state = self.state.lock().unwrap();
        state.begin("update_lan", lan_id)?;
        state.update_bodies.push(config.clone());
        let updated = stored_lan(lan_id.to_string(), site_id, config);
        let slot = state
            .lans
            .iter_mut()
            .find(|(site, lan)| site == site_id && lan.id == lan_id)
            .ok_or_else(|| {
                Error::upstream("fabric", format!("update_lan: LAN {} not found", lan_id))
            })?;
        slot.1 = updated.clone();
        Ok(updated)
    }

    async fn list_lans(&self, site_id: &str) -> Result<Vec<LanDescriptor>> {
        let mut state = self.state.lock().unwrap();
        state.begin("list_lans", site_id)?;
        Ok(state
            .lans
            .iter()
            .filter(|(site, _)| site == site_id)
            .map(|(_, lan)| lan.clone())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Default)]
struct DnsState {
    calls: Vec<String>,
    failures: Failures,
    next_id: usize,
    records: Vec<(DnsRecord, DnsRecordRequest)>,
}

/// In-memory DNS provider
#[derive(Debug, Default)]
pub struct MockDns {
    state: Mutex<DnsState>,
}

impl MockDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: &'static str, nth: usize) {
        self.state.lock().unwrap().failures.fail_on(op, nth);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state.lock().unwrap().failures.count(op)
    }

    /// Names of the records currently held
    pub fn names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|(record, _)| record.name.clone())
            .collect()
    }

    /// Creation request of the record with `id`
    pub fn request(&self, id: &str) -> Option<DnsRecordRequest> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|(record, _)| record.id == id)
            .map(|(_, request)| request.clone())
    }

    /// Add a record directly, e.g. a printer alias
    pub fn seed(&self, name: &str, record_type: &str, content: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("rec-{}", state.next_id);
        let request = DnsRecordRequest {
            content: content.to_string(),
            name: name.to_string(),
            proxied: false,
            record_type: record_type.to_string(),
            comment: String::new(),
            tags: Vec::new(),
            ttl: 3600,
        };
        state.records.push((
            DnsRecord {
                id: id.clone(),
                name: name.to_string(),
                record_type: record_type.to_string(),
                content: content.to_string(),
            },
            request,
        ));
        id
    }
}

#[async_trait]
impl DnsApi for MockDns {
    async fn create_record(&self, request: &DnsRecordRequest) -> Result<String> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("create_record {}", request.name));
            state.failures.check("dns", "create_record")?;
        }
        let id = self.seed(&request.name, &request.record_type, &request.content);
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.records.iter_mut().find(|(r, _)| r.id == id) {
            entry.1 = request.clone();
        }
        Ok(id)
    }

    async fn query_records(&self, name: &str) -> Result<Vec<DnsRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("query_records {}", name));
        state.failures.check("dns", "query_records")?;
        Ok(state
            .records
            .iter()
            .filter(|(record, _)| record.name == name)
            .map(|(record, _)| record.clone())
            .collect())
    }

    async fn delete_record(&self, record_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete_record {}", record_id));
        state.failures.check("dns", "delete_record")?;
        let before = state.records.len();
        state.records.retain(|(record, _)| record.id != record_id);
        if state.records.len() == before {
            return Err(Error::upstream(
                "dns",
                format!("delete_record: record {} not found", record_id),
            ));
        }
        Ok(())
    }
}

/// Everything a workflow test needs
pub struct Harness {
    pub fabric: Arc<MockFabric>,
    pub dns: Arc<MockDns>,
    pub store: Arc<MemoryStore>,
    pub config: StorenetConfig,
    pub location: Location,
    pub connector: Connector,
}

pub const STORE_CODE: &str = "1042";
pub const CONNECTOR_SERIAL: &str = "SN-1042";

impl Harness {
    /// Store 1042 with its address plan and one available connector
    pub async fn new() -> Self {
        Self::with_config(StorenetConfig::default()).await
    }

    pub async fn with_config(config: StorenetConfig) -> Self {
        let store = Arc::new(MemoryStore::new());

        let mut location = Location::new(STORE_CODE, "Store 1042", "Store");
        location.latitude = Some(38.9);
        location.longitude = Some(-77.0);
        location.ip_schema = vec!["172.17.5.0/24".parse().unwrap()];
        location.aptos_network = Some("10.67.42.192/26".parse().unwrap());
        let location = store.upsert_location(location).await.unwrap();

        let connector = store
            .upsert_connector(Connector::available(
                "conn-1",
                CONNECTOR_SERIAL,
                &config.provisioning.available_code,
                &config.provisioning.connector_note,
            ))
            .await
            .unwrap();

        Self {
            fabric: Arc::new(MockFabric::new()),
            dns: Arc::new(MockDns::new()),
            store,
            config,
            location,
            connector,
        }
    }

    /// Harness whose location already has a provisioned site
    pub async fn provisioned() -> Self {
        let harness = Self::new().await;
        SiteProvisioner::new(harness.ctx())
            .create(harness.location.id, CONNECTOR_SERIAL)
            .await
            .unwrap();
        harness
    }

    pub fn ctx(&self) -> WorkflowContext {
        WorkflowContext::new(
            self.fabric.clone(),
            self.dns.clone(),
            self.store.clone(),
            self.config.clone(),
        )
    }

    pub fn location_id(&self) -> Uuid {
        self.location.id
    }

    /// Fabric id of the provisioned site
    pub async fn site_id(&self) -> String {
        self.store
            .site_for_location(self.location.id)
            .await
            .unwrap()
            .expect("site provisioned")
            .mwan_site_id
    }

    /// Current fabric copy of the secure LAN
    pub async fn secure_lan(&self) -> LanDescriptor {
        let site = self
            .store
            .site_for_location(self.location.id)
            .await
            .unwrap()
            .expect("site provisioned");
        let secure = site.secure_lan().expect("secure LAN").clone();
        self.fabric
            .lan(&site.mwan_site_id, &secure.id)
            .expect("secure LAN on fabric")
    }
}
