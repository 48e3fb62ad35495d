//! Bring a new site online
//!
//! ## Stages
//!
//! ```text
//! Requested -> SiteCreated -> ConnectorActivated -> ConnectorAttached
//!   -> WansCreated -> SiteRecordPersisted -> SubnetsDivided -> LansCreated
//!   -> Complete
//! ```
//!
//! Each arrow is one externally visible side effect, except `SubnetsDivided`
//! which is pure arithmetic. Steps run strictly in order and the first
//! failure stops the run. With `rollback_on_failure` set, completed steps are
//! undone in reverse order before the error is returned.

use chrono::Utc;
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::WorkflowEvent;
use super::WorkflowContext;
use crate::address::{divide_block, host_at, last_host_offset, STORE_BLOCK_PREFIX};
use crate::error::{Error, Result};
use crate::model::{
    Connector, DhcpServer, LanConfig, LanDescriptor, LanNat, Location, SECURE_VLAN_TAG, Site,
    SiteDraft, StaticAddressing, WanDescriptor,
};
use crate::traits::{ConnectorUpdate, SiteRequest, WanRequest};

/// WAN uplinks created on every site, in creation order: (name, port, priority)
pub const WAN_PLAN: [(&str, u8, u32); 2] = [("Primary", 5, 10), ("Backup", 6, 100)];

/// VLANs carved from the store /24, paired in order with the divided
/// subnets: (name, VLAN tag, port)
pub const VLAN_PLAN: [(&str, u16, u8); 6] = [
    ("VND_EQP_20", 20, 1),
    ("GUEST_40", 40, 1),
    ("VOIP_18", 18, 1),
    ("SW_MGMT", 0, 3),
    ("COMPUTE_130", 130, 2),
    ("IPMI_10", 0, 4),
];

/// The secure LAN, carved from the location's secure network
pub const SECURE_LAN: (&str, u16, u8) = ("SECURE", SECURE_VLAN_TAG, 1);

/// Offset of the first DHCP pool address on a regular LAN
const POOL_OFFSET: u32 = 2;

/// Offset of the first DHCP pool address on the secure LAN; the addresses
/// below it are the reservation window
const SECURE_POOL_OFFSET: u32 = 18;

/// Provisioning stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionStage {
    Requested,
    SiteCreated,
    ConnectorActivated,
    ConnectorAttached,
    WansCreated,
    SiteRecordPersisted,
    SubnetsDivided,
    LansCreated,
    Complete,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStage::Requested => "requested",
            ProvisionStage::SiteCreated => "site created",
            ProvisionStage::ConnectorActivated => "connector activated",
            ProvisionStage::ConnectorAttached => "connector attached",
            ProvisionStage::WansCreated => "WANs created",
            ProvisionStage::SiteRecordPersisted => "site record persisted",
            ProvisionStage::SubnetsDivided => "subnets divided",
            ProvisionStage::LansCreated => "LANs created",
            ProvisionStage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// What a provisioning run has done so far
///
/// Drives compensation after a failure.
#[derive(Debug, Clone)]
pub struct ProvisionJournal {
    pub location_code: String,
    pub stage: ProvisionStage,
    pub remote_site_id: Option<String>,
    pub connector_id: Option<String>,
    /// Connector row as it was before attachment
    pub connector_before: Option<Connector>,
    pub wans: Vec<WanDescriptor>,
    pub site: Option<Site>,
    pub subnets: Vec<Ipv4Net>,
    pub lans: Vec<LanDescriptor>,
}

impl ProvisionJournal {
    fn new(location_code: &str) -> Self {
        Self {
            location_code: location_code.to_string(),
            stage: ProvisionStage::Requested,
            remote_site_id: None,
            connector_id: None,
            connector_before: None,
            wans: Vec::new(),
            site: None,
            subnets: Vec::new(),
            lans: Vec::new(),
        }
    }

    fn reached(&self, stage: ProvisionStage) -> bool {
        self.stage >= stage
    }
}

/// Provisions and resynchronises sites
#[derive(Debug, Clone)]
pub struct SiteProvisioner {
    ctx: WorkflowContext,
}

impl SiteProvisioner {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Provision a site for a location on the connector with `serial`
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`]: location, connector or address plan missing
    /// - [`Error::AlreadyExists`]: the location already has a site, or the
    ///   connector is attached elsewhere
    /// - [`Error::UpstreamRejected`]: a fabric call failed; later steps are
    ///   not attempted
    pub async fn create(&self, location_id: Uuid, serial: &str) -> Result<Site> {
        let (location, connector, store_block, secure_network) =
            self.check_preconditions(location_id, serial).await?;

        let mut journal = ProvisionJournal::new(&location.code);
        info!(
            "Provisioning site for location {} on connector {}",
            location.code, connector.serial
        );

        match self
            .run(&mut journal, &location, connector, store_block, secure_network)
            .await
        {
            Ok(site) => {
                info!("Site {} provisioned", site.name);
                Ok(site)
            }
            Err(e) => {
                error!(
                    "Provisioning for location {} failed after stage '{}': {}",
                    location.code, journal.stage, e
                );
                self.ctx.events.emit(WorkflowEvent::ProvisionFailed {
                    location_code: location.code.clone(),
                    stage: journal.stage,
                    error: e.to_string(),
                });
                if self.ctx.config.provisioning.rollback_on_failure {
                    self.compensate(&journal).await;
                }
                Err(e)
            }
        }
    }

    /// Replace the stored LAN list with the fabric's current one
    pub async fn refresh_lans(&self, location_id: Uuid) -> Result<Vec<LanDescriptor>> {
        let location = self.ctx.require_location(location_id).await?;
        let site = self.ctx.require_site(&location).await?;

        let lans = self.ctx.fabric.list_lans(&site.mwan_site_id).await?;
        self.ctx
            .store
            .update_site_lans(site.id, lans.clone())
            .await?;
        info!("Refreshed {} LANs for site {}", lans.len(), site.name);
        Ok(lans)
    }

    async fn check_preconditions(
        &self,
        location_id: Uuid,
        serial: &str,
    ) -> Result<(Location, Connector, Ipv4Net, Ipv4Net)> {
        let location = self.ctx.require_location(location_id).await?;

        if self.ctx.store.site_for_location(location.id).await?.is_some() {
            return Err(Error::already_exists(format!(
                "Site for location {}",
                location.code
            )));
        }

        let store_block = *location.store_block().ok_or_else(|| {
            Error::not_found(format!("Address plan for location {}", location.code))
        })?;
        if store_block.prefix_len() != STORE_BLOCK_PREFIX {
            return Err(Error::invalid_input(format!(
                "Location {} has store block {}, expected a /{}",
                location.code, store_block, STORE_BLOCK_PREFIX
            )));
        }
        let secure_network = location.aptos_network.ok_or_else(|| {
            Error::not_found(format!("Secure network for location {}", location.code))
        })?;

        let connector = self
            .ctx
            .store
            .connector_by_serial(serial)
            .await?
            .ok_or_else(|| Error::not_found(format!("Connector with serial {}", serial)))?;
        if let Some(attached) = connector.location_id {
            return Err(Error::already_exists(format!(
                "Connector {} is attached to location {}",
                serial, attached
            )));
        }

        let site_name = self.ctx.config.provisioning.site_name(&location.code);
        let remote_sites = self.ctx.fabric.list_sites().await?;
        if remote_sites.iter().any(|s| s.name == site_name) {
            return Err(Error::already_exists(format!(
                "Fabric site {}",
                site_name
            )));
        }

        debug!(
            "Preconditions met for {}: block {}, secure network {}",
            location.code, store_block, secure_network
        );
        Ok((location, connector, store_block, secure_network))
    }

    async fn run(
        &self,
        journal: &mut ProvisionJournal,
        location: &Location,
        mut connector: Connector,
        store_block: Ipv4Net,
        secure_network: Ipv4Net,
    ) -> Result<Site> {
        let fabric = &self.ctx.fabric;
        let store = &self.ctx.store;
        let settings = &self.ctx.config.provisioning;
        let site_name = settings.site_name(&location.code);

        // 1. Remote site
        let site_id = fabric
            .create_site(&SiteRequest {
                name: site_name.clone(),
                description: location.name.clone(),
                connector_id: connector.id.clone(),
            })
            .await?;
        journal.remote_site_id = Some(site_id.clone());
        self.advance(journal, ProvisionStage::SiteCreated);

        // 2. Connector activation on the fabric
        fabric
            .update_connector(
                &connector.id,
                &ConnectorUpdate {
                    activated: true,
                    notes: site_name.clone(),
                },
            )
            .await?;
        journal.connector_id = Some(connector.id.clone());
        self.advance(journal, ProvisionStage::ConnectorActivated);

        // 3. Local connector attachment
        journal.connector_before = Some(connector.clone());
        connector.attach(location, &site_name, Utc::now());
        store.update_connector(&connector).await?;
        self.advance(journal, ProvisionStage::ConnectorAttached);

        // 4. WAN uplinks
        for (name, physport, priority) in WAN_PLAN {
            let wan = fabric
                .create_wan(
                    &site_id,
                    &WanRequest {
                        site_id: site_id.clone(),
                        name: name.to_string(),
                        physport,
                        priority,
                        vlan_tag: 0,
                    },
                )
                .await?;
            debug!("Created WAN {} on site {}", name, site_name);
            journal.wans.push(wan);
        }
        self.advance(journal, ProvisionStage::WansCreated);

        // 5. Local site row
        let site = store
            .insert_site(SiteDraft {
                mwan_site_id: site_id.clone(),
                connector_id: connector.id.clone(),
                location_id: location.id,
                name: location.name.clone(),
                location_lat: location.latitude,
                location_long: location.longitude,
                mwan_wans: journal.wans.clone(),
            })
            .await?;
        journal.site = Some(site.clone());
        self.advance(journal, ProvisionStage::SiteRecordPersisted);

        // 6. Subnet plan
        journal.subnets = divide_block(&store_block)?;
        self.advance(journal, ProvisionStage::SubnetsDivided);

        let mut plan: Vec<LanConfig> = VLAN_PLAN
            .iter()
            .zip(journal.subnets.iter())
            .map(|((name, vlan_tag, physport), subnet)| {
                lan_config(name, *vlan_tag, *physport, subnet, POOL_OFFSET, settings.lan_dns_server)
            })
            .collect();
        let (name, vlan_tag, physport) = SECURE_LAN;
        plan.push(lan_config(
            name,
            vlan_tag,
            physport,
            &secure_network.trunc(),
            SECURE_POOL_OFFSET,
            settings.lan_dns_server,
        ));

        // 7. LANs
        for config in &plan {
            let lan = fabric.create_lan(&site_id, config).await?;
            debug!("Created LAN {} ({}) on site {}", config.name, lan.id, site_name);
            journal.lans.push(lan);
        }
        self.advance(journal, ProvisionStage::LansCreated);

        // 8. Persist LANs
        store.update_site_lans(site.id, journal.lans.clone()).await?;
        self.advance(journal, ProvisionStage::Complete);

        Ok(Site {
            mwan_lans: journal.lans.clone(),
            ..site
        })
    }

    fn advance(&self, journal: &mut ProvisionJournal, stage: ProvisionStage) {
        journal.stage = stage;
        info!("Location {}: {}", journal.location_code, stage);
        self.ctx.events.emit(WorkflowEvent::ProvisionAdvanced {
            location_code: journal.location_code.clone(),
            stage,
        });
    }

    /// Undo completed steps in reverse order, best effort
    async fn compensate(&self, journal: &ProvisionJournal) {
        warn!(
            "Rolling back provisioning for location {} from stage '{}'",
            journal.location_code, journal.stage
        );
        let mut failures = 0usize;

        if let Some(site) = &journal.site {
            if let Err(e) = self.ctx.store.delete_site(site.id).await {
                warn!("Rollback: failed to delete site row {}: {}", site.id, e);
                failures += 1;
            }
        }

        if journal.reached(ProvisionStage::ConnectorAttached) {
            if let Some(before) = &journal.connector_before {
                if let Err(e) = self.ctx.store.update_connector(before).await {
                    warn!("Rollback: failed to restore connector {}: {}", before.serial, e);
                    failures += 1;
                }
            }
        }

        if let Some(connector_id) = &journal.connector_id {
            let update = ConnectorUpdate {
                activated: false,
                notes: self.ctx.config.provisioning.connector_note.clone(),
            };
            if let Err(e) = self.ctx.fabric.update_connector(connector_id, &update).await {
                warn!("Rollback: failed to deactivate connector {}: {}", connector_id, e);
                failures += 1;
            }
        }

        if let Some(site_id) = &journal.remote_site_id {
            if let Err(e) = self.ctx.fabric.delete_site(site_id).await {
                warn!("Rollback: failed to delete fabric site {}: {}", site_id, e);
                failures += 1;
            }
        }

        if failures == 0 {
            info!("Rollback for location {} complete", journal.location_code);
        } else {
            error!(
                "Rollback for location {} left {} step(s) undone; run sites cleanse",
                journal.location_code, failures
            );
        }
        self.ctx.events.emit(WorkflowEvent::ProvisionRolledBack {
            location_code: journal.location_code.clone(),
            failures,
        });
    }
}

/// LAN body for a subnet
///
/// Static address is the first host, the DHCP pool runs from `pool_offset`
/// to the last usable host, and NAT maps the whole subnet.
pub fn lan_config(
    name: &str,
    vlan_tag: u16,
    physport: u8,
    subnet: &Ipv4Net,
    pool_offset: u32,
    dns_server: Ipv4Addr,
) -> LanConfig {
    let prefix = subnet.prefix_len();
    LanConfig {
        name: name.to_string(),
        physport,
        vlan_tag,
        static_addressing: Some(StaticAddressing {
            address: format!("{}/{}", host_at(subnet, 1), prefix),
            dhcp_server: Some(DhcpServer {
                dns_server: Some(dns_server.to_string()),
                dhcp_pool_start: Some(host_at(subnet, pool_offset).to_string()),
                dhcp_pool_end: Some(host_at(subnet, last_host_offset(prefix)).to_string()),
                reservations: None,
                extra: Default::default(),
            }),
            extra: Default::default(),
        }),
        nat: Some(LanNat {
            static_prefix: Some(subnet.trunc().to_string()),
            extra: Default::default(),
        }),
        extra: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_lan_body() {
        let subnet: Ipv4Net = "10.0.5.64/26".parse().unwrap();
        let lan = lan_config("GUEST_40", 40, 1, &subnet, POOL_OFFSET, Ipv4Addr::new(1, 1, 1, 1));

        let addressing = lan.static_addressing.unwrap();
        assert_eq!(addressing.address, "10.0.5.65/26");
        let dhcp = addressing.dhcp_server.unwrap();
        assert_eq!(dhcp.dhcp_pool_start.as_deref(), Some("10.0.5.66"));
        assert_eq!(dhcp.dhcp_pool_end.as_deref(), Some("10.0.5.126"));
        assert_eq!(dhcp.dns_server.as_deref(), Some("1.1.1.1"));
        assert_eq!(lan.nat.unwrap().static_prefix.as_deref(), Some("10.0.5.64/26"));
    }

    #[test]
    fn secure_lan_leaves_reservation_window() {
        let subnet: Ipv4Net = "10.67.42.192/26".parse().unwrap();
        let lan = lan_config("SECURE", 100, 1, &subnet, SECURE_POOL_OFFSET, Ipv4Addr::new(1, 1, 1, 1));

        let dhcp = lan.static_addressing.unwrap().dhcp_server.unwrap();
        assert_eq!(dhcp.dhcp_pool_start.as_deref(), Some("10.67.42.210"));
        assert_eq!(dhcp.dhcp_pool_end.as_deref(), Some("10.67.42.254"));
    }

    #[test]
    fn plan_pairs_with_divided_block() {
        let block: Ipv4Net = "10.0.5.0/24".parse().unwrap();
        let subnets = divide_block(&block).unwrap();
        assert_eq!(subnets.len(), VLAN_PLAN.len());
        assert_eq!(VLAN_PLAN[5].0, "IPMI_10");
        assert_eq!(subnets[5].to_string(), "10.0.5.224/27");
    }

    #[test]
    fn stages_are_ordered() {
        assert!(ProvisionStage::Requested < ProvisionStage::SiteCreated);
        assert!(ProvisionStage::LansCreated < ProvisionStage::Complete);
        assert_eq!(ProvisionStage::WansCreated.to_string(), "WANs created");
    }
}
