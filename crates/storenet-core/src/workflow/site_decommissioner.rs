//! Tear a site down
//!
//! DNS cleanup is best effort: a record that cannot be deleted is logged,
//! reported and skipped. Every other step stops the run on failure, and
//! completed steps are not undone. Re-running after a failure is safe for
//! the local steps; the fabric may reject deleting what is already gone.

use chrono::Utc;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::WorkflowEvent;
use super::reservation_manager::delete_printer_alias;
use super::WorkflowContext;
use crate::address::DeviceClass;
use crate::error::{Error, Result};
use crate::traits::ConnectorUpdate;

/// Teardown steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecommissionStep {
    DnsRecordsDeleted,
    ReservationsDeleted,
    ConnectorDeactivated,
    ConnectorReset,
    RemoteSiteDeleted,
    SiteRecordDeleted,
}

impl fmt::Display for DecommissionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecommissionStep::DnsRecordsDeleted => "DNS records deleted",
            DecommissionStep::ReservationsDeleted => "reservations deleted",
            DecommissionStep::ConnectorDeactivated => "connector deactivated",
            DecommissionStep::ConnectorReset => "connector reset",
            DecommissionStep::RemoteSiteDeleted => "fabric site deleted",
            DecommissionStep::SiteRecordDeleted => "site record deleted",
        };
        f.write_str(name)
    }
}

/// Outcome of a teardown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecommissionReport {
    pub site_name: String,
    pub connector_serial: String,
    pub reservations_removed: usize,
    pub dns_records_removed: usize,
    /// `record: error` for every DNS deletion that failed
    pub dns_failures: Vec<String>,
}

/// Decommissions sites
#[derive(Debug, Clone)]
pub struct SiteDecommissioner {
    ctx: WorkflowContext,
}

impl SiteDecommissioner {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Remove a location's site, reservations and DNS records and return
    /// its connector to the available pool
    pub async fn cleanse(&self, location_id: Uuid) -> Result<DecommissionReport> {
        let full = self
            .ctx
            .store
            .location_full(location_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Location {}", location_id)))?;
        let code = full.location.code.clone();
        let site = full
            .site
            .ok_or_else(|| Error::not_found(format!("Site for location {}", code)))?;
        let mut connector = self
            .ctx
            .store
            .get_connector(&site.connector_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Connector {}", site.connector_id)))?;

        info!("Decommissioning site {} for location {}", site.name, code);
        let mut report = DecommissionReport {
            site_name: site.name.clone(),
            connector_serial: connector.serial.clone(),
            ..Default::default()
        };

        // 1. DNS records
        for reservation in &full.reservations {
            match &reservation.dns_record {
                Some(record) => match self.ctx.dns.delete_record(record).await {
                    Ok(()) => report.dns_records_removed += 1,
                    Err(e) => self.dns_failure(&code, &mut report, record, e),
                },
                None => debug!("Reservation {} has no DNS record", reservation.name),
            }

            if reservation.reservations_type == DeviceClass::Printer {
                match delete_printer_alias(&self.ctx, &code, reservation).await {
                    Ok(true) => report.dns_records_removed += 1,
                    Ok(false) => {}
                    Err(e) => self.dns_failure(&code, &mut report, &reservation.name, e),
                }
            }
        }
        self.advance(&code, DecommissionStep::DnsRecordsDeleted);

        // 2. Reservation rows
        report.reservations_removed = self
            .ctx
            .store
            .delete_reservations_for_site(&site.mwan_site_id)
            .await?;
        self.advance(&code, DecommissionStep::ReservationsDeleted);

        // 3. Connector deactivation on the fabric
        let settings = &self.ctx.config.provisioning;
        self.ctx
            .fabric
            .update_connector(
                &connector.id,
                &ConnectorUpdate {
                    activated: false,
                    notes: settings.connector_note.clone(),
                },
            )
            .await?;
        self.advance(&code, DecommissionStep::ConnectorDeactivated);

        // 4. Local connector reset
        connector.detach(&settings.available_code, &settings.connector_note, Utc::now());
        self.ctx.store.update_connector(&connector).await?;
        self.advance(&code, DecommissionStep::ConnectorReset);

        // 5. Remote site
        self.ctx.fabric.delete_site(&site.mwan_site_id).await?;
        self.advance(&code, DecommissionStep::RemoteSiteDeleted);

        // 6. Local site row
        self.ctx.store.delete_site(site.id).await?;
        self.advance(&code, DecommissionStep::SiteRecordDeleted);

        if report.dns_failures.is_empty() {
            info!("Site {} decommissioned", report.site_name);
        } else {
            warn!(
                "Site {} decommissioned with {} DNS record(s) left behind",
                report.site_name,
                report.dns_failures.len()
            );
        }
        Ok(report)
    }

    fn dns_failure(&self, code: &str, report: &mut DecommissionReport, record: &str, e: Error) {
        warn!("Failed to delete DNS record {} for {}: {}", record, code, e);
        self.ctx.events.emit(WorkflowEvent::DnsCleanupFailed {
            location_code: code.to_string(),
            record: record.to_string(),
            error: e.to_string(),
        });
        report.dns_failures.push(format!("{}: {}", record, e));
    }

    fn advance(&self, code: &str, step: DecommissionStep) {
        info!("Location {}: {}", code, step);
        self.ctx.events.emit(WorkflowEvent::DecommissionAdvanced {
            location_code: code.to_string(),
            step,
        });
    }
}
