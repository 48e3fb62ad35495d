//! Control surface consumed by operator tooling
//!
//! Every operation the workflows expose is one [`Action`]. Callers build an
//! action, hand it to [`ControlSurface::dispatch`] and get either an
//! [`ActionOutcome`] or an error whose text carries any upstream payload
//! verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};
use uuid::Uuid;

use crate::address::DeviceClass;
use crate::error::Result;
use crate::model::{LanDescriptor, Reservation, Site};
use crate::workflow::{
    AssignmentReport, DecommissionReport, LocationAddressAssigner, ReservationManager,
    SiteDecommissioner, SiteProvisioner, WorkflowContext,
};

/// One operator request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Action {
    #[serde(rename = "sites.create")]
    SitesCreate { location_id: Uuid, serial: String },

    #[serde(rename = "sites.cleanse")]
    SitesCleanse { location_id: Uuid },

    #[serde(rename = "sites.refresh_lans")]
    SitesRefreshLans { location_id: Uuid },

    #[serde(rename = "reservations.create")]
    ReservationsCreate {
        location_id: Uuid,
        mac: String,
        device_type: DeviceClass,
    },

    #[serde(rename = "reservations.edit")]
    ReservationsEdit {
        location_id: Uuid,
        reservation_id: Uuid,
        mac: String,
        device_type: DeviceClass,
    },

    #[serde(rename = "reservations.delete")]
    ReservationsDelete {
        location_id: Uuid,
        reservation_id: Uuid,
    },

    #[serde(rename = "locations.assign")]
    LocationsAssign,
}

impl Action {
    /// Dotted action name
    pub fn name(&self) -> &'static str {
        match self {
            Action::SitesCreate { .. } => "sites.create",
            Action::SitesCleanse { .. } => "sites.cleanse",
            Action::SitesRefreshLans { .. } => "sites.refresh_lans",
            Action::ReservationsCreate { .. } => "reservations.create",
            Action::ReservationsEdit { .. } => "reservations.edit",
            Action::ReservationsDelete { .. } => "reservations.delete",
            Action::LocationsAssign => "locations.assign",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a dispatched action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    SiteProvisioned(Site),
    SiteDecommissioned(DecommissionReport),
    LansRefreshed(Vec<LanDescriptor>),
    ReservationCreated(Reservation),
    ReservationDeleted(Reservation),
    AddressesAssigned(AssignmentReport),
}

impl ActionOutcome {
    /// One-line description for operators
    pub fn summary(&self) -> String {
        match self {
            ActionOutcome::SiteProvisioned(site) => format!(
                "Site {} provisioned ({} WANs, {} LANs)",
                site.name,
                site.mwan_wans.len(),
                site.mwan_lans.len()
            ),
            ActionOutcome::SiteDecommissioned(report) => format!(
                "Site {} decommissioned; connector {} released, {} reservations removed, {} DNS failures",
                report.site_name,
                report.connector_serial,
                report.reservations_removed,
                report.dns_failures.len()
            ),
            ActionOutcome::LansRefreshed(lans) => format!("{} LANs refreshed", lans.len()),
            ActionOutcome::ReservationCreated(r) => format!(
                "Reserved {} for {} as {}",
                r.reservations_ip, r.reservations_mac, r.name
            ),
            ActionOutcome::ReservationDeleted(r) => format!(
                "Released {} ({})",
                r.reservations_ip, r.reservations_mac
            ),
            ActionOutcome::AddressesAssigned(report) => format!(
                "{} store blocks assigned, {} secure networks written, {} skipped",
                report.assigned.len(),
                report.secure_updated,
                report.skipped.len()
            ),
        }
    }
}

/// Dispatches actions to the workflows
#[derive(Debug, Clone)]
pub struct ControlSurface {
    provisioner: SiteProvisioner,
    decommissioner: SiteDecommissioner,
    reservations: ReservationManager,
    assigner: LocationAddressAssigner,
}

impl ControlSurface {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            provisioner: SiteProvisioner::new(ctx.clone()),
            decommissioner: SiteDecommissioner::new(ctx.clone()),
            reservations: ReservationManager::new(ctx.clone()),
            assigner: LocationAddressAssigner::new(ctx),
        }
    }

    /// Run one action to completion
    pub async fn dispatch(&self, action: Action) -> Result<ActionOutcome> {
        let name = action.name();
        info!("Dispatching {}", name);

        let outcome = match action {
            Action::SitesCreate {
                location_id,
                serial,
            } => self
                .provisioner
                .create(location_id, &serial)
                .await
                .map(ActionOutcome::SiteProvisioned),
            Action::SitesCleanse { location_id } => self
                .decommissioner
                .cleanse(location_id)
                .await
                .map(ActionOutcome::SiteDecommissioned),
            Action::SitesRefreshLans { location_id } => self
                .provisioner
                .refresh_lans(location_id)
                .await
                .map(ActionOutcome::LansRefreshed),
            Action::ReservationsCreate {
                location_id,
                mac,
                device_type,
            } => self
                .reservations
                .create(location_id, &mac, device_type)
                .await
                .map(ActionOutcome::ReservationCreated),
            Action::ReservationsEdit {
                location_id,
                reservation_id,
                mac,
                device_type,
            } => self
                .reservations
                .edit(location_id, reservation_id, &mac, device_type)
                .await
                .map(ActionOutcome::ReservationCreated),
            Action::ReservationsDelete {
                location_id,
                reservation_id,
            } => self
                .reservations
                .delete(location_id, reservation_id)
                .await
                .map(ActionOutcome::ReservationDeleted),
            Action::LocationsAssign => self
                .assigner
                .assign_all()
                .await
                .map(ActionOutcome::AddressesAssigned),
        };

        match &outcome {
            Ok(result) => info!("{} succeeded: {}", name, result.summary()),
            Err(e) => error!("{} failed: {}", name, e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_use_dotted_names_on_the_wire() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "action": "reservations.create",
            "location_id": "6f1c1f0e-8a53-4a55-9d3c-7a0c1b2d3e4f",
            "mac": "aa:bb:cc:dd:ee:ff",
            "device_type": "zebra"
        }))
        .unwrap();

        assert_eq!(action.name(), "reservations.create");
        match action {
            Action::ReservationsCreate { device_type, .. } => {
                assert_eq!(device_type, DeviceClass::Zebra)
            }
            other => panic!("unexpected action {other}"),
        }

        let assign = serde_json::to_value(Action::LocationsAssign).unwrap();
        assert_eq!(assign, serde_json::json!({ "action": "locations.assign" }));
    }
}
