// # Store Tables
//
// Row storage shared by the memory and file stores. All uniqueness rules
// (location code, connector serial, one site per location, MAC) are enforced
// here so both stores behave the same.

use chrono::Utc;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::Error;
use crate::model::{
    Connector, LanDescriptor, Location, LocationFull, Reservation, ReservationDraft, Site,
    SiteDraft, validate_location_code,
};

/// In-memory tables, serializable as one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub locations: HashMap<Uuid, Location>,
    /// Keyed by fabric connector id
    #[serde(default)]
    pub connectors: HashMap<String, Connector>,
    #[serde(default)]
    pub sites: HashMap<Uuid, Site>,
    #[serde(default)]
    pub reservations: HashMap<Uuid, Reservation>,
}

impl Tables {
    pub fn get_location(&self, id: Uuid) -> Option<Location> {
        self.locations.get(&id).cloned()
    }

    pub fn location_by_code(&self, code: &str) -> Result<Option<Location>, Error> {
        validate_location_code(code)?;
        let code = code.trim();
        Ok(self.locations.values().find(|l| l.code == code).cloned())
    }

    pub fn locations_by_type(&self, label: &str) -> Vec<Location> {
        let mut locations: Vec<Location> = self
            .locations
            .values()
            .filter(|l| l.location_type == label)
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.code.cmp(&b.code));
        locations
    }

    pub fn upsert_location(&mut self, mut location: Location) -> Location {
        if let Some(existing) = self.locations.values().find(|l| l.code == location.code) {
            location.id = existing.id;
        }
        location.updated_at = Some(Utc::now());
        self.locations.insert(location.id, location.clone());
        location
    }

    pub fn set_location_addressing(
        &mut self,
        id: Uuid,
        ip_schema: Vec<Ipv4Net>,
        aptos_network: Option<Ipv4Net>,
    ) -> Result<(), Error> {
        let location = self
            .locations
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Location {}", id)))?;
        location.ip_schema = ip_schema;
        location.aptos_network = aptos_network;
        location.updated_at = Some(Utc::now());
        Ok(())
    }

    pub fn location_full(&self, id: Uuid) -> Option<LocationFull> {
        let location = self.locations.get(&id)?.clone();

        let mut connectors: Vec<Connector> = self
            .connectors
            .values()
            .filter(|c| c.location_id == Some(id))
            .cloned()
            .collect();
        connectors.sort_by(|a, b| a.serial.cmp(&b.serial));

        let site = self.site_for_location(id);
        let reservations = site
            .as_ref()
            .map(|s| self.reservations_for_site(&s.mwan_site_id))
            .unwrap_or_default();

        Some(LocationFull {
            location,
            connectors,
            site,
            reservations,
        })
    }

    pub fn get_connector(&self, id: &str) -> Option<Connector> {
        self.connectors.get(id).cloned()
    }

    pub fn connector_by_serial(&self, serial: &str) -> Option<Connector> {
        self.connectors.values().find(|c| c.serial == serial).cloned()
    }

    pub fn update_connector(&mut self, connector: &Connector) -> Result<(), Error> {
        let row = self
            .connectors
            .get_mut(&connector.id)
            .ok_or_else(|| Error::not_found(format!("Connector {}", connector.id)))?;
        *row = connector.clone();
        row.updated_at = Some(Utc::now());
        Ok(())
    }

    pub fn upsert_connector(&mut self, mut connector: Connector) -> Connector {
        let previous = self
            .connectors
            .values()
            .find(|c| c.serial == connector.serial)
            .map(|c| c.id.clone());
        if let Some(previous) = previous {
            self.connectors.remove(&previous);
        }
        connector.updated_at = Some(Utc::now());
        self.connectors.insert(connector.id.clone(), connector.clone());
        connector
    }

    pub fn site_for_location(&self, location_id: Uuid) -> Option<Site> {
        self.sites
            .values()
            .find(|s| s.location_id == location_id)
            .cloned()
    }

    pub fn insert_site(&mut self, draft: SiteDraft) -> Result<Site, Error> {
        if self.sites.values().any(|s| s.location_id == draft.location_id) {
            return Err(Error::already_exists(format!(
                "Site for location {}",
                draft.location_id
            )));
        }

        let site = Site {
            id: Uuid::new_v4(),
            mwan_site_id: draft.mwan_site_id,
            connector_id: draft.connector_id,
            location_id: draft.location_id,
            name: draft.name,
            location_lat: draft.location_lat,
            location_long: draft.location_long,
            mwan_wans: draft.mwan_wans,
            mwan_lans: Vec::new(),
            created_at: Utc::now(),
        };
        self.sites.insert(site.id, site.clone());
        Ok(site)
    }

    pub fn update_site_lans(&mut self, site_id: Uuid, lans: Vec<LanDescriptor>) -> Result<(), Error> {
        let site = self
            .sites
            .get_mut(&site_id)
            .ok_or_else(|| Error::not_found(format!("Site {}", site_id)))?;
        site.mwan_lans = lans;
        Ok(())
    }

    pub fn delete_site(&mut self, site_id: Uuid) {
        self.sites.remove(&site_id);
    }

    pub fn get_reservation(&self, id: Uuid) -> Option<Reservation> {
        self.reservations.get(&id).cloned()
    }

    pub fn reservation_by_mac(&self, mac: &str) -> Option<Reservation> {
        self.reservations
            .values()
            .find(|r| r.reservations_mac == mac)
            .cloned()
    }

    pub fn reservations_for_site(&self, mwan_site_id: &str) -> Vec<Reservation> {
        let mut reservations: Vec<Reservation> = self
            .reservations
            .values()
            .filter(|r| r.mwan_site_id == mwan_site_id)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.reservations_ip);
        reservations
    }

    pub fn insert_reservation(&mut self, draft: ReservationDraft) -> Result<Reservation, Error> {
        if self.reservation_by_mac(&draft.reservations_mac).is_some() {
            return Err(Error::already_exists(format!(
                "Reservation for MAC {}",
                draft.reservations_mac
            )));
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            mwan_site_id: draft.mwan_site_id,
            mwan_lan_id: draft.mwan_lan_id,
            reservations_mac: draft.reservations_mac,
            reservations_ip: draft.reservations_ip,
            reservations_type: draft.reservations_type,
            name: draft.name,
            dns_record: draft.dns_record,
            created_at: Utc::now(),
        };
        self.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    pub fn delete_reservation(&mut self, id: Uuid) {
        self.reservations.remove(&id);
    }

    pub fn delete_reservations_for_site(&mut self, mwan_site_id: &str) -> usize {
        let before = self.reservations.len();
        self.reservations.retain(|_, r| r.mwan_site_id != mwan_site_id);
        before - self.reservations.len()
    }
}
