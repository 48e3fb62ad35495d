//! Device DHCP reservations on a site's secure LAN
//!
//! A reservation lives in three places: the secure LAN's reservation map on
//! the fabric, an `A` record at the DNS provider, and a row in the local
//! store. The fabric has no partial update, so every change fetches the LAN,
//! edits its map and sends the whole LAN back.

use std::net::Ipv4Addr;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::WorkflowEvent;
use super::WorkflowContext;
use crate::address::{DeviceClass, next_slot, reservation_window_start};
use crate::error::{Error, Result};
use crate::model::{LanConfig, Location, MacAddress, Reservation, ReservationDraft};
use crate::traits::DnsRecordRequest;

/// Creates, edits and deletes device reservations
#[derive(Debug, Clone)]
pub struct ReservationManager {
    ctx: WorkflowContext,
}

impl ReservationManager {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Reserve the next free slot of `class` for `mac`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`]: malformed MAC
    /// - [`Error::AlreadyExists`]: the MAC is reserved anywhere in the fleet
    /// - [`Error::NotFound`]: location, site or secure LAN missing
    /// - [`Error::CapacityExceeded`]: every slot of the class is taken
    /// - [`Error::Configuration`]: the fabric LAN has no static addressing
    pub async fn create(
        &self,
        location_id: Uuid,
        mac: &str,
        class: DeviceClass,
    ) -> Result<Reservation> {
        let mac = normalise_mac(mac)?;
        self.ensure_mac_free(&mac).await?;

        let location = self.ctx.require_location(location_id).await?;
        let site = self.ctx.require_site(&location).await?;
        let secure = site.secure_lan().ok_or_else(|| {
            Error::not_found(format!("Secure LAN on site {}", site.name))
        })?;

        let lan = self.ctx.fabric.get_lan(&site.mwan_site_id, &secure.id).await?;
        let mut config = lan.config.writable();

        let addressing = config.static_addressing.as_mut().ok_or_else(|| {
            Error::configuration(format!("LAN {} has no static addressing", lan.id))
        })?;
        let pool_start = reservation_window_start(&addressing.address)?;
        let dhcp = addressing.dhcp_server.as_mut().ok_or_else(|| {
            Error::configuration(format!("LAN {} has no DHCP server", lan.id))
        })?;
        let reservations = dhcp.reservations.get_or_insert_with(Default::default);

        let occupied: Vec<Ipv4Addr> = reservations
            .values()
            .filter_map(|ip| match ip.parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    debug!("Ignoring unparsable reservation address {} on LAN {}", ip, lan.id);
                    None
                }
            })
            .collect();
        let slot = next_slot(pool_start, class, occupied)?;
        reservations.insert(mac.clone(), slot.ip.to_string());

        let updated = self
            .ctx
            .fabric
            .update_lan(&site.mwan_site_id, &lan.id, &config)
            .await?;
        info!(
            "Reserved {} for {} ({}) on site {}",
            slot.ip, mac, slot.name, site.name
        );

        let dns_name = format!("{}.s{}", slot.name, location.code);
        let record_id = self
            .ctx
            .dns
            .create_record(&self.a_record(&location, &slot.name, &dns_name, slot.ip))
            .await?;

        let reservation = self
            .ctx
            .store
            .insert_reservation(ReservationDraft {
                mwan_site_id: site.mwan_site_id.clone(),
                mwan_lan_id: updated.id.clone(),
                reservations_mac: mac.clone(),
                reservations_ip: slot.ip,
                reservations_type: class,
                name: dns_name,
                dns_record: Some(record_id),
            })
            .await?;
        self.ctx
            .store
            .update_site_lans(site.id, site.lans_with(updated))
            .await?;

        self.ctx.events.emit(WorkflowEvent::ReservationCreated {
            location_code: location.code.clone(),
            mac,
            ip: reservation.reservations_ip,
            name: reservation.name.clone(),
        });
        Ok(reservation)
    }

    /// Remove a reservation and its DNS records
    ///
    /// The LAN is read fresh from the fabric so concurrent edits to other
    /// entries survive. Returns the deleted row.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`]: reservation, its LAN linkage or the site missing
    /// - [`Error::Configuration`]: the fabric LAN lacks the MAC entry or its
    ///   DHCP structure; nothing is written in that case
    pub async fn delete(&self, location_id: Uuid, reservation_id: Uuid) -> Result<Reservation> {
        let location = self.ctx.require_location(location_id).await?;
        let reservation = self
            .ctx
            .store
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Reservation {}", reservation_id)))?;
        if reservation.mwan_site_id.is_empty() || reservation.mwan_lan_id.is_empty() {
            return Err(Error::not_found(format!(
                "LAN linkage for reservation {}",
                reservation.name
            )));
        }
        let site = self.ctx.require_site(&location).await?;
        if site.mwan_site_id != reservation.mwan_site_id {
            return Err(Error::not_found(format!(
                "Reservation {} on site {}",
                reservation.name, site.name
            )));
        }

        let lan = self
            .ctx
            .fabric
            .get_lan(&reservation.mwan_site_id, &reservation.mwan_lan_id)
            .await?;
        let key = normalise_mac(&reservation.reservations_mac)
            .unwrap_or_else(|_| reservation.reservations_mac.to_ascii_lowercase());
        let mut config = lan.config.writable();
        remove_reservation(&mut config, &key, &lan.id)?;

        let updated = self
            .ctx
            .fabric
            .update_lan(&reservation.mwan_site_id, &reservation.mwan_lan_id, &config)
            .await?;
        info!(
            "Released {} for {} on site {}",
            reservation.reservations_ip, key, site.name
        );

        match &reservation.dns_record {
            Some(record) => self.ctx.dns.delete_record(record).await?,
            None => warn!("Reservation {} has no DNS record id", reservation.name),
        }
        if reservation.reservations_type == DeviceClass::Printer {
            delete_printer_alias(&self.ctx, &location.code, &reservation).await?;
        }

        self.ctx.store.delete_reservation(reservation.id).await?;
        self.ctx
            .store
            .update_site_lans(site.id, site.lans_with(updated))
            .await?;

        self.ctx.events.emit(WorkflowEvent::ReservationDeleted {
            location_code: location.code.clone(),
            mac: key,
        });
        Ok(reservation)
    }

    /// Replace a reservation with one for a new MAC and class
    ///
    /// Runs [`delete`](Self::delete) then [`create`](Self::create); the new
    /// slot is recomputed, so the address and name may change. If the create
    /// fails, the old reservation is re-created and the create error returned.
    pub async fn edit(
        &self,
        location_id: Uuid,
        reservation_id: Uuid,
        new_mac: &str,
        class: DeviceClass,
    ) -> Result<Reservation> {
        let new_mac = normalise_mac(new_mac)?;
        if let Some(existing) = self.ctx.store.reservation_by_mac(&new_mac).await? {
            if existing.id != reservation_id {
                return Err(Error::already_exists(format!(
                    "Reservation for MAC {}",
                    new_mac
                )));
            }
        }

        let old = self.delete(location_id, reservation_id).await?;

        match self.create(location_id, &new_mac, class).await {
            Ok(reservation) => Ok(reservation),
            Err(e) => {
                warn!(
                    "Edit of {} failed after delete: {}. Restoring previous reservation",
                    old.name, e
                );
                match self
                    .create(location_id, &old.reservations_mac, old.reservations_type)
                    .await
                {
                    Ok(restored) => info!(
                        "Restored reservation for {} at {}",
                        restored.reservations_mac, restored.reservations_ip
                    ),
                    Err(restore_err) => error!(
                        "Could not restore reservation for {}: {}",
                        old.reservations_mac, restore_err
                    ),
                }
                Err(e)
            }
        }
    }

    async fn ensure_mac_free(&self, mac: &str) -> Result<()> {
        if let Some(existing) = self.ctx.store.reservation_by_mac(mac).await? {
            return Err(Error::already_exists(format!(
                "Reservation for MAC {} ({})",
                mac, existing.name
            )));
        }
        Ok(())
    }

    fn a_record(
        &self,
        location: &Location,
        device: &str,
        dns_name: &str,
        ip: Ipv4Addr,
    ) -> DnsRecordRequest {
        let dns = &self.ctx.config.dns;
        DnsRecordRequest {
            content: ip.to_string(),
            name: dns_name.to_string(),
            proxied: false,
            record_type: "A".to_string(),
            comment: format!("Record for {} at {}", device, location.code),
            tags: vec![
                dns.tag_base.clone(),
                "connector".to_string(),
                "device".to_string(),
                location.code.clone(),
            ],
            ttl: dns.ttl,
        }
    }
}

/// Parse and render a MAC in the fabric's key form
pub fn normalise_mac(mac: &str) -> Result<String> {
    Ok(mac.parse::<MacAddress>()?.to_string())
}

fn remove_reservation(config: &mut LanConfig, key: &str, lan_id: &str) -> Result<()> {
    let drift = |what: &str| Error::configuration(format!("LAN {} {}", lan_id, what));

    let reservations = config
        .static_addressing
        .as_mut()
        .ok_or_else(|| drift("has no static addressing"))?
        .dhcp_server
        .as_mut()
        .ok_or_else(|| drift("has no DHCP server"))?
        .reservations
        .as_mut()
        .ok_or_else(|| drift("has no reservations"))?;

    reservations
        .remove(key)
        .map(|_| ())
        .ok_or_else(|| drift(&format!("has no reservation for {}", key)))
}

/// Printer alias name: `dlr<code>.prt<slot>.store.<domain>`
pub fn printer_alias(code: &str, slot: u32, domain: &str) -> String {
    format!("dlr{}.prt{}.store.{}", code, slot, domain)
}

/// Delete the alias record of a printer reservation
///
/// Returns `Ok(false)` when no alias exists.
pub(crate) async fn delete_printer_alias(
    ctx: &WorkflowContext,
    code: &str,
    reservation: &Reservation,
) -> Result<bool> {
    let Some(slot) = reservation.slot_index() else {
        warn!("Cannot derive printer slot from name {}", reservation.name);
        return Ok(false);
    };
    let alias = printer_alias(code, slot, &ctx.config.dns.domain);

    let records = ctx.dns.query_records(&alias).await?;
    let Some(record) = records.first() else {
        debug!("No alias record {} to delete", alias);
        return Ok(false);
    };

    ctx.dns.delete_record(&record.id).await?;
    info!("Deleted printer alias {}", alias);
    Ok(true)
}
