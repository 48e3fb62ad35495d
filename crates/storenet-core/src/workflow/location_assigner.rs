//! Fleet-wide address assignment
//!
//! Gives every store lacking one a unique /24 from the store base block, and
//! (re)derives every store's secure network from its code. Run as a single
//! writer: the used-subnet ledger is read once at the start and not
//! re-checked against concurrent assignments.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use super::events::WorkflowEvent;
use super::WorkflowContext;
use crate::address::SubnetLedger;
use crate::config::AddressingConfig;
use crate::error::{Error, Result};

/// Outcome of an assignment run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentReport {
    /// Locations that received a new store block
    pub assigned: Vec<(String, Ipv4Net)>,
    /// Locations whose secure network was written
    pub secure_updated: usize,
    /// Locations whose secure network could not be derived, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Assigns store blocks and secure networks
#[derive(Debug, Clone)]
pub struct LocationAddressAssigner {
    ctx: WorkflowContext,
}

impl LocationAddressAssigner {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Assign addresses to every store, in code order
    ///
    /// # Errors
    ///
    /// [`Error::AddressSpaceExhausted`] when no free block is left inside the
    /// private range. Locations processed before that keep their assignment.
    pub async fn assign_all(&self) -> Result<AssignmentReport> {
        let addressing = &self.ctx.config.addressing;
        let locations = self
            .ctx
            .store
            .locations_by_type(&addressing.location_type)
            .await?;

        let mut ledger: SubnetLedger = locations
            .iter()
            .flat_map(|l| l.ip_schema.iter().copied())
            .collect();
        info!(
            "Assigning addresses for {} locations ({} blocks in use)",
            locations.len(),
            ledger.len()
        );

        let mut report = AssignmentReport::default();
        for location in locations {
            let code = location.code.trim().to_string();

            let mut ip_schema = location.ip_schema.clone();
            let mut new_block = None;
            if ip_schema.is_empty() {
                let block = next_store_block(&ledger, addressing, &code)?;
                ledger.insert(block);
                ip_schema.push(block);
                new_block = Some(block);
                debug!("Location {} gets store block {}", code, block);
            }

            let secure = match secure_network_for_code(&code, addressing) {
                Ok(net) => Some(net),
                Err(e) => {
                    warn!("No secure network for location {}: {}", code, e);
                    report.skipped.push((code.clone(), e.to_string()));
                    None
                }
            };

            if new_block.is_none() && secure.is_none() {
                continue;
            }

            self.ctx
                .store
                .set_location_addressing(
                    location.id,
                    ip_schema,
                    secure.or(location.aptos_network),
                )
                .await?;

            if let Some(block) = new_block {
                report.assigned.push((code.clone(), block));
            }
            if secure.is_some() {
                report.secure_updated += 1;
            }
            self.ctx.events.emit(WorkflowEvent::AddressAssigned {
                location_code: code,
                store_block: new_block,
                secure_network: secure,
            });
        }

        info!(
            "Address assignment done: {} new blocks, {} secure networks, {} skipped",
            report.assigned.len(),
            report.secure_updated,
            report.skipped.len()
        );
        Ok(report)
    }
}

fn next_store_block(ledger: &SubnetLedger, addressing: &AddressingConfig, code: &str) -> Result<Ipv4Net> {
    let block = ledger
        .next_unused(&addressing.store_base, addressing.store_prefix)?
        .ok_or_else(|| {
            Error::exhausted(format!(
                "No free /{} for location {} in {}",
                addressing.store_prefix, code, addressing.store_base
            ))
        })?;

    let range = &addressing.private_range;
    if !range.contains(&block.network()) || !range.contains(&block.broadcast()) {
        return Err(Error::exhausted(format!(
            "Reached end of private range {} at {}",
            range, block
        )));
    }
    Ok(block)
}

/// Secure network of a location code
///
/// Codes at or above the threshold use the high template, the rest the low
/// one. The third octet comes from the last three digits; values above 255
/// become `1` followed by the first two of those digits.
///
/// `1042` -> `10.67.42.192/26`, `3999` -> `10.66.199.192/26`
pub fn secure_network_for_code(code: &str, addressing: &AddressingConfig) -> Result<Ipv4Net> {
    let code = code.trim();
    let numeric: u32 = code
        .parse()
        .map_err(|_| Error::invalid_input(format!("Location code '{}' is not numeric", code)))?;

    let base = if numeric >= addressing.secure_threshold {
        addressing.secure_base_high
    } else {
        addressing.secure_base_low
    };

    let tail = &code[code.len().saturating_sub(3)..];
    let mut octet: u32 = tail.parse().unwrap_or_default();
    if octet > 255 {
        octet = format!("1{}", &tail[..2]).parse().unwrap_or_default();
    }

    let [a, b, _, d] = base.addr().octets();
    Ipv4Net::new(Ipv4Addr::new(a, b, octet as u8, d), base.prefix_len())
        .map_err(|_| Error::config(format!("Invalid secure network template {}", base)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure(code: &str) -> String {
        secure_network_for_code(code, &AddressingConfig::default())
            .unwrap()
            .to_string()
    }

    #[test]
    fn secure_network_derivation() {
        assert_eq!(secure("1042"), "10.67.42.192/26");
        assert_eq!(secure("2255"), "10.67.255.192/26");
        assert_eq!(secure("2256"), "10.67.125.192/26");
        assert_eq!(secure("3000"), "10.66.0.192/26");
        assert_eq!(secure("3999"), "10.66.199.192/26");
        assert_eq!(secure("1007"), "10.67.7.192/26");
    }

    #[test]
    fn non_numeric_code_is_rejected() {
        let err = secure_network_for_code("HQ01", &AddressingConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn store_block_stays_inside_private_range() {
        let addressing = AddressingConfig {
            store_base: "172.31.254.0/23".parse().unwrap(),
            ..AddressingConfig::default()
        };
        let mut ledger = SubnetLedger::new();

        let first = next_store_block(&ledger, &addressing, "0001").unwrap();
        assert_eq!(first.to_string(), "172.31.254.0/24");
        ledger.insert(first);
        let second = next_store_block(&ledger, &addressing, "0002").unwrap();
        assert_eq!(second.to_string(), "172.31.255.0/24");
        ledger.insert(second);

        let err = next_store_block(&ledger, &addressing, "0003").unwrap_err();
        assert!(matches!(err, Error::AddressSpaceExhausted(_)));
    }

    #[test]
    fn block_past_private_range_is_exhausted() {
        let addressing = AddressingConfig {
            store_base: "172.31.255.0/16".parse().unwrap(),
            ..AddressingConfig::default()
        };
        let ledger: SubnetLedger = ["172.31.255.0/24".parse().unwrap()].into_iter().collect();

        let err = next_store_block(&ledger, &addressing, "0001").unwrap_err();
        assert!(matches!(err, Error::AddressSpaceExhausted(_)));
    }
}
