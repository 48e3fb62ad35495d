//! IPv4 address planning
//!
//! Pure, side-effect-free arithmetic used by every workflow that hands out
//! address space:
//!
//! - [`next_unused_subnet`]: first free subnet of a given size inside a base block
//! - [`divide_block`]: fixed split of a store /24 into its six VLAN subnets
//! - [`ip_to_int`] / [`int_to_ip`]: dotted quad <-> `u32` (network byte order)
//! - [`SubnetLedger`]: sorted accumulator of already-assigned subnets
//!
//! Nothing in here performs I/O. Callers that read a list of used subnets,
//! pick a new one and write it back must serialize that sequence themselves.

pub mod slots;

pub use slots::{DeviceClass, SlotAssignment, SLOT_WINDOW, next_slot, reservation_window_start};

use crate::error::{Error, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Prefix lengths of the six subnets carved out of a store /24, in address order
///
/// Two /26 blocks (64 addresses) followed by four /27 blocks (32 addresses).
pub const STORE_BLOCK_LAYOUT: [u8; 6] = [26, 26, 27, 27, 27, 27];

/// Prefix length a store block must have to be divided
pub const STORE_BLOCK_PREFIX: u8 = 24;

/// Convert a dotted-quad string to its 32-bit integer form
pub fn ip_to_int(ip: &str) -> Result<u32> {
    let addr: Ipv4Addr = ip
        .trim()
        .parse()
        .map_err(|e| Error::invalid_input(format!("Invalid IPv4 address '{}': {}", ip, e)))?;
    Ok(u32::from(addr))
}

/// Convert a 32-bit integer to an IPv4 address (most-significant octet first)
pub fn int_to_ip(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value)
}

/// Parse a CIDR string such as `10.0.5.0/24`
///
/// The address part must be a valid dotted quad and the prefix a number
/// between 0 and 32.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net> {
    let (addr, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| Error::invalid_input(format!("CIDR '{}' has no prefix length", cidr)))?;

    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|e| Error::invalid_input(format!("Invalid address in CIDR '{}': {}", cidr, e)))?;

    let prefix: u8 = prefix
        .parse()
        .map_err(|_| Error::invalid_input(format!("Non-numeric prefix in CIDR '{}'", cidr)))?;

    Ipv4Net::new(addr, prefix)
        .map_err(|_| Error::invalid_input(format!("Prefix out of range in CIDR '{}'", cidr)))
}

/// Number of addresses in a subnet of the given prefix length
pub fn block_size(prefix: u8) -> u64 {
    1u64 << (32 - u32::from(prefix.min(32)))
}

/// Offset (from the network address) of the last usable host address
///
/// `/26` -> 62, `/27` -> 30, `/25` -> 126.
pub fn last_host_offset(prefix: u8) -> u32 {
    block_size(prefix).saturating_sub(2) as u32
}

/// Address `offset` places after the network address of `net`
pub fn host_at(net: &Ipv4Net, offset: u32) -> Ipv4Addr {
    int_to_ip(u32::from(net.network()).wrapping_add(offset))
}

/// Find the first subnet of size `target_prefix` inside `base` that is not in `used`
///
/// The walk starts at `base`'s address as written (not its masked network)
/// and covers `2^(32 - base prefix)` addresses in steps of the target block
/// size. `used` is consumed in lock-step with the walk, so it MUST be sorted
/// ascending by address; entries that sort below the current candidate are
/// skipped. Unsorted input produces wrong answers.
///
/// Returns `Ok(None)` when every candidate is taken.
pub fn next_unused_subnet(
    base: &Ipv4Net,
    used: &[Ipv4Net],
    target_prefix: u8,
) -> Result<Option<Ipv4Net>> {
    if target_prefix > 32 || target_prefix < base.prefix_len() {
        return Err(Error::invalid_input(format!(
            "Target prefix /{} does not fit inside {}",
            target_prefix, base
        )));
    }

    let start = u64::from(u32::from(base.addr()));
    let span = block_size(base.prefix_len());
    let step = block_size(target_prefix);

    let mut cursor = 0usize;
    let mut offset = 0u64;
    while offset < span {
        let addr = start + offset;
        if addr > u64::from(u32::MAX) {
            break;
        }

        let candidate = Ipv4Net::new(int_to_ip(addr as u32), target_prefix)
            .map_err(|_| Error::invalid_input(format!("Invalid prefix /{}", target_prefix)))?;

        while cursor < used.len() && sort_key(&used[cursor]) < sort_key(&candidate) {
            cursor += 1;
        }

        if cursor < used.len() && sort_key(&used[cursor]) == sort_key(&candidate) {
            cursor += 1;
        } else {
            return Ok(Some(candidate));
        }

        offset += step;
    }

    Ok(None)
}

/// Split a store /24 into its six VLAN subnets
///
/// The result tiles the block exactly, in address order, with prefixes
/// [`STORE_BLOCK_LAYOUT`].
pub fn divide_block(block: &Ipv4Net) -> Result<Vec<Ipv4Net>> {
    if block.prefix_len() != STORE_BLOCK_PREFIX {
        return Err(Error::invalid_input(format!(
            "Only /{} blocks can be divided, got {}",
            STORE_BLOCK_PREFIX, block
        )));
    }

    let mut current = u32::from(block.network());
    let mut subnets = Vec::with_capacity(STORE_BLOCK_LAYOUT.len());
    for prefix in STORE_BLOCK_LAYOUT {
        let subnet = Ipv4Net::new(int_to_ip(current), prefix)
            .map_err(|_| Error::invalid_input(format!("Invalid prefix /{}", prefix)))?;
        subnets.push(subnet);
        current += block_size(prefix) as u32;
    }

    Ok(subnets)
}

fn sort_key(net: &Ipv4Net) -> (u32, u8) {
    (u32::from(net.addr()), net.prefix_len())
}

/// Sorted set of subnets already handed out
///
/// Replaces a shared mutable list: new assignments are inserted at their
/// sorted position so the next [`next_unused_subnet`] scan stays correct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetLedger {
    subnets: Vec<Ipv4Net>,
}

impl SubnetLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subnet, keeping address order; duplicates are ignored
    ///
    /// Returns `true` if the subnet was not present before.
    pub fn insert(&mut self, subnet: Ipv4Net) -> bool {
        match self
            .subnets
            .binary_search_by_key(&sort_key(&subnet), sort_key)
        {
            Ok(_) => false,
            Err(position) => {
                self.subnets.insert(position, subnet);
                true
            }
        }
    }

    /// First free subnet of `prefix` size inside `base`
    pub fn next_unused(&self, base: &Ipv4Net, prefix: u8) -> Result<Option<Ipv4Net>> {
        next_unused_subnet(base, &self.subnets, prefix)
    }

    /// Whether the subnet is already recorded
    pub fn contains(&self, subnet: &Ipv4Net) -> bool {
        self.subnets
            .binary_search_by_key(&sort_key(subnet), sort_key)
            .is_ok()
    }

    /// Recorded subnets in address order
    pub fn as_slice(&self) -> &[Ipv4Net] {
        &self.subnets
    }

    /// Number of recorded subnets
    pub fn len(&self) -> usize {
        self.subnets.len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }
}

impl FromIterator<Ipv4Net> for SubnetLedger {
    fn from_iter<I: IntoIterator<Item = Ipv4Net>>(iter: I) -> Self {
        let mut ledger = Self::new();
        for subnet in iter {
            ledger.insert(subnet);
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        parse_cidr(s).unwrap()
    }

    #[test]
    fn next_unused_skips_taken_prefix() {
        let base = net("172.17.0.0/12");
        let used = vec![net("172.17.0.0/24"), net("172.17.1.0/24")];

        let next = next_unused_subnet(&base, &used, 24).unwrap();
        assert_eq!(next, Some(net("172.17.2.0/24")));
    }

    #[test]
    fn next_unused_fills_gaps() {
        let base = net("10.0.0.0/16");
        let used = vec![net("10.0.0.0/24"), net("10.0.2.0/24")];

        let next = next_unused_subnet(&base, &used, 24).unwrap();
        assert_eq!(next, Some(net("10.0.1.0/24")));
    }

    #[test]
    fn next_unused_returns_none_when_full() {
        let base = net("10.0.0.0/22");
        let used: Vec<Ipv4Net> = (0..4).map(|i| net(&format!("10.0.{}.0/24", i))).collect();

        assert_eq!(next_unused_subnet(&base, &used, 24).unwrap(), None);
    }

    #[test]
    fn next_unused_ignores_entries_below_base() {
        let base = net("10.0.4.0/22");
        let used = vec![net("10.0.0.0/24"), net("10.0.4.0/24")];

        let next = next_unused_subnet(&base, &used, 24).unwrap();
        assert_eq!(next, Some(net("10.0.5.0/24")));
    }

    #[test]
    fn next_unused_result_is_inside_base_and_not_used() {
        let base = net("10.10.0.0/20");
        let mut ledger = SubnetLedger::new();
        for _ in 0..16 {
            let next = ledger.next_unused(&base, 24).unwrap().unwrap();
            assert!(base.contains(&next));
            assert!(!ledger.contains(&next));
            ledger.insert(next);
        }
        assert_eq!(ledger.next_unused(&base, 24).unwrap(), None);
    }

    #[test]
    fn next_unused_rejects_larger_target() {
        let base = net("10.0.0.0/24");
        let err = next_unused_subnet(&base, &[], 16).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn divide_block_matches_store_layout() {
        let subnets = divide_block(&net("10.0.5.0/24")).unwrap();
        let rendered: Vec<String> = subnets.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "10.0.5.0/26",
                "10.0.5.64/26",
                "10.0.5.128/27",
                "10.0.5.160/27",
                "10.0.5.192/27",
                "10.0.5.224/27",
            ]
        );
    }

    #[test]
    fn divide_block_tiles_without_gaps() {
        let block = net("172.18.77.0/24");
        let subnets = divide_block(&block).unwrap();

        let mut expected_start = u32::from(block.network());
        let mut total = 0u64;
        for subnet in &subnets {
            assert_eq!(u32::from(subnet.network()), expected_start);
            assert!(block.contains(subnet));
            expected_start += block_size(subnet.prefix_len()) as u32;
            total += block_size(subnet.prefix_len());
        }
        assert_eq!(total, 256);
    }

    #[test]
    fn divide_block_rejects_other_prefixes() {
        let err = divide_block(&net("10.0.0.0/23")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn parse_cidr_rejects_non_numeric_prefix() {
        assert!(matches!(parse_cidr("10.0.0.0/ab"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_cidr("10.0.0.0"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_cidr("10.0.0.0/33"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_cidr("10.0.0/24"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn ip_int_round_trip() {
        for ip in ["0.0.0.0", "10.1.1.1", "172.31.255.255", "255.255.255.255", "192.168.0.1"] {
            let value = ip_to_int(ip).unwrap();
            assert_eq!(int_to_ip(value).to_string(), ip);
        }
        assert_eq!(ip_to_int("1.2.3.4").unwrap(), 0x0102_0304);
    }

    #[test]
    fn last_host_offsets() {
        assert_eq!(last_host_offset(25), 126);
        assert_eq!(last_host_offset(26), 62);
        assert_eq!(last_host_offset(27), 30);
    }

    #[test]
    fn ledger_keeps_order_on_insert() {
        let mut ledger: SubnetLedger = [net("172.17.5.0/24"), net("172.17.0.0/24")]
            .into_iter()
            .collect();
        assert!(ledger.insert(net("172.17.2.0/24")));
        assert!(!ledger.insert(net("172.17.2.0/24")));

        let rendered: Vec<String> = ledger.as_slice().iter().map(|s| s.to_string()).collect();
        assert_eq!(rendered, vec!["172.17.0.0/24", "172.17.2.0/24", "172.17.5.0/24"]);
    }
}
