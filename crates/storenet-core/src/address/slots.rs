//! DHCP reservation slots on the secure LAN
//!
//! A secure LAN reserves a run of [`SLOT_WINDOW`] addresses starting one past
//! its static (gateway) address. Each [`DeviceClass`] owns a fixed sub-range of
//! that window, in declaration order:
//!
//! ```text
//! slot:   0  1 | 2  3  4  5  6 | 7  8  9 10 11
//! class: printer|     zebra     |    pinpad
//! ```
//!
//! Allocation is positional: occupancy is rebuilt from the current
//! reservation addresses every time, so the answer never depends on the
//! order reservations were made in.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Number of reservation slots on a secure LAN
pub const SLOT_WINDOW: usize = 12;

/// Device classes that receive fixed DHCP reservations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Receipt and label printers
    Printer,
    /// Zebra handheld scanners
    Zebra,
    /// Payment pinpads
    Pinpad,
}

impl DeviceClass {
    /// All classes in slot order
    pub const ALL: [DeviceClass; 3] = [DeviceClass::Printer, DeviceClass::Zebra, DeviceClass::Pinpad];

    /// Number of slots owned by this class
    pub fn capacity(self) -> usize {
        match self {
            DeviceClass::Printer => 2,
            DeviceClass::Zebra => 5,
            DeviceClass::Pinpad => 5,
        }
    }

    /// Index of this class's first slot in the window
    pub fn offset(self) -> usize {
        Self::ALL
            .iter()
            .take_while(|class| **class != self)
            .map(|class| class.capacity())
            .sum()
    }

    /// Lowercase class name, as used in device names
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Printer => "printer",
            DeviceClass::Zebra => "zebra",
            DeviceClass::Pinpad => "pinpad",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "printer" => Ok(DeviceClass::Printer),
            "zebra" => Ok(DeviceClass::Zebra),
            "pinpad" => Ok(DeviceClass::Pinpad),
            other => Err(Error::invalid_input(format!(
                "Unknown device class '{}'. Valid classes: printer, zebra, pinpad",
                other
            ))),
        }
    }
}

/// A free slot picked for a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    /// Reserved address
    pub ip: Ipv4Addr,
    /// Generated device name, e.g. `zebra-3`
    pub name: String,
    /// Class the slot belongs to
    pub class: DeviceClass,
    /// 1-based index within the class
    pub index: usize,
}

/// First address of the reservation window for a LAN static address
///
/// Accepts either a bare address or the `address/prefix` form the fabric
/// stores on a LAN.
pub fn reservation_window_start(static_address: &str) -> Result<Ipv4Addr> {
    let host = static_address
        .split('/')
        .next()
        .unwrap_or_default()
        .trim();
    let addr: Ipv4Addr = host.parse().map_err(|e| {
        Error::invalid_input(format!("Invalid static address '{}': {}", static_address, e))
    })?;
    Ok(Ipv4Addr::from(u32::from(addr).wrapping_add(1)))
}

/// Pick the next free slot for `class`
///
/// `occupied` holds every address currently reserved on the LAN. Addresses
/// outside the window are ignored.
///
/// # Errors
///
/// [`Error::CapacityExceeded`] when every slot of the class is taken.
pub fn next_slot<I>(pool_start: Ipv4Addr, class: DeviceClass, occupied: I) -> Result<SlotAssignment>
where
    I: IntoIterator<Item = Ipv4Addr>,
{
    let start = i64::from(u32::from(pool_start));
    let mut slots = [false; SLOT_WINDOW];

    for ip in occupied {
        let index = i64::from(u32::from(ip)) - start;
        if (0..SLOT_WINDOW as i64).contains(&index) {
            slots[index as usize] = true;
        }
    }

    let offset = class.offset();
    for i in 0..class.capacity() {
        let slot = offset + i;
        if !slots[slot] {
            return Ok(SlotAssignment {
                ip: Ipv4Addr::from(u32::from(pool_start) + slot as u32),
                name: format!("{}-{}", class, i + 1),
                class,
                index: i + 1,
            });
        }
    }

    Err(Error::capacity_exceeded(format!(
        "No available slots for device type: {}",
        class
    )))
}
