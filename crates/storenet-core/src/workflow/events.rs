//! Progress events emitted by the workflows

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tracing::warn;

use super::site_decommissioner::DecommissionStep;
use super::site_provisioner::ProvisionStage;

/// Events emitted while workflows run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A provisioning stage completed
    ProvisionAdvanced {
        location_code: String,
        stage: ProvisionStage,
    },

    /// Provisioning stopped; `stage` is the last completed one
    ProvisionFailed {
        location_code: String,
        stage: ProvisionStage,
        error: String,
    },

    /// Compensation ran after a provisioning failure
    ProvisionRolledBack {
        location_code: String,
        failures: usize,
    },

    /// A teardown step completed
    DecommissionAdvanced {
        location_code: String,
        step: DecommissionStep,
    },

    /// A DNS record could not be removed during teardown
    DnsCleanupFailed {
        location_code: String,
        record: String,
        error: String,
    },

    /// A reservation went live
    ReservationCreated {
        location_code: String,
        mac: String,
        ip: Ipv4Addr,
        name: String,
    },

    /// A reservation was removed
    ReservationDeleted {
        location_code: String,
        mac: String,
    },

    /// A location received its address plan
    AddressAssigned {
        location_code: String,
        store_block: Option<Ipv4Net>,
        secure_network: Option<Ipv4Net>,
    },
}

/// Sending half of the optional event channel
///
/// A sink without a channel discards everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl EventSink {
    /// Sink that discards events
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Bounded channel of the given capacity
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Send without waiting; a full channel drops the event
    pub fn emit(&self, event: WorkflowEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
