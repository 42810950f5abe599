//! Bus table and engine timing.

use std::time::Duration;

use crate::ledger::MAX_SEQ_QUEUE;
use crate::types::{Channel, Interface};

/// One row of the platform's IPMB bus table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Position of the bus in the table; doubles as the bus index used by the API.
    pub index: usize,
    /// Physical interface.
    pub interface: Interface,
    /// Logical channel served by this bus.
    pub channel: Channel,
    /// Controller bus number (`/dev/i2c-N` on Linux).
    pub bus: u8,
    /// 7-bit address of the peer on this bus.
    pub target_addr: u8,
    /// Whether workers are started for this bus.
    pub enabled: bool,
    /// 7-bit address of this controller on this bus.
    pub self_addr: u8,
    /// Name of the transmit worker thread.
    pub tx_thread_name: String,
    /// Name of the receive worker thread.
    pub rx_thread_name: String,
}

impl BusConfig {
    /// An enabled I2C bus serving `channel`, with thread names derived from `bus`.
    pub fn new(index: usize, channel: Channel, bus: u8, self_addr: u8, target_addr: u8) -> Self {
        Self {
            index,
            interface: Interface::I2c,
            channel,
            bus,
            target_addr,
            enabled: true,
            self_addr,
            tx_thread_name: format!("ipmb_tx_bus{bus}"),
            rx_thread_name: format!("ipmb_rx_bus{bus}"),
        }
    }

    /// Set the physical interface.
    pub fn interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    /// Enable or disable the bus.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Override the worker thread names.
    pub fn thread_names(mut self, tx: impl Into<String>, rx: impl Into<String>) -> Self {
        self.tx_thread_name = tx.into();
        self.rx_thread_name = rx.into();
        self
    }

    /// Whether this row can carry traffic.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.interface != Interface::Reserved
    }
}

/// Timing and sizing knobs for the engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Pause after a failed write before the envelope is retried.
    pub retry_delay: Duration,
    /// Pause after every transmitted envelope.
    pub tx_pace: Duration,
    /// Receive poll period.
    pub poll_interval: Duration,
    /// Age after which an outstanding request is swept.
    pub seq_timeout: Duration,
    /// Sweeper period.
    pub sweep_interval: Duration,
    /// How long `read` waits for a response.
    pub read_timeout: Duration,
    /// Bound on every internal lock acquisition.
    pub lock_timeout: Duration,
    /// Writes beyond the first before an envelope is given up.
    pub max_retries: u32,
    /// Outstanding requests per bus.
    pub ledger_capacity: usize,
    /// Transmit queue depth per bus.
    pub tx_queue_len: usize,
    /// Response queue depth per bus (one `read` caller at a time).
    pub response_queue_len: usize,
    /// Depth of the queue feeding inbound requests to the dispatcher.
    pub request_queue_len: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(500),
            tx_pace: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            seq_timeout: Duration::from_millis(1000),
            sweep_interval: Duration::from_millis(1000),
            read_timeout: Duration::from_millis(1000),
            lock_timeout: Duration::from_millis(1000),
            max_retries: 5,
            ledger_capacity: MAX_SEQ_QUEUE,
            tx_queue_len: 10,
            response_queue_len: 2,
            request_queue_len: 5,
        }
    }
}

impl Timing {
    /// Timing suited to in-memory tests: no pacing and short waits.
    pub fn fast() -> Self {
        Self {
            retry_delay: Duration::from_millis(1),
            tx_pace: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            seq_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_millis(50),
            read_timeout: Duration::from_millis(500),
            lock_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }

    pub(crate) fn seq_timeout_ms(&self) -> u32 {
        u32::try_from(self.seq_timeout.as_millis()).unwrap_or(u32::MAX)
    }

    /// Bound on the `read` lock: the read timeout plus a small margin.
    pub(crate) fn read_lock_timeout(&self) -> Duration {
        self.read_timeout + Duration::from_millis(10)
    }
}
