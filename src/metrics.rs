// Per-instance transport counters
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters updated from the command path and the IRQ handler
pub struct DsimMetrics {
    // Command traffic
    commands_written: AtomicU32,
    commands_read: AtomicU32,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,

    // Transfer failures
    timeouts: AtomicU32,
    protocol_errors: AtomicU32,
    residual_data: AtomicU32,
    late_fifo_drains: AtomicU32,
    watchdog_recoveries: AtomicU32,

    // Interrupt sources
    frame_done: AtomicU32,
    underruns: AtomicU32,
    rx_crc_errors: AtomicU32,
    rx_ecc_errors: AtomicU32,
    spurious_irqs: AtomicU32,

    // Timing (in microseconds)
    total_wait_us: AtomicU64,
    max_wait_us: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub commands_written: u32,
    pub commands_read: u32,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub timeouts: u32,
    pub protocol_errors: u32,
    pub residual_data: u32,
    pub late_fifo_drains: u32,
    pub watchdog_recoveries: u32,
    pub frame_done: u32,
    pub underruns: u32,
    pub rx_crc_errors: u32,
    pub rx_ecc_errors: u32,
    pub spurious_irqs: u32,
    pub total_wait_us: u64,
    pub max_wait_us: u64,
}

impl DsimMetrics {
    pub fn new() -> Self {
        Self {
            commands_written: AtomicU32::new(0),
            commands_read: AtomicU32::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            timeouts: AtomicU32::new(0),
            protocol_errors: AtomicU32::new(0),
            residual_data: AtomicU32::new(0),
            late_fifo_drains: AtomicU32::new(0),
            watchdog_recoveries: AtomicU32::new(0),
            frame_done: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
            rx_crc_errors: AtomicU32::new(0),
            rx_ecc_errors: AtomicU32::new(0),
            spurious_irqs: AtomicU32::new(0),
            total_wait_us: AtomicU64::new(0),
            max_wait_us: AtomicU64::new(0),
        }
    }

    pub fn add_write(&self, bytes: usize) {
        self.commands_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_read(&self, bytes: usize) {
        self.commands_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_residual_data(&self) {
        self.residual_data.fetch_add(1, Ordering::Relaxed);
    }

    /// Completion timed out but the FIFO had drained
    pub fn add_late_drain(&self) {
        self.late_fifo_drains.fetch_add(1, Ordering::Relaxed);
    }

    /// Watchdog cleared a PH_FIFO_EMPTY the interrupt never reported
    pub fn add_watchdog_recovery(&self) {
        self.watchdog_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_frame_done(&self) {
        self.frame_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rx_crc(&self) {
        self.rx_crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rx_ecc(&self) {
        self.rx_ecc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_spurious_irq(&self) {
        self.spurious_irqs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent blocked on a completion
    pub fn add_wait(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.total_wait_us.fetch_add(us, Ordering::Relaxed);
        self.max_wait_us.fetch_max(us, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_written: self.commands_written.load(Ordering::Relaxed),
            commands_read: self.commands_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            residual_data: self.residual_data.load(Ordering::Relaxed),
            late_fifo_drains: self.late_fifo_drains.load(Ordering::Relaxed),
            watchdog_recoveries: self.watchdog_recoveries.load(Ordering::Relaxed),
            frame_done: self.frame_done.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            rx_crc_errors: self.rx_crc_errors.load(Ordering::Relaxed),
            rx_ecc_errors: self.rx_ecc_errors.load(Ordering::Relaxed),
            spurious_irqs: self.spurious_irqs.load(Ordering::Relaxed),
            total_wait_us: self.total_wait_us.load(Ordering::Relaxed),
            max_wait_us: self.max_wait_us.load(Ordering::Relaxed),
        }
    }

    /// Log a one-line summary
    pub fn report(&self, id: u32) {
        let s = self.snapshot();
        log::info!(
            "dsim[{}] cmds w:{} r:{} | timeouts:{} proto:{} residual:{} | underrun:{} crc:{} ecc:{} | max wait {}us",
            id,
            s.commands_written,
            s.commands_read,
            s.timeouts,
            s.protocol_errors,
            s.residual_data,
            s.underruns,
            s.rx_crc_errors,
            s.rx_ecc_errors,
            s.max_wait_us
        );
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}

impl Default for DsimMetrics {
    fn default() -> Self {
        Self::new()
    }
}
