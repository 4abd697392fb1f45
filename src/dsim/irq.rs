/// Interrupt dispatch and the command watchdog
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use super::platform::DsimEvent;
use super::regs::{
    INTSRC_ERR_RX_ECC, INTSRC_FRAME_DONE, INTSRC_RX_CRC, INTSRC_RX_DATA_DONE, INTSRC_SFR_PH_FIFO_EMPTY,
    INTSRC_UNDER_RUN, INTSRC_VT_STATUS,
};
use super::{lock, Dsim, DsimInner, TransportState};
use crate::{dsim_debug, dsim_err, dsim_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The line was masked or the instance is gone
    None,
    Handled,
}

/// Entry point for the interrupt line of one instance. Does not keep the
/// instance alive.
#[derive(Clone)]
pub struct IrqHandle {
    inner: Weak<DsimInner>,
}

impl IrqHandle {
    pub fn fire(&self) -> IrqReturn {
        match self.inner.upgrade() {
            Some(inner) => Dsim { inner }.handle_irq(),
            None => IrqReturn::None,
        }
    }
}

impl Dsim {
    pub fn irq_handle(&self) -> IrqHandle {
        IrqHandle { inner: Arc::downgrade(&self.inner) }
    }

    pub fn handle_irq(&self) -> IrqReturn {
        let inner = &self.inner;
        let _slock = lock(&inner.slock);

        if !inner.irq_enabled.load(Ordering::Acquire) {
            inner.metrics.add_spurious_irq();
            return IrqReturn::None;
        }

        let state = self.state();
        if state != TransportState::HsClkEn {
            dsim_info!(self.id(), "dsim power is off state({:?})", state);
            inner.metrics.add_spurious_irq();
            return IrqReturn::Handled;
        }

        let regs = self.regs();
        let int_src = regs.get_int_and_clear();

        if int_src & INTSRC_SFR_PH_FIFO_EMPTY != 0 {
            inner.cmd_timer.stop();
            inner.ph_wr_comp.complete();
            dsim_debug!(self.id(), "PH_FIFO_EMPTY irq occurs");
        }
        if int_src & INTSRC_RX_DATA_DONE != 0 {
            inner.rd_comp.complete();
        }
        if int_src & INTSRC_FRAME_DONE != 0 {
            inner.collab.log_event(DsimEvent::FrameDone);
            inner.metrics.add_frame_done();
        }
        if int_src & INTSRC_RX_CRC != 0 {
            dsim_err!(self.id(), "RX CRC error was detected!");
            inner.collab.log_event(DsimEvent::RxCrc);
            inner.metrics.add_rx_crc();
        }
        if int_src & INTSRC_ERR_RX_ECC != 0 {
            dsim_err!(self.id(), "RX ECC Multibit error was detected!");
            inner.collab.log_event(DsimEvent::RxEcc);
            inner.metrics.add_rx_ecc();
        }
        if int_src & INTSRC_UNDER_RUN != 0 {
            dsim_info!(self.id(), "dsim underrun irq occurs");
            inner.collab.log_event(DsimEvent::Underrun);
            inner.metrics.add_underrun();
        }
        if int_src & INTSRC_VT_STATUS != 0 && self.is_video_mode() {
            if let Some(clock) = &inner.collab.frame_clock {
                clock.handle_vblank();
            }
        }

        IrqReturn::Handled
    }

    /// Watchdog expiry: recover a completion the interrupt never delivered
    pub(crate) fn cmd_fail_detector(&self) {
        dsim_debug!(self.id(), "cmd_fail_detector +");

        let state = self.state();
        if state != TransportState::HsClkEn {
            dsim_err!(self.id(), "DSIM is not ready. state({:?})", state);
            return;
        }

        let regs = self.regs();
        if !self.inner.cmd_timer.is_active() && regs.header_fifo_is_empty() {
            self.inner.ph_wr_comp.reinit();
            regs.clear_int(INTSRC_SFR_PH_FIFO_EMPTY);
            self.inner.metrics.add_watchdog_recovery();
            dsim_info!(self.id(), "PH_FIFO_EMPTY cleared by watchdog");
        }

        dsim_debug!(self.id(), "cmd_fail_detector -");
    }
}
