/// Interfaces to the parts of the display stack the DSIM core does not own
use std::sync::Arc;

use anyhow::Result;

use crate::diagnostics::RegisterDump;

/// D-PHY power control
pub trait Phy: Send + Sync {
    fn power_on(&self) -> Result<()>;
    fn power_off(&self) -> Result<()>;
}

/// Power-reference hold of the display controller. Calls are paired.
pub trait Hibernation: Send + Sync {
    fn block_exit(&self);
    fn unblock(&self);
}

/// Opaque notifications for the display event log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsimEvent {
    Enabled,
    Disabled,
    EnterUlps,
    ExitUlps,
    Command { data_id: u8, d0: u8 },
    FrameDone,
    Underrun,
    RxCrc,
    RxEcc,
}

pub trait EventLog: Send + Sync {
    fn log(&self, event: DsimEvent);
}

/// Vblank notifier of the attached CRTC
pub trait FrameClock: Send + Sync {
    fn handle_vblank(&self);
}

/// Receives register dumps taken on protocol failures
pub trait DumpHook: Send + Sync {
    fn dump(&self, dump: &RegisterDump);
}

/// External collaborators of one DSIM instance. Missing ones are skipped.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub phy: Option<Arc<dyn Phy>>,
    pub hibernation: Option<Arc<dyn Hibernation>>,
    pub event_log: Option<Arc<dyn EventLog>>,
    pub frame_clock: Option<Arc<dyn FrameClock>>,
    pub dump_hook: Option<Arc<dyn DumpHook>>,
}

impl Collaborators {
    pub(crate) fn log_event(&self, event: DsimEvent) {
        if let Some(log) = &self.event_log {
            log.log(event);
        }
    }
}

/// Holds the hibernation block for the lifetime of one transfer
pub(crate) struct HibernationGuard<'a> {
    hibernation: Option<&'a dyn Hibernation>,
}

impl<'a> HibernationGuard<'a> {
    pub(crate) fn new(hibernation: Option<&'a Arc<dyn Hibernation>>) -> Self {
        let hibernation = hibernation.map(|h| h.as_ref());
        if let Some(h) = hibernation {
            h.block_exit();
        }
        Self { hibernation }
    }
}

impl Drop for HibernationGuard<'_> {
    fn drop(&mut self) {
        if let Some(h) = self.hibernation {
            h.unblock();
        }
    }
}
