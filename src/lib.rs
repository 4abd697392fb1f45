//! Exynos DSIM - MIPI-DSI host controller core
//!
//! Command mode packet transport, link power states, clock mode selection
//! and the interrupt bridge for the Samsung Exynos DSI master. Register
//! access goes through [`dsim::regs::RegisterBus`]; platform services (PHY
//! power, hibernation hold, event log, vblank) are injected through
//! [`dsim::Collaborators`].

pub mod config;
pub mod diagnostics;
pub mod dsim;
pub mod logging;
pub mod metrics;
pub mod registry;

#[cfg(test)]
mod tests;

pub use config::DsimOptions;
pub use dsim::{BistMode, Dsim, DsiMessage, TransportError, TransportState};
pub use dsim_core::{ClockError, DisplayMode, ModeError};
pub use registry::{DsimRegistry, MAX_DSI_CNT};
