//! DSIM Core - hardware-independent logic for the Exynos MIPI-DSI host
//!
//! This crate contains the numeric and protocol logic that can be tested on
//! the host platform without any register access: PLL divider solving,
//! LP underrun budgeting, DSI packet encoding and the mode table format.

pub mod config;
pub mod error;
pub mod packet;
pub mod pll;
pub mod timing;
pub mod underrun;

pub use error::{ClockError, ModeError};
pub use pll::calc_pmsk;
pub use timing::{
    DisplayMode, DscConfig, DscMode, DsimConfig, OpMode, PanelTiming, PllFeatures, PllParameter,
    PllParams, Pms, UnderrunParam,
};
pub use underrun::calc_underrun;
