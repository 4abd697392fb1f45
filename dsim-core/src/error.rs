/// Error types for clock solving and mode selection
use std::fmt;

/// Failures of the PLL solver, the underrun calculator and the clock override
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// A derived PLL value lies outside what the PHY supports
    OutOfRange {
        what: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    /// The requested HS clock cannot move one frame inside the frame period
    InfeasibleTiming {
        max_frame_time_ns: u64,
        min_transfer_time_ns: u64,
    },
    /// No PLL feature description is available for this PHY
    NoDevice,
    /// No clock mode has been selected yet
    NotConfigured,
    /// The named register field may only be read
    ReadOnly(String),
}

impl ClockError {
    pub(crate) fn out_of_range(what: &'static str, value: u64, min: u64, max: u64) -> Self {
        ClockError::OutOfRange { what, value, min, max }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClockError::OutOfRange { .. } => "OUT_OF_RANGE",
            ClockError::InfeasibleTiming { .. } => "INFEASIBLE_TIMING",
            ClockError::NoDevice => "NO_DEVICE",
            ClockError::NotConfigured => "NOT_CONFIGURED",
            ClockError::ReadOnly(_) => "READ_ONLY",
        }
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::OutOfRange { what, value, min, max } => {
                write!(f, "{}: {} {} is out of range ({}, {})", self.as_str(), what, value, min, max)
            }
            ClockError::InfeasibleTiming { max_frame_time_ns, min_transfer_time_ns } => write!(
                f,
                "{}: max frame time {}ns < min frame transfer time {}ns",
                self.as_str(),
                max_frame_time_ns,
                min_transfer_time_ns
            ),
            ClockError::NoDevice => write!(f, "{}: no pll features available", self.as_str()),
            ClockError::NotConfigured => write!(f, "{}: no clock mode selected", self.as_str()),
            ClockError::ReadOnly(name) => write!(f, "{}: '{}' cannot be written", self.as_str(), name),
        }
    }
}

impl std::error::Error for ClockError {}

/// Failures while mapping a display mode onto a clock/timing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    /// No configured PLL entry matches the mode name
    NotFound(String),
    /// The matching entry could not be turned into a working clock setup
    Clock(ClockError),
    /// The mode table or the mode request itself is malformed
    InvalidConfig(String),
}

impl fmt::Display for ModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeError::NotFound(name) => write!(f, "NOT_FOUND: no clock mode for '{}'", name),
            ModeError::Clock(e) => write!(f, "{}", e),
            ModeError::InvalidConfig(msg) => write!(f, "INVALID_CONFIG: {}", msg),
        }
    }
}

impl std::error::Error for ModeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModeError::Clock(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClockError> for ModeError {
    fn from(e: ClockError) -> Self {
        ModeError::Clock(e)
    }
}
