/// Display mode to clock mode selection and the atomic mode set
use dsim_core::{calc_underrun, DisplayMode, DsimConfig, ModeError, PllParameter, PllParams};

use super::{Dsim, TransportState};
use crate::{dsim_debug, dsim_err, dsim_warn};

/// Result of validating a mode set request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeCheck {
    /// The switch can happen without a full reconfiguration
    pub seamless: bool,
    /// TE routing for hardware triggered modes
    pub te_from: Option<u32>,
    pub te_gpio: Option<u32>,
}

/// Index of the clock mode for `name`. Entry names match as prefixes; an
/// exact match wins over any earlier prefix match.
pub(crate) fn find_clock_mode(params: &PllParams, name: &str) -> Option<usize> {
    let mut fallback = None;

    for (idx, param) in params.params.iter().enumerate() {
        if !name.starts_with(param.name.as_str()) {
            continue;
        }
        if param.name.len() == name.len() {
            return Some(idx);
        }
        fallback.get_or_insert(idx);
    }

    fallback
}

/// Copy the clock mode into `config`, deriving the LP underrun count when
/// the entry does not carry one
pub(crate) fn update_clock_config(id: u32, config: &mut DsimConfig, param: &PllParameter) -> Result<(), ModeError> {
    config.apply_pll_param(param);

    config.cmd_underrun_cnt = if param.cmd_underrun_cnt != 0 {
        param.cmd_underrun_cnt
    } else {
        calc_underrun(config, param.pll_freq).map_err(|e| {
            dsim_err!(id, "failed to calculate underrun for {}: {}", param.name, e);
            e
        })?
    };

    dsim_debug!(
        id,
        "clock mode {}: hs {} MHz esc {} MHz underrun {}",
        param.name,
        config.hs_clk,
        config.esc_clk,
        config.cmd_underrun_cnt
    );
    Ok(())
}

impl Dsim {
    /// Clock mode configured for display mode `name`
    pub fn get_clock_mode(&self, name: &str) -> Result<PllParameter, ModeError> {
        let state = self.lock_state();
        state
            .pll_params
            .as_ref()
            .and_then(|params| find_clock_mode(params, name).map(|idx| params.params[idx].clone()))
            .ok_or_else(|| ModeError::NotFound(name.to_string()))
    }

    pub fn mode_valid(&self, mode: &DisplayMode) -> Result<(), ModeError> {
        self.get_clock_mode(&mode.name).map(|_| ()).map_err(|e| {
            dsim_debug!(self.id(), "failed to find clock mode for {}", mode.name);
            e
        })
    }

    /// Switch to `mode`. On error the previous configuration stays active.
    pub fn configure_mode(&self, mode: &DisplayMode) -> Result<(), ModeError> {
        if mode.dsc.enabled && mode.dsc.slice_count == 0 {
            return Err(ModeError::InvalidConfig(format!("mode {} has DSC without slices", mode.name)));
        }

        let mut state = self.lock_state();
        let (idx, param) = {
            let params = state
                .pll_params
                .as_ref()
                .ok_or_else(|| ModeError::NotFound(mode.name.clone()))?;
            let idx = find_clock_mode(params, &mode.name).ok_or_else(|| {
                dsim_err!(self.id(), "no clock mode for {}", mode.name);
                ModeError::NotFound(mode.name.clone())
            })?;
            (idx, params.params[idx].clone())
        };

        let mut config = state.config.clone();
        config.data_lane_cnt = self.options().lanes;
        config.update_for_mode(mode);
        update_clock_config(self.id(), &mut config, &param)?;

        state.config = config;
        state.current_pll = Some(idx);
        state.hw_trigger = !mode.sw_trigger;
        self.set_video_mode(state.config.mode);

        if self.state() == TransportState::HsClkEn {
            self.regs().set_vrr_config(&state.config);
        }

        dsim_debug!(self.id(), "mode set to {} (clock mode {})", mode.name, param.name);
        Ok(())
    }

    /// `mode` can be entered without reprogramming the link
    pub fn mode_is_seamless(&self, mode: &DisplayMode) -> bool {
        let state = self.lock_state();
        let Some(params) = state.pll_params.as_ref() else {
            return false;
        };

        if find_clock_mode(params, &mode.name) != state.current_pll {
            dsim_debug!(self.id(), "clock mode change not allowed seamlessly");
            return false;
        }

        let mut next = state.config.clone();
        next.update_for_mode(mode);

        if next.mode != state.config.mode {
            dsim_debug!(self.id(), "op mode change not allowed seamlessly");
            return false;
        }
        if next.dsc != state.config.dsc {
            dsim_debug!(self.id(), "dsc config change not allowed seamlessly");
            return false;
        }
        true
    }

    /// Validate a mode set before committing it
    pub fn atomic_check(&self, mode: &DisplayMode, seamless_requested: bool) -> Result<ModeCheck, ModeError> {
        let mut seamless = seamless_requested;
        if seamless && !self.mode_is_seamless(mode) {
            dsim_warn!(self.id(), "seamless not supported for {}", mode.name);
            seamless = false;
        }

        let options = self.options();
        if !mode.sw_trigger && !options.has_te_config() {
            dsim_err!(self.id(), "invalid TE config for hw trigger mode");
            return Err(ModeError::InvalidConfig("hw trigger mode without a TE source".to_string()));
        }

        Ok(ModeCheck {
            seamless,
            te_from: options.te_from,
            te_gpio: options.te_gpio,
        })
    }
}
