/// Register/timing model shared by the solver, the selector and the transport
use serde::{Deserialize, Serialize};

use crate::error::ModeError;

/// TE idle time used when a mode carries no underrun parameters
pub const DEFAULT_TE_IDLE_US: u32 = 1000;
/// TE variation (percent) used when a mode carries no underrun parameters
pub const DEFAULT_TE_VARIATION: u32 = 1;

/// Hardware limits of one PHY PLL. Frequencies are in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PllFeatures {
    pub finput: u64,
    pub foptimum: u64,
    pub fout_min: u64,
    pub fout_max: u64,
    pub fvco_min: u64,
    pub fvco_max: u64,
    pub p_min: u32,
    pub p_max: u32,
    pub m_min: u32,
    pub m_max: u32,
    pub s_min: u32,
    pub s_max: u32,
    pub k_bits: u32,
}

/// PLL divider set as programmed into the D-PHY
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pms {
    pub p: u32,
    pub m: u32,
    pub s: u32,
    pub k: u32,
    // Fractional compensation / loop filter fields, only set by 14-value tables
    pub mfr: u32,
    pub mrr: u32,
    pub sel_pf: u32,
    pub icp: u32,
    pub afc_enb: u32,
    pub extafc: u32,
    pub feed_en: u32,
    pub fsel: u32,
    pub fout_mask: u32,
    pub rsel: u32,
    pub dither_en: bool,
}

/// A named clock point from the mode table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PllParameter {
    pub name: String,
    pub pms: Pms,
    /// HS clock in MHz
    pub pll_freq: u32,
    /// Escape clock in MHz
    pub esc_freq: u32,
    /// LP underrun count; 0 means compute it from the panel timing
    pub cmd_underrun_cnt: u32,
}

impl PllParameter {
    /// Build an entry from a raw PMSK list. Only 4 (p, m, s, k) or 14
    /// (p, m, s, k + extended fields) values are accepted.
    pub fn from_pmsk(
        name: &str,
        pmsk: &[u32],
        pll_freq: u32,
        esc_freq: u32,
        cmd_underrun_cnt: u32,
    ) -> Result<Self, ModeError> {
        let mut pms = match pmsk {
            [p, m, s, k, ..] => Pms { p: *p, m: *m, s: *s, k: *k, ..Pms::default() },
            _ => Pms::default(),
        };

        match pmsk.len() {
            4 => {}
            14 => {
                pms.mfr = pmsk[4];
                pms.mrr = pmsk[5];
                pms.sel_pf = pmsk[6];
                pms.icp = pmsk[7];
                pms.afc_enb = pmsk[8];
                pms.extafc = pmsk[9];
                pms.feed_en = pmsk[10];
                pms.fsel = pmsk[11];
                pms.fout_mask = pmsk[12];
                pms.rsel = pmsk[13];
                pms.dither_en = true;
            }
            n => {
                return Err(ModeError::InvalidConfig(format!(
                    "mode {} has wrong pmsk elements number {}",
                    name, n
                )))
            }
        }

        Ok(Self {
            name: name.to_string(),
            pms,
            pll_freq,
            esc_freq,
            cmd_underrun_cnt,
        })
    }
}

/// Mode table of one DSIM instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PllParams {
    pub params: Vec<PllParameter>,
    pub features: Option<PllFeatures>,
}

impl PllParams {
    pub fn num_modes(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpMode {
    Video,
    #[default]
    Command,
}

/// Per-mode panel timing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelTiming {
    pub vactive: u32,
    pub vfp: u32,
    pub vbp: u32,
    pub vsa: u32,
    pub hactive: u32,
    pub hfp: u32,
    pub hbp: u32,
    pub hsa: u32,
    pub vrefresh: u32,
    pub te_idle_us: u32,
    pub te_var: u32,
}

/// DSC parameters as programmed into the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DscConfig {
    pub enabled: bool,
    pub dsc_count: u32,
    pub slice_count: u32,
    pub slice_height: u32,
    pub slice_width: u32,
}

/// DSC parameters as requested by the panel mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DscMode {
    pub enabled: bool,
    pub dsc_count: u32,
    pub slice_count: u32,
    pub slice_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderrunParam {
    pub te_idle_us: u32,
    pub te_var: u32,
}

/// A mode-set request coming from the panel layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub name: String,
    pub hactive: u32,
    pub hfp: u32,
    pub hbp: u32,
    pub hsa: u32,
    pub vactive: u32,
    pub vfp: u32,
    pub vbp: u32,
    pub vsa: u32,
    pub vrefresh: u32,
    pub op_mode: OpMode,
    /// Bits per component
    pub bpc: u32,
    #[serde(default)]
    pub dsc: DscMode,
    #[serde(default)]
    pub underrun_param: Option<UnderrunParam>,
    /// Software triggered (no TE) frame updates
    #[serde(default)]
    pub sw_trigger: bool,
}

/// Full host configuration, mutated on every mode set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DsimConfig {
    pub p_timing: PanelTiming,
    pub mode: OpMode,
    pub bpp: u32,
    pub dsc: DscConfig,
    pub data_lane_cnt: u32,
    pub dphy_pms: Pms,
    pub cmd_underrun_cnt: u32,
    /// HS clock in MHz
    pub hs_clk: u32,
    /// Escape clock in MHz
    pub esc_clk: u32,
}

impl DsimConfig {
    /// Copy the timing, op mode, bpp and DSC fields of `mode`
    pub fn update_for_mode(&mut self, mode: &DisplayMode) {
        let t = &mut self.p_timing;

        t.vactive = mode.vactive;
        t.vfp = mode.vfp;
        t.vbp = mode.vbp;
        t.vsa = mode.vsa;
        t.hactive = mode.hactive;
        t.hfp = mode.hfp;
        t.hbp = mode.hbp;
        t.hsa = mode.hsa;
        t.vrefresh = mode.vrefresh;

        match mode.underrun_param {
            Some(up) => {
                t.te_idle_us = up.te_idle_us;
                t.te_var = up.te_var;
            }
            None => {
                t.te_idle_us = DEFAULT_TE_IDLE_US;
                t.te_var = DEFAULT_TE_VARIATION;
                log::debug!("underrun_param for mode {} not specified", mode.name);
            }
        }

        self.mode = mode.op_mode;
        self.bpp = mode.bpc * 3;

        self.dsc = if mode.dsc.enabled {
            DscConfig {
                enabled: true,
                dsc_count: mode.dsc.dsc_count,
                slice_count: mode.dsc.slice_count,
                slice_height: mode.dsc.slice_height,
                slice_width: div_round_up(t.hactive, mode.dsc.slice_count),
            }
        } else {
            DscConfig::default()
        };
    }

    /// Copy the divider set and the clock pair of a table entry
    pub fn apply_pll_param(&mut self, p: &PllParameter) {
        self.dphy_pms = p.pms;
        self.hs_clk = p.pll_freq;
        self.esc_clk = p.esc_freq;
    }
}

fn div_round_up(n: u32, d: u32) -> u32 {
    if d == 0 {
        0
    } else {
        n.div_ceil(d)
    }
}
