/// Mode table and D-PHY diagnostic descriptions loaded from JSON
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::timing::{PllFeatures, PllParameter, PllParams};

/// PLL limits as written in the mode table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct FeaturesEntry {
    pub pll_input: u64,
    pub pll_optimum: u64,
    pub pll_out_range: [u64; 2],
    pub pll_vco_range: [u64; 2],
    pub p_range: [u32; 2],
    pub m_range: [u32; 2],
    pub s_range: [u32; 2],
    pub k_bits: u32,
}

impl From<&FeaturesEntry> for PllFeatures {
    fn from(e: &FeaturesEntry) -> Self {
        PllFeatures {
            finput: e.pll_input,
            foptimum: e.pll_optimum,
            fout_min: e.pll_out_range[0],
            fout_max: e.pll_out_range[1],
            fvco_min: e.pll_vco_range[0],
            fvco_max: e.pll_vco_range[1],
            p_min: e.p_range[0],
            p_max: e.p_range[1],
            m_min: e.m_range[0],
            m_max: e.m_range[1],
            s_min: e.s_range[0],
            s_max: e.s_range[1],
            k_bits: e.k_bits,
        }
    }
}

/// One clock point of the mode table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ModeEntry {
    pub mode_name: String,
    pub pmsk: Vec<u32>,
    #[serde(default)]
    pub hs_clk: u32,
    #[serde(default)]
    pub esc_clk: u32,
    #[serde(default, rename = "cmd_underrun_cnt")]
    pub cmd_underrun_cnt: u32,
}

/// Register block a D-PHY diagnostic item lives in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DiagRegBase {
    Dphy,
    DphyExtra,
}

/// D-PHY diagnostic item as written in the configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DiagEntry {
    pub diag_name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub help: String,
    pub reg_base: DiagRegBase,
    pub reg_offset: Vec<u16>,
    pub bit_range: [u8; 2],
    #[serde(default, rename = "read_only")]
    pub read_only: bool,
}

/// Whole mode table document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ModeTable {
    #[serde(default)]
    pub features: Option<FeaturesEntry>,
    #[serde(default, rename = "dsim-modes")]
    pub modes: Vec<serde_json::Value>,
    #[serde(default, rename = "dphy-diags")]
    pub diags: Vec<DiagEntry>,
}

impl ModeTable {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("failed to parse mode table")
    }

    /// Build the PLL table. Entries that fail to parse or carry a PMSK list
    /// of the wrong length are skipped; a table left with no modes is an
    /// error.
    pub fn pll_params(&self) -> Result<PllParams> {
        let mut params = Vec::with_capacity(self.modes.len());

        for (index, raw) in self.modes.iter().enumerate() {
            let entry: ModeEntry = match serde_json::from_value(raw.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("skipping mode entry {}: {}", index, e);
                    continue;
                }
            };

            match PllParameter::from_pmsk(
                &entry.mode_name,
                &entry.pmsk,
                entry.hs_clk,
                entry.esc_clk,
                entry.cmd_underrun_cnt,
            ) {
                Ok(param) => params.push(param),
                Err(e) => log::warn!("skipping mode entry {}: {}", index, e),
            }
        }

        if params.is_empty() {
            bail!("no modes specified");
        }

        let features = self.features.as_ref().map(PllFeatures::from);
        match &features {
            Some(f) => log::debug!(
                "pll limits: p({}, {}), m({}, {}), s({}, {}), k({})",
                f.p_min,
                f.p_max,
                f.m_min,
                f.m_max,
                f.s_min,
                f.s_max,
                f.k_bits
            ),
            None => log::info!("no pll features, hs clock override unavailable"),
        }

        Ok(PllParams { params, features })
    }
}

/// Parse a mode table document into the PLL table
pub fn load_pll_params(bytes: &[u8]) -> Result<PllParams> {
    ModeTable::from_json(bytes)?.pll_params()
}

pub fn load_mode_table<P: AsRef<Path>>(path: P) -> Result<ModeTable> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    ModeTable::from_json(&bytes)
}
