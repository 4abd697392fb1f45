use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::registry::MAX_DSI_CNT;

/// Number of TE sources the display controller can take
pub const MAX_TE_FROM: u32 = 2;

/// Per-instance host options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DsimOptions {
    pub id: u32,
    /// Data lanes wired to the panel
    pub lanes: u32,

    // Command watchdog
    pub write_timeout_ms: u64,
    pub read_timeout_ms: u64,

    // TE routing for hardware-triggered (command mode) panels
    pub te_from: Option<u32>,
    pub te_gpio: Option<u32>,

    /// Log level applied by `init_logger` users
    pub log_level: String,
}

impl Default for DsimOptions {
    fn default() -> Self {
        Self {
            id: 0,
            lanes: 4,
            write_timeout_ms: 50,
            read_timeout_ms: 100,
            te_from: None,
            te_gpio: None,
            log_level: "info".to_string(),
        }
    }
}

impl DsimOptions {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// A TE source is routed, so hardware triggered modes can run
    pub fn has_te_config(&self) -> bool {
        matches!((self.te_from, self.te_gpio), (Some(from), Some(_)) if from < MAX_TE_FROM)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id as usize >= MAX_DSI_CNT {
            bail!("wrong dsim id({})", self.id);
        }
        if self.lanes == 0 || self.lanes > 4 {
            bail!("wrong data lane count({})", self.lanes);
        }
        if self.write_timeout_ms == 0 || self.read_timeout_ms == 0 {
            bail!("command timeouts must be non-zero");
        }
        Ok(())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let options: DsimOptions = serde_json::from_slice(bytes).context("failed to parse dsim options")?;
        options.validate()?;
        Ok(options)
    }
}

/// Load options from `path`, falling back to defaults when the file is
/// missing or invalid
pub fn load_or_default<P: AsRef<Path>>(path: P) -> DsimOptions {
    let path = path.as_ref();
    match std::fs::read(path)
        .with_context(|| format!("reading {}", path.display()))
        .and_then(|bytes| DsimOptions::from_json(&bytes))
    {
        Ok(options) => {
            log::info!("Loaded dsim options from {}", path.display());
            options
        }
        Err(e) => {
            log::warn!("Failed to load dsim options: {:?}, using defaults", e);
            DsimOptions::default()
        }
    }
}
