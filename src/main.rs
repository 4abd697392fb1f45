// Bring-up tool: runs a DSIM instance against the simulated register bank
//
// usage: dsim-sim <mode-table.json> [options.json] [mode-name]

use anyhow::{anyhow, Context, Result};
use log::info;
use std::sync::Arc;

use dsim_core::config::load_mode_table;
use dsim_core::packet::{DCS_READ, DCS_SHORT_WRITE};
use dsim_core::{DisplayMode, DscMode, OpMode};
use exynos_dsim::dsim::sim::SimBus;
use exynos_dsim::dsim::Collaborators;
use exynos_dsim::{config, logging, Dsim, DsimRegistry};

const DCS_SET_DISPLAY_ON: u8 = 0x29;
const DCS_GET_POWER_MODE: u8 = 0x0a;

fn demo_mode(name: &str) -> DisplayMode {
    DisplayMode {
        name: name.to_string(),
        hactive: 1080,
        hfp: 32,
        hbp: 16,
        hsa: 12,
        vactive: 2400,
        vfp: 12,
        vbp: 8,
        vsa: 4,
        vrefresh: 60,
        op_mode: OpMode::Command,
        bpc: 8,
        dsc: DscMode::default(),
        underrun_param: None,
        sw_trigger: true,
    }
}

fn main() -> Result<()> {
    logging::init_logger().map_err(|e| anyhow!("failed to initialize logger: {}", e))?;

    let mut args = std::env::args().skip(1);
    let table_path = args.next().context("missing mode table path")?;
    let options = match args.next() {
        Some(path) => config::load_or_default(path),
        None => Default::default(),
    };
    logging::set_max_level_from_str(&options.log_level);
    let mode_name = args.next().unwrap_or_else(|| "1080x2400@60".to_string());

    info!("exynos-dsim {} bring-up on simulated bus", env!("CARGO_PKG_VERSION"));

    let table = load_mode_table(&table_path)?;
    let bus = SimBus::new();
    let dsim = Dsim::new(options, Arc::new(bus.clone()), Collaborators::default())?;
    bus.connect_irq(dsim.irq_handle());
    dsim.load_mode_table(&table)?;

    let registry = DsimRegistry::new();
    registry.register(dsim.clone())?;

    dsim.configure_mode(&demo_mode(&mode_name))?;
    dsim.enable()?;
    info!("hs clock {} MHz, underrun {}", dsim.hs_clock(), dsim.config().cmd_underrun_cnt);

    dsim.write_command(Some(DCS_SHORT_WRITE), &[DCS_SET_DISPLAY_ON])?;

    // RX: DCS short read response, one byte
    bus.push_response(vec![0x0000_9c21]);
    let power_mode = dsim.read_command(DCS_READ, u16::from(DCS_GET_POWER_MODE), 1)?;
    info!("power mode {:02x?}", power_mode);

    dsim.enter_ulps()?;
    dsim.exit_ulps()?;

    dsim.metrics().report(dsim.id());
    registry.shutdown();
    Ok(())
}
