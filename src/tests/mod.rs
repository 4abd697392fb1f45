// Scenario tests: a DSIM instance driven against the simulated register bank

mod power_tests;
mod transport_tests;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use dsim_core::config::ModeTable;
use dsim_core::{DisplayMode, DscMode, OpMode};

use crate::config::DsimOptions;
use crate::diagnostics::RegisterDump;
use crate::dsim::platform::{DumpHook, EventLog, FrameClock, Hibernation, Phy};
use crate::dsim::sim::SimBus;
use crate::dsim::{Collaborators, Dsim, DsimEvent};

/// PLL limits plus four clock modes:
/// - `1080x2400` catches any 1080x2400 mode, fixed underrun 700
/// - `1080x2400@60` 1200 MHz, underrun derived from timing (1886)
/// - `1080x2400@120` 1000 MHz, fixed underrun 500
/// - `1080x2400@60-slow` 1000 MHz, derived underrun; infeasible at 60 Hz
pub(crate) const MODE_TABLE: &str = r#"{
    "features": {
        "pll-input": 24000000,
        "pll-optimum": 8000000,
        "pll-out-range": [25000000, 2600000000],
        "pll-vco-range": [1500000000, 3000000000],
        "p-range": [1, 7],
        "m-range": [64, 1023],
        "s-range": [0, 6],
        "k-bits": 16
    },
    "dsim-modes": [
        { "mode-name": "1080x2400", "pmsk": [3, 125, 1, 0], "hs-clk": 1000, "esc-clk": 20, "cmd_underrun_cnt": 700 },
        { "mode-name": "1080x2400@60", "pmsk": [3, 150, 1, 0], "hs-clk": 1200, "esc-clk": 20 },
        { "mode-name": "1080x2400@120", "pmsk": [3, 125, 1, 0], "hs-clk": 1000, "esc-clk": 20, "cmd_underrun_cnt": 500 },
        { "mode-name": "1080x2400@60-slow", "pmsk": [3, 125, 1, 0], "hs-clk": 1000, "esc-clk": 20 }
    ],
    "dphy-diags": [
        { "diag-name": "hs_trail", "desc": "HS trail time", "reg-base": "dphy", "reg-offset": [16, 20], "bit-range": [11, 8] },
        { "diag-name": "pll_lock", "reg-base": "dphy-extra", "reg-offset": [4], "bit-range": [0, 0], "read_only": true }
    ]
}"#;

pub(crate) fn fhd_mode(name: &str) -> DisplayMode {
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

pub(crate) fn test_options() -> DsimOptions {
    DsimOptions {
        write_timeout_ms: 20,
        read_timeout_ms: 20,
        ..DsimOptions::default()
    }
}

/// Records every collaborator call
#[derive(Default)]
pub(crate) struct Recorder {
    pub events: Mutex<Vec<DsimEvent>>,
    pub dumps: AtomicUsize,
    pub vblanks: AtomicUsize,
    pub phy_on: AtomicUsize,
    pub phy_off: AtomicUsize,
    pub phy_fail: AtomicBool,
    pub hib_block: AtomicUsize,
    pub hib_unblock: AtomicUsize,
}

impl Recorder {
    pub fn events(&self) -> Vec<DsimEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl Phy for Recorder {
    fn power_on(&self) -> Result<()> {
        if self.phy_fail.load(Ordering::SeqCst) {
            bail!("phy regulator fault");
        }
        self.phy_on.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn power_off(&self) -> Result<()> {
        self.phy_off.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Hibernation for Recorder {
    fn block_exit(&self) {
        self.hib_block.fetch_add(1, Ordering::SeqCst);
    }

    fn unblock(&self) {
        self.hib_unblock.fetch_add(1, Ordering::SeqCst);
    }
}

impl EventLog for Recorder {
    fn log(&self, event: DsimEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl FrameClock for Recorder {
    fn handle_vblank(&self) {
        self.vblanks.fetch_add(1, Ordering::SeqCst);
    }
}

impl DumpHook for Recorder {
    fn dump(&self, _dump: &RegisterDump) {
        self.dumps.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct Harness {
    pub dsim: Dsim,
    pub bus: SimBus,
    pub recorder: Arc<Recorder>,
}

impl Harness {
    /// Instance with the test mode table loaded, still suspended
    pub fn new(options: DsimOptions) -> Self {
        let bus = SimBus::new();
        let recorder = Arc::new(Recorder::default());
        let collab = Collaborators {
            phy: Some(recorder.clone() as Arc<dyn Phy>),
            hibernation: Some(recorder.clone() as Arc<dyn Hibernation>),
            event_log: Some(recorder.clone() as Arc<dyn EventLog>),
            frame_clock: Some(recorder.clone() as Arc<dyn FrameClock>),
            dump_hook: Some(recorder.clone() as Arc<dyn DumpHook>),
        };

        let dsim = Dsim::new(options, Arc::new(bus.clone()), collab).unwrap();
        bus.connect_irq(dsim.irq_handle());
        dsim.load_mode_table(&ModeTable::from_json(MODE_TABLE.as_bytes()).unwrap())
            .unwrap();

        Self { dsim, bus, recorder }
    }

    /// Configured for `1080x2400@60` and enabled
    pub fn ready() -> Self {
        Self::ready_with(test_options())
    }

    pub fn ready_with(options: DsimOptions) -> Self {
        let h = Self::new(options);
        h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
        h.dsim.enable().unwrap();
        h
    }
}
