/// DSIM host instance: link power states, clock reprogramming and BIST
///
/// Locking: the state lock serialises configuration and power changes, the
/// command lock serialises one FIFO transaction, and `slock` is held by the
/// interrupt handler. Lock order is state then command; the interrupt path
/// takes neither.
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::Result;

use dsim_core::config::ModeTable;
use dsim_core::{calc_pmsk, calc_underrun, ClockError, DsimConfig, OpMode, PllParams};

use crate::config::DsimOptions;
use crate::diagnostics::{Diagnostics, RegisterDump};
use crate::metrics::DsimMetrics;
use crate::{dsim_debug, dsim_err, dsim_info};

mod clock_mode;
mod completion;
pub mod diag;
mod error;
mod irq;
pub mod platform;
pub mod regs;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod timer;
mod transport;

pub use clock_mode::ModeCheck;
pub use diag::{DiagValues, DphyDiag};
pub use error::TransportError;
pub use irq::{IrqHandle, IrqReturn};
pub use platform::{Collaborators, DsimEvent};
pub use transport::DsiMessage;

use completion::Completion;
use diag::parse_diags;
use platform::HibernationGuard;
use regs::{RegisterBus, Regs, LINK_CTRL_STOP_MASK};
use timer::CmdTimer;

/// Link power state of one DSIM instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// Link and PHY off
    Suspended = 0,
    /// High speed clock running, commands accepted
    HsClkEn = 1,
    /// Ultra low power state, PLL settings retained
    Ulps = 2,
}

impl TransportState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TransportState::HsClkEn,
            2 => TransportState::Ulps,
            _ => TransportState::Suspended,
        }
    }
}

/// Built-in self test patterns. `Off` stops the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BistMode {
    #[default]
    Off,
    ColorBar,
    GrayGradient,
    UserDefined,
    Prbs7,
}

impl BistMode {
    pub fn as_u32(self) -> u32 {
        match self {
            BistMode::Off => 0,
            BistMode::ColorBar => 1,
            BistMode::GrayGradient => 2,
            BistMode::UserDefined => 3,
            BistMode::Prbs7 => 4,
        }
    }

    /// Register encoding of the pattern
    fn pattern(self) -> u32 {
        self.as_u32().saturating_sub(1)
    }
}

impl TryFrom<u32> for BistMode {
    type Error = TransportError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(BistMode::Off),
            1 => Ok(BistMode::ColorBar),
            2 => Ok(BistMode::GrayGradient),
            3 => Ok(BistMode::UserDefined),
            4 => Ok(BistMode::Prbs7),
            _ => Err(TransportError::InvalidArgument(format!("invalid bist mode {}", v))),
        }
    }
}

/// Configuration owned by the state lock
pub(crate) struct DsimState {
    pub(crate) config: DsimConfig,
    pub(crate) pll_params: Option<PllParams>,
    /// Index into `pll_params` of the active clock mode
    pub(crate) current_pll: Option<usize>,
    pub(crate) hw_trigger: bool,
    pub(crate) bist_mode: BistMode,
    pub(crate) diags: Vec<DphyDiag>,
}

pub(crate) struct DsimInner {
    id: u32,
    options: DsimOptions,
    bus: Arc<dyn RegisterBus>,
    collab: Collaborators,

    state: Mutex<DsimState>,
    cmd_lock: Mutex<()>,
    transport_state: AtomicU8,

    // interrupt side
    slock: Mutex<()>,
    irq_enabled: AtomicBool,
    video_mode: AtomicBool,

    ph_wr_comp: Completion,
    rd_comp: Completion,
    cmd_timer: CmdTimer,

    metrics: DsimMetrics,
    diagnostics: Diagnostics,
}

/// Handle to one DSIM host controller. Clones share the instance.
#[derive(Clone)]
pub struct Dsim {
    inner: Arc<DsimInner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dsim {
    pub fn new(options: DsimOptions, bus: Arc<dyn RegisterBus>, collab: Collaborators) -> Result<Self> {
        options.validate()?;
        let id = options.id;

        let config = DsimConfig { data_lane_cnt: options.lanes, ..DsimConfig::default() };

        let inner = Arc::new_cyclic(|weak: &Weak<DsimInner>| {
            let cmd_timer = CmdTimer::new(&format!("dsim{}-cmd", id));
            let weak = weak.clone();
            cmd_timer.set_callback(move || {
                if let Some(inner) = weak.upgrade() {
                    Dsim { inner }.cmd_fail_detector();
                }
            });

            DsimInner {
                id,
                options,
                bus,
                collab,
                state: Mutex::new(DsimState {
                    config,
                    pll_params: None,
                    current_pll: None,
                    hw_trigger: true,
                    bist_mode: BistMode::Off,
                    diags: Vec::new(),
                }),
                cmd_lock: Mutex::new(()),
                transport_state: AtomicU8::new(TransportState::Suspended as u8),
                slock: Mutex::new(()),
                irq_enabled: AtomicBool::new(false),
                video_mode: AtomicBool::new(false),
                ph_wr_comp: Completion::new(),
                rd_comp: Completion::new(),
                cmd_timer,
                metrics: DsimMetrics::new(),
                diagnostics: Diagnostics::new(id),
            }
        });

        dsim_info!(id, "created ({} lanes)", inner.options.lanes);
        Ok(Self { inner })
    }

    /// Install the clock table and D-PHY diagnostic items of `table`
    pub fn load_mode_table(&self, table: &ModeTable) -> Result<()> {
        let params = table.pll_params()?;
        let diags = parse_diags(&table.diags);
        dsim_info!(self.id(), "{} clock modes, {} diag items", params.num_modes(), diags.len());

        let mut state = self.lock_state();
        state.pll_params = Some(params);
        state.current_pll = None;
        state.diags = diags;
        Ok(())
    }

    pub fn set_pll_params(&self, params: PllParams) {
        let mut state = self.lock_state();
        state.pll_params = Some(params);
        state.current_pll = None;
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn options(&self) -> &DsimOptions {
        &self.inner.options
    }

    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.inner.transport_state.load(Ordering::Acquire))
    }

    /// Copy of the active host configuration
    pub fn config(&self) -> DsimConfig {
        self.lock_state().config.clone()
    }

    pub fn metrics(&self) -> &DsimMetrics {
        &self.inner.metrics
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DsimState> {
        lock(&self.inner.state)
    }

    pub(crate) fn lock_cmd(&self) -> MutexGuard<'_, ()> {
        lock(&self.inner.cmd_lock)
    }

    pub(crate) fn regs(&self) -> Regs<'_> {
        Regs::new(self.inner.bus.as_ref())
    }

    fn set_state(&self, state: TransportState) {
        self.inner.transport_state.store(state as u8, Ordering::Release);
    }

    fn enable_irq(&self) {
        self.inner.irq_enabled.store(true, Ordering::Release);
    }

    /// Mask the interrupt line and wait for a running handler to finish
    fn disable_irq(&self) {
        self.inner.irq_enabled.store(false, Ordering::Release);
        drop(lock(&self.inner.slock));
    }

    fn phy_power(&self, on: bool) -> Result<(), TransportError> {
        let Some(phy) = &self.inner.collab.phy else {
            return Ok(());
        };
        let res = if on { phy.power_on() } else { phy.power_off() };
        res.map_err(|e| {
            dsim_err!(self.id(), "phy power {} failed: {:?}", if on { "on" } else { "off" }, e);
            TransportError::Power(e.to_string())
        })
    }

    /// Program the link for `state`, then reapply diag overrides and BIST
    fn reg_init(&self, state: &DsimState, pll_reprogram: bool) {
        let regs = self.regs();
        regs.init(&state.config, state.hw_trigger, pll_reprogram);
        diag::apply_overrides(&regs, &state.diags);
        if state.bist_mode != BistMode::Off {
            regs.set_bist(true, state.bist_mode.pattern());
        }
    }

    /// Power up the PHY and bring the link to high speed clock mode
    pub fn enable(&self) -> Result<(), TransportError> {
        let state = self.lock_state();
        if self.state() == TransportState::HsClkEn {
            dsim_info!(self.id(), "already enabled({:?})", self.state());
            return Ok(());
        }
        if state.current_pll.is_none() {
            dsim_err!(self.id(), "enable without a clock mode");
            return Err(ClockError::NotConfigured.into());
        }

        self.phy_power(true)?;
        self.reg_init(&state, true);
        self.regs().start();
        self.set_state(TransportState::HsClkEn);
        self.enable_irq();
        drop(state);

        self.inner.collab.log_event(DsimEvent::Enabled);
        dsim_info!(self.id(), "enabled");
        Ok(())
    }

    /// Stop the link and power down the PHY
    pub fn disable(&self) -> Result<(), TransportError> {
        let state = self.lock_state();
        if self.state() == TransportState::Suspended {
            dsim_info!(self.id(), "already disabled({:?})", self.state());
            return Ok(());
        }

        self.regs().stop(LINK_CTRL_STOP_MASK);
        self.disable_irq();

        {
            let _cmd = self.lock_cmd();
            self.inner.cmd_timer.stop();
            self.set_state(TransportState::Suspended);
        }
        drop(state);

        let res = self.phy_power(false);
        self.inner.collab.log_event(DsimEvent::Disabled);
        dsim_info!(self.id(), "disabled");
        res
    }

    /// Park the lanes in ULPS. Only valid from high speed clock mode.
    pub fn enter_ulps(&self) -> Result<(), TransportError> {
        let _state = self.lock_state();
        if self.state() != TransportState::HsClkEn {
            dsim_debug!(self.id(), "enter_ulps ignored in {:?}", self.state());
            return Ok(());
        }

        {
            let _cmd = self.lock_cmd();
            self.set_state(TransportState::Ulps);
        }

        self.disable_irq();
        self.regs().stop_and_enter_ulps(LINK_CTRL_STOP_MASK);
        let res = self.phy_power(false);
        self.inner.collab.log_event(DsimEvent::EnterUlps);
        dsim_debug!(self.id(), "entered ulps");
        res
    }

    /// Wake the lanes from ULPS, reusing the programmed PLL
    pub fn exit_ulps(&self) -> Result<(), TransportError> {
        let state = self.lock_state();
        if self.state() != TransportState::Ulps {
            dsim_debug!(self.id(), "exit_ulps ignored in {:?}", self.state());
            return Ok(());
        }

        self.phy_power(true)?;
        self.reg_init(&state, false);
        self.regs().exit_ulps_and_start(LINK_CTRL_STOP_MASK);
        self.set_state(TransportState::HsClkEn);
        self.enable_irq();
        drop(state);

        self.inner.collab.log_event(DsimEvent::ExitUlps);
        dsim_debug!(self.id(), "exited ulps");
        Ok(())
    }

    /// Reprogram a running link with the current configuration.
    /// The caller holds the state lock.
    pub(crate) fn restart(&self, state: &DsimState) {
        let _cmd = self.lock_cmd();
        let regs = self.regs();

        regs.stop(LINK_CTRL_STOP_MASK);
        self.disable_irq();
        self.reg_init(state, true);
        regs.start();
        self.enable_irq();
        dsim_debug!(self.id(), "restarted at {} MHz", state.config.hs_clk);
    }

    /// Active HS clock in MHz
    pub fn hs_clock(&self) -> u32 {
        self.lock_state().config.hs_clk
    }

    /// Override the HS clock of the active clock mode. The new dividers are
    /// solved from the PLL features and take effect immediately when the
    /// link is up.
    pub fn set_high_speed_clock(&self, hs_clock_mhz: u32) -> Result<(), ClockError> {
        let mut state = self.lock_state();
        let features = state
            .pll_params
            .as_ref()
            .and_then(|p| p.features)
            .ok_or(ClockError::NoDevice)?;

        let pms = calc_pmsk(&features, hs_clock_mhz).map_err(|e| {
            dsim_err!(self.id(), "failed to update pll for {} MHz: {}", hs_clock_mhz, e);
            e
        })?;
        let idx = state.current_pll.ok_or(ClockError::NotConfigured)?;
        let underrun = calc_underrun(&state.config, hs_clock_mhz)?;

        let param = {
            let params = state.pll_params.as_mut().ok_or(ClockError::NoDevice)?;
            let param = params.params.get_mut(idx).ok_or(ClockError::NotConfigured)?;
            param.pll_freq = hs_clock_mhz;
            param.pms.p = pms.p;
            param.pms.m = pms.m;
            param.pms.s = pms.s;
            param.pms.k = pms.k;
            param.cmd_underrun_cnt = underrun;
            param.clone()
        };

        state.config.apply_pll_param(&param);
        state.config.cmd_underrun_cnt = underrun;
        dsim_info!(
            self.id(),
            "hs clock {} MHz: p {} m {} s {} k {} underrun {}",
            hs_clock_mhz,
            pms.p,
            pms.m,
            pms.s,
            pms.k,
            underrun
        );

        if self.state() == TransportState::HsClkEn {
            self.restart(&state);
        }
        Ok(())
    }

    pub fn bist_mode(&self) -> BistMode {
        self.lock_state().bist_mode
    }

    /// Select a self test pattern (0 stops it). Starting a pattern powers
    /// the link up; stopping one powers it back down.
    pub fn set_bist_mode(&self, mode: u32) -> Result<(), TransportError> {
        let mode = BistMode::try_from(mode)?;
        let enable = mode != BistMode::Off;

        if enable && self.state() == TransportState::Suspended {
            self.enable()?;
        }

        {
            let mut state = self.lock_state();
            if self.state() != TransportState::Suspended {
                self.regs().set_bist(enable, mode.pattern());
            }
            state.bist_mode = mode;
        }

        if !enable && self.state() == TransportState::HsClkEn {
            self.disable()?;
        }
        dsim_info!(self.id(), "bist mode {:?}", mode);
        Ok(())
    }

    /// Snapshot the link registers and hand them to the dump hook
    pub fn dump(&self, reason: &str) {
        let dump = RegisterDump {
            id: self.id(),
            reason: reason.to_string(),
            regs: self.regs().dump(),
        };
        if let Some(hook) = &self.inner.collab.dump_hook {
            hook.dump(&dump);
        }
        self.inner.diagnostics.record_dump(dump);
    }

    /// Apply a caller supplied transfer under a hibernation hold
    pub fn transfer(&self, msg: &DsiMessage<'_>) -> Result<Vec<u8>, TransportError> {
        let _hold = HibernationGuard::new(self.inner.collab.hibernation.as_ref());
        self.transfer_locked(msg)
    }

    fn is_video_mode(&self) -> bool {
        self.inner.video_mode.load(Ordering::Acquire)
    }

    fn set_video_mode(&self, mode: OpMode) {
        self.inner.video_mode.store(mode == OpMode::Video, Ordering::Release);
    }
}
