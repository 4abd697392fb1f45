/// DSIM register map and low-level register sequences
///
/// Register access goes through [`RegisterBus`] so the same sequences run
/// against memory-mapped hardware or the simulated bank used in tests.
use std::time::Duration;

use dsim_core::timing::{DsimConfig, OpMode, Pms};

/// Register block a register offset belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegBlock {
    Dsim,
    Dphy,
    DphyExtra,
}

/// Word-granular register access. Each call is assumed atomic.
pub trait RegisterBus: Send + Sync {
    fn read(&self, block: RegBlock, offset: u32) -> u32;
    fn write(&self, block: RegBlock, offset: u32, value: u32);
}

// DSIM link registers
pub const DSIM_SWRST: u32 = 0x04;
pub const DSIM_LINK_STATUS: u32 = 0x08;
pub const DSIM_CLK_CTRL: u32 = 0x10;
pub const DSIM_LINK_CTRL: u32 = 0x14;
pub const DSIM_CONFIG: u32 = 0x1c;
pub const DSIM_ESCMODE: u32 = 0x20;
pub const DSIM_RESOL: u32 = 0x24;
pub const DSIM_VPORCH: u32 = 0x28;
pub const DSIM_HPORCH: u32 = 0x2c;
pub const DSIM_SYNC: u32 = 0x30;
pub const DSIM_CMD_CONFIG: u32 = 0x34;
pub const DSIM_UNDERRUN_CTRL: u32 = 0x38;
pub const DSIM_CPRS_CTRL: u32 = 0x3c;
pub const DSIM_INTSRC: u32 = 0x40;
pub const DSIM_INTMSK: u32 = 0x44;
pub const DSIM_PKTHDR: u32 = 0x48;
pub const DSIM_PAYLOAD: u32 = 0x4c;
pub const DSIM_RXFIFO: u32 = 0x50;
pub const DSIM_FIFOCTRL: u32 = 0x58;
pub const DSIM_SLICE_SIZE: u32 = 0x70;
pub const DSIM_PLLCTRL: u32 = 0x94;
pub const DSIM_PLLCTRL1: u32 = 0x98;
pub const DSIM_PLLCTRL2: u32 = 0x9c;
pub const DSIM_PLLCTRL3: u32 = 0xa0;
pub const DSIM_PLLSTAT: u32 = 0xa4;
pub const DSIM_BIST_CTRL: u32 = 0xb0;

/// Offsets captured by a register dump
pub const DUMP_OFFSETS: [u32; 22] = [
    DSIM_SWRST,
    DSIM_LINK_STATUS,
    DSIM_CLK_CTRL,
    DSIM_LINK_CTRL,
    DSIM_CONFIG,
    DSIM_ESCMODE,
    DSIM_RESOL,
    DSIM_VPORCH,
    DSIM_HPORCH,
    DSIM_SYNC,
    DSIM_CMD_CONFIG,
    DSIM_UNDERRUN_CTRL,
    DSIM_CPRS_CTRL,
    DSIM_INTSRC,
    DSIM_INTMSK,
    DSIM_FIFOCTRL,
    DSIM_SLICE_SIZE,
    DSIM_PLLCTRL,
    DSIM_PLLCTRL1,
    DSIM_PLLCTRL2,
    DSIM_PLLCTRL3,
    DSIM_PLLSTAT,
];

// DSIM_SWRST
pub const SWRST_RESET: u32 = 1 << 0;

// DSIM_LINK_STATUS
pub const LINK_STATUS_ULPS_CLK: u32 = 1 << 0;
pub const LINK_STATUS_ULPS_DAT: u32 = 1 << 1;
pub const LINK_STATUS_STOP_CLK: u32 = 1 << 2;

// DSIM_CLK_CTRL
pub const CLK_CTRL_ESC_DIV_MASK: u32 = 0xffff;
pub const CLK_CTRL_BYTE_CLK_EN: u32 = 1 << 24;
pub const CLK_CTRL_ESC_CLK_EN: u32 = 1 << 28;

// DSIM_LINK_CTRL
pub const LINK_CTRL_EN: u32 = 1 << 0;
pub const LINK_CTRL_HS_CLK_EN: u32 = 1 << 1;
/// All link/stream enables, the set cleared on stop
pub const LINK_CTRL_STOP_MASK: u32 = 0x1f;

// DSIM_CONFIG
pub const CONFIG_LANE_EN_SHIFT: u32 = 0;
pub const CONFIG_CLK_LANE_EN: u32 = 1 << 4;
pub const CONFIG_BPP_SHIFT: u32 = 8;
pub const CONFIG_VIDEO_MODE: u32 = 1 << 25;

// DSIM_ESCMODE
pub const ESCMODE_TX_ULPS_CLK: u32 = 1 << 0;
pub const ESCMODE_TX_ULPS_DAT: u32 = 1 << 1;
pub const ESCMODE_TX_ULPS_CLK_EXIT: u32 = 1 << 2;
pub const ESCMODE_TX_ULPS_DAT_EXIT: u32 = 1 << 3;

// DSIM_CMD_CONFIG
pub const CMD_CONFIG_HW_TRIGGER: u32 = 1 << 0;

// DSIM_CPRS_CTRL
pub const CPRS_CTRL_EN: u32 = 1 << 0;
pub const CPRS_CTRL_COUNT_SHIFT: u32 = 4;
pub const CPRS_CTRL_SLICE_COUNT_SHIFT: u32 = 8;

// DSIM_INTSRC / DSIM_INTMSK
pub const INTSRC_PLL_STABLE: u32 = 1 << 31;
pub const INTSRC_SW_RST_RELEASE: u32 = 1 << 30;
pub const INTSRC_SFR_PL_FIFO_EMPTY: u32 = 1 << 29;
pub const INTSRC_SFR_PH_FIFO_EMPTY: u32 = 1 << 28;
pub const INTSRC_UNDER_RUN: u32 = 1 << 25;
pub const INTSRC_FRAME_DONE: u32 = 1 << 24;
pub const INTSRC_VT_STATUS: u32 = 1 << 20;
pub const INTSRC_RX_DATA_DONE: u32 = 1 << 18;
pub const INTSRC_ERR_RX_ECC: u32 = 1 << 15;
pub const INTSRC_RX_CRC: u32 = 1 << 14;

/// Interrupt sources the handler services
pub const INT_HANDLED: u32 = INTSRC_SFR_PH_FIFO_EMPTY
    | INTSRC_UNDER_RUN
    | INTSRC_FRAME_DONE
    | INTSRC_VT_STATUS
    | INTSRC_RX_DATA_DONE
    | INTSRC_ERR_RX_ECC
    | INTSRC_RX_CRC;

// DSIM_PKTHDR
/// Bus turn-around request, set on read requests
pub const PKTHDR_BTA: u32 = 1 << 24;

// DSIM_FIFOCTRL
pub const FIFOCTRL_PH_LEVEL_MASK: u32 = 0x3f;
pub const FIFOCTRL_EMPTY_PH_SFR: u32 = 1 << 22;
pub const FIFOCTRL_EMPTY_RX: u32 = 1 << 24;

/// Header FIFO entries
pub const PH_FIFO_MAX_DEPTH: u32 = 32;
/// Header FIFO level at which further writes must wait for a drain
pub const PH_FIFO_WRITABLE_LEVEL: u32 = 30;
/// RX FIFO words
pub const RX_FIFO_MAX_DEPTH: usize = 64;
/// Header word preceding RX payload
pub const RX_PHK_HEADER_SIZE: usize = 4;

// DSIM_PLLCTRL
pub const PLLCTRL_P_SHIFT: u32 = 0;
pub const PLLCTRL_M_SHIFT: u32 = 8;
pub const PLLCTRL_S_SHIFT: u32 = 20;
pub const PLLCTRL_PLL_EN: u32 = 1 << 31;

// DSIM_PLLCTRL3
pub const PLLCTRL3_DITHER_EN: u32 = 1 << 31;

// DSIM_PLLSTAT
pub const PLLSTAT_LOCKED: u32 = 1 << 0;

// DSIM_BIST_CTRL
pub const BIST_CTRL_EN: u32 = 1 << 0;
pub const BIST_CTRL_MODE_SHIFT: u32 = 4;

/// Polls spent waiting for PLL lock or a ULPS state change
const POLL_RETRIES: u32 = 100;
const POLL_INTERVAL: Duration = Duration::from_micros(10);

/// Typed register sequences over a [`RegisterBus`]
pub struct Regs<'a> {
    bus: &'a dyn RegisterBus,
}

impl<'a> Regs<'a> {
    pub fn new(bus: &'a dyn RegisterBus) -> Self {
        Self { bus }
    }

    pub fn read(&self, offset: u32) -> u32 {
        self.bus.read(RegBlock::Dsim, offset)
    }

    pub fn write(&self, offset: u32, value: u32) {
        self.bus.write(RegBlock::Dsim, offset, value)
    }

    pub fn write_mask(&self, offset: u32, value: u32, mask: u32) {
        let old = self.read(offset);
        self.write(offset, (old & !mask) | (value & mask));
    }

    pub fn read_block(&self, block: RegBlock, offset: u32) -> u32 {
        self.bus.read(block, offset)
    }

    pub fn write_block_mask(&self, block: RegBlock, offset: u32, value: u32, mask: u32) {
        let old = self.bus.read(block, offset);
        self.bus.write(block, offset, (old & !mask) | (value & mask));
    }

    /// Read the pending interrupt sources and acknowledge them
    pub fn get_int_and_clear(&self) -> u32 {
        let src = self.read(DSIM_INTSRC);
        self.write(DSIM_INTSRC, src);
        src
    }

    pub fn clear_int(&self, bits: u32) {
        self.write(DSIM_INTSRC, bits);
    }

    /// Unmask the serviced interrupt sources
    pub fn set_int_mask(&self, enable: bool) {
        let mask = if enable { !INT_HANDLED } else { u32::MAX };
        self.write(DSIM_INTMSK, mask);
    }

    /// Queue a packet header; `bta` requests a bus turn-around after it
    pub fn wr_tx_header(&self, header: u32, bta: bool) {
        let word = if bta { header | PKTHDR_BTA } else { header };
        self.write(DSIM_PKTHDR, word);
    }

    pub fn wr_tx_payload(&self, word: u32) {
        self.write(DSIM_PAYLOAD, word);
    }

    pub fn get_rx_fifo(&self) -> u32 {
        self.read(DSIM_RXFIFO)
    }

    pub fn header_fifo_is_empty(&self) -> bool {
        self.read(DSIM_FIFOCTRL) & FIFOCTRL_EMPTY_PH_SFR != 0
    }

    pub fn rx_fifo_is_empty(&self) -> bool {
        self.read(DSIM_FIFOCTRL) & FIFOCTRL_EMPTY_RX != 0
    }

    /// The header FIFO still has room below the writable threshold
    pub fn is_writable_fifo_state(&self) -> bool {
        self.read(DSIM_FIFOCTRL) & FIFOCTRL_PH_LEVEL_MASK < PH_FIFO_WRITABLE_LEVEL
    }

    /// Program divider, clock, timing and interrupt setup for `config`.
    /// `pll_reprogram` is false when coming back from ULPS with the PLL
    /// settings retained.
    pub fn init(&self, config: &DsimConfig, hw_trigger: bool, pll_reprogram: bool) {
        self.write(DSIM_SWRST, SWRST_RESET);
        self.write(DSIM_SWRST, 0);

        if pll_reprogram {
            self.set_pll(&config.dphy_pms);
        }
        self.set_clocks(config.hs_clk, config.esc_clk);

        let lanes = config.data_lane_cnt.min(4);
        let mut cfg = ((1u32 << lanes) - 1) << CONFIG_LANE_EN_SHIFT | CONFIG_CLK_LANE_EN;
        cfg |= (config.bpp & 0x3f) << CONFIG_BPP_SHIFT;
        if config.mode == OpMode::Video {
            cfg |= CONFIG_VIDEO_MODE;
        }
        self.write(DSIM_CONFIG, cfg);
        self.write(DSIM_CMD_CONFIG, if hw_trigger { CMD_CONFIG_HW_TRIGGER } else { 0 });

        self.set_vrr_config(config);
        self.set_int_mask(true);
    }

    /// Timing, DSC and underrun registers; safe while the link runs
    pub fn set_vrr_config(&self, config: &DsimConfig) {
        let t = &config.p_timing;
        self.write(DSIM_RESOL, t.hactive | t.vactive << 16);
        self.write(DSIM_VPORCH, t.vfp | t.vbp << 16);
        self.write(DSIM_HPORCH, t.hfp | t.hbp << 16);
        self.write(DSIM_SYNC, t.hsa | t.vsa << 16);
        self.write(DSIM_UNDERRUN_CTRL, config.cmd_underrun_cnt);

        let dsc = &config.dsc;
        if dsc.enabled {
            self.write(
                DSIM_CPRS_CTRL,
                CPRS_CTRL_EN
                    | dsc.dsc_count << CPRS_CTRL_COUNT_SHIFT
                    | dsc.slice_count << CPRS_CTRL_SLICE_COUNT_SHIFT,
            );
            self.write(DSIM_SLICE_SIZE, dsc.slice_width | dsc.slice_height << 16);
        } else {
            self.write(DSIM_CPRS_CTRL, 0);
        }
    }

    fn set_pll(&self, pms: &Pms) {
        self.write(DSIM_PLLCTRL, 0);
        self.write(DSIM_PLLCTRL1, pms.k);
        if pms.dither_en {
            self.write(
                DSIM_PLLCTRL2,
                pms.mfr & 0xff | (pms.mrr & 0x3f) << 8 | (pms.sel_pf & 0x3) << 16 | (pms.icp & 0x3) << 20,
            );
            self.write(
                DSIM_PLLCTRL3,
                pms.afc_enb & 0x1
                    | (pms.extafc & 0x1f) << 1
                    | (pms.feed_en & 0x1) << 6
                    | (pms.fsel & 0x1) << 7
                    | (pms.fout_mask & 0x1) << 8
                    | (pms.rsel & 0xf) << 12
                    | PLLCTRL3_DITHER_EN,
            );
        } else {
            self.write(DSIM_PLLCTRL3, 0);
        }
        self.write(
            DSIM_PLLCTRL,
            pms.p << PLLCTRL_P_SHIFT | pms.m << PLLCTRL_M_SHIFT | pms.s << PLLCTRL_S_SHIFT | PLLCTRL_PLL_EN,
        );

        if !self.poll(DSIM_PLLSTAT, PLLSTAT_LOCKED, PLLSTAT_LOCKED) {
            log::warn!("pll did not lock (p {} m {} s {} k {})", pms.p, pms.m, pms.s, pms.k);
        }
    }

    fn set_clocks(&self, hs_clk_mhz: u32, esc_clk_mhz: u32) {
        // escape clock is derived from the byte clock
        let byte_clk = hs_clk_mhz / 8;
        let esc_div = if esc_clk_mhz == 0 { 1 } else { byte_clk.div_ceil(esc_clk_mhz).max(1) };
        self.write(
            DSIM_CLK_CTRL,
            (esc_div & CLK_CTRL_ESC_DIV_MASK) | CLK_CTRL_BYTE_CLK_EN | CLK_CTRL_ESC_CLK_EN,
        );
    }

    pub fn start(&self) {
        self.write_mask(DSIM_LINK_CTRL, LINK_CTRL_EN | LINK_CTRL_HS_CLK_EN, LINK_CTRL_STOP_MASK);
    }

    pub fn stop(&self, lanes_mask: u32) {
        self.write_mask(DSIM_LINK_CTRL, 0, lanes_mask & LINK_CTRL_STOP_MASK);
        self.set_int_mask(false);
    }

    pub fn stop_and_enter_ulps(&self, lanes_mask: u32) {
        self.stop(lanes_mask);
        self.write(DSIM_ESCMODE, ESCMODE_TX_ULPS_CLK | ESCMODE_TX_ULPS_DAT);
        let want = LINK_STATUS_ULPS_CLK | LINK_STATUS_ULPS_DAT;
        if !self.poll(DSIM_LINK_STATUS, want, want) {
            log::error!("ulps entry timeout (status 0x{:08x})", self.read(DSIM_LINK_STATUS));
        }
    }

    pub fn exit_ulps_and_start(&self, lanes_mask: u32) {
        self.write(DSIM_ESCMODE, ESCMODE_TX_ULPS_CLK_EXIT | ESCMODE_TX_ULPS_DAT_EXIT);
        let mask = LINK_STATUS_ULPS_CLK | LINK_STATUS_ULPS_DAT;
        if !self.poll(DSIM_LINK_STATUS, mask, 0) {
            log::error!("ulps exit timeout (status 0x{:08x})", self.read(DSIM_LINK_STATUS));
        }
        self.write(DSIM_ESCMODE, 0);
        self.write_mask(DSIM_LINK_CTRL, LINK_CTRL_EN | LINK_CTRL_HS_CLK_EN, lanes_mask & LINK_CTRL_STOP_MASK);
    }

    pub fn set_bist(&self, enable: bool, pattern: u32) {
        let value = if enable { BIST_CTRL_EN | pattern << BIST_CTRL_MODE_SHIFT } else { 0 };
        self.write(DSIM_BIST_CTRL, value);
    }

    pub fn dump(&self) -> Vec<(u32, u32)> {
        DUMP_OFFSETS.iter().map(|&off| (off, self.read(off))).collect()
    }

    fn poll(&self, offset: u32, mask: u32, want: u32) -> bool {
        for _ in 0..POLL_RETRIES {
            if self.read(offset) & mask == want {
                return true;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        false
    }
}
