/// Simulated DSIM register bank
///
/// Models the parts of the link the transport depends on: write-1-to-clear
/// interrupt sources, the header and RX FIFOs, PLL lock and ULPS status.
/// Queued peripheral responses are moved into the RX FIFO when a read
/// request (header with BTA) is written.
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::irq::IrqHandle;
use super::regs::*;

/// How the simulated link drains the header FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Drain and raise the interrupt from inside the register write
    Inline,
    /// Drain on a helper thread after the delay
    Delayed(Duration),
    /// Never drain
    Stuck,
    /// Drain, but the interrupt is never delivered
    DrainWithoutIrq,
}

/// A packet as it left the FIFOs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub header: u32,
    pub payload: Vec<u32>,
}

impl SentPacket {
    pub fn data_id(&self) -> u8 {
        self.header as u8
    }

    pub fn is_read_request(&self) -> bool {
        self.header & PKTHDR_BTA != 0
    }
}

struct SimState {
    bank: HashMap<(RegBlock, u32), u32>,
    intsrc: u32,
    ph_fifo: VecDeque<u32>,
    pl_fifo: Vec<u32>,
    rx_fifo: VecDeque<u32>,
    responses: VecDeque<Vec<u32>>,
    sent: Vec<SentPacket>,
    drain: DrainMode,
    writes: usize,
}

impl SimState {
    /// Empty the header FIFO and complete any read request in it
    fn drain(&mut self) {
        let had_read = self.ph_fifo.drain(..).any(|h| h & PKTHDR_BTA != 0);
        self.intsrc |= INTSRC_SFR_PH_FIFO_EMPTY;
        if had_read {
            if let Some(words) = self.responses.pop_front() {
                self.rx_fifo.extend(words);
                self.intsrc |= INTSRC_RX_DATA_DONE;
            }
        }
    }

    fn irq_pending(&self) -> bool {
        let mask = self.bank.get(&(RegBlock::Dsim, DSIM_INTMSK)).copied().unwrap_or(u32::MAX);
        self.intsrc & !mask != 0
    }

    fn fifoctrl(&self) -> u32 {
        let mut val = (self.ph_fifo.len() as u32).min(PH_FIFO_MAX_DEPTH) & FIFOCTRL_PH_LEVEL_MASK;
        if self.ph_fifo.is_empty() {
            val |= FIFOCTRL_EMPTY_PH_SFR;
        }
        if self.rx_fifo.is_empty() {
            val |= FIFOCTRL_EMPTY_RX;
        }
        val
    }
}

struct SimShared {
    state: Mutex<SimState>,
    irq: Mutex<Option<IrqHandle>>,
}

impl SimShared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver the interrupt if an unmasked source is pending. Called with
    /// the bank unlocked.
    fn raise(&self) {
        if !self.lock().irq_pending() {
            return;
        }
        let handle = self.irq.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(handle) = handle {
            handle.fire();
        }
    }
}

/// In-memory [`RegisterBus`]
#[derive(Clone)]
pub struct SimBus {
    shared: Arc<SimShared>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SimShared {
                state: Mutex::new(SimState {
                    bank: HashMap::new(),
                    intsrc: 0,
                    ph_fifo: VecDeque::new(),
                    pl_fifo: Vec::new(),
                    rx_fifo: VecDeque::new(),
                    responses: VecDeque::new(),
                    sent: Vec::new(),
                    drain: DrainMode::Inline,
                    writes: 0,
                }),
                irq: Mutex::new(None),
            }),
        }
    }

    /// Route the simulated interrupt line to `handle`
    pub fn connect_irq(&self, handle: IrqHandle) {
        *self.shared.irq.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn set_drain_mode(&self, mode: DrainMode) {
        self.shared.lock().drain = mode;
    }

    /// Queue the RX FIFO words answering the next read request
    pub fn push_response(&self, words: Vec<u32>) {
        self.shared.lock().responses.push_back(words);
    }

    /// Latch interrupt sources and deliver them
    pub fn raise_irq(&self, bits: u32) {
        self.shared.lock().intsrc |= bits;
        self.shared.raise();
    }

    /// Empty the header FIFO without delivering the interrupt
    pub fn drain_fifo(&self) {
        self.shared.lock().drain();
    }

    /// Latched interrupt sources, masked or not
    pub fn interrupt_sources(&self) -> u32 {
        self.shared.lock().intsrc
    }

    /// Register writes issued so far
    pub fn write_count(&self) -> usize {
        self.shared.lock().writes
    }

    pub fn sent_packets(&self) -> Vec<SentPacket> {
        self.shared.lock().sent.clone()
    }

    pub fn header_fifo_level(&self) -> usize {
        self.shared.lock().ph_fifo.len()
    }

    /// Register value without side effects
    pub fn peek(&self, block: RegBlock, offset: u32) -> u32 {
        self.shared.lock().bank.get(&(block, offset)).copied().unwrap_or(0)
    }

    /// Set a register value without side effects or write accounting
    pub fn poke(&self, block: RegBlock, offset: u32, value: u32) {
        self.shared.lock().bank.insert((block, offset), value);
    }

    fn write_dsim(&self, state: &mut SimState, offset: u32, value: u32) -> bool {
        match offset {
            DSIM_INTSRC => {
                state.intsrc &= !value;
                false
            }
            DSIM_PAYLOAD => {
                state.pl_fifo.push(value);
                false
            }
            DSIM_PKTHDR => {
                let payload = std::mem::take(&mut state.pl_fifo);
                state.sent.push(SentPacket { header: value, payload });
                state.ph_fifo.push_back(value);
                self.after_header(state)
            }
            DSIM_PLLCTRL => {
                state.bank.insert((RegBlock::Dsim, offset), value);
                let stat = if value & PLLCTRL_PLL_EN != 0 { PLLSTAT_LOCKED } else { 0 };
                state.bank.insert((RegBlock::Dsim, DSIM_PLLSTAT), stat);
                false
            }
            DSIM_ESCMODE => {
                state.bank.insert((RegBlock::Dsim, offset), value);
                let ulps = LINK_STATUS_ULPS_CLK | LINK_STATUS_ULPS_DAT;
                let status = state.bank.entry((RegBlock::Dsim, DSIM_LINK_STATUS)).or_insert(0);
                if value & (ESCMODE_TX_ULPS_CLK_EXIT | ESCMODE_TX_ULPS_DAT_EXIT) != 0 {
                    *status &= !ulps;
                } else if value & (ESCMODE_TX_ULPS_CLK | ESCMODE_TX_ULPS_DAT) != 0 {
                    *status |= ulps;
                }
                false
            }
            _ => {
                state.bank.insert((RegBlock::Dsim, offset), value);
                offset == DSIM_INTMSK
            }
        }
    }

    /// Returns true when the interrupt line should be checked
    fn after_header(&self, state: &mut SimState) -> bool {
        match state.drain {
            DrainMode::Inline => {
                state.drain();
                true
            }
            DrainMode::DrainWithoutIrq => {
                state.drain();
                false
            }
            DrainMode::Stuck => false,
            DrainMode::Delayed(delay) => {
                let shared = self.shared.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    shared.lock().drain();
                    shared.raise();
                });
                false
            }
        }
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimBus {
    fn read(&self, block: RegBlock, offset: u32) -> u32 {
        let mut state = self.shared.lock();
        if block != RegBlock::Dsim {
            return state.bank.get(&(block, offset)).copied().unwrap_or(0);
        }
        match offset {
            DSIM_INTSRC => state.intsrc,
            DSIM_FIFOCTRL => state.fifoctrl(),
            DSIM_RXFIFO => state.rx_fifo.pop_front().unwrap_or(0),
            _ => state.bank.get(&(block, offset)).copied().unwrap_or(0),
        }
    }

    fn write(&self, block: RegBlock, offset: u32, value: u32) {
        let check_irq = {
            let mut state = self.shared.lock();
            state.writes += 1;
            if block == RegBlock::Dsim {
                self.write_dsim(&mut state, offset, value)
            } else {
                state.bank.insert((block, offset), value);
                false
            }
        };
        if check_irq {
            self.shared.raise();
        }
    }
}
