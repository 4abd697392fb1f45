/// D-PHY diagnostic register overrides
use heapless::Vec as HVec;

use dsim_core::config::{DiagEntry, DiagRegBase};
use dsim_core::ClockError;

use super::regs::{RegBlock, Regs};
use super::{Dsim, TransportState};

/// Registers one diagnostic item may span
pub const MAX_DIAG_REG_NUM: usize = 8;

pub type DiagValues = HVec<u32, MAX_DIAG_REG_NUM>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DphyDiag {
    pub name: String,
    pub desc: String,
    pub help: String,
    pub reg_base: RegBlock,
    pub reg_offsets: HVec<u16, MAX_DIAG_REG_NUM>,
    pub bit_start: u8,
    pub bit_end: u8,
    pub read_only: bool,
    pub override_value: Option<u32>,
}

impl DphyDiag {
    pub fn from_entry(entry: &DiagEntry) -> Result<Self, String> {
        if entry.diag_name.is_empty() {
            return Err("empty diag-name".to_string());
        }

        let count = entry.reg_offset.len();
        if count == 0 || count > MAX_DIAG_REG_NUM {
            return Err(format!("wrong number of reg-offset: {}", count));
        }
        let reg_offsets = HVec::from_slice(&entry.reg_offset)
            .map_err(|_| format!("wrong number of reg-offset: {}", count))?;

        let [a, b] = entry.bit_range;
        if a >= 32 || b >= 32 {
            return Err(format!("invalid bit range {}, {}", a, b));
        }

        Ok(Self {
            name: entry.diag_name.clone(),
            desc: entry.desc.clone(),
            help: entry.help.clone(),
            reg_base: match entry.reg_base {
                DiagRegBase::Dphy => RegBlock::Dphy,
                DiagRegBase::DphyExtra => RegBlock::DphyExtra,
            },
            reg_offsets,
            bit_start: a.min(b),
            bit_end: a.max(b),
            read_only: entry.read_only,
            override_value: None,
        })
    }

    pub fn mask(&self) -> Result<u32, ClockError> {
        mask_from_range(self.bit_start, self.bit_end)
    }
}

/// Register mask covering bits `start..=end`
pub fn mask_from_range(start: u8, end: u8) -> Result<u32, ClockError> {
    if start > end || end >= 32 {
        return Err(ClockError::OutOfRange {
            what: "bit range",
            value: u64::from(end),
            min: u64::from(start),
            max: 31,
        });
    }
    let width = u32::from(end - start) + 1;
    let bits = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
    Ok(bits << start)
}

/// Parse configured items. A bad item drops the whole list.
pub fn parse_diags(entries: &[DiagEntry]) -> Vec<DphyDiag> {
    let mut diags = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match DphyDiag::from_entry(entry) {
            Ok(diag) => diags.push(diag),
            Err(e) => {
                log::warn!("diag parsing error for item {}: {}", index, e);
                return Vec::new();
            }
        }
    }
    diags
}

/// Write stored overrides after the PLL has been programmed
pub(crate) fn apply_overrides(regs: &Regs<'_>, diags: &[DphyDiag]) {
    for diag in diags {
        let Some(value) = diag.override_value else {
            continue;
        };
        let Ok(mask) = diag.mask() else {
            continue;
        };
        for &offset in &diag.reg_offsets {
            regs.write_block_mask(diag.reg_base, u32::from(offset), value, mask);
        }
    }
}

impl Dsim {
    pub fn diag_names(&self) -> Vec<String> {
        self.lock_state().diags.iter().map(|d| d.name.clone()).collect()
    }

    /// Read the field of every register of item `name`, shifted down to bit 0
    pub fn diag_get_reg(&self, name: &str) -> Result<DiagValues, ClockError> {
        let state = self.lock_state();
        let diag = state
            .diags
            .iter()
            .find(|d| d.name == name)
            .ok_or(ClockError::NoDevice)?;
        let mask = diag.mask()?;

        if self.state() != TransportState::HsClkEn {
            return Err(ClockError::NoDevice);
        }

        let regs = self.regs();
        let mut vals = DiagValues::new();
        for &offset in &diag.reg_offsets {
            let val = regs.read_block(diag.reg_base, u32::from(offset)) & mask;
            // capacity matches reg_offsets
            let _ = vals.push(val >> diag.bit_start);
        }
        Ok(vals)
    }

    /// Store an override for item `name`; applied now if the link is up,
    /// otherwise on the next enable
    pub fn diag_set_reg(&self, name: &str, value: u32) -> Result<(), ClockError> {
        let mut state = self.lock_state();
        let diag = state
            .diags
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or(ClockError::NoDevice)?;
        if diag.read_only {
            return Err(ClockError::ReadOnly(diag.name.clone()));
        }

        let mask = diag.mask()?;
        diag.override_value = Some((value << diag.bit_start) & mask);

        if self.state() == TransportState::HsClkEn {
            // restart to apply new config
            self.restart(&state);
        }
        Ok(())
    }
}
