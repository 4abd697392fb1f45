// Owner of the DSIM instances of one display subsystem
use anyhow::{bail, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::dsim::Dsim;

/// Host controllers per SoC
pub const MAX_DSI_CNT: usize = 2;

pub struct DsimRegistry {
    slots: Mutex<[Option<Dsim>; MAX_DSI_CNT]>,
}

impl DsimRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Default::default()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, [Option<Dsim>; MAX_DSI_CNT]> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, dsim: Dsim) -> Result<()> {
        let id = dsim.id() as usize;
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(id) else {
            bail!("dsim id {} out of range (max {})", id, MAX_DSI_CNT);
        };
        if slot.is_some() {
            bail!("dsim{} is already registered", id);
        }
        *slot = Some(dsim);
        log::info!("dsim{} registered", id);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<Dsim> {
        self.slots().get(id as usize).and_then(|slot| slot.clone())
    }

    /// Remove instance `id`, powering it down first
    pub fn unregister(&self, id: u32) -> Option<Dsim> {
        let dsim = self.slots().get_mut(id as usize).and_then(Option::take)?;
        if let Err(e) = dsim.disable() {
            log::error!("dsim{} disable on unregister failed: {}", id, e);
        }
        log::info!("dsim{} unregistered", id);
        Some(dsim)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.slots()
            .iter()
            .flatten()
            .map(|dsim| dsim.id())
            .collect()
    }

    /// Unregister every instance
    pub fn shutdown(&self) {
        for id in self.ids() {
            self.unregister(id);
        }
    }
}

impl Default for DsimRegistry {
    fn default() -> Self {
        Self::new()
    }
}
