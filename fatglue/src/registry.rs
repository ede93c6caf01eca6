//! Volume registry
//!
//! Fixed table from volume id to its configuration. The mount sequence
//! fills it through `&mut` before any I/O starts; after that it is only
//! shared by reference, so lookups take no lock.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{VolumeConfig, VolumeId, MAX_VOLUMES};
use crate::error::{DriveError, Result};

/// One registry entry.
pub struct VolumeSlot<'d> {
    config: VolumeConfig<'d>,
    opened: AtomicBool,
}

impl<'d> VolumeSlot<'d> {
    pub fn config(&self) -> &VolumeConfig<'d> {
        &self.config
    }

    /// Device opened and initialised by `initialize`.
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.opened.store(open, Ordering::Release);
    }
}

/// Volume id to configuration table.
pub struct VolumeRegistry<'d> {
    slots: [Option<VolumeSlot<'d>>; MAX_VOLUMES],
}

impl<'d> VolumeRegistry<'d> {
    const EMPTY_SLOT: Option<VolumeSlot<'d>> = None;

    pub const fn new() -> Self {
        Self {
            slots: [Self::EMPTY_SLOT; MAX_VOLUMES],
        }
    }

    /// Store `config` in slot `id`. Registering an id again replaces the
    /// previous entry and forgets its open state.
    pub fn register(&mut self, id: VolumeId, config: VolumeConfig<'d>) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id as usize)
            .ok_or(DriveError::InvalidVolume)?;

        if slot.is_some() {
            log::debug!("volume {} re-registered", id);
        }

        *slot = Some(VolumeSlot {
            config,
            opened: AtomicBool::new(false),
        });
        Ok(())
    }

    /// Register a config under its own id.
    pub fn register_config(&mut self, config: VolumeConfig<'d>) -> Result<()> {
        self.register(config.id, config)
    }

    pub fn lookup(&self, id: VolumeId) -> Result<&VolumeConfig<'d>> {
        self.slot(id).map(VolumeSlot::config)
    }

    pub fn slot(&self, id: VolumeId) -> Result<&VolumeSlot<'d>> {
        self.slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(DriveError::InvalidVolume)
    }

    pub fn is_registered(&self, id: VolumeId) -> bool {
        self.slot(id).is_ok()
    }

    pub fn capacity(&self) -> usize {
        MAX_VOLUMES
    }

    pub fn iter(&self) -> impl Iterator<Item = &VolumeConfig<'d>> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(VolumeSlot::config))
    }
}

impl Default for VolumeRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}
