//! Resilient block I/O
//!
//! [`Drive`] turns a flaky, possibly slow device into the synchronous
//! all-or-nothing sector transfer the FAT engine expects:
//!
//! ```text
//! lookup volume ─► translate LBA ─► wait ready ─► transfer ──► ok
//!                                      ▲             │ short
//!                                      │             ▼
//!                                      └──── reset + wait ready
//!                                            (bounded attempts)
//! ```
//!
//! The drive takes no lock of its own. Callers must hold the volume lock
//! before touching a volume; I/O on different volumes runs concurrently.

use gpt_disk_types::Lba;

use crate::busy::{BusyWaitGovernor, WaitReport};
use crate::config::{BusyWaitPolicy, RetryPolicy, VolumeConfig, VolumeId};
use crate::device::{DriveCommand, DriveDevice, DriveGeometry};
use crate::error::{DeviceError, DriveError, Result};
use crate::registry::VolumeRegistry;
use crate::time::Clock;

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn name(self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }
}

/// Retrying sector I/O over the volumes of a registry.
pub struct Drive<'a> {
    registry: &'a VolumeRegistry<'a>,
    clock: &'a dyn Clock,
    governor: BusyWaitGovernor,
    retry: RetryPolicy,
}

impl<'a> Drive<'a> {
    /// Drive with the default retry and back-off policies.
    pub fn new(registry: &'a VolumeRegistry<'a>, clock: &'a dyn Clock) -> Self {
        Self {
            registry,
            clock,
            governor: BusyWaitGovernor::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyWaitPolicy) -> Self {
        self.governor = BusyWaitGovernor::new(policy);
        self
    }

    pub fn registry(&self) -> &'a VolumeRegistry<'a> {
        self.registry
    }

    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Open the volume's device on first use. Later calls do nothing.
    pub fn initialize(&self, id: VolumeId) -> Result<()> {
        let slot = self.registry.slot(id)?;
        if slot.is_open() {
            return Ok(());
        }

        let device = slot.config().device;
        device.open().map_err(|e| {
            log::error!("volume {}: open failed: {}", id, e);
            DriveError::IoError
        })?;
        device.command(DriveCommand::Init).map_err(|e| {
            log::error!("volume {}: init failed: {}", id, e);
            DriveError::IoError
        })?;

        slot.set_open(true);
        log::debug!("volume {}: device initialised", id);
        Ok(())
    }

    /// Whether `initialize` has succeeded for this volume.
    pub fn is_initialized(&self, id: VolumeId) -> Result<bool> {
        Ok(self.registry.slot(id)?.is_open())
    }

    /// Close the device. The volume needs `initialize` again afterwards.
    pub fn close(&self, id: VolumeId) -> Result<()> {
        let slot = self.registry.slot(id)?;
        if !slot.is_open() {
            return Ok(());
        }

        slot.set_open(false);
        slot.config().device.close().map_err(|e| {
            log::warn!("volume {}: close failed: {}", id, e);
            DriveError::IoError
        })
    }

    /// Wait for the volume's device to finish outstanding work.
    pub fn sync(&self, id: VolumeId) -> Result<WaitReport> {
        let config = self.registry.lookup(id)?;
        Ok(self.wait_ready(config))
    }

    /// Read `buf.len()` bytes starting at volume block `lba`.
    pub fn read_blocks(&self, id: VolumeId, lba: Lba, buf: &mut [u8]) -> Result<usize> {
        let byte_count = buf.len();
        self.transfer(id, Direction::Read, lba, byte_count, |device, block| {
            device.read(block, buf)
        })
    }

    /// Write all of `buf` starting at volume block `lba`.
    pub fn write_blocks(&self, id: VolumeId, lba: Lba, buf: &[u8]) -> Result<usize> {
        self.transfer(id, Direction::Write, lba, buf.len(), |device, block| {
            device.write(block, buf)
        })
    }

    /// Device geometry with the block count clipped to the volume.
    pub fn query_geometry(&self, id: VolumeId) -> Result<DriveGeometry> {
        let config = self.registry.lookup(id)?;
        let mut geometry = config.device.geometry().map_err(|e| {
            log::error!("volume {}: failed to get info: {}", id, e);
            DriveError::IoError
        })?;

        geometry.total_blocks = config.partition.effective_block_count(geometry.total_blocks);
        Ok(geometry)
    }

    /// Erase volume blocks `start..=end`.
    ///
    /// Not retried: repeating an erase on media in an unknown state risks
    /// losing data.
    pub fn erase_range(&self, id: VolumeId, start: Lba, end: Lba) -> Result<()> {
        let config = self.registry.lookup(id)?;
        let start = config.partition.to_physical(start);
        let end = config.partition.to_physical(end);

        self.erase(config, DriveCommand::EraseBlocks {
            start: start.0,
            end: end.0,
        })
    }

    /// Erase the whole volume. A partition only erases its own blocks.
    pub fn erase_device(&self, id: VolumeId) -> Result<()> {
        let config = self.registry.lookup(id)?;
        let part = &config.partition;

        if part.block_offset == 0 && part.is_whole_device() {
            return self.erase(config, DriveCommand::EraseDevice);
        }

        // Offset with no count runs to the end of the device
        let end = if part.is_whole_device() {
            let total = self.query_geometry(id)?.total_blocks;
            if total <= part.block_offset {
                return Ok(());
            }
            total - 1
        } else {
            part.block_offset + part.block_count - 1
        };

        self.erase(config, DriveCommand::EraseBlocks {
            start: part.block_offset,
            end,
        })
    }

    fn erase(&self, config: &VolumeConfig<'_>, command: DriveCommand) -> Result<()> {
        self.wait_ready(config);
        config.device.command(command).map_err(|e| {
            log::error!("volume {}: {:?} failed: {}", config.id, command, e);
            DriveError::IoError
        })?;
        self.wait_ready(config);
        Ok(())
    }

    fn wait_ready(&self, config: &VolumeConfig<'_>) -> WaitReport {
        self.governor
            .wait_until_ready(config.device, &config.busy_wait, self.clock)
    }

    /// Reset the device and let it settle before the next attempt.
    fn reinitialize(&self, config: &VolumeConfig<'_>) {
        if let Err(e) = config.device.command(DriveCommand::Reset) {
            log::warn!("volume {}: reset failed: {}", config.id, e);
        }
        self.wait_ready(config);
    }

    fn transfer<F>(
        &self,
        id: VolumeId,
        direction: Direction,
        lba: Lba,
        byte_count: usize,
        mut attempt: F,
    ) -> Result<usize>
    where
        F: FnMut(&dyn DriveDevice, u64) -> core::result::Result<usize, DeviceError>,
    {
        let config = self.registry.lookup(id)?;
        let physical = config.partition.to_physical(lba);
        let max_attempts = self.retry.max_attempts.max(1);

        self.wait_ready(config);

        let mut attempts = 0;
        loop {
            attempts += 1;

            match attempt(config.device, physical.0) {
                Ok(n) if n == byte_count => {
                    if attempts > 1 {
                        log::warn!(
                            "volume {}: {} retries: {} (block {}, {} bytes)",
                            id,
                            direction.name(),
                            attempts,
                            physical.0,
                            byte_count
                        );
                    }
                    return Ok(byte_count);
                }
                result => {
                    if attempts == 1 {
                        log::debug!(
                            "volume {}: {} at block {} returned {:?}, expected {}",
                            id,
                            direction.name(),
                            physical.0,
                            result,
                            byte_count
                        );
                    } else {
                        log::warn!(
                            "volume {}: {} attempt {}/{} at block {} returned {:?}",
                            id,
                            direction.name(),
                            attempts,
                            max_attempts,
                            physical.0,
                            result
                        );
                    }
                }
            }

            self.reinitialize(config);

            if attempts >= max_attempts {
                log::error!(
                    "volume {}: failed to {} block {} after {} attempts",
                    id,
                    direction.name(),
                    physical.0,
                    attempts
                );
                return Err(DriveError::IoError);
            }
        }
    }
}
