//! Underlying block device contract.
//!
//! A [`DriveDevice`] is the shared handle the OS hands us for an SD card,
//! flash chip or partitioned disk. Calls take `&self`: the handle may be
//! reached from several threads and serialises itself where the hardware
//! needs it. Correct ordering of sector I/O on one volume is the volume
//! lock's job, not the device's.
//!
//! [`BlockIoDrive`] adapts any `gpt_disk_io::BlockIo` device (UEFI BlockIo,
//! VirtIO-blk, in-memory disks) to this contract.

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use spin::Mutex;

use crate::error::DeviceError;

/// Driver return code for a failed transfer or request (`EIO`).
pub const EIO: i32 = -5;

/// Driver return code for an unsupported request (`ENOTSUP`).
pub const ENOTSUP: i32 = -134;

/// Geometry reported by the device, in device-native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveGeometry {
    /// Addressable blocks
    pub total_blocks: u64,
    /// Smallest erasable unit in bytes
    pub erase_block_size: u32,
    /// Smallest writable unit in bytes
    pub write_block_size: u32,
}

impl DriveGeometry {
    /// Erase unit expressed in write blocks (at least 1).
    pub fn erase_block_sectors(&self) -> u32 {
        if self.write_block_size == 0 {
            return 1;
        }
        (self.erase_block_size / self.write_block_size).max(1)
    }
}

/// Attribute requests understood by drive devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveCommand {
    /// Bring the media up after open
    Init,
    /// Reset the device's internal state (recovery after a failed transfer)
    Reset,
    /// Erase blocks `start..=end` (physical addresses)
    EraseBlocks { start: u64, end: u64 },
    /// Erase the whole device
    EraseDevice,
}

/// Shared block device handle.
pub trait DriveDevice: Sync {
    /// Open the device. Called once per volume before any I/O.
    fn open(&self) -> Result<(), DeviceError>;

    fn close(&self) -> Result<(), DeviceError>;

    /// Read from physical block `block`. Returns the bytes transferred,
    /// which may be short on a transient fault.
    fn read(&self, block: u64, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Write to physical block `block`. Returns the bytes transferred.
    fn write(&self, block: u64, buf: &[u8]) -> Result<usize, DeviceError>;

    /// Whether the device is still completing a previous operation.
    fn is_busy(&self) -> Result<bool, DeviceError>;

    fn geometry(&self) -> Result<DriveGeometry, DeviceError>;

    fn command(&self, command: DriveCommand) -> Result<(), DeviceError>;
}

/// Largest native block size [`BlockIoDrive`] can zero-fill.
const MAX_ERASE_BLOCK: usize = 4096;

/// [`DriveDevice`] backed by a `gpt_disk_io::BlockIo`.
///
/// The wrapped device is never busy. Erasing zero-fills blocks, since
/// `BlockIo` has no erase primitive.
pub struct BlockIoDrive<B: BlockIo> {
    inner: Mutex<B>,
}

impl<B: BlockIo> BlockIoDrive<B> {
    pub fn new(block_io: B) -> Self {
        Self {
            inner: Mutex::new(block_io),
        }
    }

    /// Give back the wrapped device.
    pub fn into_inner(self) -> B {
        self.inner.into_inner()
    }

    fn zero_fill(block_io: &mut B, start: u64, end: u64) -> Result<(), DeviceError> {
        let block_size = block_io.block_size().to_u32() as usize;
        if block_size > MAX_ERASE_BLOCK {
            return Err(DeviceError(ENOTSUP));
        }

        let zeros = [0u8; MAX_ERASE_BLOCK];
        for block in start..=end {
            block_io
                .write_blocks(Lba(block), &zeros[..block_size])
                .map_err(|e| {
                    log::debug!("zero-fill of block {} failed: {:?}", block, e);
                    DeviceError(EIO)
                })?;
        }
        Ok(())
    }
}

impl<B: BlockIo + Send> DriveDevice for BlockIoDrive<B> {
    fn open(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn close(&self) -> Result<(), DeviceError> {
        self.inner.lock().flush().map_err(|_| DeviceError(EIO))
    }

    fn read(&self, block: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match self.inner.lock().read_blocks(Lba(block), buf) {
            Ok(()) => Ok(buf.len()),
            Err(e) => {
                log::debug!("BlockIo read at {} failed: {:?}", block, e);
                Err(DeviceError(EIO))
            }
        }
    }

    fn write(&self, block: u64, buf: &[u8]) -> Result<usize, DeviceError> {
        match self.inner.lock().write_blocks(Lba(block), buf) {
            Ok(()) => Ok(buf.len()),
            Err(e) => {
                log::debug!("BlockIo write at {} failed: {:?}", block, e);
                Err(DeviceError(EIO))
            }
        }
    }

    fn is_busy(&self) -> Result<bool, DeviceError> {
        Ok(false)
    }

    fn geometry(&self) -> Result<DriveGeometry, DeviceError> {
        let mut block_io = self.inner.lock();
        let block_size = block_io.block_size().to_u32();
        let total_blocks = block_io.num_blocks().map_err(|_| DeviceError(EIO))?;

        Ok(DriveGeometry {
            total_blocks,
            erase_block_size: block_size,
            write_block_size: block_size,
        })
    }

    fn command(&self, command: DriveCommand) -> Result<(), DeviceError> {
        let mut block_io = self.inner.lock();
        match command {
            DriveCommand::Init => Ok(()),
            DriveCommand::Reset => block_io.flush().map_err(|_| DeviceError(EIO)),
            DriveCommand::EraseBlocks { start, end } => Self::zero_fill(&mut block_io, start, end),
            DriveCommand::EraseDevice => {
                let total = block_io.num_blocks().map_err(|_| DeviceError(EIO))?;
                if total == 0 {
                    return Ok(());
                }
                Self::zero_fill(&mut block_io, 0, total - 1)
            }
        }
    }
}
