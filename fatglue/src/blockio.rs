//! `gpt_disk_io::BlockIo` view of a registered volume.
//!
//! Lets the workspace's FAT32 and GPT code run on top of the resilient
//! path: every read and write goes through [`Drive`] retries, partition
//! translation and busy polling.
//!
//! # Usage
//!
//! ```ignore
//! let mut bio = VolumeBlockIo::new(&drive, 0)?;
//! let mut sector = [0u8; 512];
//! bio.read_blocks(Lba(0), &mut sector)?;
//! ```

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

use crate::config::VolumeId;
use crate::error::{DriveError, Result};
use crate::io::Drive;

/// One volume of a [`Drive`] as a 512-byte-sector block device.
pub struct VolumeBlockIo<'r, 'a> {
    drive: &'r Drive<'a>,
    volume: VolumeId,
}

impl<'r, 'a> VolumeBlockIo<'r, 'a> {
    /// Fails with `InvalidVolume` if `volume` is not registered.
    pub fn new(drive: &'r Drive<'a>, volume: VolumeId) -> Result<Self> {
        drive.registry().lookup(volume)?;
        Ok(Self { drive, volume })
    }

    pub fn volume(&self) -> VolumeId {
        self.volume
    }
}

impl BlockIo for VolumeBlockIo<'_, '_> {
    type Error = DriveError;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> core::result::Result<u64, Self::Error> {
        Ok(self.drive.query_geometry(self.volume)?.total_blocks)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> core::result::Result<(), Self::Error> {
        self.drive.read_blocks(self.volume, start_lba, dst)?;
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> core::result::Result<(), Self::Error> {
        self.drive.write_blocks(self.volume, start_lba, src)?;
        Ok(())
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        self.drive.sync(self.volume)?;
        Ok(())
    }
}
