//! FatFs disk I/O glue
//!
//! The five calls the engine's `diskio` layer makes (`disk_initialize`,
//! `disk_status`, `disk_read`, `disk_write`, `disk_ioctl`) plus
//! `get_fattime`, dispatched onto a [`Drive`].
//!
//! The engine's physical drive number is the volume id. The engine counts
//! in 512-byte sectors; the drive counts in bytes.

use gpt_disk_types::Lba;

use crate::config::{VolumeId, BLOCK_SIZE};
use crate::error::DriveError;
use crate::fattime::FatTimestamp;
use crate::io::Drive;

bitflags::bitflags! {
    /// FatFs `DSTATUS`. Empty means ready.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DiskStatus: u8 {
        const NOT_INITIALIZED = 0x01;
        const NO_DISK = 0x02;
        const WRITE_PROTECTED = 0x04;
    }
}

/// FatFs `DRESULT` failure codes. `RES_OK` is `Ok(..)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiskError {
    /// `RES_ERROR`: hard I/O error
    Error = 1,
    /// `RES_WRPRT`
    WriteProtected = 2,
    /// `RES_NOTRDY`
    NotReady = 3,
    /// `RES_PARERR`
    InvalidParameter = 4,
}

impl DiskError {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<DriveError> for DiskError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::InvalidVolume => DiskError::InvalidParameter,
            DriveError::TimedOut => DiskError::NotReady,
            DriveError::IoError | DriveError::NotOwner => DiskError::Error,
        }
    }
}

/// `disk_ioctl` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// `CTRL_SYNC`: wait for the device to finish pending writes
    Sync,
    /// `GET_SECTOR_COUNT`
    GetSectorCount,
    /// `GET_SECTOR_SIZE`
    GetSectorSize,
    /// `GET_BLOCK_SIZE`: erase unit in sectors
    GetBlockSize,
    /// `CTRL_ERASE_SECTOR`: erase volume sectors `start..=end`
    EraseSectors { start: u64, end: u64 },
}

impl ControlCommand {
    /// FatFs command code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Sync => 0,
            Self::GetSectorCount => 1,
            Self::GetSectorSize => 2,
            Self::GetBlockSize => 3,
            Self::EraseSectors { .. } => 4,
        }
    }
}

/// Data returned by `disk_ioctl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Done,
    SectorCount(u64),
    SectorSize(u16),
    BlockSize(u32),
}

/// Engine-facing disk I/O over a [`Drive`].
pub struct DiskIo<'a> {
    drive: Drive<'a>,
}

impl<'a> DiskIo<'a> {
    pub fn new(drive: Drive<'a>) -> Self {
        Self { drive }
    }

    pub fn drive(&self) -> &Drive<'a> {
        &self.drive
    }

    /// `disk_initialize`
    pub fn initialize(&self, pdrv: u8) -> DiskStatus {
        match self.drive.initialize(pdrv as VolumeId) {
            Ok(()) => DiskStatus::empty(),
            Err(DriveError::InvalidVolume) => DiskStatus::NOT_INITIALIZED | DiskStatus::NO_DISK,
            Err(_) => DiskStatus::NOT_INITIALIZED,
        }
    }

    /// `disk_status`
    pub fn status(&self, pdrv: u8) -> DiskStatus {
        match self.drive.is_initialized(pdrv as VolumeId) {
            Ok(true) => DiskStatus::empty(),
            Ok(false) => DiskStatus::NOT_INITIALIZED,
            Err(_) => {
                log::debug!("drive {}: no device", pdrv);
                DiskStatus::NOT_INITIALIZED | DiskStatus::NO_DISK
            }
        }
    }

    /// `disk_read`: `count` sectors from `sector` into `buf`.
    pub fn read(&self, pdrv: u8, buf: &mut [u8], sector: u64, count: u32) -> Result<(), DiskError> {
        let len = self.check_transfer(pdrv, buf.len(), count)?;
        self.drive
            .read_blocks(pdrv as VolumeId, Lba(sector), &mut buf[..len])
            .map_err(|e| {
                log::error!("drive {}: failed to read disk", pdrv);
                DiskError::from(e)
            })?;
        Ok(())
    }

    /// `disk_write`: `count` sectors from `buf` to `sector`.
    pub fn write(&self, pdrv: u8, buf: &[u8], sector: u64, count: u32) -> Result<(), DiskError> {
        let len = self.check_transfer(pdrv, buf.len(), count)?;
        self.drive
            .write_blocks(pdrv as VolumeId, Lba(sector), &buf[..len])
            .map_err(|e| {
                log::error!("drive {}: failed to write disk", pdrv);
                DiskError::from(e)
            })?;
        Ok(())
    }

    /// `disk_ioctl`
    pub fn control(&self, pdrv: u8, command: ControlCommand) -> Result<ControlReply, DiskError> {
        let id = pdrv as VolumeId;

        match command {
            ControlCommand::Sync => {
                self.drive.sync(id)?;
                Ok(ControlReply::Done)
            }
            ControlCommand::GetSectorCount => {
                let geometry = self.drive.query_geometry(id)?;
                Ok(ControlReply::SectorCount(geometry.total_blocks))
            }
            ControlCommand::GetSectorSize => Ok(ControlReply::SectorSize(BLOCK_SIZE as u16)),
            ControlCommand::GetBlockSize => {
                let geometry = self.drive.query_geometry(id)?;
                Ok(ControlReply::BlockSize(geometry.erase_block_sectors()))
            }
            ControlCommand::EraseSectors { start, end } => {
                if end < start {
                    return Err(DiskError::InvalidParameter);
                }
                self.drive.erase_range(id, Lba(start), Lba(end))?;
                Ok(ControlReply::Done)
            }
        }
    }

    /// `get_fattime`: current time packed for directory entries.
    pub fn get_fattime(&self) -> u32 {
        self.drive
            .clock()
            .unix_time()
            .map(FatTimestamp::from_unix)
            .unwrap_or(FatTimestamp::EPOCH)
            .bits()
    }

    fn check_transfer(&self, pdrv: u8, buf_len: usize, count: u32) -> Result<usize, DiskError> {
        let len = (count as usize)
            .checked_mul(BLOCK_SIZE)
            .ok_or(DiskError::InvalidParameter)?;
        if count == 0 || buf_len < len {
            return Err(DiskError::InvalidParameter);
        }

        match self.drive.is_initialized(pdrv as VolumeId) {
            Ok(true) => Ok(len),
            Ok(false) => Err(DiskError::NotReady),
            Err(e) => Err(e.into()),
        }
    }
}
