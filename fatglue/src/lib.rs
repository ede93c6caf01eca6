//! FatFs drive glue for MorpheusX
//!
//! The layer between a FAT filesystem engine and the block devices it
//! mounts. The engine assumes sector reads and writes either complete or
//! fail outright; real SD cards and flash parts go busy, drop transfers and
//! sit behind partition tables. This crate closes that gap.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │          FAT engine (FatFs)            │
//! └──────┬──────────────────────┬──────────┘
//!        │ disk_* / get_fattime │ ff_req_grant / ff_rel_grant
//!        ▼                      ▼
//! ┌──────────────┐      ┌──────────────┐
//! │   DiskIo     │      │  LockTable   │  one reentrant lock per volume
//! └──────┬───────┘      └──────────────┘
//!        ▼
//! ┌────────────────────────────────────────┐
//! │  Drive: retry + reset, busy back-off,  │
//! │  partition offset, geometry clipping   │
//! └──────┬─────────────────────────────────┘
//!        ▼
//! ┌──────────────┐      ┌────────────────────────┐
//! │VolumeRegistry│ ───► │ DriveDevice (SD, flash,│
//! └──────────────┘      │ BlockIoDrive<BlockIo>) │
//!                       └────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fatglue::{Drive, DiskIo, LockTable, VolumeConfig, VolumeRegistry};
//!
//! let mut registry = VolumeRegistry::new();
//! registry.register(0, VolumeConfig::new(0, &sd_card))?;
//!
//! let disk = DiskIo::new(Drive::new(&registry, &clock));
//! let locks = LockTable::new(&clock, &scheduler);
//!
//! disk.initialize(0);
//! disk.read(0, &mut sector, 0, 1)?;
//! ```

#![no_std]
#![allow(clippy::new_without_default)]
#![allow(clippy::declare_interior_mutable_const)]

#[cfg(test)]
extern crate std;

pub mod blockio;
pub mod busy;
pub mod config;
pub mod device;
pub mod diskio;
pub mod error;
pub mod fattime;
pub mod io;
pub mod lock;
pub mod partition;
pub mod registry;
pub mod time;

pub use blockio::VolumeBlockIo;
pub use busy::{BusyWaitGovernor, WaitOutcome, WaitReport};
pub use config::{
    BusyWaitParams, BusyWaitPolicy, LockPolicy, PartitionDescriptor, RetryPolicy, VolumeConfig,
    VolumeId, BLOCK_SIZE, MAX_VOLUMES,
};
pub use device::{BlockIoDrive, DriveCommand, DriveDevice, DriveGeometry};
pub use diskio::{ControlCommand, ControlReply, DiskError, DiskIo, DiskStatus};
pub use error::{DeviceError, DriveError, Result};
pub use fattime::FatTimestamp;
pub use io::Drive;
pub use lock::{LockTable, SyncHandle, VolumeGuard, VolumeLock};
pub use registry::VolumeRegistry;
pub use time::{Clock, ContextId, Scheduler};
