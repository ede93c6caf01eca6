//! BlockIo adapter tests: `BlockIoDrive` under a drive, `VolumeBlockIo` over one

mod common;

use common::*;
use fatglue::{
    BlockIoDrive, Drive, DriveDevice, DriveError, PartitionDescriptor, RetryPolicy,
    VolumeBlockIo, VolumeConfig, VolumeRegistry,
};
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

#[test]
fn test_block_io_drive_geometry() {
    let dev = BlockIoDrive::new(MemoryBlockDevice::new(64));
    let geometry = dev.geometry().unwrap();

    assert_eq!(geometry.total_blocks, 64);
    assert_eq!(geometry.write_block_size, 512);
    assert_eq!(geometry.erase_block_sectors(), 1);
    assert_eq!(dev.is_busy(), Ok(false));
}

#[test]
fn test_volume_block_io_round_trip() {
    let dev = BlockIoDrive::new(MemoryBlockDevice::new(64));
    {
        let mut registry = VolumeRegistry::new();
        registry
            .register(0, VolumeConfig::new(0, &dev).with_partition(PartitionDescriptor::new(16, 32)))
            .unwrap();
        let clock = SimClock::new();
        let drive = Drive::new(&registry, &clock);
        let mut bio = VolumeBlockIo::new(&drive, 0).unwrap();

        assert_eq!(bio.block_size(), BlockSize::BS_512);
        assert_eq!(bio.num_blocks().unwrap(), 32);

        let sector = [0x5Au8; 512];
        bio.write_blocks(Lba(1), &sector).unwrap();
        bio.flush().unwrap();

        let mut back = [0u8; 512];
        bio.read_blocks(Lba(1), &mut back).unwrap();
        assert_eq!(back, sector);
    }

    let disk = dev.into_inner();
    assert!(disk.data[17 * 512..18 * 512].iter().all(|&b| b == 0x5A));
    assert!(disk.data[512..1024].iter().all(|&b| b == 0));
}

#[test]
fn test_volume_block_io_requires_registration() {
    let registry = VolumeRegistry::new();
    let clock = SimClock::new();
    let drive = Drive::new(&registry, &clock);

    assert_eq!(VolumeBlockIo::new(&drive, 0).err(), Some(DriveError::InvalidVolume));
}

#[test]
fn test_erase_zero_fills_blocks() {
    let mut mem = MemoryBlockDevice::new(32);
    mem.data.fill(0xFF);
    let dev = BlockIoDrive::new(mem);
    {
        let mut registry = VolumeRegistry::new();
        registry
            .register(0, VolumeConfig::new(0, &dev).with_partition(PartitionDescriptor::new(8, 8)))
            .unwrap();
        let clock = SimClock::new();
        let drive = Drive::new(&registry, &clock);

        drive.erase_range(0, Lba(0), Lba(1)).unwrap();
    }

    let disk = dev.into_inner();
    assert!(disk.data[8 * 512..10 * 512].iter().all(|&b| b == 0));
    assert!(disk.data[7 * 512..8 * 512].iter().all(|&b| b == 0xFF));
    assert!(disk.data[10 * 512..11 * 512].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_erase_partition_leaves_rest_of_device() {
    let mut mem = MemoryBlockDevice::new(32);
    mem.data.fill(0xFF);
    let dev = BlockIoDrive::new(mem);
    {
        let mut registry = VolumeRegistry::new();
        registry
            .register(0, VolumeConfig::new(0, &dev).with_partition(PartitionDescriptor::new(4, 4)))
            .unwrap();
        let clock = SimClock::new();
        let drive = Drive::new(&registry, &clock);

        drive.erase_device(0).unwrap();
    }

    let disk = dev.into_inner();
    assert!(disk.data[4 * 512..8 * 512].iter().all(|&b| b == 0));
    assert!(disk.data[..4 * 512].iter().all(|&b| b == 0xFF));
    assert!(disk.data[8 * 512..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_out_of_range_read_fails_after_retries() {
    let dev = BlockIoDrive::new(MemoryBlockDevice::new(8));
    let mut registry = VolumeRegistry::new();
    registry.register(0, VolumeConfig::new(0, &dev)).unwrap();
    let clock = SimClock::new();
    let drive = Drive::new(&registry, &clock).with_retry_policy(RetryPolicy::with_max_attempts(2));
    let mut bio = VolumeBlockIo::new(&drive, 0).unwrap();

    let mut buf = [0u8; 512];
    assert_eq!(bio.read_blocks(Lba(8), &mut buf), Err(DriveError::IoError));
}
