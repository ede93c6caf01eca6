//! Partition translation
//!
//! Logical blocks of a volume map onto the device by a fixed offset.
//! No bounds checking happens here; the device rejects addresses past
//! its end.

use gpt_disk_types::{GptPartitionEntry, Lba};

use crate::config::{PartitionDescriptor, VolumeConfig};

impl PartitionDescriptor {
    /// Physical block for a volume-relative block.
    pub fn to_physical(&self, logical: Lba) -> Lba {
        Lba(logical.0.wrapping_add(self.block_offset))
    }

    /// Blocks visible to the engine: the partition's own size when it has
    /// one, otherwise the whole device.
    pub fn effective_block_count(&self, device_total_blocks: u64) -> u64 {
        if self.is_whole_device() {
            device_total_blocks
        } else {
            self.block_count
        }
    }

    /// Descriptor covering a used GPT entry, `None` for an empty slot or an
    /// entry whose end precedes its start.
    pub fn from_gpt_entry(entry: &GptPartitionEntry) -> Option<Self> {
        if !entry.is_used() {
            return None;
        }

        let start = entry.starting_lba.to_u64();
        let end = entry.ending_lba.to_u64();
        if end < start {
            return None;
        }

        Some(Self::new(start, end - start + 1))
    }
}

/// Translate a volume-relative block to a device block.
pub fn to_physical(config: &VolumeConfig<'_>, logical: Lba) -> Lba {
    config.partition.to_physical(logical)
}

/// Clip the device's block count to the volume.
pub fn effective_block_count(config: &VolumeConfig<'_>, device_total_blocks: u64) -> u64 {
    config.partition.effective_block_count(device_total_blocks)
}
