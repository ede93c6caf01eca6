//! Volume configuration and tunables.
//!
//! Everything here is fixed at system startup. Nothing is loaded at runtime.

use crate::device::DriveDevice;

/// Sector size assumed by the FAT engine and by every device we drive.
pub const BLOCK_SIZE: usize = 512;

/// Number of slots in the volume registry (FatFs `_VOLUMES`).
pub const MAX_VOLUMES: usize = 4;

/// Transfer attempts before a read/write gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Busy polls between doublings of the poll delay.
pub const DEFAULT_BACKOFF_INTERVAL: u32 = 100;

/// Upper bound on a single busy-poll sleep (10 ms).
pub const DEFAULT_DELAY_CEILING_US: u32 = 10_000;

/// Volume lock acquire timeout (5 s).
pub const DEFAULT_LOCK_TIMEOUT_US: u64 = 5_000_000;

/// Sleep between attempts on a contended volume lock.
pub const DEFAULT_LOCK_POLL_US: u32 = 1_000;

/// Small integer naming a volume. Same number space as the engine's
/// physical drive number.
pub type VolumeId = u8;

/// Sub-range of a device's blocks occupied by a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    /// First device block of the volume
    pub block_offset: u64,
    /// Blocks in the volume; 0 means the rest of the device
    pub block_count: u64,
}

impl PartitionDescriptor {
    /// Volume spans the entire device.
    pub const WHOLE_DEVICE: Self = Self {
        block_offset: 0,
        block_count: 0,
    };

    pub const fn new(block_offset: u64, block_count: u64) -> Self {
        Self {
            block_offset,
            block_count,
        }
    }

    pub const fn is_whole_device(&self) -> bool {
        self.block_count == 0
    }
}

impl Default for PartitionDescriptor {
    fn default() -> Self {
        Self::WHOLE_DEVICE
    }
}

/// Per-volume busy polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyWaitParams {
    /// Initial sleep between busy polls in microseconds
    pub base_delay_us: u32,
    /// Poll budget before giving up; 0 waits forever
    pub timeout_count: u32,
}

impl BusyWaitParams {
    pub const fn new(base_delay_us: u32, timeout_count: u32) -> Self {
        Self {
            base_delay_us,
            timeout_count,
        }
    }

    pub const fn waits_forever(&self) -> bool {
        self.timeout_count == 0
    }
}

impl Default for BusyWaitParams {
    fn default() -> Self {
        Self::new(100, 0)
    }
}

/// Static description of one volume.
///
/// Built once at startup and handed to [`VolumeRegistry::register`].
///
/// [`VolumeRegistry::register`]: crate::registry::VolumeRegistry::register
#[derive(Clone, Copy)]
pub struct VolumeConfig<'d> {
    pub id: VolumeId,
    /// Underlying block device, opened on first `initialize`
    pub device: &'d dyn DriveDevice,
    pub partition: PartitionDescriptor,
    pub busy_wait: BusyWaitParams,
}

impl<'d> VolumeConfig<'d> {
    /// Whole-device volume with default busy-wait parameters.
    pub const fn new(id: VolumeId, device: &'d dyn DriveDevice) -> Self {
        Self {
            id,
            device,
            partition: PartitionDescriptor::WHOLE_DEVICE,
            busy_wait: BusyWaitParams::new(100, 0),
        }
    }

    pub fn with_partition(mut self, partition: PartitionDescriptor) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_busy_wait(mut self, busy_wait: BusyWaitParams) -> Self {
        self.busy_wait = busy_wait;
        self
    }
}

impl core::fmt::Debug for VolumeConfig<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VolumeConfig")
            .field("id", &self.id)
            .field("partition", &self.partition)
            .field("busy_wait", &self.busy_wait)
            .finish_non_exhaustive()
    }
}

/// Bounded retry for sector transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transfer attempts, first try included. Must be at least 1.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub const fn with_max_attempts(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

/// Back-off schedule shared by every volume's busy polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyWaitPolicy {
    /// Polls between delay doublings.
    pub backoff_interval_polls: u32,
    /// Cap on a single sleep in microseconds.
    pub delay_ceiling_us: u32,
}

impl Default for BusyWaitPolicy {
    fn default() -> Self {
        Self {
            backoff_interval_polls: DEFAULT_BACKOFF_INTERVAL,
            delay_ceiling_us: DEFAULT_DELAY_CEILING_US,
        }
    }
}

impl BusyWaitPolicy {
    /// Sleep length before re-query number `poll` (0-based).
    pub fn delay_for_poll(&self, base_delay_us: u32, poll: u32) -> u32 {
        let interval = self.backoff_interval_polls.max(1);
        let doublings = poll / interval;
        let mut delay = base_delay_us;
        for _ in 0..doublings {
            if delay == 0 || delay >= self.delay_ceiling_us {
                break;
            }
            delay = delay.saturating_mul(2);
        }
        delay.min(self.delay_ceiling_us)
    }
}

/// Volume lock timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Default grant timeout for engine sync objects.
    pub timeout_us: u64,
    /// Sleep between attempts while the lock is contended.
    pub poll_interval_us: u32,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            timeout_us: DEFAULT_LOCK_TIMEOUT_US,
            poll_interval_us: DEFAULT_LOCK_POLL_US,
        }
    }
}
