//! Common test utilities: simulated devices, clocks and schedulers

#![allow(dead_code)]

use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use fatglue::device::EIO;
use fatglue::{
    Clock, ContextId, DeviceError, DriveCommand, DriveDevice, DriveGeometry, Scheduler,
    BLOCK_SIZE,
};
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

/// Scriptable state behind a [`SimDevice`]
#[derive(Debug, Default)]
pub struct SimState {
    pub data: Vec<u8>,
    /// Next N transfers come back short
    pub failing_transfers: u32,
    /// Every transfer comes back short
    pub never_completes: bool,
    /// Next N busy queries report busy
    pub busy_polls: u32,
    /// Busy queries fail outright
    pub busy_query_fails: bool,
    pub open_fails: bool,
    pub erase_fails: bool,
    pub geometry_fails: bool,
    pub erase_block_size: u32,
    pub write_block_size: u32,

    pub commands: Vec<DriveCommand>,
    /// (physical block, bytes requested) per read attempt
    pub reads: Vec<(u64, usize)>,
    /// (physical block, bytes requested) per write attempt
    pub writes: Vec<(u64, usize)>,
    pub busy_queries: u32,
    pub geometry_queries: u32,
    pub opens: u32,
    pub closes: u32,
}

/// In-memory drive with injectable faults
pub struct SimDevice {
    pub state: Mutex<SimState>,
}

impl SimDevice {
    pub fn new(blocks: usize) -> Self {
        Self {
            state: Mutex::new(SimState {
                data: vec![0u8; blocks * BLOCK_SIZE],
                erase_block_size: 4096,
                write_block_size: 512,
                ..Default::default()
            }),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn resets(&self) -> usize {
        self.with(|s| {
            s.commands
                .iter()
                .filter(|c| **c == DriveCommand::Reset)
                .count()
        })
    }

    pub fn transfer_attempts(&self) -> usize {
        self.with(|s| s.reads.len() + s.writes.len())
    }

    /// Any call at all reached the device
    pub fn touched(&self) -> bool {
        self.with(|s| {
            !s.commands.is_empty()
                || !s.reads.is_empty()
                || !s.writes.is_empty()
                || s.busy_queries > 0
                || s.geometry_queries > 0
                || s.opens > 0
        })
    }

    pub fn fill_block(&self, block: u64, value: u8) {
        self.with(|s| {
            let start = block as usize * BLOCK_SIZE;
            s.data[start..start + BLOCK_SIZE].fill(value);
        })
    }

    pub fn block(&self, block: u64) -> Vec<u8> {
        self.with(|s| {
            let start = block as usize * BLOCK_SIZE;
            s.data[start..start + BLOCK_SIZE].to_vec()
        })
    }

    fn short_transfer(s: &mut SimState) -> bool {
        if s.never_completes {
            return true;
        }
        if s.failing_transfers > 0 {
            s.failing_transfers -= 1;
            return true;
        }
        false
    }
}

impl DriveDevice for SimDevice {
    fn open(&self) -> Result<(), DeviceError> {
        self.with(|s| {
            s.opens += 1;
            if s.open_fails {
                Err(DeviceError(EIO))
            } else {
                Ok(())
            }
        })
    }

    fn close(&self) -> Result<(), DeviceError> {
        self.with(|s| s.closes += 1);
        Ok(())
    }

    fn read(&self, block: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        self.with(|s| {
            s.reads.push((block, buf.len()));
            if Self::short_transfer(s) {
                return Ok(buf.len() / 2);
            }
            let start = block as usize * BLOCK_SIZE;
            if start + buf.len() > s.data.len() {
                return Err(DeviceError(EIO));
            }
            buf.copy_from_slice(&s.data[start..start + buf.len()]);
            Ok(buf.len())
        })
    }

    fn write(&self, block: u64, buf: &[u8]) -> Result<usize, DeviceError> {
        self.with(|s| {
            s.writes.push((block, buf.len()));
            if Self::short_transfer(s) {
                return Ok(0);
            }
            let start = block as usize * BLOCK_SIZE;
            if start + buf.len() > s.data.len() {
                return Err(DeviceError(EIO));
            }
            s.data[start..start + buf.len()].copy_from_slice(buf);
            Ok(buf.len())
        })
    }

    fn is_busy(&self) -> Result<bool, DeviceError> {
        self.with(|s| {
            s.busy_queries += 1;
            if s.busy_query_fails {
                return Err(DeviceError(EIO));
            }
            if s.busy_polls > 0 {
                s.busy_polls -= 1;
                return Ok(true);
            }
            Ok(false)
        })
    }

    fn geometry(&self) -> Result<DriveGeometry, DeviceError> {
        self.with(|s| {
            s.geometry_queries += 1;
            if s.geometry_fails {
                return Err(DeviceError(EIO));
            }
            Ok(DriveGeometry {
                total_blocks: (s.data.len() / BLOCK_SIZE) as u64,
                erase_block_size: s.erase_block_size,
                write_block_size: s.write_block_size,
            })
        })
    }

    fn command(&self, command: DriveCommand) -> Result<(), DeviceError> {
        self.with(|s| {
            s.commands.push(command);
            match command {
                DriveCommand::EraseBlocks { .. } | DriveCommand::EraseDevice if s.erase_fails => {
                    Err(DeviceError(EIO))
                }
                _ => Ok(()),
            }
        })
    }
}

/// Clock whose sleeps only advance simulated time, recording each one
#[derive(Default)]
pub struct SimClock {
    now: Mutex<u64>,
    pub sleeps: Mutex<Vec<u32>>,
    pub unix: Option<u64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unix_time(secs: u64) -> Self {
        Self {
            unix: Some(secs),
            ..Default::default()
        }
    }

    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        *self.now.lock().unwrap()
    }

    fn sleep_us(&self, us: u32) {
        self.sleeps.lock().unwrap().push(us);
        *self.now.lock().unwrap() += us as u64;
    }

    fn unix_time(&self) -> Option<u64> {
        self.unix
    }
}

/// Real monotonic clock for multi-threaded tests
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep_us(&self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CONTEXT: Cell<usize> = const { Cell::new(0) };
}

/// One context id per std thread
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn current() -> ContextId {
        ThreadScheduler.current_context()
    }
}

impl Scheduler for ThreadScheduler {
    fn current_context(&self) -> ContextId {
        CONTEXT.with(|ctx| {
            if ctx.get() == 0 {
                ctx.set(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
            }
            ContextId::new(ctx.get()).expect("context ids start at 1")
        })
    }
}

/// In-memory block device for testing, 512-byte sectors
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Vec<u8>,
    pub block_size: usize,
}

impl MemoryBlockDevice {
    pub fn new(blocks: usize) -> Self {
        Self {
            data: vec![0u8; blocks * 512],
            block_size: 512,
        }
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::new(self.block_size as u32).expect("valid block size")
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok((self.data.len() / self.block_size) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + src.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
