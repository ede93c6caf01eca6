//! Volume locks
//!
//! One reentrant lock per volume id. The FAT engine takes it on entry to
//! every API call and drops it on exit, which totally orders all sector
//! I/O against that volume.
//!
//! Ownership is recorded per lock as the holder's [`ContextId`]. That
//! record is what lets an exiting task's locks be found and force-released
//! (see [`LockTable::release_context`]).
//!
//! # Lock protocol
//!
//! - `acquire` polls with the host clock until granted or the timeout
//!   elapses. The holder may acquire again without blocking.
//! - Every successful `acquire` is paired with one `release`.
//! - `force_release` clears ownership no matter who holds the lock. It is
//!   `unsafe`: the previous holder must be known never to run again.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::config::{LockPolicy, VolumeId, MAX_VOLUMES};
use crate::error::{DriveError, Result};
use crate::time::{Clock, ContextId, Scheduler};

const NO_OWNER: usize = 0;

/// Reentrant, timed mutual exclusion for one volume.
pub struct VolumeLock {
    owner: AtomicUsize,
    // Only written by the owner (or by force_release)
    depth: AtomicU32,
}

impl VolumeLock {
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(NO_OWNER),
            depth: AtomicU32::new(0),
        }
    }

    /// Take the lock for `ctx` if it is free or already held by `ctx`.
    pub fn try_acquire(&self, ctx: ContextId) -> bool {
        let me = ctx.get();

        if self.owner.load(Ordering::Acquire) == me {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        if self
            .owner
            .compare_exchange(NO_OWNER, me, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.depth.store(1, Ordering::Relaxed);
            return true;
        }

        false
    }

    /// Block until granted or `timeout_us` passes on `clock`.
    pub fn acquire(
        &self,
        ctx: ContextId,
        clock: &dyn Clock,
        timeout_us: u64,
        poll_interval_us: u32,
    ) -> Result<()> {
        let start = clock.now_us();

        loop {
            if self.try_acquire(ctx) {
                return Ok(());
            }

            let elapsed = clock.now_us().saturating_sub(start);
            if elapsed >= timeout_us {
                return Err(DriveError::TimedOut);
            }

            let remaining = timeout_us - elapsed;
            let nap = (poll_interval_us as u64).min(remaining).max(1);
            clock.sleep_us(nap as u32);
        }
    }

    /// Undo one `acquire` by `ctx`.
    pub fn release(&self, ctx: ContextId) -> Result<()> {
        if self.owner.load(Ordering::Acquire) != ctx.get() {
            return Err(DriveError::NotOwner);
        }

        let depth = self.depth.load(Ordering::Relaxed);
        if depth > 1 {
            self.depth.store(depth - 1, Ordering::Relaxed);
        } else {
            self.depth.store(0, Ordering::Relaxed);
            self.owner.store(NO_OWNER, Ordering::Release);
        }
        Ok(())
    }

    /// Clear ownership regardless of holder. Returns the previous holder.
    ///
    /// # Safety
    /// The previous holder must never resume while believing it still owns
    /// the lock (it was killed, or has otherwise been confirmed dead).
    /// Otherwise two contexts will run inside the volume at once.
    pub unsafe fn force_release(&self) -> Option<ContextId> {
        self.depth.store(0, Ordering::Relaxed);
        let previous = self.owner.swap(NO_OWNER, Ordering::AcqRel);
        ContextId::new(previous)
    }

    pub fn holder(&self) -> Option<ContextId> {
        ContextId::new(self.owner.load(Ordering::Acquire))
    }

    /// Nesting depth of the current holder, 0 when free.
    pub fn depth(&self) -> u32 {
        if self.holder().is_none() {
            return 0;
        }
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_locked(&self) -> bool {
        self.holder().is_some()
    }
}

impl Default for VolumeLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-side handle for a volume's sync object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncHandle {
    volume: VolumeId,
}

impl SyncHandle {
    pub fn volume(&self) -> VolumeId {
        self.volume
    }
}

/// The per-volume locks plus the host hooks they need.
pub struct LockTable<'h> {
    locks: [VolumeLock; MAX_VOLUMES],
    created: [AtomicBool; MAX_VOLUMES],
    clock: &'h dyn Clock,
    scheduler: &'h dyn Scheduler,
    policy: LockPolicy,
}

impl<'h> LockTable<'h> {
    const FREE_LOCK: VolumeLock = VolumeLock::new();
    const NOT_CREATED: AtomicBool = AtomicBool::new(false);

    pub fn new(clock: &'h dyn Clock, scheduler: &'h dyn Scheduler) -> Self {
        Self {
            locks: [Self::FREE_LOCK; MAX_VOLUMES],
            created: [Self::NOT_CREATED; MAX_VOLUMES],
            clock,
            scheduler,
            policy: LockPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    pub fn lock(&self, id: VolumeId) -> Result<&VolumeLock> {
        self.locks.get(id as usize).ok_or(DriveError::InvalidVolume)
    }

    /// Acquire volume `id` for the current context.
    pub fn acquire(&self, id: VolumeId, timeout_us: u64) -> Result<()> {
        let lock = self.lock(id)?;
        let ctx = self.scheduler.current_context();

        lock.acquire(ctx, self.clock, timeout_us, self.policy.poll_interval_us)
            .map_err(|e| {
                log::error!(
                    "volume {}: lock not granted to context {} within {} us (held by {:?})",
                    id,
                    ctx.get(),
                    timeout_us,
                    lock.holder()
                );
                e
            })
    }

    /// Release one level of the current context's hold on volume `id`.
    pub fn release(&self, id: VolumeId) -> Result<()> {
        let lock = self.lock(id)?;
        let ctx = self.scheduler.current_context();

        lock.release(ctx).map_err(|e| {
            log::warn!(
                "volume {}: context {} released a lock held by {:?}",
                id,
                ctx.get(),
                lock.holder()
            );
            e
        })
    }

    /// Acquire with the policy timeout and release on drop.
    pub fn guard(&self, id: VolumeId) -> Result<VolumeGuard<'_, 'h>> {
        self.acquire(id, self.policy.timeout_us)?;
        Ok(VolumeGuard {
            table: self,
            volume: id,
            _not_send: PhantomData,
        })
    }

    /// Administrative unlock of volume `id`.
    ///
    /// # Safety
    /// See [`VolumeLock::force_release`].
    pub unsafe fn force_release(&self, id: VolumeId) -> Result<Option<ContextId>> {
        let previous = self.lock(id)?.force_release();
        if let Some(ctx) = previous {
            log::warn!("volume {}: lock forcibly taken from context {}", id, ctx.get());
        }
        Ok(previous)
    }

    pub fn holder(&self, id: VolumeId) -> Result<Option<ContextId>> {
        Ok(self.lock(id)?.holder())
    }

    /// Volumes currently held by `ctx`.
    pub fn held_by(&self, ctx: ContextId) -> impl Iterator<Item = VolumeId> + '_ {
        self.locks
            .iter()
            .enumerate()
            .filter(move |(_, lock)| lock.holder() == Some(ctx))
            .map(|(id, _)| id as VolumeId)
    }

    /// Force-release every volume held by a terminated context. Returns
    /// how many locks were freed.
    ///
    /// # Safety
    /// `ctx` must have exited and must never run again.
    pub unsafe fn release_context(&self, ctx: ContextId) -> usize {
        let mut released = 0;
        for (id, lock) in self.locks.iter().enumerate() {
            if lock.holder() == Some(ctx) {
                lock.force_release();
                log::warn!("volume {}: released lock of exited context {}", id, ctx.get());
                released += 1;
            }
        }
        released
    }

    // --- FatFs sync-object contract -------------------------------------

    /// Create the sync object for a volume; `None` for an id out of range.
    pub fn create_sync_object(&self, volume: VolumeId) -> Option<SyncHandle> {
        let created = self.created.get(volume as usize)?;
        created.store(true, Ordering::Release);
        Some(SyncHandle { volume })
    }

    /// Fails while the lock is held: a held mutex cannot be destroyed.
    pub fn delete_sync_object(&self, handle: SyncHandle) -> bool {
        let Ok(lock) = self.lock(handle.volume) else {
            return false;
        };
        if lock.is_locked() {
            log::warn!("volume {}: sync object deleted while held", handle.volume);
            return false;
        }
        self.created[handle.volume as usize].store(false, Ordering::Release);
        true
    }

    /// Lock the volume for an engine call, waiting up to the policy
    /// timeout. `false` makes the engine return `FR_TIMEOUT`.
    pub fn request_grant(&self, handle: SyncHandle) -> bool {
        self.request_grant_timeout(handle, self.policy.timeout_us)
    }

    pub fn request_grant_timeout(&self, handle: SyncHandle, timeout_us: u64) -> bool {
        if !self.is_created(handle) {
            log::error!("volume {}: grant requested without sync object", handle.volume);
            return false;
        }
        self.acquire(handle.volume, timeout_us).is_ok()
    }

    pub fn release_grant(&self, handle: SyncHandle) {
        // Failure is already logged by release()
        let _ = self.release(handle.volume);
    }

    pub fn is_created(&self, handle: SyncHandle) -> bool {
        self.created
            .get(handle.volume as usize)
            .map(|created| created.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

/// Held volume lock. Released when dropped.
pub struct VolumeGuard<'t, 'h> {
    table: &'t LockTable<'h>,
    volume: VolumeId,
    // Ownership belongs to the acquiring context
    _not_send: PhantomData<*const ()>,
}

impl VolumeGuard<'_, '_> {
    pub fn volume(&self) -> VolumeId {
        self.volume
    }
}

impl Drop for VolumeGuard<'_, '_> {
    fn drop(&mut self) {
        let _ = self.table.release(self.volume);
    }
}
