//! Busy-wait governor
//!
//! Polls a device's busy signal before and after transfers. The sleep
//! between polls starts at the volume's base delay and doubles every
//! `backoff_interval_polls` polls up to the policy ceiling.
//!
//! A wait that runs out of polls is a soft timeout: it is logged and the
//! caller carries on. The transfer that follows decides whether the
//! device really failed.

use crate::config::{BusyWaitParams, BusyWaitPolicy};
use crate::device::DriveDevice;
use crate::time::Clock;

/// How a busy wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Device reported ready
    Ready,
    /// Poll budget exhausted while still busy
    SoftTimeout,
    /// Busy query itself failed; treated as ready
    QueryFailed,
}

/// Summary of one `wait_until_ready` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    pub outcome: WaitOutcome,
    /// Sleeps taken while the device was busy
    pub polls: u32,
    /// Sum of requested sleep time
    pub slept_us: u64,
}

/// Busy polling with capped exponential back-off.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusyWaitGovernor {
    policy: BusyWaitPolicy,
}

impl BusyWaitGovernor {
    pub const fn new(policy: BusyWaitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BusyWaitPolicy {
        &self.policy
    }

    /// Block until `device` is not busy or the poll budget in `params`
    /// runs out. Never fails.
    pub fn wait_until_ready(
        &self,
        device: &dyn DriveDevice,
        params: &BusyWaitParams,
        clock: &dyn Clock,
    ) -> WaitReport {
        let mut polls: u32 = 0;
        let mut slept_us: u64 = 0;

        let outcome = loop {
            match device.is_busy() {
                Ok(false) => break WaitOutcome::Ready,
                Ok(true) => {}
                Err(e) => {
                    log::warn!("busy query failed: {}", e);
                    break WaitOutcome::QueryFailed;
                }
            }

            if !params.waits_forever() && polls >= params.timeout_count {
                break WaitOutcome::SoftTimeout;
            }

            let delay = self.policy.delay_for_poll(params.base_delay_us, polls);
            if delay == 0 {
                core::hint::spin_loop();
            } else {
                clock.sleep_us(delay);
            }
            slept_us += delay as u64;
            polls = polls.saturating_add(1);
        };

        match outcome {
            WaitOutcome::SoftTimeout => log::warn!(
                "device still busy after {} polls ({} us), continuing",
                polls,
                slept_us
            ),
            _ if polls > 0 => log::trace!("device ready after {} polls", polls),
            _ => {}
        }

        WaitReport {
            outcome,
            polls,
            slept_us,
        }
    }
}
