//! Polling scheduler
//!
//! Tracks when each endpoint is next due, and what it should do when it is. Time is supplied by
//! the caller as a monotonic timestamp in microseconds.
//!
//! Poll times form a grid anchored at the first poll: an endpoint first polled at `t0` with
//! interval `i` is next due at `t0 + i`, `t0 + 2i`, and so on, regardless of how late the ticks
//! which serviced it were. When whole grid points were missed, the late poll catches up once and
//! the next poll is the first grid point at least one interval after it.
use std::collections::BTreeMap;

use crate::endpoint::EndpointHandle;

/// Delay between transmitting a write and reading the value back
pub const READBACK_DELAY_US: u64 = 500_000;

/// The action an endpoint should take on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Transmit a pending write with the encoded value
    Write([u8; 2]),
    /// Read the value back after a write
    ReadBack,
    /// Regular poll
    Poll,
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    interval_us: u64,
    /// None until the first poll
    next_poll_us: Option<u64>,
    pending_write: Option<[u8; 2]>,
    /// Writes queued but not yet on the bus
    writes_in_flight: u32,
    read_back_us: Option<u64>,
}

/// Per endpoint schedule state
#[derive(Debug, Default)]
pub struct PollScheduler {
    schedules: BTreeMap<EndpointHandle, Schedule>,
}

impl PollScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scheduling an endpoint. It will be due on the next tick.
    pub fn add(&mut self, handle: EndpointHandle, interval_us: u64) {
        self.schedules.insert(
            handle,
            Schedule {
                interval_us: interval_us.max(1),
                next_poll_us: None,
                pending_write: None,
                writes_in_flight: 0,
                read_back_us: None,
            },
        );
    }

    /// Stop scheduling an endpoint
    pub fn remove(&mut self, handle: EndpointHandle) {
        self.schedules.remove(&handle);
    }

    /// Queue a write for an endpoint
    ///
    /// A write which has not been transmitted yet is replaced. Returns false if the endpoint is
    /// not scheduled.
    pub fn request_write(&mut self, handle: EndpointHandle, value: [u8; 2]) -> bool {
        match self.schedules.get_mut(&handle) {
            Some(schedule) => {
                schedule.pending_write = Some(value);
                true
            }
            None => false,
        }
    }

    /// True if a write is waiting to be transmitted for the endpoint
    pub fn has_pending_write(&self, handle: EndpointHandle) -> bool {
        self.schedules
            .get(&handle)
            .is_some_and(|s| s.pending_write.is_some())
    }

    /// Get the action due for an endpoint at `now_us`
    ///
    /// Writes take priority over read-backs, which take priority over polls. Nothing changes until
    /// [fired](Self::fired) is called, so an action which cannot be carried out is offered again
    /// on the next tick.
    pub fn due(&self, handle: EndpointHandle, now_us: u64) -> Option<Action> {
        let schedule = self.schedules.get(&handle)?;
        if let Some(value) = schedule.pending_write {
            return Some(Action::Write(value));
        }
        if schedule.read_back_us.is_some_and(|t| t <= now_us) {
            return Some(Action::ReadBack);
        }
        if schedule.next_poll_us.map_or(true, |t| t <= now_us) {
            return Some(Action::Poll);
        }
        None
    }

    /// Record that the frames of `action` were queued at `now_us`
    ///
    /// The read-back following a write is only armed once the write has been transmitted, see
    /// [write_transmitted](Self::write_transmitted).
    pub fn fired(&mut self, handle: EndpointHandle, action: Action, now_us: u64) {
        let Some(schedule) = self.schedules.get_mut(&handle) else {
            return;
        };
        match action {
            Action::Write(_) => {
                schedule.pending_write = None;
                schedule.writes_in_flight = schedule.writes_in_flight.saturating_add(1);
            }
            Action::ReadBack => schedule.read_back_us = None,
            Action::Poll => {
                let due = schedule.next_poll_us.unwrap_or(now_us);
                schedule.next_poll_us = Some(next_grid_point(due, schedule.interval_us, now_us));
            }
        }
    }

    /// Record that a write frame of the endpoint was handed to the bus at `now_us`
    ///
    /// Arms the read-back [READBACK_DELAY_US] later. A later write pushes the read-back back.
    pub fn write_transmitted(&mut self, handle: EndpointHandle, now_us: u64) {
        let Some(schedule) = self.schedules.get_mut(&handle) else {
            return;
        };
        if schedule.writes_in_flight == 0 {
            return;
        }
        schedule.writes_in_flight -= 1;
        schedule.read_back_us = Some(now_us.saturating_add(READBACK_DELAY_US));
    }

    /// The time at which the next regular poll of the endpoint is due
    ///
    /// Returns None for endpoints which have not been polled yet, or are not scheduled.
    pub fn next_poll(&self, handle: EndpointHandle) -> Option<u64> {
        self.schedules.get(&handle)?.next_poll_us
    }
}

/// The next point of the grid `due + k * interval` after a poll at `now`
///
/// A poll serviced within its own grid slot keeps the grid. A poll which missed whole grid points
/// is a catch-up, and the next one is the first grid point at least `interval` after it.
fn next_grid_point(due: u64, interval: u64, now: u64) -> u64 {
    let next = due.saturating_add(interval);
    if next > now {
        return next;
    }
    let target = now.saturating_add(interval);
    let slots = (target - due).div_ceil(interval);
    due.saturating_add(interval.saturating_mul(slots))
}
