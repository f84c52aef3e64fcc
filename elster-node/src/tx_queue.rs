//! Paced transmit queue
//!
//! Frames are released to the bus at most once per transmit interval, so that a burst of polls does
//! not flood the bus. A frame the driver fails to send stays at the head of the queue.
//!
//! Write frames carry the handle of their endpoint, so the engine learns when a write actually went
//! out on the bus.
use defmt_or_log::debug;
use elster_common::{
    messages::CanMessage,
    traits::{AsyncCanSender, CanSender},
};
use heapless::Deque;

use crate::endpoint::EndpointHandle;

/// Maximum number of frames waiting for transmission
pub const TX_QUEUE_DEPTH: usize = 32;

/// Result of a transmit attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOutcome {
    /// Frames handed to the driver
    pub sent: u32,
    /// Frames rejected by the driver
    pub failed: u32,
    /// Endpoints whose write frame was handed to the driver, in transmit order
    pub writes: Vec<EndpointHandle>,
}

#[derive(Debug, Clone, Copy)]
struct Queued {
    msg: CanMessage,
    write_for: Option<EndpointHandle>,
}

/// FIFO of outbound frames
#[derive(Debug)]
pub struct TxQueue {
    frames: Deque<Queued, TX_QUEUE_DEPTH>,
    interval_us: u64,
    last_sent_us: Option<u64>,
}

impl TxQueue {
    /// Create an empty queue releasing one frame per `interval_us`
    ///
    /// An interval of zero disables pacing.
    pub fn new(interval_us: u64) -> Self {
        Self {
            frames: Deque::new(),
            interval_us,
            last_sent_us: None,
        }
    }

    /// Number of frames which can still be queued
    pub fn free(&self) -> usize {
        self.frames.capacity() - self.frames.len()
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if no frames are queued
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a frame, returning it if the queue is full
    pub fn push(&mut self, msg: CanMessage) -> Result<(), CanMessage> {
        self.enqueue(msg, None)
    }

    /// Append the write frame of an endpoint, returning it if the queue is full
    ///
    /// The handle is reported in [TxOutcome::writes] once the frame is sent.
    pub fn push_write(
        &mut self,
        msg: CanMessage,
        handle: EndpointHandle,
    ) -> Result<(), CanMessage> {
        self.enqueue(msg, Some(handle))
    }

    fn enqueue(
        &mut self,
        msg: CanMessage,
        write_for: Option<EndpointHandle>,
    ) -> Result<(), CanMessage> {
        self.frames
            .push_back(Queued { msg, write_for })
            .map_err(|queued| queued.msg)
    }

    fn ready(&self, now_us: u64) -> bool {
        !self.frames.is_empty()
            && self
                .last_sent_us
                .map_or(true, |last| now_us.saturating_sub(last) >= self.interval_us)
    }

    fn take(&mut self, now_us: u64) -> Option<Queued> {
        if !self.ready(now_us) {
            return None;
        }
        self.frames.pop_front()
    }

    fn sent(&mut self, queued: Queued, now_us: u64, outcome: &mut TxOutcome) -> bool {
        outcome.sent += 1;
        if let Some(handle) = queued.write_for {
            outcome.writes.push(handle);
        }
        self.last_sent_us = Some(now_us);
        // Without pacing, keep draining
        self.interval_us == 0
    }

    fn failed(&mut self, queued: Queued, msg: CanMessage) {
        debug!("Transmit failed, {} frames queued", self.frames.len() + 1);
        // Cannot fail, the slot was just freed
        self.frames.push_front(Queued { msg, ..queued }).ok();
    }

    /// Release due frames to `sender`
    pub fn flush(&mut self, now_us: u64, sender: &mut dyn CanSender) -> TxOutcome {
        let mut outcome = TxOutcome::default();
        while let Some(queued) = self.take(now_us) {
            match sender.send(queued.msg) {
                Ok(()) => {
                    if !self.sent(queued, now_us, &mut outcome) {
                        break;
                    }
                }
                Err(e) => {
                    self.failed(queued, e.0);
                    outcome.failed += 1;
                    break;
                }
            }
        }
        outcome
    }

    /// Release due frames to an async `sender`
    pub async fn flush_async<S: AsyncCanSender>(
        &mut self,
        now_us: u64,
        sender: &mut S,
    ) -> TxOutcome {
        let mut outcome = TxOutcome::default();
        while let Some(queued) = self.take(now_us) {
            match sender.send(queued.msg).await {
                Ok(()) => {
                    if !self.sent(queued, now_us, &mut outcome) {
                        break;
                    }
                }
                Err(e) => {
                    self.failed(queued, e.0);
                    outcome.failed += 1;
                    break;
                }
            }
        }
        outcome
    }
}
