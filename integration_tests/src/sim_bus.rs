//! An in-memory CAN bus
//!
//! Every message sent on the bus is delivered to all receivers, including the sender's own, and to
//! each simulated member. Replies from members are delivered to all receivers immediately, so a
//! request and its response are both available as soon as `send` returns.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use elster_common::{
    traits::{AsyncCanReceiver, AsyncCanSender, CanSendError, CanSender},
    CanMember, CanMessage,
};
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    StreamExt as _,
};
use snafu::Snafu;

use crate::heat_pump::SimHeatPump;

#[derive(Default)]
struct Shared {
    listeners: Mutex<Vec<UnboundedSender<CanMessage>>>,
    members: Mutex<Vec<SimHeatPump>>,
    offline: AtomicBool,
}

impl Shared {
    fn broadcast(&self, msg: CanMessage) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|tx| tx.unbounded_send(msg).is_ok());
    }

    fn send(&self, msg: CanMessage) -> Result<(), CanSendError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(CanSendError(msg));
        }
        self.broadcast(msg);
        let replies: Vec<CanMessage> = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .filter_map(|member| member.handle_message(msg))
            .collect();
        for reply in replies {
            self.broadcast(reply);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SimBus {
    shared: Arc<Shared>,
}

impl SimBus {
    pub fn new(members: Vec<SimHeatPump>) -> Self {
        let shared = Shared {
            members: Mutex::new(members),
            ..Default::default()
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn new_sender(&self) -> SimBusSender {
        SimBusSender {
            shared: self.shared.clone(),
        }
    }

    pub fn new_receiver(&self) -> SimBusReceiver {
        let (tx, rx) = unbounded();
        self.shared.listeners.lock().unwrap().push(tx);
        SimBusReceiver { rx }
    }

    /// While offline, every send fails
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::Relaxed);
    }

    /// Accessor to allow tests to access members while they are owned by the bus
    ///
    /// Returns None if there is no simulated member for `member`.
    pub fn with_member<T>(
        &self,
        member: CanMember,
        f: impl FnOnce(&mut SimHeatPump) -> T,
    ) -> Option<T> {
        let mut members = self.shared.members.lock().unwrap();
        members.iter_mut().find(|m| m.member() == member).map(f)
    }
}

#[derive(Clone)]
pub struct SimBusSender {
    shared: Arc<Shared>,
}

impl CanSender for SimBusSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        self.shared.send(msg)
    }
}

impl AsyncCanSender for SimBusSender {
    async fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        self.shared.send(msg)
    }
}

/// Error returned when the bus has been dropped
#[derive(Debug, Snafu)]
#[snafu(display("Simulated bus closed"))]
pub struct BusClosedError;

pub struct SimBusReceiver {
    rx: UnboundedReceiver<CanMessage>,
}

impl AsyncCanReceiver for SimBusReceiver {
    type Error = BusClosedError;

    fn try_recv(&mut self) -> Result<Option<CanMessage>, BusClosedError> {
        match self.rx.try_next() {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(BusClosedError),
            Err(_) => Ok(None),
        }
    }

    async fn recv(&mut self) -> Result<CanMessage, BusClosedError> {
        self.rx.next().await.ok_or(BusClosedError)
    }
}
