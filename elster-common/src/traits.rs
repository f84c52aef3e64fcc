//! Traits at the boundary to the CAN bus driver
//!
//! The engine only ever sends through these traits. Drivers report a failed send by handing the
//! frame back, and the engine keeps it queued for the next tick.
use std::error;

use crate::messages::CanMessage;

/// A frame the driver could not put on the bus
///
/// Sending is expected to fail transiently (bus busy, lost arbitration, full driver queue), so the
/// frame is returned for a later retry.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct CanSendError(pub CanMessage);

impl core::fmt::Display for CanSendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to send CAN message: {:?}", self.0)
    }
}

impl error::Error for CanSendError {}

/// A bus driver which sends without blocking
pub trait CanSender {
    /// Hand a frame to the driver
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError>;
}

/// Any closure taking a frame is a sender
impl<F> CanSender for F
where
    F: FnMut(CanMessage) -> Result<(), CanSendError>,
{
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        self(msg)
    }
}

/// A bus driver with an async send
pub trait AsyncCanSender: Send {
    /// Hand a frame to the driver
    fn send(
        &mut self,
        msg: CanMessage,
    ) -> impl core::future::Future<Output = Result<(), CanSendError>>;
}

/// A bus driver delivering received frames
pub trait AsyncCanReceiver: Send {
    /// Error returned when the driver fails
    type Error: error::Error + Send + 'static;

    /// Return a frame if one has already been received, without waiting
    fn try_recv(&mut self) -> Result<Option<CanMessage>, Self::Error>;

    /// Wait for the next frame
    fn recv(
        &mut self,
    ) -> impl core::future::Future<Output = Result<CanMessage, Self::Error>> + Send;

    /// True if `error` reports something seen on the bus, such as an error frame, rather than a
    /// failure of the receiver
    ///
    /// Receiving can carry on after such errors. By default every error is a receiver failure.
    fn is_bus_event(&self, _error: &Self::Error) -> bool {
        false
    }

    /// Discard all frames received so far
    fn flush(&mut self) -> Result<(), Self::Error> {
        while self.try_recv()?.is_some() {}
        Ok(())
    }
}
