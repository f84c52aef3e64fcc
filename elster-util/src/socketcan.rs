use std::sync::Arc;

use elster_common::{
    messages::{CanId, CanMessage},
    traits::{AsyncCanReceiver, AsyncCanSender, CanSendError},
};
use futures::FutureExt as _;
use snafu::Snafu;
use socketcan::{
    tokio::CanSocket, CanFilter, CanFrame, EmbeddedFrame, Frame, IoError, ShouldRetry,
    SocketOptions,
};

/// Flag marking extended IDs in socketcan filter IDs and masks
const EFF_FLAG: u32 = 0x8000_0000;
/// Mask of the bits of a standard ID
const SFF_MASK: u32 = 0x7FF;

fn socketcan_id_to_elster_id(id: socketcan::CanId) -> CanId {
    match id {
        socketcan::CanId::Standard(id) => CanId::std(id.as_raw()),
        socketcan::CanId::Extended(id) => CanId::extended(id.as_raw()),
    }
}

fn elster_id_to_socketcan_id(id: CanId) -> Option<socketcan::CanId> {
    Some(match id {
        CanId::Extended(id) => socketcan::ExtendedId::new(id)?.into(),
        CanId::Std(id) => socketcan::StandardId::new(id)?.into(),
    })
}

fn socketcan_frame_to_elster_message(frame: CanFrame) -> Result<CanMessage, ReceiveError> {
    let can_id = socketcan_id_to_elster_id(frame.can_id());

    match frame {
        CanFrame::Data(frame) => Ok(CanMessage::new(can_id, frame.data())),
        CanFrame::Remote(_) => RemoteFrameSnafu { can_id }.fail(),
        CanFrame::Error(frame) => ErrorFrameSnafu {
            error_bits: frame.error_bits() as u32,
        }
        .fail(),
    }
}

/// Returns None for IDs out of range
fn elster_message_to_socketcan_frame(msg: &CanMessage) -> Option<CanFrame> {
    let id = elster_id_to_socketcan_id(msg.id())?;
    CanFrame::new(id, msg.data())
}

/// A CAN filter for socketcan interfaces.
///
/// This struct wraps socketcan filter functionality, allowing callers to filter incoming CAN
/// messages by ID and mask without directly depending on socketcan types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SocketCanFilter {
    id: u32,
    mask: u32,
}

impl SocketCanFilter {
    /// Create a new CAN filter with the specified ID and mask.
    pub fn new(id: u32, mask: u32) -> Self {
        Self { id, mask }
    }

    /// A filter accepting exactly one standard ID
    ///
    /// Extended frames with the same numeric ID are rejected.
    pub fn standard(id: u16) -> Self {
        Self::new(id as u32 & SFF_MASK, SFF_MASK | EFF_FLAG)
    }

    /// Build standard ID filters for a list of IDs, e.g. from
    /// [Engine::filter_hint](https://docs.rs/elster-node)
    pub fn for_ids(ids: &[u16]) -> Vec<Self> {
        ids.iter().map(|id| Self::standard(*id)).collect()
    }
}

/// A socketcan-based CAN message receiver.
///
/// This struct implements `AsyncCanReceiver` for receiving CAN messages from a socketcan
/// interface. Multiple receivers can share the same underlying socket through `Arc<CanSocket>`.
#[derive(Debug, Clone)]
pub struct SocketCanReceiver {
    socket: Arc<CanSocket>,
}

/// Error returned by [SocketCanReceiver]
#[derive(Debug, Snafu)]
pub enum ReceiveError {
    /// The socket failed
    #[snafu(display("Socket error: {source}"))]
    Io {
        /// The underlying IO error
        source: IoError,
    },
    /// The controller reported a bus error
    #[snafu(display("CAN error frame received, error bits 0x{error_bits:x}"))]
    ErrorFrame {
        /// The error class bits of the frame
        error_bits: u32,
    },
    /// A remote frame was received. These are not used by the Elster protocol.
    #[snafu(display("Unexpected remote frame with ID 0x{:x}", can_id.raw()))]
    RemoteFrame {
        /// The ID of the frame
        can_id: CanId,
    },
}

impl ReceiveError {
    /// True for frames received from the bus which carry no data, as opposed to socket failures
    pub fn is_bus_event(&self) -> bool {
        matches!(self, Self::ErrorFrame { .. } | Self::RemoteFrame { .. })
    }
}

impl AsyncCanReceiver for SocketCanReceiver {
    type Error = ReceiveError;

    fn is_bus_event(&self, error: &ReceiveError) -> bool {
        error.is_bus_event()
    }

    fn try_recv(&mut self) -> Result<Option<CanMessage>, ReceiveError> {
        // Must be called from within a tokio runtime
        self.recv().now_or_never().transpose()
    }

    async fn recv(&mut self) -> Result<CanMessage, ReceiveError> {
        loop {
            match self.socket.read_frame().await {
                Ok(frame) => return socketcan_frame_to_elster_message(frame),
                Err(e) => {
                    if !e.should_retry() {
                        return Err(ReceiveError::Io { source: e });
                    }
                }
            }
        }
    }
}

/// A socketcan-based CAN message sender.
///
/// This struct implements `AsyncCanSender` for sending CAN messages to a socketcan interface.
/// Multiple senders can share the same underlying socket through `Arc<CanSocket>`.
#[derive(Debug, Clone)]
pub struct SocketCanSender {
    socket: Arc<CanSocket>,
}

impl AsyncCanSender for SocketCanSender {
    async fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        let Some(frame) = elster_message_to_socketcan_frame(&msg) else {
            return Err(CanSendError(msg));
        };
        match self.socket.write_frame(frame).await {
            Ok(()) => Ok(()),
            Err(_) => Err(CanSendError(msg)),
        }
    }
}

/// Open a socketcan device and split it into a sender and receiver object for use with the elster
/// engine
///
/// # Arguments
/// * `device` - The name of the socketcan device to open, e.g. "vcan0", or "can0"
/// * `filters` - Optional receive filters. Without filters, all frames are received.
///
/// A key benefit of this is that by creating both sender and receiver objects from a shared socket,
/// the receiver will not receive messages sent by the sender.
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
    filters: Option<&[SocketCanFilter]>,
) -> Result<(SocketCanSender, SocketCanReceiver), IoError> {
    let device: &str = device.as_ref();
    let socket = CanSocket::open(device)?;
    if let Some(socket_filters) = filters {
        // Map our SocketCanFilters to the native CanFilter
        let mapped_filters: Vec<CanFilter> = socket_filters
            .iter()
            .map(|filter| CanFilter::new(filter.id, filter.mask))
            .collect();
        socket.set_filters(&mapped_filters)?;
    }
    let socket = Arc::new(socket);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender { socket };
    Ok((sender, receiver))
}
