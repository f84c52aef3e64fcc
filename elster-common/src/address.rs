//! Bus address resolver
//!
//! An Elster frame is addressed in two places:
//!
//! - The CAN ID is the address of the *sending* member.
//! - The first two payload bytes hold the *receiving* member's address, split into its upper four
//!   and lower seven bits, with the message kind in the low nibble of the first byte.
//!
//! ```text
//! data[0] = ((receiver >> 3) & 0xF0) | kind
//! data[1] = receiver & 0x7F
//! ```
//!
//! The Elster index follows the header, either as a single byte in `data[2]`, or in the extended
//! form as `0xFA` followed by a big-endian 16-bit index.
use crate::{
    can_member::CanMember,
    messages::{CanId, CanMessage, MessageError},
};

/// Marker byte selecting the extended (16-bit) index form
pub const EXTENDED_INDEX: u8 = 0xFA;
/// Value of `data[1]` for passive requests, which carry no receiver address
pub const PASSIVE_RECEIVER: u8 = 0x79;
/// Minimum payload length carrying an index
pub const MIN_FRAME_LENGTH: usize = 3;
/// Maximum payload length of an Elster frame
pub const MAX_FRAME_LENGTH: usize = 7;

/// The kind of an Elster message, held in the low nibble of the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Write a value on the receiver
    Write,
    /// Request a value from the receiver
    Read,
    /// A value sent in response to a read
    Response,
    /// Any other message kind
    Other(u8),
}

impl MessageKind {
    /// Interpret the low nibble of a byte
    pub fn from_nibble(b: u8) -> Self {
        match b & 0x0F {
            0 => MessageKind::Write,
            1 => MessageKind::Read,
            2 => MessageKind::Response,
            n => MessageKind::Other(n),
        }
    }

    /// The nibble value of this kind
    pub fn nibble(&self) -> u8 {
        match self {
            MessageKind::Write => 0,
            MessageKind::Read => 1,
            MessageKind::Response => 2,
            MessageKind::Other(n) => n & 0x0F,
        }
    }
}

/// The addressing fields of an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundAddress {
    /// The CAN ID to transmit with
    pub can_id: CanId,
    /// The header and extended index bytes, i.e. `data[0..5]`
    pub header: [u8; 5],
}

/// The addressing fields of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// The member that sent the frame
    pub sender: CanMember,
    /// The receiver address, or None for a passive request
    pub receiver: Option<u16>,
    /// The message kind
    pub kind: MessageKind,
    /// The Elster index
    pub index: u16,
    /// Offset of the value field in the payload
    pub value_offset: usize,
}

/// Encode the two header bytes addressing `receiver` with a message of `kind`
pub fn header_for(receiver: u16, kind: MessageKind) -> [u8; 2] {
    [
        ((receiver >> 3) & 0xF0) as u8 | kind.nibble(),
        (receiver & 0x7F) as u8,
    ]
}

/// Decode the receiver address from the two header bytes
///
/// Returns None for passive requests.
pub fn receiver_from_header(header: [u8; 2]) -> Option<u16> {
    if header[1] == PASSIVE_RECEIVER {
        return None;
    }
    Some((((header[0] & 0xF0) as u16) << 3) | (header[1] & 0x7F) as u16)
}

/// Build the addressing fields for a frame sent by `sender` to `target`
pub fn address_for(
    sender: CanMember,
    target: CanMember,
    index: u16,
    kind: MessageKind,
) -> OutboundAddress {
    let [h0, h1] = header_for(target.can_id(), kind);
    let [i0, i1] = index.to_be_bytes();
    OutboundAddress {
        can_id: CanId::std(sender.can_id()),
        header: [h0, h1, EXTENDED_INDEX, i0, i1],
    }
}

/// Resolve the addressing fields of a received message
pub fn resolve(msg: &CanMessage) -> Result<ResolvedAddress, MessageError> {
    let data = msg.data();
    if data.len() < MIN_FRAME_LENGTH || data.len() > MAX_FRAME_LENGTH {
        return Err(MessageError::InvalidLength { len: msg.dlc });
    }

    let sender = match msg.id() {
        CanId::Std(id) => CanMember::from_can_id(id),
        CanId::Extended(_) => None,
    }
    .ok_or(MessageError::UnknownMember { can_id: msg.id() })?;

    let (index, value_offset) = if data[2] == EXTENDED_INDEX {
        if data.len() < 5 {
            return Err(MessageError::InvalidLength { len: msg.dlc });
        }
        (u16::from_be_bytes([data[3], data[4]]), 5)
    } else {
        (data[2] as u16, 3)
    };

    Ok(ResolvedAddress {
        sender,
        receiver: receiver_from_header([data[0], data[1]]),
        kind: MessageKind::from_nibble(data[0]),
        index,
        value_offset,
    })
}
