//! Elster frames
//!
//! An [ElsterFrame] is a [CanMessage] interpreted according to the Elster addressing scheme: a
//! sending member, an optional receiver, a message kind, an index and an optional 16-bit value.
use crate::{
    address::{self, MessageKind, EXTENDED_INDEX},
    can_member::CanMember,
    messages::{CanId, CanMessage, MessageError},
};

/// Raw value sent by devices which have no value for an index
pub const VALUE_UNAVAILABLE: u16 = 0x8000;

/// Length of every frame produced by this crate
pub const OUTBOUND_FRAME_LENGTH: usize = 7;

/// A decoded Elster frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElsterFrame {
    /// The member which sent the frame
    pub sender: CanMember,
    /// The address of the receiver, or None for passive requests
    pub receiver: Option<u16>,
    /// The message kind
    pub kind: MessageKind,
    /// The Elster index
    pub index: u16,
    /// The raw value field, if the frame is long enough to carry one
    pub value: Option<[u8; 2]>,
}

impl ElsterFrame {
    /// Create a read request from `sender` to `target`
    pub fn read_request(sender: CanMember, target: CanMember, index: u16) -> Self {
        Self {
            sender,
            receiver: Some(target.can_id()),
            kind: MessageKind::Read,
            index,
            value: Some([0, 0]),
        }
    }

    /// Create a write command from `sender` to `target`
    pub fn write_request(sender: CanMember, target: CanMember, index: u16, value: [u8; 2]) -> Self {
        Self {
            sender,
            receiver: Some(target.can_id()),
            kind: MessageKind::Write,
            index,
            value: Some(value),
        }
    }

    /// Create a response from `sender` to `receiver`
    pub fn response(sender: CanMember, receiver: CanMember, index: u16, value: [u8; 2]) -> Self {
        Self {
            sender,
            receiver: Some(receiver.can_id()),
            kind: MessageKind::Response,
            index,
            value: Some(value),
        }
    }

    /// The value field as an unsigned integer
    pub fn raw_value(&self) -> Option<u16> {
        self.value.map(u16::from_be_bytes)
    }

    /// True if the frame carries no usable value
    ///
    /// This is the case when the value field is missing, or holds the 0x8000 sentinel.
    pub fn is_unavailable(&self) -> bool {
        self.raw_value().map_or(true, |v| v == VALUE_UNAVAILABLE)
    }

    /// The receiving member, if the receiver address belongs to a known member
    pub fn receiver_member(&self) -> Option<CanMember> {
        self.receiver.and_then(CanMember::from_can_id)
    }
}

impl TryFrom<CanMessage> for ElsterFrame {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let resolved = address::resolve(&msg)?;
        let data = msg.data();
        let value_end = resolved.value_offset + 2;
        // A value is only present if it fills the frame exactly in the extended form
        let value = if data[2] == EXTENDED_INDEX {
            (data.len() == value_end).then(|| [data[5], data[6]])
        } else {
            (data.len() >= value_end).then(|| [data[3], data[4]])
        };
        Ok(Self {
            sender: resolved.sender,
            receiver: resolved.receiver,
            kind: resolved.kind,
            index: resolved.index,
            value,
        })
    }
}

impl From<ElsterFrame> for CanMessage {
    fn from(frame: ElsterFrame) -> Self {
        let receiver = frame.receiver.unwrap_or(0);
        let [h0, mut h1] = address::header_for(receiver, frame.kind);
        if frame.receiver.is_none() {
            h1 = address::PASSIVE_RECEIVER;
        }
        let [i0, i1] = frame.index.to_be_bytes();
        let [v0, v1] = frame.value.unwrap_or([0, 0]);
        CanMessage::new(
            CanId::std(frame.sender.can_id()),
            &[h0, h1, EXTENDED_INDEX, i0, i1, v0, v1],
        )
    }
}

/// Formats any CAN message as a single bus dump line
///
/// ```text
///       180 [7] d2 22 fa 01 0c 01 2c     ."....,   0x010c ==   300  (180 -> 6a2)
/// ```
///
/// Columns: sending CAN ID, length, payload hex, printable payload bytes, index, kind marker and
/// value (`<-` write, `??` read, `==` response), sender and receiver addresses. Fields which
/// cannot be decoded are printed as `ffff`, and missing values as 32768.
#[derive(Debug, Clone, Copy)]
pub struct Dump<'a>(pub &'a CanMessage);

impl core::fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = self.0;
        let data = msg.data();
        let id = msg.id().raw() & 0x1FFF_FFFF;
        write!(f, "  {:8x} [{}] ", id, data.len())?;
        for i in 0..8 {
            match data.get(i) {
                Some(b) => write!(f, "{:02x} ", b)?,
                None => f.write_str("   ")?,
            }
        }
        f.write_str(" ")?;
        for i in 0..8 {
            let c = match data.get(i) {
                Some(&b) if (b' '..127).contains(&b) => b as char,
                Some(_) => '.',
                None => ' ',
            };
            write!(f, "{c}")?;
        }

        let (index, value) = dump_fields(data);
        write!(f, "  0x{:04x}", index)?;
        match data.first().map(|b| MessageKind::from_nibble(*b)) {
            Some(MessageKind::Write) => write!(f, " <- {:5}", value)?,
            Some(MessageKind::Read) => f.write_str(" ??      ")?,
            Some(MessageKind::Response) => write!(f, " == {:5}", value)?,
            _ => (),
        }

        let receiver = if data.len() < 2 {
            None
        } else {
            address::receiver_from_header([data[0], data[1]])
        };
        write!(f, "  ({:3x} -> {:3x})", id, receiver.unwrap_or(0xFFFF))
    }
}

/// Index and value of a payload for dumping, with the sentinels used for missing fields
fn dump_fields(data: &[u8]) -> (u16, u16) {
    if data.len() < address::MIN_FRAME_LENGTH || data.len() > address::MAX_FRAME_LENGTH {
        return (0xFFFF, VALUE_UNAVAILABLE);
    }
    if data[2] == EXTENDED_INDEX {
        let index = if data.len() >= 5 {
            u16::from_be_bytes([data[3], data[4]])
        } else {
            0xFFFF
        };
        let value = if data.len() == 7 {
            u16::from_be_bytes([data[5], data[6]])
        } else {
            VALUE_UNAVAILABLE
        };
        (index, value)
    } else {
        let value = if data.len() >= 5 {
            u16::from_be_bytes([data[3], data[4]])
        } else {
            VALUE_UNAVAILABLE
        };
        (data[2] as u16, value)
    }
}

impl core::fmt::Display for ElsterFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = CanMessage::from(*self);
        write!(f, "{}", Dump(&msg))
    }
}
