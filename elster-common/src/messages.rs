//! Raw CAN messages as exchanged with the bus driver
use snafu::Snafu;

/// A CAN identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CanId {
    /// A 29-bit extended identifier
    Extended(u32),
    /// An 11-bit standard identifier
    Std(u16),
}

impl CanId {
    /// Create an extended ID
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id)
    }

    /// Create a standard ID
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id)
    }

    /// Get the raw numeric ID
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// True for 29-bit IDs
    pub fn is_extended(&self) -> bool {
        match self {
            CanId::Extended(_) => true,
            CanId::Std(_) => false,
        }
    }
}

/// The largest payload of a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// A single classic CAN data frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanMessage {
    /// Payload buffer. Only the first `dlc` bytes are valid.
    pub data: [u8; MAX_DATA_LENGTH],
    /// Number of valid payload bytes
    pub dlc: u8,
    /// The CAN identifier
    pub id: CanId,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self {
            data: [0; MAX_DATA_LENGTH],
            dlc: 0,
            id: CanId::Std(0),
        }
    }
}

impl CanMessage {
    /// Create a new message
    ///
    /// Panics if `data` is longer than 8 bytes.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len() as u8;
        if dlc > MAX_DATA_LENGTH as u8 {
            panic!("Data length exceeds maximum size of {} bytes", MAX_DATA_LENGTH);
        }
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[0..dlc as usize].copy_from_slice(data);

        Self { id, dlc, data: buf }
    }

    /// Get the message ID
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get the valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[0..self.dlc as usize]
    }
}

/// Errors raised while interpreting a [CanMessage] as an Elster frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum MessageError {
    /// The payload length cannot hold an Elster header and index
    #[snafu(display("Payload of {len} bytes is not a valid Elster frame"))]
    InvalidLength {
        /// The payload length found
        len: u8,
    },
    /// The sending CAN ID does not belong to any known bus member
    #[snafu(display("Unknown bus member with CAN ID {:#x}", can_id.raw()))]
    UnknownMember {
        /// The CAN ID of the frame
        can_id: CanId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_data_is_truncated_to_dlc() {
        let msg = CanMessage::new(CanId::std(0x180), &[1, 2, 3]);
        assert_eq!(3, msg.dlc);
        assert_eq!(&[1, 2, 3], msg.data());
        assert_eq!(0x180, msg.id().raw());
        assert!(!msg.id().is_extended());
    }

    #[test]
    #[should_panic]
    fn test_oversized_message_panics() {
        CanMessage::new(CanId::std(0x180), &[0; 9]);
    }
}
