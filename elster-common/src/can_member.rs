//! Members of the Elster bus
//!
//! Every participant on the bus is identified by a fixed 11-bit CAN address. A member sends all of
//! its frames with its own address as CAN ID, and addresses a receiver through the first two
//! payload bytes (see [address](crate::address)).
use core::str::FromStr;

use int_enum::IntEnum;
use snafu::Snafu;

/// A logical bus participant
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntEnum)]
pub enum CanMember {
    /// Boiler
    Kessel = 0x180,
    /// Hot water temperature sensor
    WwTemp = 0x201,
    /// Room control unit
    Fet = 0x402,
    /// Heat pump manager
    Wpm = 0x480,
    /// System manager
    Manager = 0x514,
    /// Heating circuit 1
    Hk1 = 0x601,
    /// Heating circuit 2
    Hk2 = 0x602,
    /// This gateway
    Client = 0x6A2,
    /// Manufacturer / diagnostic node
    Mfg = 0x700,
}

/// Error returned when parsing a [CanMember] from text
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("Unknown bus member '{name}'"))]
pub struct ParseMemberError {
    name: String,
}

impl CanMember {
    /// All known members
    pub const ALL: [CanMember; 9] = [
        CanMember::Kessel,
        CanMember::WwTemp,
        CanMember::Fet,
        CanMember::Wpm,
        CanMember::Manager,
        CanMember::Hk1,
        CanMember::Hk2,
        CanMember::Client,
        CanMember::Mfg,
    ];

    /// The configuration name of the member, e.g. `HK1`
    pub const fn name(&self) -> &'static str {
        match self {
            CanMember::Kessel => "KESSEL",
            CanMember::WwTemp => "WWTEMP",
            CanMember::Fet => "FET",
            CanMember::Wpm => "WPM",
            CanMember::Manager => "MANAGER",
            CanMember::Hk1 => "HK1",
            CanMember::Hk2 => "HK2",
            CanMember::Client => "CLIENT",
            CanMember::Mfg => "MFG",
        }
    }

    /// The CAN ID this member transmits with
    pub fn can_id(&self) -> u16 {
        u16::from(*self)
    }

    /// Look up the member owning a CAN address
    pub fn from_can_id(id: u16) -> Option<Self> {
        Self::try_from(id).ok()
    }

    /// The 16-bit header addressing this member with a write
    pub fn write_id(&self) -> u16 {
        let id = self.can_id();
        ((id & 0x780) << 5) | (id & 0x7F)
    }

    /// The 16-bit header addressing this member with a read request
    pub fn read_id(&self) -> u16 {
        self.write_id() | 0x100
    }

    /// The 16-bit header addressing this member with a response
    pub fn response_id(&self) -> u16 {
        self.write_id() | 0x200
    }
}

impl core::fmt::Display for CanMember {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CanMember {
    type Err = ParseMemberError;

    /// Parse a member name, ignoring case and treating spaces as underscores
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(' ', "_");
        CanMember::ALL
            .into_iter()
            .find(|m| m.name() == normalized)
            .ok_or_else(|| ParseMemberError { name: s.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_ids() {
        assert_eq!(0x3000, CanMember::Kessel.write_id());
        assert_eq!(0x3100, CanMember::Kessel.read_id());
        assert_eq!(0x3200, CanMember::Kessel.response_id());
        assert_eq!(0xD022, CanMember::Client.write_id());
        assert_eq!(0x9000, CanMember::Wpm.write_id());
        assert_eq!(0xC101, CanMember::Hk1.read_id());
        assert_eq!(0x4201, CanMember::WwTemp.response_id());
    }

    #[test]
    fn test_member_mapping_is_bijective() {
        for member in CanMember::ALL {
            assert_eq!(Some(member), CanMember::from_can_id(member.can_id()));
            assert_eq!(Ok(member), member.name().parse());
        }
        assert_eq!(None, CanMember::from_can_id(0x123));
    }

    #[test]
    fn test_parse_member_names() {
        assert_eq!(Ok(CanMember::Hk1), "hk1".parse());
        assert_eq!(Ok(CanMember::WwTemp), " WWTemp".parse());
        assert!("HK3".parse::<CanMember>().is_err());
    }
}
