//! Endpoints
//!
//! An endpoint is a single value on a bus member which the engine polls, and optionally writes.
use core::time::Duration;

use elster_common::{CanMember, ElsterType};

/// An opaque handle identifying a registered endpoint
///
/// Handles are never reused, and compare in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointHandle(pub(crate) u32);

impl EndpointHandle {
    /// The numeric ID of the handle
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for EndpointHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a consumer may do with an endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Capability {
    /// The value is only read
    ReadOnly,
    /// The value is read, and may be written within `[min, max]`
    ReadWrite {
        /// Smallest writable value
        min: f64,
        /// Largest writable value
        max: f64,
    },
}

/// A value delivered to an endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// A decoded physical value
    Value(f64),
    /// The member answered, but has no value for the index
    Unavailable,
}

impl Reading {
    /// Get the value, if one is available
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(*v),
            Reading::Unavailable => None,
        }
    }
}

/// Callback invoked with every value decoded for an endpoint
pub type ValueCallback = Box<dyn FnMut(Reading)>;

/// Description of a registered value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    /// The member owning the value
    pub target: CanMember,
    /// The Elster index of the value, or of the first part for composite types
    pub index: u16,
    /// How the value is encoded
    pub elster_type: ElsterType,
    /// How often the value is polled
    pub interval: Duration,
    /// Whether the value may be written
    pub capability: Capability,
}

impl Endpoint {
    /// Describe a read only value
    pub fn read_only(
        target: CanMember,
        index: u16,
        elster_type: ElsterType,
        interval: Duration,
    ) -> Self {
        Self {
            target,
            index,
            elster_type,
            interval,
            capability: Capability::ReadOnly,
        }
    }

    /// Describe a writable value
    pub fn read_write(
        target: CanMember,
        index: u16,
        elster_type: ElsterType,
        interval: Duration,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            target,
            index,
            elster_type,
            interval,
            capability: Capability::ReadWrite { min, max },
        }
    }

    /// True if the endpoint accepts writes
    pub fn is_writable(&self) -> bool {
        matches!(self.capability, Capability::ReadWrite { .. })
    }

    /// The indices read to obtain the value
    ///
    /// Returns None if the indices would exceed 0xFFFF.
    pub fn part_indices(&self) -> Option<impl Iterator<Item = u16>> {
        let last = self
            .index
            .checked_add(self.elster_type.parts() as u16 - 1)?;
        Some(self.index..=last)
    }

    /// The polling interval in microseconds
    pub(crate) fn interval_us(&self) -> u64 {
        self.interval.as_micros().min(u64::MAX as u128) as u64
    }
}
