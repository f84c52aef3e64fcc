//! Endpoint registry
//!
//! Stores registered endpoints, and indexes them by the (member, index) pairs from which they
//! receive values. Composite endpoints are indexed under each of their part indices.
use std::collections::BTreeMap;

use defmt_or_log::info;
use elster_common::CanMember;
use snafu::Snafu;

use crate::endpoint::{Capability, Endpoint, EndpointHandle};

/// Error returned when an endpoint cannot be registered
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
pub enum RegisterError {
    /// A writable endpoint already exists at the same member and index
    #[snafu(display(
        "A writable endpoint for {target} index 0x{index:04x} is already registered as {existing}"
    ))]
    DuplicateWriteTarget {
        /// The target member
        target: CanMember,
        /// The Elster index
        index: u16,
        /// The endpoint already holding the address
        existing: EndpointHandle,
    },
    /// The write range is empty or not finite
    #[snafu(display("Invalid write range [{min}, {max}]"))]
    InvalidRange {
        /// Requested minimum
        min: f64,
        /// Requested maximum
        max: f64,
    },
    /// Values of the type cannot be written
    #[snafu(display("Values of type {elster_type} cannot be written"))]
    UnsupportedWriteType {
        /// The rejected type
        elster_type: elster_common::ElsterType,
    },
    /// The polling interval is zero
    #[snafu(display("Polling interval must be greater than zero"))]
    ZeroInterval,
    /// The part indices of a composite value exceed the index range
    #[snafu(display("Index 0x{index:04x} leaves no room for the parts of {elster_type}"))]
    IndexOverflow {
        /// The first index
        index: u16,
        /// The composite type
        elster_type: elster_common::ElsterType,
    },
}

/// Ordered collection of registered endpoints
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    next_id: u32,
    endpoints: BTreeMap<EndpointHandle, Endpoint>,
    by_address: BTreeMap<(CanMember, u16), Vec<EndpointHandle>>,
}

impl EndpointRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that an endpoint can be registered
    pub fn validate(&self, endpoint: &Endpoint) -> Result<(), RegisterError> {
        if endpoint.interval.is_zero() {
            return ZeroIntervalSnafu.fail();
        }
        if endpoint.part_indices().is_none() {
            return IndexOverflowSnafu {
                index: endpoint.index,
                elster_type: endpoint.elster_type,
            }
            .fail();
        }
        if let Capability::ReadWrite { min, max } = endpoint.capability {
            if !min.is_finite() || !max.is_finite() || min > max {
                return InvalidRangeSnafu { min, max }.fail();
            }
            if endpoint.elster_type.is_composite() {
                return UnsupportedWriteTypeSnafu {
                    elster_type: endpoint.elster_type,
                }
                .fail();
            }
            if let Some(existing) = self.write_endpoint_at(endpoint.target, endpoint.index) {
                return DuplicateWriteTargetSnafu {
                    target: endpoint.target,
                    index: endpoint.index,
                    existing,
                }
                .fail();
            }
        }
        Ok(())
    }

    /// Add an endpoint, returning its handle
    pub fn register(&mut self, endpoint: Endpoint) -> Result<EndpointHandle, RegisterError> {
        self.validate(&endpoint)?;

        let handle = EndpointHandle(self.next_id);
        self.next_id += 1;

        if let Some(indices) = endpoint.part_indices() {
            for index in indices {
                self.by_address
                    .entry((endpoint.target, index))
                    .or_default()
                    .push(handle);
            }
        }
        self.endpoints.insert(handle, endpoint);
        info!(
            "Registered endpoint {} for {} index 0x{:x}",
            handle.id(),
            endpoint.target.name(),
            endpoint.index
        );
        Ok(handle)
    }

    /// Remove an endpoint
    ///
    /// Returns the endpoint description, or None if the handle was not registered.
    pub fn unregister(&mut self, handle: EndpointHandle) -> Option<Endpoint> {
        let endpoint = self.endpoints.remove(&handle)?;
        if let Some(indices) = endpoint.part_indices() {
            for index in indices {
                let key = (endpoint.target, index);
                if let Some(handles) = self.by_address.get_mut(&key) {
                    handles.retain(|h| *h != handle);
                    if handles.is_empty() {
                        self.by_address.remove(&key);
                    }
                }
            }
        }
        Some(endpoint)
    }

    /// Get the handles of all endpoints receiving values from `index` on `member`
    ///
    /// Handles are returned in registration order.
    pub fn lookup(&self, member: CanMember, index: u16) -> &[EndpointHandle] {
        self.by_address
            .get(&(member, index))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get an endpoint description
    pub fn get(&self, handle: EndpointHandle) -> Option<&Endpoint> {
        self.endpoints.get(&handle)
    }

    /// Iterate over all endpoints in registration order
    pub fn iter(&self) -> impl Iterator<Item = (EndpointHandle, &Endpoint)> {
        self.endpoints.iter().map(|(h, e)| (*h, e))
    }

    /// Number of registered endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True if no endpoints are registered
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// The distinct members targeted by registered endpoints, in CAN ID order
    pub fn targets(&self) -> Vec<CanMember> {
        let mut targets: Vec<CanMember> = self.endpoints.values().map(|e| e.target).collect();
        targets.sort();
        targets.dedup();
        targets
    }

    fn write_endpoint_at(&self, member: CanMember, index: u16) -> Option<EndpointHandle> {
        self.lookup(member, index).iter().copied().find(|h| {
            self.endpoints
                .get(h)
                .is_some_and(|e| e.is_writable() && e.index == index)
        })
    }
}
