//! The protocol engine
//!
//! The [Engine] owns the registered endpoints, polls them on their intervals, and routes the values
//! in received responses to their callbacks.
use core::time::Duration;
use std::collections::BTreeMap;

use defmt_or_log::{debug, info, warn};
use elster_common::{
    address::MessageKind,
    bus_config::BusConfig,
    codec::CodecError,
    frame::ElsterFrame,
    messages::{CanMessage, MessageError},
    traits::{AsyncCanSender, CanSender},
    CanMember, ElsterType,
};
use snafu::{OptionExt as _, ResultExt as _, Snafu};

use crate::{
    endpoint::{Capability, Endpoint, EndpointHandle, Reading, ValueCallback},
    reassembly::CompositeParts,
    registry::{EndpointRegistry, RegisterError},
    scheduler::{Action, PollScheduler},
    tx_queue::{TxOutcome, TxQueue},
};

/// Default minimum time between two transmitted frames
pub const DEFAULT_TX_INTERVAL: Duration = Duration::from_millis(50);

/// Error returned when a value cannot be written
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
pub enum WriteError {
    /// The handle does not refer to a registered endpoint
    #[snafu(display("No endpoint registered as {handle}"))]
    UnknownEndpoint {
        /// The handle
        handle: EndpointHandle,
    },
    /// The endpoint does not accept writes
    #[snafu(display("Endpoint {handle} is read only"))]
    ReadOnly {
        /// The handle
        handle: EndpointHandle,
    },
    /// The value lies outside the endpoint's range
    #[snafu(display("Value {value} is outside of [{min}, {max}]"))]
    ValueOutOfRange {
        /// The rejected value
        value: f64,
        /// Smallest writable value
        min: f64,
        /// Largest writable value
        max: f64,
    },
    /// The value cannot be encoded with the endpoint's type
    #[snafu(display("Cannot encode value: {source}"))]
    Encoding {
        /// The codec error
        source: CodecError,
    },
    /// The endpoint's type does not fit in a single frame
    #[snafu(display("Values of type {elster_type} cannot be written"))]
    UnsupportedType {
        /// The endpoint's type
        elster_type: ElsterType,
    },
}

/// Error returned when a callback is attached to an unknown handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(display("No endpoint registered as {handle}"))]
pub struct UnknownHandleError {
    handle: EndpointHandle,
}

/// Error returned when an endpoint from a [BusConfig] cannot be registered
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(display("Failed to register '{name}': {source}"))]
pub struct ConfigError {
    /// Name of the endpoint in the config
    pub name: String,
    /// Why the endpoint was rejected
    pub source: RegisterError,
}

/// Counters of the frames processed by an [Engine]
///
/// Counters wrap around on overflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames passed to [Engine::handle_message]
    pub frames_received: u32,
    /// Frames without a valid Elster header
    pub invalid_frames: u32,
    /// Frames sent by an unknown CAN ID
    pub unknown_member: u32,
    /// Frames which are not responses
    pub ignored_kind: u32,
    /// Responses no endpoint is registered for
    pub unmatched: u32,
    /// Values decoded for an endpoint
    pub values_decoded: u32,
    /// Responses carrying no value
    pub unavailable: u32,
    /// Values which could not be decoded
    pub decode_errors: u32,
    /// Frames added to the transmit queue
    pub frames_queued: u32,
    /// Actions postponed because the transmit queue was full
    pub deferred_actions: u32,
    /// Frames handed to the bus driver
    pub frames_sent: u32,
    /// Frames rejected by the bus driver
    pub send_failures: u32,
}

/// The Elster protocol engine
///
/// # Operation
///
/// Received messages are passed to [handle_message](Self::handle_message) in the order they arrive.
/// [process](Self::process) must be called periodically with the current time; it queues the polls,
/// writes and read-backs which are due, and releases queued frames to the bus driver.
///
/// ```ignore
/// let mut engine = Engine::new(CanMember::Client, DEFAULT_TX_INTERVAL);
/// let flow = engine.register_read_endpoint(CanMember::Hk1, 0x000F, ElsterType::Dec, Duration::from_secs(60))?;
/// engine.on_value_decoded(flow, |reading| println!("Flow temperature: {reading:?}"))?;
///
/// loop {
///     while let Some(msg) = rx.try_recv() {
///         engine.handle_message(msg);
///     }
///     engine.process(epoch.elapsed().as_micros() as u64, &mut tx);
/// }
/// ```
pub struct Engine {
    sender: CanMember,
    registry: EndpointRegistry,
    callbacks: BTreeMap<EndpointHandle, ValueCallback>,
    composites: BTreeMap<EndpointHandle, CompositeParts>,
    scheduler: PollScheduler,
    tx_queue: TxQueue,
    stats: EngineStats,
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("sender", &self.sender)
            .field("registry", &self.registry)
            .field("composites", &self.composites)
            .field("scheduler", &self.scheduler)
            .field("tx_queue", &self.tx_queue)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine sending as `sender`, transmitting at most one frame per `tx_interval`
    pub fn new(sender: CanMember, tx_interval: Duration) -> Self {
        let tx_interval_us = tx_interval.as_micros().min(u64::MAX as u128) as u64;
        Self {
            sender,
            registry: EndpointRegistry::new(),
            callbacks: BTreeMap::new(),
            composites: BTreeMap::new(),
            scheduler: PollScheduler::new(),
            tx_queue: TxQueue::new(tx_interval_us),
            stats: EngineStats::default(),
        }
    }

    /// Create an engine and register every sensor and number of a [BusConfig]
    ///
    /// Returns the engine along with the endpoint handles keyed by name.
    pub fn from_config(
        config: &BusConfig,
    ) -> Result<(Self, BTreeMap<String, EndpointHandle>), ConfigError> {
        let mut engine = Self::new(config.sender, config.tx_interval());
        let mut handles = BTreeMap::new();

        for sensor in &config.sensors {
            let handle = engine
                .register_read_endpoint(
                    sensor.target,
                    sensor.elster_index,
                    sensor.elster_type,
                    sensor.update_interval.into(),
                )
                .context(ConfigSnafu {
                    name: sensor.name.clone(),
                })?;
            handles.insert(sensor.name.clone(), handle);
        }

        for number in &config.numbers {
            let handle = engine
                .register_write_endpoint(
                    number.target,
                    number.elster_index,
                    number.elster_type,
                    number.update_interval.into(),
                    number.min_value,
                    number.max_value,
                )
                .context(ConfigSnafu {
                    name: number.name.clone(),
                })?;
            handles.insert(number.name.clone(), handle);
        }

        Ok((engine, handles))
    }

    /// The member this engine sends as
    pub fn sender(&self) -> CanMember {
        self.sender
    }

    /// Register a read only value
    pub fn register_read_endpoint(
        &mut self,
        target: CanMember,
        index: u16,
        elster_type: ElsterType,
        interval: Duration,
    ) -> Result<EndpointHandle, RegisterError> {
        self.register(Endpoint::read_only(target, index, elster_type, interval))
    }

    /// Register a writable value
    pub fn register_write_endpoint(
        &mut self,
        target: CanMember,
        index: u16,
        elster_type: ElsterType,
        interval: Duration,
        min: f64,
        max: f64,
    ) -> Result<EndpointHandle, RegisterError> {
        self.register(Endpoint::read_write(
            target,
            index,
            elster_type,
            interval,
            min,
            max,
        ))
    }

    /// Register an endpoint
    ///
    /// The endpoint is polled on the next call to [process](Self::process).
    pub fn register(&mut self, endpoint: Endpoint) -> Result<EndpointHandle, RegisterError> {
        let handle = self.registry.register(endpoint)?;
        self.scheduler.add(handle, endpoint.interval_us());
        if endpoint.elster_type.is_composite() {
            self.composites
                .insert(handle, CompositeParts::new(endpoint.elster_type));
        }
        Ok(handle)
    }

    /// Remove an endpoint
    ///
    /// No further polls are sent, and no further values are delivered for it. Returns the endpoint
    /// description, or None if the handle is not registered.
    pub fn unregister(&mut self, handle: EndpointHandle) -> Option<Endpoint> {
        let endpoint = self.registry.unregister(handle)?;
        self.scheduler.remove(handle);
        self.callbacks.remove(&handle);
        self.composites.remove(&handle);
        Some(endpoint)
    }

    /// Set the callback receiving the values decoded for an endpoint
    ///
    /// Replaces any previously set callback.
    pub fn on_value_decoded(
        &mut self,
        handle: EndpointHandle,
        callback: impl FnMut(Reading) + 'static,
    ) -> Result<(), UnknownHandleError> {
        if self.registry.get(handle).is_none() {
            return UnknownHandleSnafu { handle }.fail();
        }
        self.callbacks.insert(handle, Box::new(callback));
        Ok(())
    }

    /// Request a value to be written to a writable endpoint
    ///
    /// The write is transmitted on the next call to [process](Self::process), and followed by a
    /// read-back of the value. A write which has not been transmitted yet is replaced.
    pub fn push_write_value(&mut self, handle: EndpointHandle, value: f64) -> Result<(), WriteError> {
        let endpoint = *self
            .registry
            .get(handle)
            .context(UnknownEndpointSnafu { handle })?;
        let Capability::ReadWrite { min, max } = endpoint.capability else {
            return ReadOnlySnafu { handle }.fail();
        };
        if !(min..=max).contains(&value) {
            return ValueOutOfRangeSnafu { value, min, max }.fail();
        }
        let field = endpoint.elster_type.encode(value).context(EncodingSnafu)?;
        let bytes = field.as_frame_value().context(UnsupportedTypeSnafu {
            elster_type: endpoint.elster_type,
        })?;

        info!(
            "Writing {} to {} index 0x{:x}",
            value,
            endpoint.target.name(),
            endpoint.index
        );
        self.scheduler.request_write(handle, bytes);
        Ok(())
    }

    /// Handle a message received from the bus
    ///
    /// Responses are decoded and delivered to every endpoint registered for the sending member and
    /// index. All other messages are dropped and counted in [stats](Self::stats).
    pub fn handle_message(&mut self, msg: CanMessage) {
        self.stats.frames_received = self.stats.frames_received.wrapping_add(1);

        let frame = match ElsterFrame::try_from(msg) {
            Ok(frame) => frame,
            Err(MessageError::InvalidLength { len }) => {
                self.stats.invalid_frames = self.stats.invalid_frames.wrapping_add(1);
                debug!("Dropped frame with invalid length {}", len);
                return;
            }
            Err(MessageError::UnknownMember { can_id }) => {
                self.stats.unknown_member = self.stats.unknown_member.wrapping_add(1);
                debug!("Dropped frame from unknown member 0x{:x}", can_id.raw());
                return;
            }
        };

        if frame.kind != MessageKind::Response {
            self.stats.ignored_kind = self.stats.ignored_kind.wrapping_add(1);
            return;
        }

        let handles = self.registry.lookup(frame.sender, frame.index).to_vec();
        if handles.is_empty() {
            self.stats.unmatched = self.stats.unmatched.wrapping_add(1);
            return;
        }

        let value = frame.value.filter(|_| !frame.is_unavailable());
        if value.is_none() {
            self.stats.unavailable = self.stats.unavailable.wrapping_add(1);
        }

        for handle in handles {
            let Some(endpoint) = self.registry.get(handle).copied() else {
                continue;
            };
            let reading = match value {
                Some(raw) => match self.decode(handle, &endpoint, frame.index, raw) {
                    Some(reading) => reading,
                    None => continue,
                },
                None => {
                    if let Some(parts) = self.composites.get_mut(&handle) {
                        parts.reset();
                    }
                    Reading::Unavailable
                }
            };

            self.stats.values_decoded = self.stats.values_decoded.wrapping_add(1);
            if let Some(callback) = self.callbacks.get_mut(&handle) {
                callback(reading);
            }
        }
    }

    fn decode(
        &mut self,
        handle: EndpointHandle,
        endpoint: &Endpoint,
        index: u16,
        raw: [u8; 2],
    ) -> Option<Reading> {
        if let Some(parts) = self.composites.get_mut(&handle) {
            // Each part is a plain count
            let part = ElsterType::Default.decode(&raw).ok()?;
            let offset = index.wrapping_sub(endpoint.index) as usize;
            return parts.update(offset, part).map(Reading::Value);
        }

        match endpoint.elster_type.decode(&raw) {
            Ok(value) => Some(Reading::Value(value)),
            Err(_) => {
                self.stats.decode_errors = self.stats.decode_errors.wrapping_add(1);
                warn!(
                    "Failed to decode value for {} index 0x{:x}",
                    endpoint.target.name(),
                    index
                );
                None
            }
        }
    }

    /// Queue the actions due at `now_us`
    ///
    /// Endpoints are visited in registration order. If the frames of an action do not fit in the
    /// transmit queue, it and all later actions are deferred to the next call.
    fn schedule(&mut self, now_us: u64) {
        let handles: Vec<EndpointHandle> = self.registry.iter().map(|(h, _)| h).collect();
        for handle in handles {
            let Some(action) = self.scheduler.due(handle, now_us) else {
                continue;
            };
            let Some(endpoint) = self.registry.get(handle).copied() else {
                continue;
            };

            let frames = self.compose(&endpoint, action);
            if frames.len() > self.tx_queue.free() {
                self.stats.deferred_actions = self.stats.deferred_actions.wrapping_add(1);
                debug!(
                    "Transmit queue full, deferring {} index 0x{:x}",
                    endpoint.target.name(),
                    endpoint.index
                );
                break;
            }

            self.stats.frames_queued =
                self.stats.frames_queued.wrapping_add(frames.len() as u32);
            for msg in frames {
                // Capacity was checked above
                match action {
                    Action::Write(_) => self.tx_queue.push_write(msg, handle).ok(),
                    _ => self.tx_queue.push(msg).ok(),
                };
            }
            if action == Action::Poll {
                if let Some(parts) = self.composites.get_mut(&handle) {
                    parts.reset();
                }
            }
            self.scheduler.fired(handle, action, now_us);
        }
    }

    fn compose(&self, endpoint: &Endpoint, action: Action) -> heapless::Vec<CanMessage, 3> {
        let mut frames = heapless::Vec::new();
        match action {
            Action::Write(value) => {
                let frame =
                    ElsterFrame::write_request(self.sender, endpoint.target, endpoint.index, value);
                frames.push(frame.into()).ok();
            }
            Action::Poll | Action::ReadBack => {
                if let Some(indices) = endpoint.part_indices() {
                    for index in indices {
                        let frame = ElsterFrame::read_request(self.sender, endpoint.target, index);
                        frames.push(frame.into()).ok();
                    }
                }
            }
        }
        frames
    }

    fn record(&mut self, outcome: TxOutcome, now_us: u64) {
        for handle in &outcome.writes {
            self.scheduler.write_transmitted(*handle, now_us);
        }
        self.stats.frames_sent = self.stats.frames_sent.wrapping_add(outcome.sent);
        self.stats.send_failures = self.stats.send_failures.wrapping_add(outcome.failed);
        if outcome.failed > 0 {
            warn!(
                "Failed to send CAN message, {} frames queued",
                self.tx_queue.len()
            );
        }
    }

    /// Run periodic processing
    ///
    /// Queues the polls, writes and read-backs due at `now_us`, then releases queued frames to
    /// `sender` at the configured pace. `now_us` is a monotonic time in microseconds.
    pub fn process(&mut self, now_us: u64, sender: &mut dyn CanSender) {
        self.schedule(now_us);
        let outcome = self.tx_queue.flush(now_us, sender);
        self.record(outcome, now_us);
    }

    /// Run periodic processing with an async bus driver
    ///
    /// See [process](Self::process).
    pub async fn process_async<S: AsyncCanSender>(&mut self, now_us: u64, sender: &mut S) {
        self.schedule(now_us);
        let outcome = self.tx_queue.flush_async(now_us, sender).await;
        self.record(outcome, now_us);
    }

    /// Get the processing counters
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// The CAN IDs of all members endpoints are registered for, in ascending order
    ///
    /// Only frames sent from these IDs can carry values of interest, so a driver may use them as
    /// receive filters.
    pub fn filter_hint(&self) -> Vec<u16> {
        self.registry
            .targets()
            .into_iter()
            .map(|m| m.can_id())
            .collect()
    }

    /// Get an endpoint description
    pub fn endpoint(&self, handle: EndpointHandle) -> Option<&Endpoint> {
        self.registry.get(handle)
    }

    /// Iterate over all endpoints in registration order
    pub fn endpoints(&self) -> impl Iterator<Item = (EndpointHandle, &Endpoint)> {
        self.registry.iter()
    }

    /// Number of frames waiting for transmission
    pub fn pending_frames(&self) -> usize {
        self.tx_queue.len()
    }
}
