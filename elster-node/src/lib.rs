//! A library implementing the Elster protocol spoken on the CAN bus of Stiebel Eltron and Tecalor
//! heat pumps
//!
//! Elster-node polls values from the members of the bus (boiler, heat pump manager, heating
//! circuits, ...), decodes the responses, and writes values back. It provides the following
//! features:
//!
//! * An [Engine] holding a registry of *endpoints*. Each endpoint is a value at an Elster index on
//!   one bus member, decoded according to an [ElsterType](common::ElsterType).
//! * Read only endpoints (sensors) and writable endpoints (numbers) with a permitted range.
//! * Periodic polling of every endpoint at its own interval, with written values read back.
//! * Reassembly of counters which are spread over several consecutive indices.
//! * A paced transmit queue, so that polling does not flood the bus.
//!
//! # Getting Started
//!
//! ## Bus Configuration
//!
//! The endpoints can be registered one by one, or created from a
//! [BusConfig](common::bus_config::BusConfig) TOML file, see the [common::bus_config] module docs
//! for more info.
//!
//! ```ignore
//! let config = BusConfig::load("heatpump.toml")?;
//! let (mut engine, handles) = Engine::from_config(&config)?;
//! for (name, handle) in &handles {
//!     let name = name.clone();
//!     engine.on_value_decoded(*handle, move |reading| println!("{name}: {reading:?}"))?;
//! }
//! ```
//!
//! ## Handling CAN messages
//!
//! The application has to handle sending and receiving CAN messages. Received messages are passed
//! to [Engine::handle_message], and [Engine::process] must be called periodically with a
//! monotonic time in microseconds and a [CanSender](common::traits::CanSender) for transmitting.
//!
//! ```ignore
//! let epoch = std::time::Instant::now();
//! loop {
//!     while let Some(msg) = can_rx.try_recv() {
//!         engine.handle_message(msg);
//!     }
//!     engine.process(epoch.elapsed().as_micros() as u64, &mut |msg| can_tx.send(msg));
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! ```
//!
//! Everything runs on the calling thread. Callbacks are invoked from within
//! [Engine::handle_message].
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod endpoint;
mod engine;
pub mod reassembly;
pub mod registry;
pub mod scheduler;
pub mod tx_queue;

pub use elster_common as common;

pub use endpoint::{Capability, Endpoint, EndpointHandle, Reading, ValueCallback};
pub use engine::{
    ConfigError, Engine, EngineStats, UnknownHandleError, WriteError, DEFAULT_TX_INTERVAL,
};
pub use registry::RegisterError;
