//! Command-line utilities for Elster heat pumps
//!
//! Collection of tools for interacting with an Elster CAN bus via a socketcan interface on linux.
//!
//! # elsterdump
//!
//! Monitors a bus, and prints each message received to stdout. Similar to the popular `candump`
//! utility, but shows the sending and receiving member, the Elster index and the raw value of
//! each frame.
//!
//! Usage example: `elsterdump can0`
//!
//! # elster-cli
//!
//! * `elster-cli decode DEC 0x01 0x44` decodes the bytes of a value field
//! * `elster-cli encode DEC 32.4` encodes a value
//! * `elster-cli run heatpump.toml can0 --set "Comfort temperature=21.5"` polls the values of a
//!   bus config file and logs each reading. Set `RUST_LOG=info` to see them.

pub mod command;
pub mod runner;
