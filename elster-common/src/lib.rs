//! Common functionality shared among the elster crates.
//!
//! This crate holds the pieces of the Elster protocol which do not depend on any runtime state:
//!
//! - The [value codec](codec) which converts between payload bytes and physical values
//! - The fixed set of [bus members](CanMember) and their CAN addresses
//! - The [address resolver](address) which builds and parses the Elster header bytes
//! - [Elster frames](ElsterFrame), built on top of the raw [CanMessage]
//! - The [bus configuration](bus_config) TOML format
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `elster-node`.
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod address;
pub mod bus_config;
pub mod can_member;
pub mod codec;
pub mod frame;
pub mod messages;
pub mod traits;

pub use can_member::CanMember;
pub use codec::ElsterType;
pub use frame::ElsterFrame;
pub use messages::{CanId, CanMessage};
