//! Utilities for connecting the elster crates to a real CAN bus
//!
//! With the `socketcan` feature (enabled by default), a Linux socketcan interface can be opened as
//! a pair of [AsyncCanSender](elster_common::traits::AsyncCanSender) and
//! [AsyncCanReceiver](elster_common::traits::AsyncCanReceiver) objects with [open_socketcan].
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "socketcan")]
mod socketcan;

#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use self::socketcan::{
    open_socketcan, ReceiveError, SocketCanFilter, SocketCanReceiver, SocketCanSender,
};
