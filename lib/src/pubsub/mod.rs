// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The publishing engine.
//!
//! Notifications flow from a `NotificationSource` through the field filters and heartbeats of a
//! `DataSetWriter`, are batched by their `WriterGroup` into network messages, encoded by the
//! `Encoder` and handed to an `OutboundSink`. A `SubscriptionWatchdog` observes the notifications
//! and acts when a subscription goes quiet.

pub mod config;
pub mod data_set_message;
pub mod data_set_writer;
pub mod diagnostics;
pub mod encoder;
pub mod field_filter;
pub mod heartbeat;
pub mod meta_data;
pub mod models;
pub mod network_message;
pub mod notification;
pub mod publisher;
pub mod sink;
pub mod watchdog;
pub mod writer_group;

pub mod prelude {
    pub use super::config::*;
    pub use super::data_set_message::*;
    pub use super::data_set_writer::*;
    pub use super::diagnostics::*;
    pub use super::encoder::*;
    pub use super::field_filter::*;
    pub use super::heartbeat::*;
    pub use super::meta_data::*;
    pub use super::models::*;
    pub use super::network_message::*;
    pub use super::notification::*;
    pub use super::publisher::*;
    pub use super::sink::*;
    pub use super::watchdog::*;
    pub use super::writer_group::*;
}

#[cfg(test)]
mod tests;
