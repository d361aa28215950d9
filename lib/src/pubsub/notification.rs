// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Notifications delivered by the subscription layer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::*;

/// A notification for one field of a data set
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A sampled value of a published variable
    DataChange { field_id: String, value: DataValue },
    /// An event raised by a published event notifier. Fields are in selection order.
    Event {
        field_id: String,
        fields: Vec<(String, Variant)>,
        timestamp: DateTime,
    },
    /// The result of calling a published method
    MethodResult {
        field_id: String,
        status: StatusCode,
        outputs: Vec<Variant>,
        timestamp: DateTime,
    },
}

impl Notification {
    pub fn field_id(&self) -> &str {
        match self {
            Notification::DataChange { field_id, .. }
            | Notification::Event { field_id, .. }
            | Notification::MethodResult { field_id, .. } => field_id,
        }
    }
}

/// Something delivered by a notification source, addressed to a writer
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Notification {
        writer_group_id: u16,
        data_set_writer_id: u16,
        notification: Notification,
    },
    /// A monitored item is alive even though its value did not change
    ItemAlive {
        writer_group_id: u16,
        data_set_writer_id: u16,
        field_id: String,
    },
}

/// Produces the notifications of the subscriptions behind the writers
#[async_trait]
pub trait NotificationSource: Send {
    /// The next event, or `None` when the source is exhausted
    async fn next(&mut self) -> Option<SourceEvent>;
}

/// A notification source fed through a channel
pub struct ChannelSource {
    receiver: mpsc::Receiver<SourceEvent>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<SourceEvent>, ChannelSource) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, ChannelSource { receiver })
    }
}

#[async_trait]
impl NotificationSource for ChannelSource {
    async fn next(&mut self) -> Option<SourceEvent> {
        self.receiver.recv().await
    }
}

/// Recreates subscriptions when a watchdog resets a writer
#[async_trait]
pub trait SubscriptionController: Send + Sync {
    async fn recreate(&self, writer_group_id: u16, data_set_writer_id: u16) -> Result<(), StatusCode>;
}

/// A controller for embeddings without a subscription layer to reset
pub struct NullSubscriptionController;

#[async_trait]
impl SubscriptionController for NullSubscriptionController {
    async fn recreate(&self, writer_group_id: u16, data_set_writer_id: u16) -> Result<(), StatusCode> {
        debug!(
            "No subscription layer to recreate writer {} of group {}",
            data_set_writer_id, writer_group_id
        );
        Ok(())
    }
}
