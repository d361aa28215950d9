// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The outbound boundary of the engine. Encoded messages are buffered per writer group in a
//! bounded queue and handed to an `OutboundSink`, which owns delivery and its retries.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::pubsub::{diagnostics::WriterGroupDiagnostics, models::*};
use crate::sync::*;

#[cfg(feature = "mqtt")]
pub mod mqtt;

/// An encoded message ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Topic or queue name
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: BrokerTransportQualityOfService,
    /// Time to live in milliseconds
    pub ttl: Option<u64>,
    pub retain: bool,
    pub content_type: String,
    pub content_encoding: Option<String>,
    /// Number of data set messages in the payload
    pub message_count: usize,
}

impl OutboundMessage {
    /// A JSON event such as a runtime state change or a diagnostics report
    pub fn new_event<S>(topic: S, payload: Vec<u8>) -> Self
    where
        S: Into<String>,
    {
        Self {
            topic: topic.into(),
            payload,
            qos: BrokerTransportQualityOfService::AtLeastOnce,
            ttl: None,
            retain: false,
            content_type: "application/json".into(),
            content_encoding: None,
            message_count: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EnqueueResult {
    Ok,
    /// The sink could not take the message
    Dropped,
}

/// Accepts finished messages for delivery to a broker or queue
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn enqueue(&self, message: OutboundMessage) -> EnqueueResult;
}

/// A sink that hands messages to a channel, for embedding and tests
pub struct ChannelSink {
    sender: mpsc::Sender<OutboundMessage>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (ChannelSink, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (ChannelSink { sender }, receiver)
    }
}

#[async_trait]
impl OutboundSink for ChannelSink {
    async fn enqueue(&self, message: OutboundMessage) -> EnqueueResult {
        match self.sender.try_send(message) {
            Ok(_) => EnqueueResult::Ok,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Channel sink is full");
                EnqueueResult::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Channel sink is closed");
                EnqueueResult::Dropped
            }
        }
    }
}

/// A bounded buffer of outbound messages. When full the oldest message makes room.
pub struct OutboundQueue {
    capacity: usize,
    messages: Mutex<VecDeque<OutboundMessage>>,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Adds a message, returning the message it displaced if the queue was full
    pub fn push(&self, message: OutboundMessage) -> Option<OutboundMessage> {
        let dropped = {
            let mut messages = trace_lock!(self.messages);
            let dropped = if messages.len() >= self.capacity {
                messages.pop_front()
            } else {
                None
            };
            messages.push_back(message);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    pub fn pop(&self) -> Option<OutboundMessage> {
        trace_lock!(self.messages).pop_front()
    }

    pub fn len(&self) -> usize {
        trace_lock!(self.messages).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands queued messages to the sink until cancelled. Whatever is queued when the token is
    /// cancelled is still delivered.
    pub async fn drain(
        self: Arc<Self>,
        sink: Arc<dyn OutboundSink>,
        diagnostics: Arc<WriterGroupDiagnostics>,
        cancel: CancellationToken,
    ) {
        loop {
            while let Some(message) = self.pop() {
                diagnostics.set_input_buffer_count(self.len());
                match sink.enqueue(message).await {
                    EnqueueResult::Ok => diagnostics.increment(&diagnostics.outgress_message_count),
                    EnqueueResult::Dropped => {
                        diagnostics.increment(&diagnostics.outgress_message_dropped)
                    }
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = self.notify.notified() => {}
            }
        }
        debug!(
            "Outbound queue of writer group {} is drained",
            diagnostics.writer_group_id()
        );
    }
}
