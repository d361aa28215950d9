// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The writer group flushes its writers on the publishing interval, or earlier when enough
//! notifications are pending, and turns their data set messages into encoded network messages.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use tokio::{
    sync::Notify,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::error::PublisherError;
use crate::pubsub::{
    data_set_writer::*, diagnostics::WriterGroupDiagnostics, encoder::*,
    models::*, network_message::*, notification::Notification, sink::*, watchdog::*,
};
use crate::sync::*;
use crate::types::*;

/// Suffix of the topic metadata messages are published to
pub const META_DATA_TOPIC_SUFFIX: &str = "metadata";

#[derive(Debug)]
struct PublishState {
    sequence_number: u16,
    last_output: DateTime,
}

pub struct WriterGroup {
    model: WriterGroupModel,
    publisher_id: String,
    encoder: Encoder,
    writers: Vec<Arc<Mutex<DataSetWriter>>>,
    watchdogs: Vec<Arc<Mutex<SubscriptionWatchdog>>>,
    diagnostics: Arc<WriterGroupDiagnostics>,
    queue: Arc<OutboundQueue>,
    /// Notifications received since the last publish
    pending: AtomicUsize,
    publish_now: Notify,
    accepting: AtomicBool,
    discard_on_stop: AtomicBool,
    state: Mutex<PublishState>,
}

impl WriterGroup {
    pub fn new(
        model: WriterGroupModel,
        publisher_id: &str,
        defaults: &WriterDefaults,
        now: DateTime,
    ) -> Result<WriterGroup, PublisherError> {
        let encoder = Encoder::new(model.message_encoding())?;
        let name = model.name();
        let diagnostics = Arc::new(WriterGroupDiagnostics::new(model.writer_group_id, &name, now));

        let mut writers: Vec<Arc<Mutex<DataSetWriter>>> = Vec::with_capacity(model.data_set_writers.len());
        let mut watchdogs = Vec::new();
        for writer_model in &model.data_set_writers {
            let id = writer_model.data_set_writer_id;
            if writers.iter().any(|w| trace_lock!(w).id() == id) {
                error!("Writer group {} has more than one writer with id {}", name, id);
                return Err(PublisherError::InvalidConfiguration(format!(
                    "data set writer id {} is not unique in writer group {}",
                    id, name
                )));
            }
            let writer = DataSetWriter::new(
                writer_model.clone(),
                &name,
                encoder.encoding(),
                defaults.clone(),
                diagnostics.clone(),
            );
            let settings = writer_model.watchdog.as_ref().or(defaults.watchdog.as_ref());
            if let Some(settings) = settings {
                if let Some(watchdog) = SubscriptionWatchdog::new(
                    model.writer_group_id,
                    id,
                    settings,
                    writer.monitored_item_ids(),
                    now,
                ) {
                    watchdogs.push(Arc::new(Mutex::new(watchdog)));
                }
            }
            writers.push(Arc::new(Mutex::new(writer)));
        }

        let group = WriterGroup {
            queue: Arc::new(OutboundQueue::new(model.publish_queue_size())),
            publisher_id: publisher_id.to_string(),
            encoder,
            writers,
            watchdogs,
            diagnostics,
            pending: AtomicUsize::new(0),
            publish_now: Notify::new(),
            accepting: AtomicBool::new(true),
            discard_on_stop: AtomicBool::new(false),
            state: Mutex::new(PublishState {
                sequence_number: 0,
                last_output: now,
            }),
            model,
        };
        group.update_writers_in_error();
        Ok(group)
    }

    pub fn id(&self) -> u16 {
        self.model.writer_group_id
    }

    pub fn name(&self) -> String {
        self.model.name()
    }

    pub fn model(&self) -> &WriterGroupModel {
        &self.model
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn diagnostics(&self) -> Arc<WriterGroupDiagnostics> {
        self.diagnostics.clone()
    }

    pub fn queue(&self) -> Arc<OutboundQueue> {
        self.queue.clone()
    }

    pub fn writer(&self, data_set_writer_id: u16) -> Option<Arc<Mutex<DataSetWriter>>> {
        self.writers
            .iter()
            .find(|w| trace_lock!(w).id() == data_set_writer_id)
            .cloned()
    }

    pub fn writers(&self) -> &[Arc<Mutex<DataSetWriter>>] {
        &self.writers
    }

    pub fn watchdogs(&self) -> &[Arc<Mutex<SubscriptionWatchdog>>] {
        &self.watchdogs
    }

    fn watchdog(&self, data_set_writer_id: u16) -> Option<&Arc<Mutex<SubscriptionWatchdog>>> {
        self.watchdogs
            .iter()
            .find(|w| trace_lock!(w).data_set_writer_id() == data_set_writer_id)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// First phase of a stop, notifications are refused from now on
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Skip the final publish when the group stops
    pub fn set_discard_on_stop(&self, discard: bool) {
        self.discard_on_stop.store(discard, Ordering::Release);
    }

    /// Feeds a notification to a writer. Reaching the notification publish threshold wakes the
    /// group for an early publish.
    pub fn on_notification(
        &self,
        data_set_writer_id: u16,
        notification: Notification,
        now: DateTime,
    ) -> Result<(), PublisherError> {
        if !self.is_accepting() {
            return Err(PublisherError::NotAccepting(self.id()));
        }
        let writer = self
            .writer(data_set_writer_id)
            .ok_or(PublisherError::UnknownWriter(data_set_writer_id))?;
        if let Some(watchdog) = self.watchdog(data_set_writer_id) {
            trace_lock!(watchdog).on_item_alive(notification.field_id(), now);
        }
        let produced = trace_lock!(writer).on_notification(notification, now)?;
        if produced {
            let pending = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
            let threshold = self.model.notification_publish_threshold();
            if threshold > 0 && pending == threshold {
                trace!("Writer group {} reached its publish threshold", self.id());
                self.publish_now.notify_one();
            }
        }
        Ok(())
    }

    /// A monitored item is alive without a new value
    pub fn on_item_alive(&self, data_set_writer_id: u16, field_id: &str, now: DateTime) {
        if let Some(watchdog) = self.watchdog(data_set_writer_id) {
            trace_lock!(watchdog).on_item_alive(field_id, now);
        }
    }

    pub fn restart_writer(&self, data_set_writer_id: u16, now: DateTime) -> Result<(), PublisherError> {
        let writer = self
            .writer(data_set_writer_id)
            .ok_or(PublisherError::UnknownWriter(data_set_writer_id))?;
        trace_lock!(writer).restart();
        if let Some(watchdog) = self.watchdog(data_set_writer_id) {
            trace_lock!(watchdog).reset(now);
        }
        Ok(())
    }

    /// Replaces the configuration of a writer. Returns true if its metadata version changed.
    pub fn reconfigure_writer(&self, model: DataSetWriterModel) -> Result<bool, PublisherError> {
        let writer = self
            .writer(model.data_set_writer_id)
            .ok_or(PublisherError::UnknownWriter(model.data_set_writer_id))?;
        let changed = trace_lock!(writer).reconfigure(model);
        self.update_writers_in_error();
        Ok(changed)
    }

    fn update_writers_in_error(&self) {
        let count = self.writers.iter().filter(|w| !trace_lock!(w).is_ok()).count();
        self.diagnostics.set_writers_in_error(count);
    }

    fn topic(&self) -> String {
        self.model
            .publishing_queue
            .as_ref()
            .and_then(|q| q.queue_name.clone())
            .unwrap_or_else(|| format!("{}/{}", self.publisher_id, self.name()))
    }

    fn header(&self, now: DateTime) -> NetworkMessage {
        let class_id = if self.writers.len() == 1 {
            trace_lock!(self.writers[0])
                .model()
                .data_set
                .as_ref()
                .and_then(|d| d.data_set_class_id)
        } else {
            None
        };
        NetworkMessage {
            publisher_id: self.publisher_id.clone(),
            writer_group_id: self.id(),
            writer_group_name: self.name(),
            group_version: self.model.group_version(),
            timestamp: now,
            data_set_class_id: class_id,
            content_mask: self.model.network_message_content_mask(),
            ..Default::default()
        }
    }

    fn outbound(&self, topic: String, payload: Vec<u8>, message_type: NetworkMessageType, message_count: usize) -> OutboundMessage {
        let queue = self.model.publishing_queue.as_ref();
        OutboundMessage {
            topic,
            payload,
            qos: queue
                .and_then(|q| q.requested_delivery_guarantee)
                .unwrap_or_default(),
            ttl: queue.and_then(|q| q.ttl),
            retain: queue.and_then(|q| q.retain).unwrap_or(false),
            content_type: self.encoder.content_type(message_type).to_string(),
            content_encoding: self.encoder.content_encoding().map(str::to_string),
            message_count,
        }
    }

    /// Runs one publishing cycle. Writers are flushed in order, their messages packed, encoded
    /// and returned ready for the sink. Encoding failures only lose the affected message.
    pub fn publish(&self, now: DateTime) -> Vec<OutboundMessage> {
        self.pending.store(0, Ordering::Release);
        if self.writers.is_empty() {
            return Vec::new();
        }

        let mut messages = Vec::new();
        let mut meta_data = Vec::new();
        for writer in &self.writers {
            let mut writer = trace_lock!(writer);
            messages.extend(writer.drain_events());
            if let Some(message) = writer.flush(now) {
                messages.push(message);
            }
            if let Some(m) = writer.meta_data_message(now) {
                meta_data.push(DataSetMetaDataMessage {
                    data_set_writer_id: writer.id(),
                    data_set_writer_name: writer.name(),
                    meta_data: m,
                });
            }
        }
        self.update_writers_in_error();

        let header = self.header(now);
        let topic = self.topic();
        let mut state = trace_lock!(self.state);
        let mut output = Vec::new();

        // Metadata goes first so a subscriber knows the layout before the data
        for m in meta_data {
            let message = NetworkMessage::new_meta_data(&header, m);
            match self.encoder.encode(&message) {
                Ok(payload) => {
                    self.diagnostics
                        .increment(&self.diagnostics.encoder_meta_data_messages_processed);
                    output.push(self.outbound(
                        format!("{}/{}", topic, META_DATA_TOPIC_SUFFIX),
                        payload,
                        NetworkMessageType::MetaData,
                        1,
                    ));
                }
                Err(err) => {
                    error!("Cannot encode metadata of writer group {}, {}", self.id(), err);
                    self.diagnostics.increment(&self.diagnostics.encoder_errors);
                }
            }
        }

        let network_messages = if messages.is_empty() {
            let keep_alive_due = self
                .model
                .keep_alive_time()
                .and_then(|t| chrono::Duration::from_std(t).ok())
                .map(|t| now - state.last_output >= t)
                .unwrap_or(false);
            if !keep_alive_due {
                return output;
            }
            state.last_output = now;
            if !header
                .content_mask
                .contains(NetworkMessageContentFlags::NETWORK_MESSAGE_HEADER)
            {
                trace!("Keep alive of writer group {} is suppressed without a header", self.id());
                return output;
            }
            vec![NetworkMessage::new_data(&header, Vec::new())]
        } else {
            let total = messages.len();
            let result = packer::pack(
                &self.encoder,
                &header,
                messages,
                self.model.data_set_ordering(),
                self.model.max_network_message_size(),
            );
            self.diagnostics
                .record_split_ratio(result.split as f64 / total as f64);
            self.diagnostics.add(
                &self.diagnostics.encoder_notifications_dropped,
                result.dropped_notifications as u64,
            );
            self.diagnostics
                .add(&self.diagnostics.encoder_errors, result.errors as u64);
            result.messages
        };

        let mut network_messages = network_messages;
        for (i, message) in network_messages.iter_mut().enumerate() {
            state.sequence_number = state.sequence_number.wrapping_add(1);
            message.sequence_number = state.sequence_number;
            message.network_message_number = (i + 1) as u16;
        }
        if network_messages.iter().any(|m| !m.messages.is_empty()) {
            state.last_output = now;
        }

        if self.model.use_array_envelope() && self.encoder.supports_envelope() {
            let count = network_messages.iter().map(|m| m.messages.len()).sum();
            match self.encoder.encode_envelope(&network_messages) {
                Ok(payload) => {
                    self.record_encoded(network_messages.len(), count, payload.len());
                    output.push(self.outbound(topic, payload, NetworkMessageType::Data, count));
                }
                Err(err) => {
                    error!("Cannot encode messages of writer group {}, {}", self.id(), err);
                    self.diagnostics.increment(&self.diagnostics.encoder_errors);
                }
            }
        } else {
            for message in &network_messages {
                match self.encoder.encode(message) {
                    Ok(payload) => {
                        let count = message.messages.len();
                        self.record_encoded(1, count, payload.len());
                        output.push(self.outbound(topic.clone(), payload, NetworkMessageType::Data, count));
                    }
                    Err(err) => {
                        error!(
                            "Cannot encode message {} of writer group {}, {}",
                            message.sequence_number,
                            self.id(),
                            err
                        );
                        self.diagnostics.increment(&self.diagnostics.encoder_errors);
                    }
                }
            }
        }
        output
    }

    fn record_encoded(&self, network_messages: usize, notifications: usize, bytes: usize) {
        let d = &self.diagnostics;
        d.add(&d.encoder_network_messages_processed, network_messages as u64);
        d.add(&d.encoder_notifications_processed, notifications as u64);
        d.add(&d.encoder_message_bytes, bytes as u64);
    }

    /// Puts messages on the outbound queue, displacing the oldest when it is full
    pub fn enqueue(&self, messages: Vec<OutboundMessage>) {
        for message in messages {
            if self.queue.push(message).is_some() {
                self.diagnostics
                    .increment(&self.diagnostics.outgress_input_buffer_dropped);
            }
        }
        self.diagnostics.set_input_buffer_count(self.queue.len());
    }

    /// Publishes on the interval, or early when the threshold is reached, until cancelled. On
    /// cancellation notifications are refused and a final cycle is published unless discarding.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.model.publishing_interval();
        info!(
            "Writer group {} publishes every {}ms with {} writers",
            self.name(),
            period.as_millis(),
            self.writers.len()
        );
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        timer.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }
                _ = timer.tick() => {
                    self.enqueue(self.publish(DateTime::now()));
                }
                _ = self.publish_now.notified() => {
                    self.enqueue(self.publish(DateTime::now()));
                    timer.reset();
                }
            }
        }
        self.stop_accepting();
        if !self.discard_on_stop.load(Ordering::Acquire) {
            debug!("Writer group {} publishes its final cycle", self.name());
            self.enqueue(self.publish(DateTime::now()));
        }
        info!("Writer group {} has stopped", self.name());
    }
}
