// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The data set writer turns the notifications of one published data set into data set
//! messages, one per publishing cycle plus one per event.

use std::{
    collections::HashMap,
    str::FromStr,
    sync::Arc,
};

use chrono::Duration;

use crate::error::PublisherError;
use crate::pubsub::{
    data_set_message::*, diagnostics::WriterGroupDiagnostics, field_filter::FieldFilter,
    heartbeat::*, meta_data::*, models::*, notification::Notification,
};
use crate::types::*;

/// A writer is either fully configured or in error. A writer in error is skipped until it is
/// reconfigured.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterState {
    Ok,
    Error { status: StatusCode, reason: String },
}

/// Settings applied to fields that do not set their own
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriterDefaults {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: Option<u64>,
    pub heartbeat_behavior: Option<HeartbeatBehavior>,
    pub watchdog: Option<WatchdogSettingsModel>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FieldKind {
    Variable,
    Method,
    Event,
}

#[derive(Debug)]
struct FieldState {
    id: String,
    name: String,
    kind: FieldKind,
    node_id: String,
    display_name: Option<String>,
    mode: MonitoringMode,
    promoted: bool,
    /// Reported only when a triggering field reports
    triggered: bool,
    /// Indices of the fields this field triggers
    triggers: Vec<usize>,
    filter: FieldFilter,
    heartbeat: Option<HeartbeatGenerator>,
    last_emitted: Option<DataValue>,
    last_sampled: Option<DataValue>,
    pending: Option<DataValue>,
}

impl FieldState {
    fn new(id: String, name: String, kind: FieldKind, node_id: String) -> Self {
        FieldState {
            id,
            name,
            kind,
            node_id,
            display_name: None,
            mode: MonitoringMode::Reporting,
            promoted: false,
            triggered: false,
            triggers: Vec::new(),
            filter: FieldFilter::default(),
            heartbeat: None,
            last_emitted: None,
            last_sampled: None,
            pending: None,
        }
    }

    fn clear(&mut self) {
        self.last_emitted = None;
        self.last_sampled = None;
        self.pending = None;
        self.filter.activate();
        if let Some(ref mut heartbeat) = self.heartbeat {
            heartbeat.reset();
        }
    }
}

type ConfigError = (StatusCode, String);

pub struct DataSetWriter {
    model: DataSetWriterModel,
    writer_group_name: String,
    encoding: MessageEncoding,
    defaults: WriterDefaults,
    state: WriterState,
    fields: Vec<FieldState>,
    field_index: HashMap<String, usize>,
    extension_fields: Vec<(String, Variant)>,
    sequence_number: u32,
    flush_count: u64,
    meta_data: Arc<DataSetMetaData>,
    meta_data_sent: Option<(ConfigurationVersion, DateTime)>,
    events: Vec<DataSetMessage>,
    diagnostics: Arc<WriterGroupDiagnostics>,
}

impl DataSetWriter {
    pub fn new(
        model: DataSetWriterModel,
        writer_group_name: &str,
        encoding: MessageEncoding,
        defaults: WriterDefaults,
        diagnostics: Arc<WriterGroupDiagnostics>,
    ) -> DataSetWriter {
        let class_id = model.data_set.as_ref().and_then(|d| d.data_set_class_id);
        let meta_data = DataSetMetaData::new(model.name(), class_id, Vec::new());
        let mut writer = DataSetWriter {
            model: DataSetWriterModel::default(),
            writer_group_name: writer_group_name.to_string(),
            encoding,
            defaults,
            state: WriterState::Ok,
            fields: Vec::new(),
            field_index: HashMap::new(),
            extension_fields: Vec::new(),
            sequence_number: 0,
            flush_count: 0,
            meta_data: Arc::new(meta_data),
            meta_data_sent: None,
            events: Vec::new(),
            diagnostics,
        };
        writer.configure(model);
        writer
    }

    pub fn id(&self) -> u16 {
        self.model.data_set_writer_id
    }

    pub fn name(&self) -> String {
        self.model.name()
    }

    pub fn writer_group_name(&self) -> &str {
        &self.writer_group_name
    }

    pub fn model(&self) -> &DataSetWriterModel {
        &self.model
    }

    pub fn state(&self) -> &WriterState {
        &self.state
    }

    pub fn is_ok(&self) -> bool {
        self.state == WriterState::Ok
    }

    pub fn meta_data(&self) -> Arc<DataSetMetaData> {
        self.meta_data.clone()
    }

    /// The sequence number of the last message produced
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Ids of the monitored items behind the fields, watched by the watchdog
    pub fn monitored_item_ids(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.kind != FieldKind::Method && f.mode != MonitoringMode::Disabled)
            .map(|f| f.id.clone())
            .collect()
    }

    /// Records an error found outside the writer, e.g. by the subscription layer
    pub fn set_error(&mut self, status: StatusCode, reason: &str) {
        warn!(
            "Data set writer {} is in error {}, {}",
            self.id(),
            status,
            reason
        );
        self.state = WriterState::Error {
            status,
            reason: reason.to_string(),
        };
    }

    /// Replaces the configuration. Sequence numbers carry on, the metadata version follows
    /// the change of the field layout. Returns true if the metadata version changed.
    pub fn reconfigure(&mut self, model: DataSetWriterModel) -> bool {
        let version = self.meta_data.configuration_version;
        self.configure(model);
        self.meta_data.configuration_version != version
    }

    /// Starts over as if newly created, e.g. after the subscription was recreated
    pub fn restart(&mut self) {
        info!("Data set writer {} restarts", self.id());
        self.sequence_number = 0;
        self.flush_count = 0;
        self.events.clear();
        self.meta_data_sent = None;
        self.fields.iter_mut().for_each(|f| f.clear());
    }

    fn configure(&mut self, model: DataSetWriterModel) {
        match self.build_fields(&model) {
            Ok((fields, meta_fields, extension_fields)) => {
                self.field_index = fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (f.id.clone(), i))
                    .collect();
                self.fields = fields;
                self.extension_fields = extension_fields;
                let meta_data = Arc::make_mut(&mut self.meta_data);
                meta_data.name = model.name();
                meta_data.data_set_class_id =
                    model.data_set.as_ref().and_then(|d| d.data_set_class_id);
                if meta_data.update_fields(meta_fields) {
                    debug!(
                        "Data set writer {} metadata version is now {}",
                        model.data_set_writer_id, meta_data.configuration_version
                    );
                }
                self.state = WriterState::Ok;
                self.model = model;
            }
            Err((status, reason)) => {
                self.model = model;
                self.fields.clear();
                self.field_index.clear();
                self.set_error(status, &reason);
            }
        }
    }

    fn build_fields(
        &self,
        model: &DataSetWriterModel,
    ) -> Result<(Vec<FieldState>, Vec<FieldMetaData>, Vec<(String, Variant)>), ConfigError> {
        let data_set = model.data_set.as_ref().ok_or_else(|| {
            (
                StatusCode::BadConfigurationError,
                format!("Writer {} has no data set", model.id),
            )
        })?;

        let mut fields = Vec::new();
        let mut meta_fields = Vec::new();
        match &data_set.data_set_source {
            PublishedDataSetSource::PublishedVariables(variables) => {
                for v in variables {
                    let field = self.variable_field(v)?;
                    meta_fields.push(FieldMetaData::new(&field.name, Some(field.node_id.clone())));
                    fields.push(field);
                }
                self.resolve_triggering(variables, &mut fields);
            }
            PublishedDataSetSource::PublishedEvents(events) => {
                for e in events {
                    let node_id = parse_node_id(&e.field_id(), e.event_notifier.as_deref())?;
                    fields.push(FieldState::new(
                        e.field_id(),
                        e.published_event_name.clone().unwrap_or_else(|| e.field_id()),
                        FieldKind::Event,
                        node_id,
                    ));
                    // Payload fields are the selected event fields
                    for name in e.selected_fields.iter().flatten() {
                        if !meta_fields.iter().any(|f: &FieldMetaData| &f.name == name) {
                            meta_fields.push(FieldMetaData::new(name, None));
                        }
                    }
                }
            }
            PublishedDataSetSource::PublishedMethods(methods) => {
                for m in methods {
                    let node_id = parse_node_id(&m.field_id(), m.method_id.as_deref())?;
                    let field = FieldState::new(m.field_id(), m.field_name(), FieldKind::Method, node_id);
                    meta_fields.push(FieldMetaData::new(&field.name, Some(field.node_id.clone())));
                    fields.push(field);
                }
            }
        }

        let mut index = HashMap::new();
        for f in &fields {
            if index.insert(f.id.as_str(), ()).is_some() {
                return Err((
                    StatusCode::BadConfigurationError,
                    format!("Field id {} is used more than once", f.id),
                ));
            }
        }

        let mut extension_fields = Vec::new();
        if model
            .field_content_mask()
            .contains(DataSetFieldContentFlags::EXTENSION_FIELDS)
        {
            for (name, value) in data_set.extension_fields.iter().flatten() {
                let mut meta_field = FieldMetaData::new(name, None);
                meta_field.built_in_type = Some(value.type_id());
                if value.is_array() {
                    meta_field.value_rank = VALUE_RANK_ONE_DIMENSION;
                }
                meta_fields.push(meta_field);
                extension_fields.push((name.clone(), value.clone()));
            }
        }
        Ok((fields, meta_fields, extension_fields))
    }

    fn variable_field(&self, v: &PublishedDataSetVariableModel) -> Result<FieldState, ConfigError> {
        let id = v.field_id();
        let node_id = parse_node_id(&id, v.published_variable_node_id.as_deref())?;
        let filter = FieldFilter::new(v)
            .map_err(|status| (status, format!("Field {} has an invalid filter", id)))?;
        let heartbeat_interval = v
            .heartbeat_interval
            .or(self.defaults.heartbeat_interval)
            .filter(|i| *i > 0);
        let heartbeat = heartbeat_interval.map(|interval| {
            let behavior = v
                .heartbeat_behavior
                .or(self.defaults.heartbeat_behavior)
                .unwrap_or_default();
            HeartbeatGenerator::new(Duration::milliseconds(interval as i64), behavior)
        });
        let mut field = FieldState::new(id, v.field_name(), FieldKind::Variable, node_id);
        field.display_name = v.published_variable_display_name.clone();
        field.mode = v.monitoring_mode.unwrap_or_default();
        field.promoted = v.promoted.unwrap_or(false);
        field.filter = filter;
        field.heartbeat = heartbeat;
        Ok(field)
    }

    /// Links triggering fields to the fields they trigger. Triggered fields never heartbeat.
    fn resolve_triggering(&self, variables: &[PublishedDataSetVariableModel], fields: &mut [FieldState]) {
        for (i, v) in variables.iter().enumerate() {
            for target in v.triggering.iter().flatten() {
                match fields.iter().position(|f| &f.id == target) {
                    Some(t) if t != i => {
                        fields[i].triggers.push(t);
                        fields[t].triggered = true;
                        if fields[t].heartbeat.take().is_some() {
                            debug!("Field {} is triggered, its heartbeat is ignored", target);
                        }
                    }
                    _ => warn!(
                        "Field {} triggers unknown field {}, ignored",
                        fields[i].id, target
                    ),
                }
            }
        }
    }

    /// Feeds a notification to the writer. Returns true if it produced something to publish.
    pub fn on_notification(
        &mut self,
        notification: Notification,
        now: DateTime,
    ) -> Result<bool, PublisherError> {
        if !self.is_ok() {
            trace!(
                "Data set writer {} is in error, notification is ignored",
                self.id()
            );
            return Ok(false);
        }
        let index = *self
            .field_index
            .get(notification.field_id())
            .ok_or_else(|| PublisherError::UnknownField(notification.field_id().to_string()))?;
        self.diagnostics
            .increment(&self.diagnostics.ingress_data_changes);
        let result = match notification {
            Notification::DataChange { value, .. } => {
                self.diagnostics
                    .increment(&self.diagnostics.ingress_value_changes);
                self.on_data_change(index, value, now)
            }
            Notification::MethodResult {
                status,
                outputs,
                timestamp,
                ..
            } => {
                let value = DataValue {
                    value: Some(method_outputs_to_variant(outputs)),
                    status: Some(status),
                    source_timestamp: Some(timestamp),
                    server_timestamp: Some(timestamp),
                    ..Default::default()
                };
                self.on_data_change(index, value, now)
            }
            Notification::Event {
                fields, timestamp, ..
            } => self.on_event(index, fields, timestamp, now),
        };
        Ok(result)
    }

    fn on_data_change(&mut self, index: usize, value: DataValue, now: DateTime) -> bool {
        if self.fields[index].mode == MonitoringMode::Disabled {
            return false;
        }
        if let Some(ref v) = value.value {
            if Arc::make_mut(&mut self.meta_data).learn_type(index, v) {
                debug!(
                    "Data set writer {} learned type of field {}, metadata version {}",
                    self.id(),
                    self.fields[index].name,
                    self.meta_data.configuration_version
                );
            }
        }

        let field = &mut self.fields[index];
        if field.mode == MonitoringMode::Sampling || field.triggered {
            field.last_sampled = Some(value);
            return false;
        }

        let (emit, value) = field.filter.apply(field.last_emitted.as_ref(), value);
        if !emit {
            self.diagnostics
                .increment(&self.diagnostics.ingress_filtered);
            return false;
        }
        if let Some(ref mut heartbeat) = field.heartbeat {
            heartbeat.on_value(&value, now);
        }
        field.last_sampled = Some(value.clone());
        field.last_emitted = Some(value.clone());
        field.pending = Some(value);

        let triggers = field.triggers.clone();
        for t in triggers {
            let target = &mut self.fields[t];
            if let Some(sampled) = target.last_sampled.clone() {
                target.last_emitted = Some(sampled.clone());
                target.pending = Some(sampled);
            }
        }
        true
    }

    fn on_event(
        &mut self,
        index: usize,
        fields: Vec<(String, Variant)>,
        timestamp: DateTime,
        now: DateTime,
    ) -> bool {
        if self.fields[index].mode == MonitoringMode::Disabled {
            return false;
        }
        self.diagnostics.increment(&self.diagnostics.ingress_events);
        self.diagnostics
            .increment(&self.diagnostics.ingress_event_notifications);

        let node_id = self.fields[index].node_id.clone();
        let mut payload = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let position = self.meta_data.field_index(&name);
            if let Some(position) = position {
                Arc::make_mut(&mut self.meta_data).learn_type(position, &value);
            }
            let mut field = DataSetField::new(
                position.unwrap_or(payload.len()) as u16,
                name,
                DataValue {
                    value: Some(value),
                    source_timestamp: Some(timestamp),
                    ..Default::default()
                },
            );
            field.node_id = Some(node_id.clone());
            field.subscription_id = self.model.subscription_id;
            payload.push(field);
        }
        let message = self.new_message(DataSetMessageType::Event, Payload::Fields(payload), now);
        self.events.push(message);
        true
    }

    /// Event messages produced since the last call
    pub fn drain_events(&mut self) -> Vec<DataSetMessage> {
        std::mem::take(&mut self.events)
    }

    /// Produces the data set message of this publishing cycle, if any
    pub fn flush(&mut self, now: DateTime) -> Option<DataSetMessage> {
        if !self.is_ok() {
            return None;
        }
        let key_frame_count = self.model.key_frame_count.unwrap_or(0) as u64;
        let key_frame_due = key_frame_count > 0 && self.flush_count % key_frame_count == 0;
        self.flush_count += 1;

        self.poll_heartbeats(now);

        let has_pending = self.fields.iter().any(|f| f.pending.is_some());
        let has_data = has_pending || self.fields.iter().any(|f| f.last_emitted.is_some());

        let (message_type, fields) = if key_frame_due && has_data {
            let mut fields = Vec::with_capacity(self.fields.len());
            for i in 0..self.fields.len() {
                if self.fields[i].mode == MonitoringMode::Disabled {
                    continue;
                }
                let value = match self.fields[i].pending.take() {
                    Some(value) => value,
                    None => self.fields[i].last_emitted.clone().unwrap_or_else(|| DataValue {
                        status: Some(StatusCode::BadWaitingForInitialData),
                        server_timestamp: Some(now),
                        ..Default::default()
                    }),
                };
                fields.push(self.data_set_field(i, value));
            }
            (DataSetMessageType::KeyFrame, fields)
        } else if has_pending {
            let mut fields = Vec::new();
            for i in 0..self.fields.len() {
                if let Some(value) = self.fields[i].pending.take() {
                    fields.push(self.data_set_field(i, value));
                }
            }
            (DataSetMessageType::DeltaFrame, fields)
        } else if self.send_keep_alive() {
            return Some(self.new_message(DataSetMessageType::KeepAlive, Payload::default(), now));
        } else {
            return None;
        };

        let field_mask = self.model.field_content_mask();
        let payload = if field_mask.contains(DataSetFieldContentFlags::SINGLE_FIELD_DEGRADE_TO_VALUE)
            && self.fields.len() == 1
            && fields.len() == 1
        {
            Payload::Value(fields.into_iter().next()?)
        } else {
            let mut fields = fields;
            let base = self.fields.len();
            fields.extend(self.extension_fields.iter().enumerate().map(|(i, (name, value))| {
                DataSetField::new((base + i) as u16, name.clone(), DataValue::from(value.clone()))
            }));
            Payload::Fields(fields)
        };
        Some(self.new_message(message_type, payload, now))
    }

    fn poll_heartbeats(&mut self, now: DateTime) {
        for field in self.fields.iter_mut() {
            let Some(ref mut heartbeat) = field.heartbeat else {
                continue;
            };
            match heartbeat.poll(now) {
                Some(Heartbeat::Value(value)) => {
                    trace!("Heartbeat of field {}", field.id);
                    self.diagnostics
                        .increment(&self.diagnostics.ingress_heartbeats);
                    if field.pending.is_none() {
                        field.pending = Some(value);
                    }
                }
                Some(Heartbeat::Diagnostic) => {
                    self.diagnostics
                        .increment(&self.diagnostics.ingress_diagnostic_heartbeats);
                }
                None => {}
            }
        }
    }

    fn send_keep_alive(&self) -> bool {
        self.model
            .data_set
            .as_ref()
            .and_then(|d| d.send_keep_alive)
            .unwrap_or(false)
    }

    fn data_set_field(&self, index: usize, value: DataValue) -> DataSetField {
        let f = &self.fields[index];
        DataSetField {
            index: index as u16,
            name: f.name.clone(),
            value,
            node_id: Some(f.node_id.clone()),
            display_name: Some(f.display_name.clone().unwrap_or_else(|| f.name.clone())),
            subscription_id: self.model.subscription_id,
            promoted: f.promoted,
        }
    }

    fn new_message(
        &mut self,
        message_type: DataSetMessageType,
        payload: Payload,
        now: DateTime,
    ) -> DataSetMessage {
        let sequence_number = self.next_sequence_number();
        DataSetMessage {
            data_set_writer_id: self.model.data_set_writer_id,
            data_set_writer_name: self.model.name(),
            sequence_number,
            message_type,
            timestamp: now,
            picoseconds: 0,
            status: worst_status(payload.fields().iter().map(|f| f.value.status())),
            meta_data_version: self.meta_data.configuration_version,
            field_content_mask: self.model.field_content_mask(),
            message_content_mask: self.model.message_content_mask(),
            payload,
            endpoint_url: self.model.endpoint_url.clone(),
            application_uri: self.model.application_uri.clone(),
            meta_data: Some(self.meta_data.clone()),
        }
    }

    /// Sequence numbers wrap at 16 bits for the binary mapping, 32 bits otherwise
    fn next_sequence_number(&mut self) -> u32 {
        self.sequence_number = if self.encoding.base() == MessageEncoding::UADP {
            (self.sequence_number as u16).wrapping_add(1) as u32
        } else {
            self.sequence_number.wrapping_add(1)
        };
        self.sequence_number
    }

    /// Metadata to send this cycle. Metadata is sent when its version changed and every
    /// metadata update time thereafter. Writers without an update time never send it.
    pub fn meta_data_message(&mut self, now: DateTime) -> Option<Arc<DataSetMetaData>> {
        let update_time = self.model.meta_data_update_time?;
        if !self.is_ok() {
            return None;
        }
        let version = self.meta_data.configuration_version;
        let send = match self.meta_data_sent {
            None => true,
            Some((sent_version, sent_at)) => {
                sent_version != version
                    || (update_time > 0
                        && now - sent_at >= Duration::milliseconds(update_time as i64))
            }
        };
        if send {
            self.meta_data_sent = Some((version, now));
            Some(self.meta_data.clone())
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn set_sequence_number(&mut self, sequence_number: u32) {
        self.sequence_number = sequence_number;
    }
}

fn parse_node_id(field_id: &str, node_id: Option<&str>) -> Result<String, ConfigError> {
    let node_id = node_id.ok_or_else(|| {
        (
            StatusCode::BadNodeIdInvalid,
            format!("Field {} has no node id", field_id),
        )
    })?;
    NodeId::from_str(node_id)
        .map(|n| n.to_string())
        .map_err(|status| {
            (
                status,
                format!("Field {} has invalid node id {}", field_id, node_id),
            )
        })
}

/// A single output is the value itself, several outputs become an array
fn method_outputs_to_variant(mut outputs: Vec<Variant>) -> Variant {
    match outputs.len() {
        0 => Variant::Empty,
        1 => outputs.remove(0),
        _ => {
            let value_type = outputs[0].type_id();
            if outputs
                .iter()
                .all(|v| v.type_id() == value_type && !v.is_array())
            {
                Variant::new_array(value_type, outputs)
            } else {
                Variant::new_array(
                    VariantTypeId::String,
                    outputs
                        .iter()
                        .map(|v| Variant::String(v.to_string()))
                        .collect(),
                )
            }
        }
    }
}
