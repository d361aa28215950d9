// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The publisher ties writer groups to a notification source and an outbound sink, and runs
//! their tasks on the tokio runtime.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::error::PublisherError;
use crate::pubsub::{
    config::PublisherConfig, diagnostics::DiagnosticsReporter, models::*, notification::*,
    sink::*, watchdog::*, writer_group::WriterGroup,
};
use crate::types::*;

/// Builds a publisher. A configuration and a sink are required.
pub struct PublisherBuilder {
    config: Option<PublisherConfig>,
    sink: Option<Arc<dyn OutboundSink>>,
    controller: Arc<dyn SubscriptionController>,
    process: Arc<dyn ProcessControl>,
}

impl Default for PublisherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PublisherBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            sink: None,
            controller: Arc::new(NullSubscriptionController),
            process: Arc::new(DefaultProcessControl),
        }
    }

    pub fn config(mut self, config: PublisherConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutboundSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The subscription layer, asked to recreate subscriptions when a watchdog resets a writer
    pub fn subscription_controller(mut self, controller: Arc<dyn SubscriptionController>) -> Self {
        self.controller = controller;
        self
    }

    /// Replaces the process control used by fatal watchdog behaviors
    pub fn process_control(mut self, process: Arc<dyn ProcessControl>) -> Self {
        self.process = process;
        self
    }

    pub fn build(self) -> Result<Publisher, PublisherError> {
        let config = self.config.ok_or_else(|| {
            PublisherError::InvalidConfiguration("publisher has no configuration".into())
        })?;
        let sink = self.sink.ok_or_else(|| {
            PublisherError::InvalidConfiguration("publisher has no outbound sink".into())
        })?;
        if !config.is_valid() {
            return Err(PublisherError::InvalidConfiguration(format!(
                "configuration of publisher {} is not valid",
                config.publisher_id
            )));
        }
        let now = DateTime::now();
        let defaults = config.writer_defaults();
        let groups = config
            .writer_groups
            .iter()
            .map(|m| WriterGroup::new(m.clone(), &config.publisher_id, &defaults, now).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Publisher {
            config,
            groups,
            sink,
            controller: self.controller,
            process: self.process,
            running: None,
        })
    }
}

struct Running {
    cancel: CancellationToken,
    drain_cancel: CancellationToken,
    group_tasks: Vec<JoinHandle<()>>,
    drain_tasks: Vec<JoinHandle<()>>,
    other_tasks: Vec<JoinHandle<()>>,
}

pub struct Publisher {
    config: PublisherConfig,
    groups: Vec<Arc<WriterGroup>>,
    sink: Arc<dyn OutboundSink>,
    controller: Arc<dyn SubscriptionController>,
    process: Arc<dyn ProcessControl>,
    running: Option<Running>,
}

impl Publisher {
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn groups(&self) -> &[Arc<WriterGroup>] {
        &self.groups
    }

    pub fn group(&self, writer_group_id: u16) -> Option<Arc<WriterGroup>> {
        self.groups
            .iter()
            .find(|g| g.id() == writer_group_id)
            .cloned()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Snapshots of the counters of every writer group
    pub fn diagnostics(&self, now: DateTime) -> Vec<WriterGroupDiagnosticModel> {
        self.groups
            .iter()
            .map(|g| g.diagnostics().snapshot(now))
            .collect()
    }

    /// Routes an event of the notification source to its writer group
    pub fn dispatch(&self, event: SourceEvent, now: DateTime) -> Result<(), PublisherError> {
        dispatch(&self.groups, event, now)
    }

    async fn announce(&self, event_type: RuntimeStateEventType) {
        let event = RuntimeStateEventModel::new(event_type, &self.config.publisher_id, DateTime::now());
        match serde_json::to_vec(&event) {
            Ok(payload) => {
                let message = OutboundMessage::new_event(self.config.events_topic(), payload);
                if self.sink.enqueue(message).await == EnqueueResult::Dropped {
                    warn!("Runtime state event {:?} was dropped by the sink", event_type);
                }
            }
            Err(err) => error!("Cannot serialize runtime state event, {}", err),
        }
    }

    /// Starts the writer groups, their watchdogs and outbound queues, the diagnostics reporter and
    /// the dispatch of notifications from the source.
    pub async fn start(&mut self, source: Box<dyn NotificationSource>) -> Result<(), PublisherError> {
        if self.running.is_some() {
            return Err(PublisherError::InvalidConfiguration(format!(
                "publisher {} is already running",
                self.config.publisher_id
            )));
        }
        info!(
            "Publisher {} starts with {} writer groups",
            self.config.publisher_id,
            self.groups.len()
        );
        let cancel = CancellationToken::new();
        let drain_cancel = CancellationToken::new();
        let mut group_tasks = Vec::new();
        let mut drain_tasks = Vec::new();
        let mut other_tasks = Vec::new();

        for group in &self.groups {
            group_tasks.push(tokio::spawn(group.clone().run(cancel.child_token())));
            drain_tasks.push(tokio::spawn(group.queue().drain(
                self.sink.clone(),
                group.diagnostics(),
                drain_cancel.child_token(),
            )));
            for watchdog in group.watchdogs() {
                let data_set_writer_id = trace_lock!(watchdog).data_set_writer_id();
                let Some(writer) = group.writer(data_set_writer_id) else {
                    continue;
                };
                let actions = WatchdogActions {
                    diagnostics: group.diagnostics(),
                    writer,
                    controller: self.controller.clone(),
                    process: self.process.clone(),
                };
                other_tasks.push(tokio::spawn(actions.run(watchdog.clone(), cancel.child_token())));
            }
        }

        if self.config.diagnostics_interval_ms > 0 {
            let reporter = DiagnosticsReporter::new(
                self.groups.iter().map(|g| g.diagnostics()).collect(),
                self.config.diagnostics_target,
                std::time::Duration::from_millis(self.config.diagnostics_interval_ms),
                self.sink.clone(),
                self.config.events_topic(),
            );
            other_tasks.push(tokio::spawn(reporter.run(cancel.child_token())));
        }

        other_tasks.push(tokio::spawn(run_source(
            self.groups.clone(),
            source,
            cancel.child_token(),
        )));

        self.running = Some(Running {
            cancel,
            drain_cancel,
            group_tasks,
            drain_tasks,
            other_tasks,
        });
        self.announce(RuntimeStateEventType::Running).await;
        Ok(())
    }

    /// Stops in two phases. Notifications are refused and every group publishes a final cycle,
    /// unless `discard` is set, then the outbound queues are drained into the sink.
    pub async fn stop(&mut self, discard: bool) {
        let Some(running) = self.running.take() else {
            return;
        };
        self.announce(RuntimeStateEventType::ShutdownAnnouncement).await;
        for group in &self.groups {
            group.stop_accepting();
            group.set_discard_on_stop(discard);
        }
        running.cancel.cancel();
        let tasks = running.group_tasks.into_iter().chain(running.other_tasks);
        for err in join_all(tasks).await.into_iter().filter_map(Result::err) {
            error!("Publisher task failed, {}", err);
        }
        // Final cycles are queued, the queues may drain now
        running.drain_cancel.cancel();
        for err in join_all(running.drain_tasks).await.into_iter().filter_map(Result::err) {
            error!("Outbound queue task failed, {}", err);
        }
        self.announce(RuntimeStateEventType::Stopped).await;
        info!("Publisher {} has stopped", self.config.publisher_id);
    }

    /// Restarts every writer, so sequence numbers and key frame counting start over
    pub async fn restart(&self) {
        self.announce(RuntimeStateEventType::RestartAnnouncement).await;
        let now = DateTime::now();
        for group in &self.groups {
            for writer in group.writers() {
                let id = trace_lock!(writer).id();
                if let Err(err) = group.restart_writer(id, now) {
                    error!("Cannot restart writer {} of group {}, {}", id, group.id(), err);
                }
            }
        }
    }
}

fn dispatch(groups: &[Arc<WriterGroup>], event: SourceEvent, now: DateTime) -> Result<(), PublisherError> {
    match event {
        SourceEvent::Notification {
            writer_group_id,
            data_set_writer_id,
            notification,
        } => {
            let group = groups
                .iter()
                .find(|g| g.id() == writer_group_id)
                .ok_or(PublisherError::UnknownWriterGroup(writer_group_id))?;
            group.on_notification(data_set_writer_id, notification, now)
        }
        SourceEvent::ItemAlive {
            writer_group_id,
            data_set_writer_id,
            field_id,
        } => {
            let group = groups
                .iter()
                .find(|g| g.id() == writer_group_id)
                .ok_or(PublisherError::UnknownWriterGroup(writer_group_id))?;
            group.on_item_alive(data_set_writer_id, &field_id, now);
            Ok(())
        }
    }
}

async fn run_source(
    groups: Vec<Arc<WriterGroup>>,
    mut source: Box<dyn NotificationSource>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            event = source.next() => match event {
                Some(event) => {
                    if let Err(err) = dispatch(&groups, event, DateTime::now()) {
                        warn!("Notification was not delivered, {}", err);
                    }
                }
                None => {
                    debug!("Notification source is exhausted");
                    break;
                }
            }
        }
    }
}
