// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Counters of a writer group and the periodic reporting of them.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::pubsub::{models::*, sink::*};
use crate::sync::*;
use crate::types::*;

/// Counters shared by a writer group, its writers and its watchdogs
#[derive(Debug)]
pub struct WriterGroupDiagnostics {
    writer_group_id: u16,
    writer_group_name: String,
    start: RwLock<DateTime>,
    pub ingress_data_changes: AtomicU64,
    pub ingress_value_changes: AtomicU64,
    pub ingress_events: AtomicU64,
    pub ingress_event_notifications: AtomicU64,
    pub ingress_filtered: AtomicU64,
    pub ingress_heartbeats: AtomicU64,
    pub ingress_diagnostic_heartbeats: AtomicU64,
    pub encoder_notifications_processed: AtomicU64,
    pub encoder_notifications_dropped: AtomicU64,
    pub encoder_network_messages_processed: AtomicU64,
    pub encoder_meta_data_messages_processed: AtomicU64,
    pub encoder_errors: AtomicU64,
    pub encoder_message_bytes: AtomicU64,
    /// Split ratio in parts per million, only ever raised
    encoder_max_split_ratio_ppm: AtomicU64,
    pub outgress_input_buffer_count: AtomicU64,
    pub outgress_input_buffer_dropped: AtomicU64,
    pub outgress_message_count: AtomicU64,
    pub outgress_message_dropped: AtomicU64,
    pub writers_in_error: AtomicU64,
    pub watchdog_late_monitored_items: AtomicU64,
    pub watchdog_subscription_trips: AtomicU64,
    pub watchdog_resets: AtomicU64,
}

fn add(counter: &AtomicU64, value: u64) {
    counter.fetch_add(value, Ordering::Relaxed);
}

fn get(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

fn per_sec(count: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        count as f64 / seconds
    } else {
        0.0
    }
}

impl WriterGroupDiagnostics {
    pub fn new<S>(writer_group_id: u16, writer_group_name: S, now: DateTime) -> Self
    where
        S: Into<String>,
    {
        Self {
            writer_group_id,
            writer_group_name: writer_group_name.into(),
            start: RwLock::new(now),
            ingress_data_changes: AtomicU64::new(0),
            ingress_value_changes: AtomicU64::new(0),
            ingress_events: AtomicU64::new(0),
            ingress_event_notifications: AtomicU64::new(0),
            ingress_filtered: AtomicU64::new(0),
            ingress_heartbeats: AtomicU64::new(0),
            ingress_diagnostic_heartbeats: AtomicU64::new(0),
            encoder_notifications_processed: AtomicU64::new(0),
            encoder_notifications_dropped: AtomicU64::new(0),
            encoder_network_messages_processed: AtomicU64::new(0),
            encoder_meta_data_messages_processed: AtomicU64::new(0),
            encoder_errors: AtomicU64::new(0),
            encoder_message_bytes: AtomicU64::new(0),
            encoder_max_split_ratio_ppm: AtomicU64::new(0),
            outgress_input_buffer_count: AtomicU64::new(0),
            outgress_input_buffer_dropped: AtomicU64::new(0),
            outgress_message_count: AtomicU64::new(0),
            outgress_message_dropped: AtomicU64::new(0),
            writers_in_error: AtomicU64::new(0),
            watchdog_late_monitored_items: AtomicU64::new(0),
            watchdog_subscription_trips: AtomicU64::new(0),
            watchdog_resets: AtomicU64::new(0),
        }
    }

    pub fn writer_group_id(&self) -> u16 {
        self.writer_group_id
    }

    pub fn increment(&self, counter: &AtomicU64) {
        add(counter, 1);
    }

    pub fn add(&self, counter: &AtomicU64, value: u64) {
        add(counter, value);
    }

    pub fn set_input_buffer_count(&self, count: usize) {
        self.outgress_input_buffer_count
            .store(count as u64, Ordering::Relaxed);
    }

    pub fn set_writers_in_error(&self, count: usize) {
        self.writers_in_error.store(count as u64, Ordering::Relaxed);
    }

    /// Records the split ratio of a publishing cycle, keeping the worst seen
    pub fn record_split_ratio(&self, ratio: f64) {
        let ppm = (ratio.clamp(0.0, 1.0) * 1_000_000.0).round() as u64;
        self.encoder_max_split_ratio_ppm
            .fetch_max(ppm, Ordering::Relaxed);
    }

    pub fn max_split_ratio(&self) -> f64 {
        get(&self.encoder_max_split_ratio_ppm) as f64 / 1_000_000.0
    }

    /// Counters restart from the supplied time
    pub fn reset_start(&self, now: DateTime) {
        let mut start = trace_write_lock!(self.start);
        *start = now;
    }

    pub fn snapshot(&self, now: DateTime) -> WriterGroupDiagnosticModel {
        let start = *trace_read_lock!(self.start);
        let duration = (now - start).num_milliseconds().max(0) as f64 / 1000.0;
        let network_messages = get(&self.encoder_network_messages_processed);
        let notifications = get(&self.encoder_notifications_processed);
        let (avg_notifications, avg_body) = if network_messages > 0 {
            (
                notifications as f64 / network_messages as f64,
                get(&self.encoder_message_bytes) as f64 / network_messages as f64,
            )
        } else {
            (0.0, 0.0)
        };
        let data_changes = get(&self.ingress_data_changes);
        let sent = get(&self.outgress_message_count);
        WriterGroupDiagnosticModel {
            writer_group_id: self.writer_group_id,
            writer_group_name: Some(self.writer_group_name.clone()),
            timestamp: now,
            ingestion_start: start,
            ingestion_duration: duration,
            ingress_data_changes: data_changes,
            ingress_value_changes: get(&self.ingress_value_changes),
            ingress_events: get(&self.ingress_events),
            ingress_event_notifications: get(&self.ingress_event_notifications),
            ingress_filtered: get(&self.ingress_filtered),
            ingress_heartbeats: get(&self.ingress_heartbeats),
            ingress_diagnostic_heartbeats: get(&self.ingress_diagnostic_heartbeats),
            ingress_data_changes_per_sec: per_sec(data_changes, duration),
            encoder_notifications_processed: notifications,
            encoder_notifications_dropped: get(&self.encoder_notifications_dropped),
            encoder_network_messages_processed: network_messages,
            encoder_meta_data_messages_processed: get(&self.encoder_meta_data_messages_processed),
            encoder_errors: get(&self.encoder_errors),
            encoder_max_message_split_ratio: self.max_split_ratio(),
            encoder_avg_notifications_message: avg_notifications,
            encoder_avg_message_body_size: avg_body,
            outgress_input_buffer_count: get(&self.outgress_input_buffer_count),
            outgress_input_buffer_dropped: get(&self.outgress_input_buffer_dropped),
            outgress_message_count: sent,
            outgress_message_dropped: get(&self.outgress_message_dropped),
            sent_messages_per_sec: per_sec(sent, duration),
            writers_in_error: get(&self.writers_in_error),
            watchdog_late_monitored_items: get(&self.watchdog_late_monitored_items),
            watchdog_subscription_trips: get(&self.watchdog_subscription_trips),
            watchdog_resets: get(&self.watchdog_resets),
        }
    }
}

/// Formats a snapshot as the multi line block written to the log
pub fn format_diagnostics(d: &WriterGroupDiagnosticModel) -> String {
    let mut s = String::new();
    s.push_str(&format!(
        "\n  DIAGNOSTICS INFORMATION for writer group {} ({})\n",
        d.writer_group_id,
        d.writer_group_name.as_deref().unwrap_or("")
    ));
    let lines: [(&str, String); 18] = [
        ("Ingestion duration (s)", format!("{:.0}", d.ingestion_duration)),
        (
            "Ingress data changes",
            format!("{} ({:.2}/s)", d.ingress_data_changes, d.ingress_data_changes_per_sec),
        ),
        ("Ingress value changes", d.ingress_value_changes.to_string()),
        ("Ingress events", d.ingress_events.to_string()),
        ("Ingress filtered values", d.ingress_filtered.to_string()),
        ("Ingress heartbeats", d.ingress_heartbeats.to_string()),
        ("Ingress diagnostic heartbeats", d.ingress_diagnostic_heartbeats.to_string()),
        ("Encoder notifications processed", d.encoder_notifications_processed.to_string()),
        ("Encoder notifications dropped", d.encoder_notifications_dropped.to_string()),
        ("Encoder network messages", d.encoder_network_messages_processed.to_string()),
        ("Encoder errors", d.encoder_errors.to_string()),
        (
            "Encoder worst message split ratio",
            format!("{:.2}", d.encoder_max_message_split_ratio),
        ),
        (
            "Encoder avg notifications/message",
            format!("{:.1}", d.encoder_avg_notifications_message),
        ),
        ("Encoder avg message body size", format!("{:.0}", d.encoder_avg_message_body_size)),
        (
            "Outgress buffer count/dropped",
            format!("{} | {}", d.outgress_input_buffer_count, d.outgress_input_buffer_dropped),
        ),
        (
            "Outgress messages sent",
            format!("{} ({:.2}/s)", d.outgress_message_count, d.sent_messages_per_sec),
        ),
        ("Writers in error", d.writers_in_error.to_string()),
        (
            "Watchdog late items/trips/resets",
            format!(
                "{} | {} | {}",
                d.watchdog_late_monitored_items, d.watchdog_subscription_trips, d.watchdog_resets
            ),
        ),
    ];
    for (name, value) in lines.iter() {
        s.push_str(&format!("  # {:<36}: {:>14}\n", name, value));
    }
    s
}

/// Periodically reports the diagnostics of writer groups to the log or as events
pub struct DiagnosticsReporter {
    groups: Vec<Arc<WriterGroupDiagnostics>>,
    target: DiagnosticsTarget,
    interval: std::time::Duration,
    sink: Arc<dyn OutboundSink>,
    topic: String,
}

impl DiagnosticsReporter {
    pub fn new(
        groups: Vec<Arc<WriterGroupDiagnostics>>,
        target: DiagnosticsTarget,
        interval: std::time::Duration,
        sink: Arc<dyn OutboundSink>,
        topic: String,
    ) -> Self {
        Self {
            groups,
            target,
            interval,
            sink,
            topic,
        }
    }

    /// Writes one report for every group
    pub async fn report(&self, now: DateTime) {
        for group in &self.groups {
            let snapshot = group.snapshot(now);
            match self.target {
                DiagnosticsTarget::Log => info!("{}", format_diagnostics(&snapshot)),
                DiagnosticsTarget::Events => match serde_json::to_vec(&snapshot) {
                    Ok(payload) => {
                        let message = OutboundMessage::new_event(&self.topic, payload);
                        if self.sink.enqueue(message).await == EnqueueResult::Dropped {
                            warn!(
                                "Diagnostics of writer group {} were dropped by the sink",
                                snapshot.writer_group_id
                            );
                        }
                    }
                    Err(err) => error!("Cannot serialize diagnostics, {}", err),
                },
            }
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        timer.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Diagnostics reporter is stopping");
                    break;
                }
                _ = timer.tick() => {
                    self.report(DateTime::now()).await;
                }
            }
        }
    }
}
