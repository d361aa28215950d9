// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Staleness detection of the subscription behind a data set writer.
//!
//! Every monitored item is late once it went without a notification for longer than the
//! watchdog timeout, and is no longer late on its next notification. The subscription trips when
//! all or any of its items are late, depending on the configured condition. A trip is edge
//! triggered: the behavior runs once and the subscription must recover before it can trip again.

use std::{collections::HashMap, sync::Arc};

use chrono::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::pubsub::{
    data_set_writer::DataSetWriter, diagnostics::WriterGroupDiagnostics, models::*,
    notification::SubscriptionController,
};
use crate::sync::*;
use crate::types::*;

/// Exit code of the process when a watchdog with the `ExitProcess` behavior trips. A POSIX
/// parent sees it as 246.
pub const WATCHDOG_EXIT_CODE: i32 = -10;

/// Fatal escalations go through this so that embedding code may observe them
pub trait ProcessControl: Send + Sync {
    /// Terminates the process with the exit code
    fn exit(&self, code: i32);
    /// Terminates the process immediately
    fn abort(&self, reason: &str);
}

/// Really terminates the process
pub struct DefaultProcessControl;

impl ProcessControl for DefaultProcessControl {
    fn exit(&self, code: i32) {
        log::logger().flush();
        std::process::exit(code);
    }

    fn abort(&self, reason: &str) {
        eprintln!("Aborting, {}", reason);
        log::logger().flush();
        std::process::abort();
    }
}

#[derive(Debug, Clone, Copy)]
struct ItemState {
    last_seen: DateTime,
    late: bool,
}

/// A trip of a subscription watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTrip {
    pub writer_group_id: u16,
    pub data_set_writer_id: u16,
    pub behavior: SubscriptionWatchdogBehavior,
    pub late_items: usize,
    pub total_items: usize,
}

/// Watches the monitored items of one subscription
#[derive(Debug)]
pub struct SubscriptionWatchdog {
    writer_group_id: u16,
    data_set_writer_id: u16,
    timeout: Duration,
    condition: MonitoredItemWatchdogCondition,
    behavior: SubscriptionWatchdogBehavior,
    items: HashMap<String, ItemState>,
    tripped: bool,
}

impl SubscriptionWatchdog {
    /// A watchdog for the items, or `None` if the settings disable it with a zero timeout
    pub fn new(
        writer_group_id: u16,
        data_set_writer_id: u16,
        settings: &WatchdogSettingsModel,
        item_ids: Vec<String>,
        now: DateTime,
    ) -> Option<SubscriptionWatchdog> {
        if settings.monitored_item_watchdog_timeout == 0 {
            return None;
        }
        let items = item_ids
            .into_iter()
            .map(|id| {
                (
                    id,
                    ItemState {
                        last_seen: now,
                        late: false,
                    },
                )
            })
            .collect();
        Some(SubscriptionWatchdog {
            writer_group_id,
            data_set_writer_id,
            timeout: Duration::milliseconds(settings.monitored_item_watchdog_timeout as i64),
            condition: settings
                .monitored_item_watchdog_condition
                .unwrap_or_default(),
            behavior: settings.watchdog_behavior.unwrap_or_default(),
            items,
            tripped: false,
        })
    }

    pub fn data_set_writer_id(&self) -> u16 {
        self.data_set_writer_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn behavior(&self) -> SubscriptionWatchdogBehavior {
        self.behavior
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn is_late(&self, item_id: &str) -> bool {
        self.items.get(item_id).map(|i| i.late).unwrap_or(false)
    }

    pub fn late_count(&self) -> usize {
        self.items.values().filter(|i| i.late).count()
    }

    /// The item delivered a notification or reported it is alive
    pub fn on_item_alive(&mut self, item_id: &str, now: DateTime) {
        if let Some(item) = self.items.get_mut(item_id) {
            if item.late {
                debug!(
                    "Monitored item {} of writer {} is no longer late",
                    item_id, self.data_set_writer_id
                );
            }
            item.last_seen = now;
            item.late = false;
        }
    }

    /// Updates the late flags and returns a trip when the subscription just became late.
    /// Newly late items are counted in the diagnostics.
    pub fn check(&mut self, now: DateTime, diagnostics: &WriterGroupDiagnostics) -> Option<WatchdogTrip> {
        for (id, item) in self.items.iter_mut() {
            if !item.late && now - item.last_seen > self.timeout {
                trace!("Monitored item {} of writer {} is late", id, self.data_set_writer_id);
                item.late = true;
                diagnostics.increment(&diagnostics.watchdog_late_monitored_items);
            }
        }
        let late = self.late_count();
        let total = self.items.len();
        let is_late = match self.condition {
            MonitoredItemWatchdogCondition::WhenAllAreLate => total > 0 && late == total,
            MonitoredItemWatchdogCondition::WhenAnyIsLate => late > 0,
        };
        if is_late && !self.tripped {
            self.tripped = true;
            Some(WatchdogTrip {
                writer_group_id: self.writer_group_id,
                data_set_writer_id: self.data_set_writer_id,
                behavior: self.behavior,
                late_items: late,
                total_items: total,
            })
        } else {
            if !is_late && self.tripped {
                info!(
                    "Subscription of writer {} recovered",
                    self.data_set_writer_id
                );
                self.tripped = false;
            }
            None
        }
    }

    /// Forgets all lateness, e.g. after the subscription was recreated
    pub fn reset(&mut self, now: DateTime) {
        self.items.values_mut().for_each(|i| {
            i.last_seen = now;
            i.late = false;
        });
        self.tripped = false;
    }
}

/// What a tripped watchdog acts upon
#[derive(Clone)]
pub struct WatchdogActions {
    pub diagnostics: Arc<WriterGroupDiagnostics>,
    pub writer: Arc<Mutex<DataSetWriter>>,
    pub controller: Arc<dyn SubscriptionController>,
    pub process: Arc<dyn ProcessControl>,
}

impl WatchdogActions {
    /// Runs the behavior of the trip
    pub async fn execute(&self, trip: WatchdogTrip, watchdog: &Mutex<SubscriptionWatchdog>) {
        let diagnostics = &self.diagnostics;
        diagnostics.increment(&diagnostics.watchdog_subscription_trips);
        match trip.behavior {
            SubscriptionWatchdogBehavior::Diagnostic => {
                warn!(
                    "Subscription of writer {} in group {} is late, {} of {} items are late",
                    trip.data_set_writer_id, trip.writer_group_id, trip.late_items, trip.total_items
                );
            }
            SubscriptionWatchdogBehavior::Reset => {
                warn!(
                    "Subscription of writer {} in group {} is late, recreating it",
                    trip.data_set_writer_id, trip.writer_group_id
                );
                diagnostics.increment(&diagnostics.watchdog_resets);
                match self
                    .controller
                    .recreate(trip.writer_group_id, trip.data_set_writer_id)
                    .await
                {
                    Ok(_) => {
                        trace_lock!(self.writer).restart();
                        trace_lock!(watchdog).reset(DateTime::now());
                    }
                    Err(status) => {
                        trace_lock!(self.writer)
                            .set_error(status, "subscription could not be recreated");
                    }
                }
            }
            SubscriptionWatchdogBehavior::FailFast => {
                error!(
                    "FATAL: subscription of writer {} in group {} is late, failing fast",
                    trip.data_set_writer_id, trip.writer_group_id
                );
                self.process.abort("subscription watchdog tripped");
            }
            SubscriptionWatchdogBehavior::ExitProcess => {
                error!(
                    "FATAL: subscription of writer {} in group {} is late, exiting with code {}",
                    trip.data_set_writer_id, trip.writer_group_id, WATCHDOG_EXIT_CODE
                );
                self.process.exit(WATCHDOG_EXIT_CODE);
            }
        }
    }

    /// Checks the watchdog on its own timer until cancelled
    pub async fn run(self, watchdog: Arc<Mutex<SubscriptionWatchdog>>, cancel: CancellationToken) {
        let period = {
            let watchdog = trace_lock!(watchdog);
            (watchdog.timeout() / 2)
                .to_std()
                .unwrap_or_default()
                .max(std::time::Duration::from_millis(10))
        };
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }
                _ = timer.tick() => {
                    let trip = trace_lock!(watchdog).check(DateTime::now(), &self.diagnostics);
                    if let Some(trip) = trip {
                        self.execute(trip, &watchdog).await;
                    }
                }
            }
        }
    }
}
