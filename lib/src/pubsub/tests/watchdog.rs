use std::sync::{atomic::Ordering, Arc};

use async_trait::async_trait;

use crate::pubsub::{notification::*, watchdog::*};
use crate::sync::*;
use crate::types::*;

use super::*;

fn settings(
    timeout: u64,
    condition: MonitoredItemWatchdogCondition,
    behavior: SubscriptionWatchdogBehavior,
) -> WatchdogSettingsModel {
    WatchdogSettingsModel {
        monitored_item_watchdog_timeout: timeout,
        monitored_item_watchdog_condition: Some(condition),
        watchdog_behavior: Some(behavior),
    }
}

fn watchdog(condition: MonitoredItemWatchdogCondition) -> SubscriptionWatchdog {
    SubscriptionWatchdog::new(
        1,
        5,
        &settings(1000, condition, SubscriptionWatchdogBehavior::Diagnostic),
        vec!["a".into(), "b".into(), "c".into()],
        t0(),
    )
    .unwrap()
}

#[derive(Default)]
struct RecordingProcess {
    exits: Mutex<Vec<i32>>,
    aborts: Mutex<Vec<String>>,
}

impl ProcessControl for RecordingProcess {
    fn exit(&self, code: i32) {
        self.exits.lock().push(code);
    }

    fn abort(&self, reason: &str) {
        self.aborts.lock().push(reason.to_string());
    }
}

struct FailingController;

#[async_trait]
impl SubscriptionController for FailingController {
    async fn recreate(&self, _writer_group_id: u16, _data_set_writer_id: u16) -> Result<(), StatusCode> {
        Err(StatusCode::BadNoCommunication)
    }
}

fn actions(
    process: Arc<RecordingProcess>,
    controller: Arc<dyn SubscriptionController>,
) -> (WatchdogActions, Arc<Mutex<DataSetWriter>>) {
    let writer = Arc::new(Mutex::new(writer(writer_model(5, vec![variable("a")]))));
    let actions = WatchdogActions {
        diagnostics: diagnostics(),
        writer: writer.clone(),
        controller,
        process,
    };
    (actions, writer)
}

fn trip(behavior: SubscriptionWatchdogBehavior) -> WatchdogTrip {
    WatchdogTrip {
        writer_group_id: 1,
        data_set_writer_id: 5,
        behavior,
        late_items: 1,
        total_items: 1,
    }
}

fn single_item_watchdog() -> Mutex<SubscriptionWatchdog> {
    Mutex::new(
        SubscriptionWatchdog::new(
            1,
            5,
            &settings(
                1000,
                MonitoredItemWatchdogCondition::WhenAnyIsLate,
                SubscriptionWatchdogBehavior::Reset,
            ),
            vec!["a".into()],
            t0(),
        )
        .unwrap(),
    )
}

#[test]
fn zero_timeout_disables_the_watchdog() {
    let s = settings(
        0,
        MonitoredItemWatchdogCondition::WhenAnyIsLate,
        SubscriptionWatchdogBehavior::Diagnostic,
    );
    assert!(SubscriptionWatchdog::new(1, 5, &s, vec!["a".into()], t0()).is_none());
}

#[test]
fn when_all_are_late() {
    let d = diagnostics();
    let mut w = watchdog(MonitoredItemWatchdogCondition::WhenAllAreLate);
    w.on_item_alive("c", at_ms(800));
    // Not late at exactly the timeout
    assert!(w.check(at_ms(1000), &d).is_none());
    assert!(w.check(at_ms(1500), &d).is_none());
    assert_eq!(w.late_count(), 2);
    assert!(w.is_late("a"));
    assert!(!w.is_late("c"));

    let trip = w.check(at_ms(1801), &d).unwrap();
    assert_eq!(trip.late_items, 3);
    assert_eq!(trip.total_items, 3);
    assert_eq!(trip.data_set_writer_id, 5);
    assert!(w.is_tripped());
    assert_eq!(d.watchdog_late_monitored_items.load(Ordering::Relaxed), 3);
}

#[test]
fn when_any_is_late() {
    let d = diagnostics();
    let mut w = watchdog(MonitoredItemWatchdogCondition::WhenAnyIsLate);
    w.on_item_alive("b", at_ms(500));
    w.on_item_alive("c", at_ms(500));
    let trip = w.check(at_ms(1001), &d).unwrap();
    assert_eq!(trip.late_items, 1);
    assert_eq!(trip.behavior, SubscriptionWatchdogBehavior::Diagnostic);
}

#[test]
fn trips_once_until_recovered() {
    let d = diagnostics();
    let mut w = watchdog(MonitoredItemWatchdogCondition::WhenAnyIsLate);
    assert!(w.check(at_ms(1001), &d).is_some());
    assert!(w.check(at_ms(2000), &d).is_none());
    assert!(w.check(at_ms(5000), &d).is_none());

    for id in ["a", "b", "c"] {
        w.on_item_alive(id, at_ms(5000));
    }
    assert!(w.check(at_ms(5100), &d).is_none());
    assert!(!w.is_tripped());
    assert!(w.check(at_ms(6001), &d).is_some());
}

#[test]
fn unknown_items_are_ignored() {
    let d = diagnostics();
    let mut w = watchdog(MonitoredItemWatchdogCondition::WhenAnyIsLate);
    w.on_item_alive("zzz", at_ms(900));
    assert!(!w.is_late("zzz"));
    assert!(w.check(at_ms(1001), &d).is_some());
}

#[test]
fn reset_forgets_lateness() {
    let d = diagnostics();
    let mut w = watchdog(MonitoredItemWatchdogCondition::WhenAllAreLate);
    assert!(w.check(at_ms(1001), &d).is_some());
    w.reset(at_ms(1001));
    assert!(!w.is_tripped());
    assert_eq!(w.late_count(), 0);
    assert!(w.check(at_ms(1500), &d).is_none());
}

#[tokio::test]
async fn exit_process_exits_with_code() {
    let process = Arc::new(RecordingProcess::default());
    let (actions, _) = actions(process.clone(), Arc::new(NullSubscriptionController));
    actions
        .execute(trip(SubscriptionWatchdogBehavior::ExitProcess), &single_item_watchdog())
        .await;
    assert_eq!(*process.exits.lock(), vec![-10]);
    assert!(process.aborts.lock().is_empty());
    assert_eq!(
        actions.diagnostics.watchdog_subscription_trips.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn fail_fast_aborts() {
    let process = Arc::new(RecordingProcess::default());
    let (actions, _) = actions(process.clone(), Arc::new(NullSubscriptionController));
    actions
        .execute(trip(SubscriptionWatchdogBehavior::FailFast), &single_item_watchdog())
        .await;
    assert_eq!(process.aborts.lock().len(), 1);
    assert!(process.exits.lock().is_empty());
}

#[tokio::test]
async fn diagnostic_only_counts() {
    let process = Arc::new(RecordingProcess::default());
    let (actions, writer) = actions(process.clone(), Arc::new(NullSubscriptionController));
    actions
        .execute(trip(SubscriptionWatchdogBehavior::Diagnostic), &single_item_watchdog())
        .await;
    assert!(process.exits.lock().is_empty());
    assert!(process.aborts.lock().is_empty());
    assert!(writer.lock().is_ok());
    assert_eq!(actions.diagnostics.watchdog_resets.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn reset_recreates_the_subscription() {
    let process = Arc::new(RecordingProcess::default());
    let (actions, writer) = actions(process.clone(), Arc::new(NullSubscriptionController));
    writer
        .lock()
        .on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0())
        .unwrap();
    assert!(writer.lock().flush(t0()).is_some());
    assert_eq!(writer.lock().sequence_number(), 1);

    let d = diagnostics();
    let watchdog = single_item_watchdog();
    assert!(watchdog.lock().check(at_ms(1001), &d).is_some());
    actions
        .execute(trip(SubscriptionWatchdogBehavior::Reset), &watchdog)
        .await;
    assert_eq!(actions.diagnostics.watchdog_resets.load(Ordering::Relaxed), 1);
    assert_eq!(writer.lock().sequence_number(), 0);
    assert!(!watchdog.lock().is_tripped());
}

#[tokio::test]
async fn failed_reset_puts_the_writer_in_error() {
    let process = Arc::new(RecordingProcess::default());
    let (actions, writer) = actions(process, Arc::new(FailingController));
    actions
        .execute(trip(SubscriptionWatchdogBehavior::Reset), &single_item_watchdog())
        .await;
    assert!(!writer.lock().is_ok());
}
