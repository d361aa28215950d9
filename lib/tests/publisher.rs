use std::{sync::Arc, time::Duration};

use opcua_publisher::{
    pubsub::prelude::*,
    types::{DataValue, DateTime, Variant},
};
use serde_json::Value;
use tokio::sync::mpsc;

const PUBLISHER_ID: &str = "Publisher";

fn config(publishing_interval: u64) -> PublisherConfig {
    let mut config = PublisherConfig::new(PUBLISHER_ID);
    config.diagnostics_interval_ms = 0;
    config.writer_groups.push(WriterGroupModel {
        writer_group_id: 1,
        name: Some("Group".into()),
        publishing_interval: Some(publishing_interval),
        data_set_writers: vec![DataSetWriterModel {
            data_set_writer_id: 1,
            id: "Tank".into(),
            data_set: Some(PublishedDataSetModel {
                name: Some("Tank".into()),
                data_set_source: PublishedDataSetSource::PublishedVariables(vec![
                    PublishedDataSetVariableModel::new("temp", "ns=2;s=Tank.Temperature"),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    });
    config
}

fn temperature(value: f64) -> SourceEvent {
    SourceEvent::Notification {
        writer_group_id: 1,
        data_set_writer_id: 1,
        notification: Notification::DataChange {
            field_id: "temp".into(),
            value: DataValue::new_at(value, DateTime::now()),
        },
    }
}

fn build(publishing_interval: u64) -> (Publisher, mpsc::Receiver<OutboundMessage>) {
    let (sink, receiver) = ChannelSink::new(100);
    let publisher = PublisherBuilder::new()
        .config(config(publishing_interval))
        .sink(Arc::new(sink))
        .build()
        .unwrap();
    (publisher, receiver)
}

fn event_type(message: &OutboundMessage) -> Option<String> {
    if message.topic != format!("{}/events", PUBLISHER_ID) {
        return None;
    }
    let value: Value = serde_json::from_slice(&message.payload).unwrap();
    value["MessageType"].as_str().map(str::to_string)
}

fn drain(receiver: &mut mpsc::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Ok(m) = receiver.try_recv() {
        messages.push(m);
    }
    messages
}

fn temperature_of(message: &OutboundMessage) -> Variant {
    let encoder = Encoder::new(MessageEncoding::JSON).unwrap();
    let decoded = encoder
        .decode(&message.payload, NetworkMessageContentFlags::default())
        .unwrap();
    decoded[0].messages[0].payload.fields()[0]
        .value
        .value
        .clone()
        .unwrap()
}

#[test]
fn publisher_needs_a_sink_and_valid_config() {
    assert!(PublisherBuilder::new().config(config(100)).build().is_err());

    let mut invalid = config(100);
    invalid.writer_groups.push(invalid.writer_groups[0].clone());
    let (sink, _receiver) = ChannelSink::new(1);
    assert!(PublisherBuilder::new()
        .config(invalid)
        .sink(Arc::new(sink))
        .build()
        .is_err());
}

#[tokio::test]
async fn notifications_flow_to_the_sink() {
    opcua_publisher::console_logging::init();

    let (mut publisher, mut receiver) = build(50);
    let (sender, source) = ChannelSource::new(10);
    publisher.start(Box::new(source)).await.unwrap();
    assert!(publisher.is_running());

    let first = receiver.recv().await.unwrap();
    assert_eq!(event_type(&first).as_deref(), Some("Running"));

    sender.send(temperature(21.5)).await.unwrap();
    let data = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let m = receiver.recv().await.unwrap();
            if m.topic == "Publisher/Group" {
                break m;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(data.content_type, "application/json");
    assert_eq!(data.message_count, 1);
    assert_eq!(temperature_of(&data), Variant::Double(21.5));

    publisher.stop(false).await;
    assert!(!publisher.is_running());
    let events: Vec<String> = drain(&mut receiver).iter().filter_map(event_type).collect();
    assert_eq!(events, vec!["ShutdownAnnouncement", "Stopped"]);

    let d = publisher.diagnostics(DateTime::now());
    assert_eq!(d[0].ingress_data_changes, 1);
    assert_eq!(d[0].outgress_message_count, 1);
}

#[tokio::test]
async fn stop_publishes_the_final_cycle() {
    let (mut publisher, mut receiver) = build(3_600_000);
    let (_sender, source) = ChannelSource::new(10);
    publisher.start(Box::new(source)).await.unwrap();
    publisher.dispatch(temperature(4.0), DateTime::now()).unwrap();
    publisher.stop(false).await;

    let messages = drain(&mut receiver);
    let kinds: Vec<String> = messages
        .iter()
        .map(|m| event_type(m).unwrap_or_else(|| m.topic.clone()))
        .collect();
    assert_eq!(
        kinds,
        vec!["Running", "ShutdownAnnouncement", "Publisher/Group", "Stopped"]
    );
    assert_eq!(temperature_of(&messages[2]), Variant::Double(4.0));

    // Refused once stopped
    assert!(publisher.dispatch(temperature(5.0), DateTime::now()).is_err());
}

#[tokio::test]
async fn stop_can_discard_pending_data() {
    let (mut publisher, mut receiver) = build(3_600_000);
    let (_sender, source) = ChannelSource::new(10);
    publisher.start(Box::new(source)).await.unwrap();
    publisher.dispatch(temperature(4.0), DateTime::now()).unwrap();
    publisher.stop(true).await;

    let messages = drain(&mut receiver);
    assert!(messages.iter().all(|m| event_type(m).is_some()));
    assert_eq!(messages.len(), 3);
}

#[tokio::test]
async fn restart_starts_sequence_numbers_over() {
    let (mut publisher, mut receiver) = build(3_600_000);
    let (_sender, source) = ChannelSource::new(10);
    publisher.start(Box::new(source)).await.unwrap();
    publisher.dispatch(temperature(1.0), DateTime::now()).unwrap();

    let group = publisher.group(1).unwrap();
    let writer = group.writer(1).unwrap();
    group.enqueue(group.publish(DateTime::now()));
    assert_eq!(writer.lock().sequence_number(), 1);

    publisher.restart().await;
    assert_eq!(writer.lock().sequence_number(), 0);
    let events: Vec<String> = drain(&mut receiver).iter().filter_map(event_type).collect();
    assert!(events.contains(&"RestartAnnouncement".to_string()));

    publisher.stop(true).await;
    assert!(matches!(
        publisher.dispatch(
            SourceEvent::ItemAlive {
                writer_group_id: 9,
                data_set_writer_id: 1,
                field_id: "temp".into(),
            },
            DateTime::now()
        ),
        Err(opcua_publisher::error::PublisherError::UnknownWriterGroup(9))
    ));
}
