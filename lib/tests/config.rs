use std::{fs, path::PathBuf};

use opcua_publisher::{core::config::Config, error::PublisherError, pubsub::prelude::*};
use tempdir::TempDir;

const SAMPLE: &str = r#"
publisher_id: Plant1
diagnostics_interval_ms: 30000
diagnostics_target: Events
default_heartbeat_interval_ms: 10000
default_heartbeat_behavior: PeriodicLKV
writer_groups:
  - WriterGroupId: 1
    Name: Line1
    MessageType: JsonReversibleGzip
    PublishingInterval: 1000
    KeepAliveTime: 5000
    MessageSettings:
      NetworkMessageContentMask: PublisherId, WriterGroupId, NetworkMessageHeader, DataSetMessageHeader, SingleDataSetMessage
      UseArrayEnvelope: true
    PublishingQueue:
      QueueName: plant1/line1
      RequestedDeliveryGuarantee: AtLeastOnce
    DataSetWriters:
      - DataSetWriterId: 10
        Id: Boiler
        KeyFrameCount: 10
        MetaDataUpdateTime: 60000
        DataSet:
          Name: Boiler
          DataSetSource:
            PublishedVariables:
              - Id: temp
                PublishedVariableNodeId: ns=2;s=Boiler.Temperature
                DeadbandType: Absolute
                DeadbandValue: 0.5
              - Id: pressure
                PublishedVariableNodeId: ns=2;s=Boiler.Pressure
                HeartbeatInterval: 2000
"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn load_sample() {
    let dir = TempDir::new("config").unwrap();
    let path = write(&dir, "publisher.yaml", SAMPLE);
    let config: PublisherConfig = PublisherConfig::load(&path).unwrap();

    assert_eq!(config.publisher_id, "Plant1");
    assert_eq!(config.events_topic(), "Plant1/events");
    assert_eq!(config.diagnostics_target, DiagnosticsTarget::Events);
    let defaults = config.writer_defaults();
    assert_eq!(defaults.heartbeat_interval, Some(10_000));
    assert_eq!(defaults.heartbeat_behavior, Some(HeartbeatBehavior::PERIODIC_LKV));

    let group = &config.writer_groups[0];
    assert_eq!(group.name(), "Line1");
    assert_eq!(group.message_encoding(), MessageEncoding::JSON_REVERSIBLE_GZIP);
    assert!(group.use_array_envelope());
    assert!(group
        .network_message_content_mask()
        .contains(NetworkMessageContentFlags::SINGLE_DATA_SET_MESSAGE));

    let writer = &group.data_set_writers[0];
    assert_eq!(writer.key_frame_count, Some(10));
    match &writer.data_set.as_ref().unwrap().data_set_source {
        PublishedDataSetSource::PublishedVariables(variables) => {
            assert_eq!(variables.len(), 2);
            assert_eq!(variables[0].deadband_type, Some(DeadbandType::Absolute));
            assert_eq!(variables[1].heartbeat_interval, Some(2000));
        }
        other => panic!("unexpected source {:?}", other),
    }
}

#[test]
fn save_and_reload() {
    let dir = TempDir::new("config").unwrap();
    let path = write(&dir, "publisher.yaml", SAMPLE);
    let config: PublisherConfig = PublisherConfig::load(&path).unwrap();

    let saved = dir.path().join("saved.yaml");
    config.save(&saved).unwrap();
    let reloaded: PublisherConfig = PublisherConfig::load(&saved).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn invalid_configurations_are_refused() {
    let dir = TempDir::new("config").unwrap();

    let duplicate_groups = r#"
publisher_id: Plant1
writer_groups:
  - WriterGroupId: 1
  - WriterGroupId: 1
"#;
    let path = write(&dir, "duplicate.yaml", duplicate_groups);
    assert!(matches!(
        PublisherConfig::load::<PublisherConfig>(&path),
        Err(PublisherError::Config(_))
    ));

    let uadp_envelope = r#"
publisher_id: Plant1
writer_groups:
  - WriterGroupId: 1
    MessageType: Uadp
    MessageSettings:
      UseArrayEnvelope: true
"#;
    let path = write(&dir, "envelope.yaml", uadp_envelope);
    assert!(PublisherConfig::load::<PublisherConfig>(&path).is_err());

    let two_encodings = r#"
publisher_id: Plant1
writer_groups:
  - WriterGroupId: 1
    MessageType: Json, Uadp
"#;
    let path = write(&dir, "encodings.yaml", two_encodings);
    assert!(PublisherConfig::load::<PublisherConfig>(&path).is_err());

    let path = write(&dir, "garbage.yaml", "writer_groups: [");
    assert!(matches!(
        PublisherConfig::load::<PublisherConfig>(&path),
        Err(PublisherError::Config(_))
    ));

    let missing = dir.path().join("missing.yaml");
    assert!(matches!(
        PublisherConfig::load::<PublisherConfig>(&missing),
        Err(PublisherError::Io(_))
    ));

    let mut config = PublisherConfig::new("");
    config.diagnostics_interval_ms = 0;
    assert!(config.save(&dir.path().join("empty.yaml")).is_err());
}
