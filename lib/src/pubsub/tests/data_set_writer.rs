use std::sync::atomic::Ordering;

use crate::error::PublisherError;
use crate::pubsub::{
    data_set_message::*, data_set_writer::*, meta_data::ConfigurationVersion, models::*,
    notification::Notification,
};
use crate::types::*;

use super::*;

fn two_field_writer() -> DataSetWriter {
    writer(writer_model(1, vec![variable("a"), variable("b")]))
}

fn field_names(message: &DataSetMessage) -> Vec<String> {
    message.payload.fields().iter().map(|f| f.name.clone()).collect()
}

#[test]
fn nothing_to_flush() {
    let mut w = two_field_writer();
    assert!(w.is_ok());
    assert!(w.flush(t0()).is_none());
    assert_eq!(w.sequence_number(), 0);
}

#[test]
fn delta_frames_carry_changed_fields() {
    let mut w = two_field_writer();
    assert!(w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0()).unwrap());
    let m = w.flush(at_ms(100)).unwrap();
    assert_eq!(m.message_type, DataSetMessageType::DeltaFrame);
    assert_eq!(field_names(&m), vec!["a"]);
    assert_eq!(m.payload.fields()[0].index, 0);
    assert_eq!(m.data_set_writer_id, 1);
    assert_eq!(m.timestamp, at_ms(100));

    // Unchanged value is filtered
    assert!(!w.on_notification(data_change("a", DataValue::new_at(1i32, at_ms(150))), at_ms(150)).unwrap());
    assert!(w.flush(at_ms(200)).is_none());
}

#[test]
fn sequence_numbers_are_contiguous() {
    let mut w = two_field_writer();
    let mut sequence_numbers = Vec::new();
    for i in 0..20 {
        let now = at_ms(i * 100);
        w.on_notification(data_change("a", DataValue::new_at(i as i32, now)), now)
            .unwrap();
        sequence_numbers.push(w.flush(now).unwrap().sequence_number);
        // Cycles without data use no sequence number
        assert!(w.flush(now).is_none());
    }
    assert_eq!(sequence_numbers[0], 1);
    for pair in sequence_numbers.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
}

#[test]
fn sequence_numbers_wrap_at_16_bits_for_uadp() {
    let mut w = DataSetWriter::new(
        writer_model(1, vec![variable("a")]),
        "Group",
        MessageEncoding::UADP,
        WriterDefaults::default(),
        diagnostics(),
    );
    w.set_sequence_number(u16::MAX as u32);
    w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0())
        .unwrap();
    assert_eq!(w.flush(t0()).unwrap().sequence_number, 0);

    let mut w = two_field_writer();
    w.set_sequence_number(u16::MAX as u32);
    w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0())
        .unwrap();
    assert_eq!(w.flush(t0()).unwrap().sequence_number, 65536);
}

#[test]
fn key_frames() {
    let mut model = writer_model(1, vec![variable("a"), variable("b")]);
    model.key_frame_count = Some(3);
    let mut w = writer(model);

    w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0())
        .unwrap();
    let m = w.flush(t0()).unwrap();
    assert_eq!(m.message_type, DataSetMessageType::KeyFrame);
    assert_eq!(field_names(&m), vec!["a", "b"]);
    // b has never been seen
    assert_eq!(
        m.payload.fields()[1].value.status,
        Some(StatusCode::BadWaitingForInitialData)
    );

    w.on_notification(data_change("b", DataValue::new_at(2i32, at_ms(1))), at_ms(1))
        .unwrap();
    let m = w.flush(at_ms(1)).unwrap();
    assert_eq!(m.message_type, DataSetMessageType::DeltaFrame);
    assert_eq!(field_names(&m), vec!["b"]);

    // Third cycle has nothing to send
    assert!(w.flush(at_ms(2)).is_none());

    // Fourth is a key frame again, with the last values
    let m = w.flush(at_ms(3)).unwrap();
    assert_eq!(m.message_type, DataSetMessageType::KeyFrame);
    assert_eq!(m.payload.fields()[0].value.value, Some(Variant::Int32(1)));
    assert_eq!(m.payload.fields()[1].value.value, Some(Variant::Int32(2)));
}

#[test]
fn keep_alive() {
    let mut model = writer_model(1, vec![variable("a")]);
    model.data_set.as_mut().unwrap().send_keep_alive = Some(true);
    let mut w = writer(model);
    let m = w.flush(t0()).unwrap();
    assert_eq!(m.message_type, DataSetMessageType::KeepAlive);
    assert!(m.payload.is_empty());
    assert_eq!(m.sequence_number, 1);
}

#[test]
fn single_field_degrades_to_value() {
    let mut model = writer_model(1, vec![variable("a")]);
    model.data_set_field_content_mask = Some(
        DataSetFieldContentFlags::RAW_DATA | DataSetFieldContentFlags::SINGLE_FIELD_DEGRADE_TO_VALUE,
    );
    let mut w = writer(model);
    w.on_notification(data_change("a", DataValue::new_at(5i32, t0())), t0())
        .unwrap();
    let m = w.flush(t0()).unwrap();
    assert!(matches!(m.payload, Payload::Value(_)));
}

#[test]
fn unknown_field() {
    let mut w = two_field_writer();
    let result = w.on_notification(data_change("zz", DataValue::new_at(1i32, t0())), t0());
    assert!(matches!(result, Err(PublisherError::UnknownField(f)) if f == "zz"));
}

#[test]
fn writer_without_data_set_is_in_error() {
    let model = DataSetWriterModel {
        data_set_writer_id: 3,
        id: "Broken".into(),
        ..Default::default()
    };
    let mut w = writer(model);
    assert!(!w.is_ok());
    assert!(matches!(
        w.state(),
        WriterState::Error { status, .. } if *status == StatusCode::BadConfigurationError
    ));
    assert!(!w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0()).unwrap());
    assert!(w.flush(t0()).is_none());

    // Reconfiguring with a data set clears the error
    w.reconfigure(writer_model(3, vec![variable("a")]));
    assert!(w.is_ok());
    assert!(w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0()).unwrap());
}

#[test]
fn invalid_node_id_is_an_error() {
    let mut v = variable("a");
    v.published_variable_node_id = Some("not a node".into());
    let w = writer(writer_model(1, vec![v]));
    assert!(matches!(
        w.state(),
        WriterState::Error { status, .. } if *status == StatusCode::BadNodeIdInvalid
    ));
}

#[test]
fn heartbeat_is_published() {
    let mut v = variable("a");
    v.heartbeat_interval = Some(1000);
    let mut w = writer(writer_model(1, vec![v, variable("b")]));
    w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0())
        .unwrap();
    assert!(w.flush(t0()).is_some());
    assert!(w.flush(at_ms(500)).is_none());
    let m = w.flush(at_ms(1000)).unwrap();
    assert_eq!(field_names(&m), vec!["a"]);
    assert_eq!(m.payload.fields()[0].value.value, Some(Variant::Int32(1)));
    // Watchdog behavior fires once
    assert!(w.flush(at_ms(2000)).is_none());
}

#[test]
fn triggered_fields_report_with_their_trigger() {
    let mut a = variable("a");
    a.triggering = Some(vec!["b".into()]);
    let mut w = writer(writer_model(1, vec![a, variable("b")]));

    // b alone never reports
    assert!(!w.on_notification(data_change("b", DataValue::new_at(2i32, t0())), t0()).unwrap());
    assert!(w.flush(t0()).is_none());

    assert!(w.on_notification(data_change("a", DataValue::new_at(1i32, at_ms(1))), at_ms(1)).unwrap());
    let m = w.flush(at_ms(1)).unwrap();
    assert_eq!(field_names(&m), vec!["a", "b"]);
    assert_eq!(m.payload.fields()[1].value.value, Some(Variant::Int32(2)));
}

#[test]
fn sampling_and_disabled_fields_do_not_report() {
    let mut a = variable("a");
    a.monitoring_mode = Some(MonitoringMode::Sampling);
    let mut b = variable("b");
    b.monitoring_mode = Some(MonitoringMode::Disabled);
    let mut w = writer(writer_model(1, vec![a, b]));
    assert!(!w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0()).unwrap());
    assert!(!w.on_notification(data_change("b", DataValue::new_at(1i32, t0())), t0()).unwrap());
    assert!(w.flush(t0()).is_none());
    assert_eq!(w.monitored_item_ids(), vec!["a".to_string()]);
}

#[test]
fn filtered_values_are_counted() {
    let d = diagnostics();
    let mut w = DataSetWriter::new(
        writer_model(1, vec![variable("a")]),
        "Group",
        MessageEncoding::JSON,
        WriterDefaults::default(),
        d.clone(),
    );
    w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0())
        .unwrap();
    w.on_notification(data_change("a", DataValue::new_at(1i32, at_ms(1))), at_ms(1))
        .unwrap();
    assert_eq!(d.ingress_data_changes.load(Ordering::Relaxed), 2);
    assert_eq!(d.ingress_filtered.load(Ordering::Relaxed), 1);
}

#[test]
fn events_become_event_messages() {
    let model = DataSetWriterModel {
        data_set_writer_id: 2,
        id: "Events".into(),
        data_set: Some(PublishedDataSetModel {
            name: Some("Alarms".into()),
            data_set_source: PublishedDataSetSource::PublishedEvents(vec![PublishedDataSetEventModel {
                id: Some("server".into()),
                event_notifier: Some("i=2253".into()),
                selected_fields: Some(vec!["Message".into(), "Severity".into()]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut w = writer(model);
    assert!(w.is_ok());
    let event = Notification::Event {
        field_id: "server".into(),
        fields: vec![
            ("Message".into(), Variant::from("Tank overflow")),
            ("Severity".into(), Variant::UInt16(800)),
        ],
        timestamp: t0(),
    };
    assert!(w.on_notification(event, t0()).unwrap());
    let events = w.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message_type, DataSetMessageType::Event);
    assert_eq!(field_names(&events[0]), vec!["Message", "Severity"]);
    assert_eq!(events[0].payload.fields()[0].node_id.as_deref(), Some("i=2253"));
    assert!(w.drain_events().is_empty());
    // Events are not repeated by the cycle
    assert!(w.flush(t0()).is_none());
}

#[test]
fn method_results_are_data_changes() {
    let model = DataSetWriterModel {
        data_set_writer_id: 4,
        id: "Methods".into(),
        data_set: Some(PublishedDataSetModel {
            data_set_source: PublishedDataSetSource::PublishedMethods(vec![PublishedDataSetMethodModel {
                id: Some("calc".into()),
                object_id: Some("ns=2;s=Calc".into()),
                method_id: Some("ns=2;s=Calc.Add".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut w = writer(model);
    let result = Notification::MethodResult {
        field_id: "calc".into(),
        status: StatusCode::Good,
        outputs: vec![Variant::Int32(1), Variant::Int32(2)],
        timestamp: t0(),
    };
    assert!(w.on_notification(result, t0()).unwrap());
    let m = w.flush(t0()).unwrap();
    assert_eq!(
        m.payload.fields()[0].value.value,
        Some(Variant::new_array(
            VariantTypeId::Int32,
            vec![Variant::Int32(1), Variant::Int32(2)]
        ))
    );
}

#[test]
fn restart_resets_sequence_numbers() {
    let mut w = two_field_writer();
    for i in 0..3 {
        w.on_notification(data_change("a", DataValue::new_at(i as i32, at_ms(i as i64))), at_ms(i as i64))
            .unwrap();
        w.flush(at_ms(i as i64)).unwrap();
    }
    assert_eq!(w.sequence_number(), 3);
    w.restart();
    assert_eq!(w.sequence_number(), 0);
    w.on_notification(data_change("a", DataValue::new_at(9i32, at_ms(10))), at_ms(10))
        .unwrap();
    assert_eq!(w.flush(at_ms(10)).unwrap().sequence_number, 1);
}

#[test]
fn meta_data_on_change_and_interval() {
    let mut model = writer_model(1, vec![variable("a")]);
    model.meta_data_update_time = Some(60_000);
    let mut w = writer(model);
    let m = w.meta_data_message(t0()).unwrap();
    assert_eq!(m.configuration_version, ConfigurationVersion::new(1, 0));
    assert!(w.meta_data_message(at_ms(1)).is_none());

    // Learning the type is a version change
    w.on_notification(data_change("a", DataValue::new_at(1.5f64, at_ms(2))), at_ms(2))
        .unwrap();
    let m = w.meta_data_message(at_ms(3)).unwrap();
    assert_eq!(m.configuration_version, ConfigurationVersion::new(1, 1));
    assert_eq!(m.fields[0].built_in_type, Some(VariantTypeId::Double));
    assert!(w.meta_data_message(at_ms(4)).is_none());
    assert!(w.meta_data_message(at_ms(60_003)).is_some());
}

#[test]
fn no_meta_data_without_update_time() {
    let mut w = two_field_writer();
    assert!(w.meta_data_message(t0()).is_none());
}

#[test]
fn reconfigure_bumps_meta_data_version() {
    let mut w = two_field_writer();
    assert!(w.reconfigure(writer_model(1, vec![variable("a"), variable("b"), variable("c")])));
    assert_eq!(
        w.meta_data().configuration_version,
        ConfigurationVersion::new(1, 1)
    );
    assert!(w.reconfigure(writer_model(1, vec![variable("c")])));
    assert_eq!(w.meta_data().configuration_version.major_version, 2);
}

#[test]
fn extension_fields_follow_data_fields() {
    let mut model = writer_model(1, vec![variable("a")]);
    model.data_set_field_content_mask =
        Some(DataSetFieldContentFlags::default() | DataSetFieldContentFlags::EXTENSION_FIELDS);
    let mut extension_fields = std::collections::BTreeMap::new();
    extension_fields.insert("Site".to_string(), Variant::from("Plant 7"));
    model.data_set.as_mut().unwrap().extension_fields = Some(extension_fields);
    let mut w = writer(model);
    w.on_notification(data_change("a", DataValue::new_at(1i32, t0())), t0())
        .unwrap();
    let m = w.flush(t0()).unwrap();
    assert_eq!(field_names(&m), vec!["a", "Site"]);
    assert_eq!(m.payload.fields()[1].index, 1);
}
