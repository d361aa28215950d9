use std::sync::{atomic::Ordering, Arc};

use tokio_util::sync::CancellationToken;

use crate::error::PublisherError;
use crate::pubsub::{
    data_set_message::*, encoder::{packer, Encoder}, models::*, network_message::*, sink::*,
    writer_group::*,
};
use crate::types::*;

use super::*;

fn group_model(writers: Vec<DataSetWriterModel>) -> WriterGroupModel {
    WriterGroupModel {
        writer_group_id: 1,
        name: Some("Group".into()),
        data_set_writers: writers,
        message_type: Some(MessageEncoding::JSON),
        ..Default::default()
    }
}

fn with_mask(mut model: WriterGroupModel, mask: NetworkMessageContentFlags) -> WriterGroupModel {
    let settings = model.message_settings.get_or_insert_with(Default::default);
    settings.network_message_content_mask = Some(mask);
    model
}

fn with_ordering(mut model: WriterGroupModel, ordering: DataSetOrderingType) -> WriterGroupModel {
    let settings = model.message_settings.get_or_insert_with(Default::default);
    settings.data_set_ordering = Some(ordering);
    model
}

fn group(model: WriterGroupModel) -> WriterGroup {
    WriterGroup::new(model, "Publisher", &WriterDefaults::default(), t0()).unwrap()
}

fn decode(group: &WriterGroup, message: &OutboundMessage) -> Vec<NetworkMessage> {
    group
        .encoder()
        .decode(&message.payload, group.model().network_message_content_mask())
        .unwrap()
}

fn writer_ids(message: &NetworkMessage) -> Vec<u16> {
    message.messages.iter().map(|m| m.data_set_writer_id).collect()
}

fn notify(group: &WriterGroup, writer_id: u16, field: &str, value: Variant) {
    group
        .on_notification(writer_id, data_change(field, DataValue::new_at(value, t0())), t0())
        .unwrap();
}

fn big_dsm(writer_id: u16) -> DataSetMessage {
    DataSetMessage {
        data_set_writer_id: writer_id,
        sequence_number: 1,
        timestamp: t0(),
        payload: Payload::Fields(vec![DataSetField::new(
            0,
            "Text",
            DataValue::new_at("x".repeat(1000), t0()),
        )]),
        ..Default::default()
    }
}

fn pack_header() -> NetworkMessage {
    NetworkMessage {
        publisher_id: "Publisher".into(),
        writer_group_id: 1,
        timestamp: t0(),
        ..Default::default()
    }
}

#[test]
fn no_writers_no_output() {
    let g = group(group_model(vec![]));
    assert!(g.publish(t0()).is_empty());
}

#[test]
fn duplicate_writer_ids() {
    let result = WriterGroup::new(
        group_model(vec![writer_model(1, vec![variable("a")]), writer_model(1, vec![variable("b")])]),
        "Publisher",
        &WriterDefaults::default(),
        t0(),
    );
    assert!(matches!(result, Err(PublisherError::InvalidConfiguration(_))));
}

#[test]
fn notifications_are_routed_to_writers() {
    let g = group(group_model(vec![writer_model(1, vec![variable("a")])]));
    assert!(matches!(
        g.on_notification(9, data_change("a", DataValue::new_at(1i32, t0())), t0()),
        Err(PublisherError::UnknownWriter(9))
    ));
    notify(&g, 1, "a", Variant::Int32(1));
    let output = g.publish(t0());
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].topic, "Publisher/Group");
    assert_eq!(output[0].content_type, "application/json");
    assert_eq!(output[0].message_count, 1);
    let decoded = decode(&g, &output[0]);
    assert_eq!(writer_ids(&decoded[0]), vec![1]);

    g.stop_accepting();
    assert!(matches!(
        g.on_notification(1, data_change("a", DataValue::new_at(2i32, t0())), t0()),
        Err(PublisherError::NotAccepting(1))
    ));
}

#[test]
fn data_set_messages_share_a_network_message() {
    let g = group(group_model(vec![
        writer_model(1, vec![variable("a")]),
        writer_model(2, vec![variable("b")]),
    ]));
    notify(&g, 1, "a", Variant::Int32(1));
    notify(&g, 2, "b", Variant::Int32(2));
    let output = g.publish(t0());
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].message_count, 2);
    assert_eq!(writer_ids(&decode(&g, &output[0])[0]), vec![1, 2]);
    let d = g.diagnostics();
    assert_eq!(d.encoder_network_messages_processed.load(Ordering::Relaxed), 1);
    assert_eq!(d.encoder_notifications_processed.load(Ordering::Relaxed), 2);
}

#[test]
fn single_data_set_message_per_network_message() {
    let model = with_mask(
        group_model(vec![
            writer_model(1, vec![variable("a")]),
            writer_model(2, vec![variable("b")]),
            writer_model(3, vec![variable("c")]),
        ]),
        NetworkMessageContentFlags::default() | NetworkMessageContentFlags::SINGLE_DATA_SET_MESSAGE,
    );
    let g = group(model);
    notify(&g, 1, "a", Variant::Int32(1));
    notify(&g, 2, "b", Variant::Int32(2));
    notify(&g, 3, "c", Variant::Int32(3));
    let output = g.publish(t0());
    assert_eq!(output.len(), 3);
    assert!(output.iter().all(|m| m.message_count == 1));
}

#[test]
fn ascending_writer_id_ordering() {
    let writers = vec![
        writer_model(3, vec![variable("c")]),
        writer_model(1, vec![variable("a")]),
        writer_model(2, vec![variable("b")]),
    ];
    for (ordering, expected) in [
        (DataSetOrderingType::Undefined, vec![3, 1, 2]),
        (DataSetOrderingType::AscendingWriterId, vec![1, 2, 3]),
    ] {
        let g = group(with_ordering(group_model(writers.clone()), ordering));
        notify(&g, 3, "c", Variant::Int32(3));
        notify(&g, 1, "a", Variant::Int32(1));
        notify(&g, 2, "b", Variant::Int32(2));
        let output = g.publish(t0());
        assert_eq!(writer_ids(&decode(&g, &output[0])[0]), expected, "{}", ordering);
    }
}

#[test]
fn ascending_writer_id_single_keeps_one_message_per_writer() {
    let encoder = Encoder::new(MessageEncoding::JSON).unwrap();
    let result = packer::pack(
        &encoder,
        &pack_header(),
        vec![big_dsm(1), big_dsm(2), big_dsm(1)],
        DataSetOrderingType::AscendingWriterIdSingle,
        usize::MAX,
    );
    let ids: Vec<Vec<u16>> = result.messages.iter().map(writer_ids).collect();
    assert_eq!(ids, vec![vec![1], vec![1, 2]]);
}

#[test]
fn packing_respects_the_maximum_size() {
    let encoder = Encoder::new(MessageEncoding::JSON).unwrap();
    let header = pack_header();
    let messages: Vec<DataSetMessage> = (10..22).map(big_dsm).collect();
    let total = encoder
        .estimate_size(&NetworkMessage::new_data(&header, messages.clone()))
        .unwrap();
    // Room for a little more than 4 of the 12 messages
    let max_size = (total as f64 / 2.4).ceil() as usize;

    let result = packer::pack(
        &encoder,
        &header,
        messages,
        DataSetOrderingType::AscendingWriterId,
        max_size,
    );
    assert_eq!(result.messages.len(), 3);
    assert_eq!(result.split, 0);
    assert_eq!(result.dropped_notifications, 0);
    for m in &result.messages {
        assert_eq!(m.messages.len(), 4);
        assert!(encoder.estimate_size(m).unwrap() <= max_size);
    }
    let ids: Vec<u16> = result.messages.iter().flat_map(writer_ids).collect();
    assert_eq!(ids, (10..22).collect::<Vec<u16>>());
}

fn small_dsm(writer_id: u16) -> DataSetMessage {
    DataSetMessage {
        data_set_writer_id: writer_id,
        sequence_number: 1,
        timestamp: t0(),
        payload: Payload::Fields(vec![DataSetField::new(
            0,
            "Level",
            DataValue::new_at(writer_id as i32, t0()),
        )]),
        ..Default::default()
    }
}

#[test]
fn packing_stays_within_the_limit_for_every_encoding() {
    for encoding in [
        MessageEncoding::JSON,
        MessageEncoding::JSON_REVERSIBLE,
        MessageEncoding::JSON_GZIP,
        MessageEncoding::UADP,
    ] {
        let encoder = Encoder::new(encoding).unwrap();
        let mut header = pack_header();
        header.content_mask |= NetworkMessageContentFlags::PAYLOAD_HEADER;
        let messages: Vec<DataSetMessage> = (1..25).map(small_dsm).collect();
        let largest = messages
            .iter()
            .map(|m| {
                encoder
                    .encode(&NetworkMessage::new_data(&header, vec![m.clone()]))
                    .unwrap()
                    .len()
            })
            .max()
            .unwrap();
        let max_size = largest * 3;

        let result = packer::pack(
            &encoder,
            &header,
            messages,
            DataSetOrderingType::AscendingWriterId,
            max_size,
        );
        assert_eq!(result.split, 0, "{}", encoding);
        assert_eq!(result.dropped_notifications, 0, "{}", encoding);
        assert!(result.messages.len() <= 12, "{}", encoding);
        for m in &result.messages {
            assert!(encoder.encode(m).unwrap().len() <= max_size, "{}", encoding);
        }
        let ids: Vec<u16> = result.messages.iter().flat_map(writer_ids).collect();
        assert_eq!(ids, (1..25).collect::<Vec<u16>>(), "{}", encoding);
    }
}

#[test]
fn compressed_messages_respect_the_maximum_size() {
    let encoder = Encoder::new(MessageEncoding::JSON_GZIP).unwrap();
    let mut header = pack_header();
    header.content_mask = NetworkMessageContentFlags::empty();
    let dsm = small_dsm(1);
    let single = NetworkMessage::new_data(&header, vec![dsm.clone()]);
    let body = encoder.body_size(&single).unwrap();
    let encoded = encoder.encode(&single).unwrap().len();
    assert!(encoded > body);

    // Room for the body but not for the gzip framing
    let result = packer::pack(
        &encoder,
        &header,
        vec![dsm],
        DataSetOrderingType::Undefined,
        encoded - 1,
    );
    for m in &result.messages {
        assert!(encoder.encode(m).unwrap().len() < encoded);
    }
    assert_eq!(result.dropped_notifications, 1);
}

#[test]
fn oversized_messages_are_split_by_field() {
    let encoder = Encoder::new(MessageEncoding::JSON).unwrap();
    let header = pack_header();
    let mut dsm = big_dsm(1);
    dsm.payload = Payload::Fields(
        (0..3)
            .map(|i| DataSetField::new(i, format!("Text{}", i), DataValue::new_at("x".repeat(1000), t0())))
            .collect(),
    );
    let one = encoder
        .estimate_size(&NetworkMessage::new_data(&header, vec![dsm.with_fields(dsm.payload.fields()[..1].to_vec())]))
        .unwrap();
    let two = encoder
        .estimate_size(&NetworkMessage::new_data(&header, vec![dsm.with_fields(dsm.payload.fields()[..2].to_vec())]))
        .unwrap();

    let result = packer::pack(&encoder, &header, vec![dsm], DataSetOrderingType::Undefined, (one + two) / 2);
    assert_eq!(result.split, 1);
    assert_eq!(result.messages.len(), 3);
    for (i, m) in result.messages.iter().enumerate() {
        let fields = m.messages[0].payload.fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].index, i as u16);
        assert_eq!(m.messages[0].sequence_number, 1);
    }
}

#[test]
fn fields_too_big_on_their_own_are_dropped() {
    let encoder = Encoder::new(MessageEncoding::JSON).unwrap();
    let header = pack_header();
    let mut dsm = big_dsm(1);
    dsm.payload = Payload::Fields(vec![
        DataSetField::new(0, "Small", DataValue::new_at(1i32, t0())),
        DataSetField::new(1, "Huge", DataValue::new_at("x".repeat(10_000), t0())),
    ]);
    let result = packer::pack(&encoder, &header, vec![dsm], DataSetOrderingType::Undefined, 2000);
    assert_eq!(result.split, 1);
    assert_eq!(result.dropped_notifications, 1);
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].messages[0].payload.fields()[0].name, "Small");
}

#[test]
fn split_ratio_is_recorded() {
    let writers = vec![writer_model(1, vec![variable("a"), variable("b")])];
    let fill = |g: &WriterGroup| {
        notify(g, 1, "a", Variant::from("x".repeat(500)));
        notify(g, 1, "b", Variant::from("y".repeat(500)));
    };

    let g = group(group_model(writers.clone()));
    fill(&g);
    let whole = g.publish(t0());
    assert_eq!(whole.len(), 1);
    assert_eq!(g.diagnostics().max_split_ratio(), 0.0);

    let mut model = group_model(writers);
    model.max_network_message_size = Some((whole[0].payload.len() - 100) as u32);
    let g = group(model);
    fill(&g);
    let parts = g.publish(t0());
    assert_eq!(parts.len(), 2);
    assert_eq!(g.diagnostics().max_split_ratio(), 1.0);
}

#[test]
fn network_message_numbering() {
    let mask = NetworkMessageContentFlags::default()
        | NetworkMessageContentFlags::SEQUENCE_NUMBER
        | NetworkMessageContentFlags::NETWORK_MESSAGE_NUMBER
        | NetworkMessageContentFlags::SINGLE_DATA_SET_MESSAGE;
    let g = group(with_mask(
        group_model(vec![
            writer_model(1, vec![variable("a")]),
            writer_model(2, vec![variable("b")]),
        ]),
        mask,
    ));
    let mut numbers = Vec::new();
    for i in 0..2 {
        notify(&g, 1, "a", Variant::Int32(i));
        notify(&g, 2, "b", Variant::Int32(i));
        for m in g.publish(at_ms(i as i64 * 1000)) {
            let decoded = decode(&g, &m);
            numbers.push((decoded[0].sequence_number, decoded[0].network_message_number));
        }
    }
    assert_eq!(numbers, vec![(1, 1), (2, 2), (3, 1), (4, 2)]);
}

#[test]
fn keep_alive_messages() {
    let mut model = group_model(vec![writer_model(1, vec![variable("a")])]);
    model.keep_alive_time = Some(1000);
    let g = group(model.clone());
    assert!(g.publish(at_ms(500)).is_empty());
    let output = g.publish(at_ms(1000));
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].message_count, 0);
    assert!(decode(&g, &output[0])[0].messages.is_empty());
    assert!(g.publish(at_ms(1500)).is_empty());

    // Data output restarts the keep alive time
    notify(&g, 1, "a", Variant::Int32(1));
    assert_eq!(g.publish(at_ms(1900)).len(), 1);
    assert!(g.publish(at_ms(2000)).is_empty());
    assert_eq!(g.publish(at_ms(2900)).len(), 1);

    // A keep alive needs the network message header
    let g = group(with_mask(model, NetworkMessageContentFlags::DATA_SET_MESSAGE_HEADER));
    assert!(g.publish(at_ms(1000)).is_empty());
}

#[test]
fn meta_data_goes_first() {
    let mut writer = writer_model(1, vec![variable("a")]);
    writer.meta_data_update_time = Some(0);
    let g = group(group_model(vec![writer]));
    notify(&g, 1, "a", Variant::Double(1.0));
    let output = g.publish(t0());
    assert_eq!(output.len(), 2);
    assert_eq!(output[0].topic, format!("Publisher/Group/{}", META_DATA_TOPIC_SUFFIX));
    let meta_data = decode(&g, &output[0]);
    assert_eq!(meta_data[0].message_type, NetworkMessageType::MetaData);
    assert_eq!(
        meta_data[0].meta_data.as_ref().unwrap().meta_data.fields[0].built_in_type,
        Some(VariantTypeId::Double)
    );
    assert_eq!(output[1].topic, "Publisher/Group");

    // Unchanged metadata is not repeated
    notify(&g, 1, "a", Variant::Double(2.0));
    assert_eq!(g.publish(at_ms(1000)).len(), 1);
}

#[test]
fn queue_settings_shape_outbound_messages() {
    let mut model = group_model(vec![writer_model(1, vec![variable("a")])]);
    model.publishing_queue = Some(PublishingQueueSettingsModel {
        queue_name: Some("plant/line1".into()),
        requested_delivery_guarantee: Some(BrokerTransportQualityOfService::AtLeastOnce),
        ttl: Some(5000),
        retain: Some(true),
    });
    model.message_type = Some(MessageEncoding::JSON_GZIP);
    let g = group(model);
    notify(&g, 1, "a", Variant::Int32(1));
    let output = g.publish(t0());
    assert_eq!(output[0].topic, "plant/line1");
    assert_eq!(output[0].qos, BrokerTransportQualityOfService::AtLeastOnce);
    assert_eq!(output[0].ttl, Some(5000));
    assert!(output[0].retain);
    assert_eq!(output[0].content_encoding.as_deref(), Some("gzip"));
}

#[test]
fn array_envelope() {
    let mut model = with_mask(
        group_model(vec![
            writer_model(1, vec![variable("a")]),
            writer_model(2, vec![variable("b")]),
        ]),
        NetworkMessageContentFlags::default() | NetworkMessageContentFlags::SINGLE_DATA_SET_MESSAGE,
    );
    model
        .message_settings
        .get_or_insert_with(Default::default)
        .use_array_envelope = Some(true);
    let g = group(model);
    notify(&g, 1, "a", Variant::Int32(1));
    notify(&g, 2, "b", Variant::Int32(2));
    let output = g.publish(t0());
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].message_count, 2);
    assert_eq!(decode(&g, &output[0]).len(), 2);
}

#[test]
fn writers_in_error_are_counted() {
    let broken = DataSetWriterModel {
        data_set_writer_id: 2,
        id: "Broken".into(),
        ..Default::default()
    };
    let g = group(group_model(vec![writer_model(1, vec![variable("a")]), broken]));
    let d = g.diagnostics();
    assert_eq!(d.writers_in_error.load(Ordering::Relaxed), 1);
    assert!(g.reconfigure_writer(writer_model(2, vec![variable("b")])).is_ok());
    assert_eq!(d.writers_in_error.load(Ordering::Relaxed), 0);
    assert!(matches!(
        g.reconfigure_writer(writer_model(7, vec![])),
        Err(PublisherError::UnknownWriter(7))
    ));
}

#[test]
fn outbound_queue_drops_the_oldest() {
    let queue = OutboundQueue::new(2);
    for topic in ["a", "b"] {
        assert!(queue.push(OutboundMessage::new_event(topic, vec![])).is_none());
    }
    let dropped = queue.push(OutboundMessage::new_event("c", vec![])).unwrap();
    assert_eq!(dropped.topic, "a");
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop().unwrap().topic, "b");
    assert_eq!(queue.pop().unwrap().topic, "c");
    assert!(queue.is_empty());
}

#[test]
fn full_queue_is_counted() {
    let mut model = group_model(vec![writer_model(1, vec![variable("a")])]);
    model.publish_queue_size = Some(1);
    let g = group(model);
    g.enqueue(vec![
        OutboundMessage::new_event("x", vec![]),
        OutboundMessage::new_event("y", vec![]),
    ]);
    let d = g.diagnostics();
    assert_eq!(d.outgress_input_buffer_dropped.load(Ordering::Relaxed), 1);
    assert_eq!(d.outgress_input_buffer_count.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn queue_drains_to_the_sink() {
    let queue = Arc::new(OutboundQueue::new(10));
    queue.push(OutboundMessage::new_event("a", vec![1]));
    queue.push(OutboundMessage::new_event("b", vec![2]));
    let (sink, mut receiver) = ChannelSink::new(1);
    let d = diagnostics();
    let cancel = CancellationToken::new();
    cancel.cancel();
    // Cancelled before it starts, queued messages are still offered
    queue.clone().drain(Arc::new(sink), d.clone(), cancel).await;
    assert!(queue.is_empty());
    assert_eq!(receiver.recv().await.unwrap().topic, "a");
    // The channel holds one message, the second is dropped
    assert_eq!(d.outgress_message_count.load(Ordering::Relaxed), 1);
    assert_eq!(d.outgress_message_dropped.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn threshold_triggers_an_early_publish() {
    let mut model = group_model(vec![writer_model(1, vec![variable("a"), variable("b")])]);
    model.publishing_interval = Some(3_600_000);
    model.notification_publish_threshold = Some(2);
    let g = Arc::new(group(model));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(g.clone().run(cancel.clone()));
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert!(g.queue().is_empty());

    notify(&g, 1, "a", Variant::Int32(1));
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert!(g.queue().is_empty());
    notify(&g, 1, "b", Variant::Int32(2));
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(g.queue().len(), 1);

    cancel.cancel();
    handle.await.unwrap();
    assert!(!g.is_accepting());
    // Nothing was pending for the final cycle
    assert_eq!(g.queue().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn final_cycle_on_stop() {
    let mut model = group_model(vec![writer_model(1, vec![variable("a")])]);
    model.publishing_interval = Some(3_600_000);
    let g = Arc::new(group(model));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(g.clone().run(cancel.clone()));
    notify(&g, 1, "a", Variant::Int32(1));
    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(g.queue().len(), 1);

    let mut model = group_model(vec![writer_model(1, vec![variable("a")])]);
    model.publishing_interval = Some(3_600_000);
    let g = Arc::new(group(model));
    g.set_discard_on_stop(true);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(g.clone().run(cancel.clone()));
    notify(&g, 1, "a", Variant::Int32(1));
    cancel.cancel();
    handle.await.unwrap();
    assert!(g.queue().is_empty());
}
