use std::io::Cursor;

use crate::types::*;

use super::*;

#[test]
fn encoding_scalars() {
    serialize_test(Variant::Empty);
    serialize_test(Variant::Boolean(true));
    serialize_test(Variant::SByte(-5));
    serialize_test(Variant::Byte(200));
    serialize_test(Variant::Int16(-1234));
    serialize_test(Variant::UInt16(54321));
    serialize_test(Variant::Int32(-123456));
    serialize_test(Variant::UInt32(4000000000));
    serialize_test(Variant::Int64(i64::MIN));
    serialize_test(Variant::UInt64(u64::MAX));
    serialize_test(Variant::Float(1.5));
    serialize_test(Variant::Double(0.0));
    serialize_test(Variant::from("Hello World"));
    serialize_test(Variant::from(DateTime::ymd_hms(2024, 2, 29, 12, 0, 1)));
    serialize_test(Variant::from(Guid::new()));
    serialize_test(Variant::ByteString(vec![1, 2, 3]));
    serialize_test(Variant::StatusCode(StatusCode::BadNoCommunication));
}

#[test]
fn encoding_array() {
    serialize_test(Variant::new_array(
        VariantTypeId::Int32,
        vec![Variant::Int32(1), Variant::Int32(2), Variant::Int32(3)],
    ));
    // Mixed element types cannot be encoded
    let mixed = Variant::new_array(
        VariantTypeId::Int32,
        vec![Variant::Int32(1), Variant::Double(2.0)],
    );
    let mut stream = Cursor::new(Vec::new());
    assert_eq!(
        mixed.encode(&mut stream).unwrap_err(),
        StatusCode::BadEncodingError
    );
}

#[test]
fn encoding_data_value() {
    let now = DateTime::now();
    serialize_test(DataValue::default());
    serialize_test(DataValue::new_at(42i32, now));
    serialize_test(DataValue {
        value: Some(Variant::Double(3.25)),
        status: Some(StatusCode::UncertainLastUsableValue),
        source_timestamp: Some(now),
        source_picoseconds: Some(100),
        server_timestamp: Some(now),
        server_picoseconds: Some(200),
    });
    serialize_test(DataValue::new_status(StatusCode::BadNodeIdUnknown, now));
}

#[test]
fn decoding_limits() {
    let value = Variant::from("x".repeat(100));
    let mut stream = serialize_as_stream(value);
    let decoding_options = DecodingOptions {
        max_string_length: 10,
        ..Default::default()
    };
    assert_eq!(
        Variant::decode(&mut stream, &decoding_options).unwrap_err(),
        StatusCode::BadDecodingError
    );
}

#[test]
fn decoding_unknown_type() {
    let mut stream = Cursor::new(vec![0x40u8]);
    assert!(Variant::decode(&mut stream, &DecodingOptions::default()).is_err());
}
