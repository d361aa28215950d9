use crate::pubsub::meta_data::*;
use crate::types::*;

fn meta_data(names: &[&str]) -> DataSetMetaData {
    DataSetMetaData::new(
        "Test",
        None,
        names.iter().map(|n| FieldMetaData::new(*n, None)).collect(),
    )
}

#[test]
fn learning_types_is_additive() {
    let mut m = meta_data(&["a", "b"]);
    assert_eq!(m.configuration_version, ConfigurationVersion::new(1, 0));
    assert!(m.learn_type(0, &Variant::Double(1.0)));
    assert_eq!(m.configuration_version, ConfigurationVersion::new(1, 1));
    // Same type again changes nothing
    assert!(!m.learn_type(0, &Variant::Double(2.0)));
    // Empty values teach nothing
    assert!(!m.learn_type(1, &Variant::Empty));
    assert_eq!(m.configuration_version, ConfigurationVersion::new(1, 1));
}

#[test]
fn changing_type_bumps_major() {
    let mut m = meta_data(&["a"]);
    m.learn_type(0, &Variant::Double(1.0));
    assert!(m.learn_type(0, &Variant::from("text")));
    assert_eq!(m.configuration_version, ConfigurationVersion::new(2, 0));
    assert_eq!(m.fields[0].built_in_type, Some(VariantTypeId::String));
}

#[test]
fn scalar_to_array_bumps_major() {
    let mut m = meta_data(&["a"]);
    m.learn_type(0, &Variant::Int32(1));
    let array = Variant::new_array(VariantTypeId::Int32, vec![Variant::Int32(1)]);
    assert!(m.learn_type(0, &array));
    assert_eq!(m.configuration_version.major_version, 2);
    assert_eq!(m.fields[0].value_rank, VALUE_RANK_ONE_DIMENSION);
}

#[test]
fn appending_fields_bumps_minor() {
    let mut m = meta_data(&["a", "b"]);
    let id = m.fields[0].data_set_field_id;
    let fields = ["a", "b", "c"].iter().map(|n| FieldMetaData::new(*n, None)).collect();
    assert!(m.update_fields(fields));
    assert_eq!(m.configuration_version, ConfigurationVersion::new(1, 1));
    // Surviving fields keep their identity
    assert_eq!(m.fields[0].data_set_field_id, id);
}

#[test]
fn removing_or_reordering_bumps_major() {
    let mut m = meta_data(&["a", "b"]);
    m.learn_type(0, &Variant::Int32(1));
    let fields = vec![FieldMetaData::new("a", None)];
    assert!(m.update_fields(fields));
    assert_eq!(m.configuration_version, ConfigurationVersion::new(2, 0));
    // Learned type survives
    assert_eq!(m.fields[0].built_in_type, Some(VariantTypeId::Int32));

    let fields = ["b", "a"].iter().map(|n| FieldMetaData::new(*n, None)).collect();
    assert!(m.update_fields(fields));
    assert_eq!(m.configuration_version, ConfigurationVersion::new(3, 0));
}

#[test]
fn same_fields_keep_version() {
    let mut m = meta_data(&["a", "b"]);
    let fields = ["a", "b"].iter().map(|n| FieldMetaData::new(*n, None)).collect();
    assert!(!m.update_fields(fields));
    assert_eq!(m.configuration_version, ConfigurationVersion::new(1, 0));
}
