use std::str::FromStr;

use crate::types::*;

#[test]
fn parse_node_id() {
    let node_id = NodeId::from_str("ns=2;s=Boiler/Temperature").unwrap();
    assert_eq!(node_id.namespace, 2);
    assert_eq!(
        node_id.identifier,
        Identifier::String("Boiler/Temperature".to_string())
    );
    assert_eq!(node_id.to_string(), "ns=2;s=Boiler/Temperature");

    // Namespace 0 is omitted
    let node_id = NodeId::from_str("i=2258").unwrap();
    assert_eq!(node_id, NodeId::from((0, 2258u32)));
    assert_eq!(node_id.to_string(), "i=2258");

    let node_id = NodeId::from_str("ns=1;g=72962b91-fa75-4ae6-8d28-b404dc7daf63").unwrap();
    assert!(matches!(node_id.identifier, Identifier::Guid(_)));

    let node_id = NodeId::from_str("ns=3;b=AAEC").unwrap();
    assert_eq!(node_id.identifier, Identifier::ByteString(vec![0, 1, 2]));
    assert_eq!(node_id.to_string(), "ns=3;b=AAEC");
}

#[test]
fn parse_invalid_node_id() {
    assert_eq!(
        NodeId::from_str("").unwrap_err(),
        StatusCode::BadNodeIdInvalid
    );
    assert!(NodeId::from_str("ns=;i=1").is_err());
    assert!(NodeId::from_str("ns=70000;i=1").is_err());
    assert!(NodeId::from_str("x=1").is_err());
    assert!(NodeId::from_str("i=abc").is_err());
    assert!(NodeId::from_str("g=not-a-guid").is_err());
}

#[test]
fn node_id_serde() {
    let node_id = NodeId::from((4, "Pump"));
    let json = serde_json::to_string(&node_id).unwrap();
    assert_eq!(json, "\"ns=4;s=Pump\"");
    let node_id2: NodeId = serde_json::from_str(&json).unwrap();
    assert_eq!(node_id, node_id2);
    assert!(serde_json::from_str::<NodeId>("\"nonsense\"").is_err());
    assert!(NodeId::null().is_null());
}
