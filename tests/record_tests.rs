use experimenthq::kernel::record::{ParameterPayload, ParameterRecord};
use experimenthq::{NotionType, ParameterValue};
use serde_json::json;

#[test]
fn test_retried_copies_with_incremented_count() {
    let record = ParameterRecord::new("epochs", 20, None);
    let again = record.clone().retried().retried();
    assert_eq!(record.retry_count, 0);
    assert_eq!(again.retry_count, 2);
    assert_eq!(again.name, "epochs");
    assert_eq!(again.value, ParameterValue::Integer(20));
}

#[test]
fn test_payload_serializes_plain_scalars() {
    let record = ParameterRecord::new("accuracy", 0.93, Some(NotionType::Number));
    let payload = serde_json::to_value(ParameterPayload::from(&record)).unwrap();
    assert_eq!(
        payload,
        json!({ "parameter_name": "accuracy", "parameter_value": 0.93, "notion_type": "number" })
    );

    let untyped = ParameterRecord::new("weights", "uniform", None);
    let payload = serde_json::to_value(ParameterPayload::from(&untyped)).unwrap();
    assert_eq!(payload["parameter_value"], json!("uniform"));
    assert!(payload["notion_type"].is_null());
}

#[test]
fn test_infer_reads_command_line_values() {
    assert_eq!(ParameterValue::infer("3"), ParameterValue::Integer(3));
    assert_eq!(ParameterValue::infer("0.97"), ParameterValue::Float(0.97));
    assert_eq!(ParameterValue::infer("true"), ParameterValue::Boolean(true));
    assert_eq!(
        ParameterValue::infer("http://localhost:8080"),
        ParameterValue::Text("http://localhost:8080".into())
    );
}
