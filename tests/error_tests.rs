use experimenthq::{DeliveryWarning, DropReason, ServiceError};

#[test]
fn test_status_classification() {
    assert!(matches!(ServiceError::from_status(401, ""), ServiceError::Unauthorized));
    assert!(matches!(ServiceError::from_status(400, "bad"), ServiceError::BadRequest(m) if m == "bad"));
    assert!(matches!(ServiceError::from_status(503, "down"), ServiceError::Status { code: 503, .. }));

    assert!(!ServiceError::from_status(401, "").is_retryable_delivery());
    assert!(!ServiceError::from_status(400, "").is_retryable_delivery());
    assert!(!ServiceError::from_status(404, "").is_retryable_delivery());
    assert!(ServiceError::from_status(403, "").is_retryable_delivery());
    assert!(ServiceError::from_status(500, "").is_retryable_delivery());

    assert!(ServiceError::from_status(408, "").is_terminal_startup());
    assert!(ServiceError::from_status(403, "").is_terminal_startup());
    assert!(!ServiceError::from_status(502, "").is_terminal_startup());
}

#[test]
fn test_warning_names_parameter_and_page() {
    let mut warning = DeliveryWarning {
        parameter_name: "lr".into(),
        parameter_value: "0.01".into(),
        page_url: "https://www.notion.so/abc".into(),
        retry_count: 3,
        reason: DropReason::RetriesExhausted,
    };
    let text = warning.to_string();
    assert!(text.starts_with("Failed to log parameter `lr` with value: `0.01`"));
    assert!(text.contains("after 3 attempts"));
    assert!(text.ends_with("https://www.notion.so/abc."));

    warning.reason = DropReason::Interrupted("connection refused".into());
    assert!(warning.to_string().contains("before shutdown (connection refused)"));
}
