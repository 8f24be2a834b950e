use super::*;
use serde_json::json;

const MAX: usize = 4096;

fn check(raw: &Value) -> Result<MessagePayload, ValidationError> {
    validate(Some(raw), MAX)
}

#[test]
fn accepts_public_message() {
    let payload = check(&json!({"content": "hi", "public": true})).unwrap();
    assert_eq!(payload, MessagePayload { content: "hi".into(), public: true });
}

#[test]
fn keeps_surrounding_whitespace() {
    let payload = check(&json!({"content": "  hi  ", "public": false})).unwrap();
    assert_eq!(payload.content, "  hi  ");
    assert!(!payload.public);
}

#[test]
fn ignores_unknown_fields() {
    assert!(check(&json!({"content": "hi", "public": true, "to": "bob"})).is_ok());
}

#[test]
fn missing_argument_is_invalid() {
    assert_eq!(
        validate(None, MAX).unwrap_err(),
        ValidationError::InvalidPayload("payload must be an object")
    );
}

#[test]
fn non_object_is_invalid() {
    for raw in [json!("hi"), json!(["hi", true]), json!(null), json!(7)] {
        assert!(matches!(check(&raw), Err(ValidationError::InvalidPayload(_))), "{raw}");
    }
}

#[test]
fn empty_content_is_invalid() {
    let err = check(&json!({"content": "", "public": true})).unwrap_err();
    assert_eq!(err, ValidationError::InvalidPayload("content must not be empty"));
    assert_eq!(err.error_code(), "E_INVALID_PAYLOAD");
}

#[test]
fn whitespace_only_content_is_invalid() {
    assert!(matches!(
        check(&json!({"content": " \t\n ", "public": true})),
        Err(ValidationError::InvalidPayload(_))
    ));
}

#[test]
fn missing_or_mistyped_content_is_invalid() {
    assert_eq!(
        check(&json!({"public": true})).unwrap_err(),
        ValidationError::InvalidPayload("content required")
    );
    assert_eq!(
        check(&json!({"content": 5, "public": true})).unwrap_err(),
        ValidationError::InvalidPayload("content must be a string")
    );
}

#[test]
fn missing_or_mistyped_public_is_invalid() {
    assert_eq!(
        check(&json!({"content": "hi"})).unwrap_err(),
        ValidationError::InvalidPayload("public required")
    );
    assert_eq!(
        check(&json!({"content": "hi", "public": "true"})).unwrap_err(),
        ValidationError::InvalidPayload("public must be a boolean")
    );
}

#[test]
fn content_at_bound_is_accepted() {
    let content = "a".repeat(MAX);
    assert!(check(&json!({"content": content, "public": true})).is_ok());
}

#[test]
fn content_over_bound_is_too_large() {
    let content = "a".repeat(MAX + 1);
    let err = check(&json!({"content": content, "public": true})).unwrap_err();
    assert_eq!(err, ValidationError::PayloadTooLarge { len: MAX + 1, max: MAX });
    assert_eq!(err.error_code(), "E_PAYLOAD_TOO_LARGE");
}

#[test]
fn bound_counts_bytes_not_chars() {
    // 3 bytes per char in UTF-8.
    let content = "€".repeat(2);
    let err = validate(Some(&json!({"content": content, "public": true})), 5).unwrap_err();
    assert_eq!(err, ValidationError::PayloadTooLarge { len: 6, max: 5 });
}
