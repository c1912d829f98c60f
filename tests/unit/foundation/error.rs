use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        EaselError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        EaselError::invariant("x")
            .to_string()
            .contains("invariant violation:")
    );
    assert!(
        EaselError::decode("x")
            .to_string()
            .contains("decode error:")
    );
    assert!(
        EaselError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
    assert_eq!(
        EaselError::missing_plugin("filter", "blur").to_string(),
        "missing filter plugin 'blur'"
    );
}

#[test]
fn classification_helpers() {
    assert!(EaselError::Cancelled.is_cancelled());
    assert!(!EaselError::invariant("x").is_cancelled());
    assert!(EaselError::missing_plugin("brush", "pencil").is_missing_plugin());
    assert!(!EaselError::Cancelled.is_missing_plugin());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = EaselError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
