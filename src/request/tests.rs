use super::*;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

#[test]
fn overrides_leave_the_original_untouched() {
    let spec = RequestSpec::get("/a");
    let authorized = spec.with(Override::Authorization(Some(bearer("T"))));
    let moved = authorized.with(Override::Url("/b".to_string()));

    assert_eq!(moved.authorization(), Some("Bearer T"));
    assert_eq!(moved.url(), "/b");
    assert_eq!(moved.method(), Method::Get);

    assert_eq!(authorized.url(), "/a");
    assert_eq!(spec.authorization(), None);
    assert_eq!(spec.url(), "/a");
}

#[test]
fn body_override_on_bodiless_request_defaults_to_json() {
    let spec = RequestSpec::post("/admin/blacklist");
    let with_body = spec.with(Override::Body(Some(json!({"organizationName": "acme"}))));

    assert_eq!(spec.format(), SerializationFormat::None);
    assert_eq!(with_body.format(), SerializationFormat::Json);
    let (bytes, content_type) = with_body.encode_body().unwrap().unwrap();
    assert_eq!(content_type, "application/json");
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(),
        json!({"organizationName": "acme"})
    );
}

#[test]
fn header_override_replaces_case_insensitively() {
    let spec = RequestSpec::get("/x").header("X-Trace", "1");
    let next = spec.with(Override::Header("x-trace".to_string(), "2".to_string()));

    assert_eq!(next.headers().len(), 1);
    assert_eq!(next.header_value("X-TRACE"), Some("2"));
    assert_eq!(spec.header_value("x-trace"), Some("1"));

    let cleared = next.with(Override::Headers(BTreeMap::new()));
    assert!(cleared.headers().is_empty());
}

#[test]
fn text_bodies_are_sent_verbatim() {
    let spec = RequestSpec::post("/notes").text("");
    let (bytes, content_type) = spec.encode_body().unwrap().unwrap();
    assert!(bytes.is_empty());
    assert!(content_type.starts_with("text/plain"));
}

#[test]
fn body_without_format_is_rejected() {
    let spec = RequestSpec::post("/x")
        .json(&json!({"isDelete": false}))
        .unwrap()
        .as_format(SerializationFormat::None);
    assert!(spec.encode_body().is_err());
    assert!(RequestSpec::get("/x").encode_body().unwrap().is_none());
}

#[test]
fn content_type_detection() {
    assert_eq!(
        SerializationFormat::from_content_type("application/json; charset=utf-8"),
        Some(SerializationFormat::Json)
    );
    assert_eq!(
        SerializationFormat::from_content_type("application/problem+json"),
        Some(SerializationFormat::Json)
    );
    assert_eq!(
        SerializationFormat::from_content_type("text/plain"),
        Some(SerializationFormat::Text)
    );
    assert_eq!(SerializationFormat::from_content_type("application/octet-stream"), None);
}

fn arb_override() -> impl Strategy<Value = Override> {
    prop_oneof![
        proptest::option::of("[a-zA-Z0-9]{1,16}").prop_map(Override::Authorization),
        "/[a-z]{1,12}".prop_map(Override::Url),
        ("[a-z-]{1,10}", "[a-z0-9]{0,10}").prop_map(|(n, v)| Override::Header(n, v)),
        proptest::option::of(any::<i64>()).prop_map(|v| Override::Body(v.map(|n| json!({ "n": n })))),
        Just(Override::Format(SerializationFormat::Text)),
    ]
}

proptest! {
    #[test]
    fn with_never_mutates_the_receiver(overrides in proptest::collection::vec(arb_override(), 1..8)) {
        let original = RequestSpec::post("/a")
            .header("X-Original", "yes")
            .json(&json!({"keep": true}))
            .unwrap();
        let snapshot = original.clone();

        let mut current = original.clone();
        for field in overrides {
            let next = current.with(field);
            current = next;
        }

        prop_assert_eq!(&original, &snapshot);
    }
}
