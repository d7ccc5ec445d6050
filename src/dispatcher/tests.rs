use super::*;
use crate::request::{Method, Override, bearer};
use serde_json::json;
use std::collections::VecDeque;

/// Transport that records requests and replays canned responses.
#[derive(Default)]
struct ScriptedTransport {
    sent: Arc<Mutex<Vec<PreparedRequest>>>,
    replies: Mutex<VecDeque<(u16, &'static str, &'static str)>>,
}

impl ScriptedTransport {
    fn replying(replies: Vec<(u16, &'static str, &'static str)>) -> (Self, Arc<Mutex<Vec<PreparedRequest>>>) {
        let transport = Self {
            sent: Arc::default(),
            replies: Mutex::new(replies.into()),
        };
        let sent = Arc::clone(&transport.sent);
        (transport, sent)
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let (status, content_type, body) = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((200, "application/json", "{}"));
            self.sent.lock().unwrap().push(request.clone());
            Ok(ResponseView::new(
                request.method,
                request.url,
                status,
                "",
                vec![("Content-Type".to_string(), content_type.to_string())],
                body.as_bytes().to_vec(),
            ))
        })
    }
}

fn config() -> HarnessConfig {
    HarnessConfig::default()
        .with_base_url("https://api.example.com/")
        .with_api_version("v1")
}

#[test]
fn relative_and_versioned_urls_are_resolved() {
    let (transport, _) = ScriptedTransport::replying(vec![]);
    let dispatcher = Dispatcher::new(transport, &config());

    assert_eq!(
        dispatcher.resolve_url(&RequestSpec::get("/gl-share/api/share")).unwrap(),
        "https://api.example.com/gl-share/api/share"
    );
    assert_eq!(
        dispatcher
            .resolve_url(&RequestSpec::get("users?page=2").requiring_api_version())
            .unwrap(),
        "https://api.example.com/v1/users?page=2"
    );
    assert_eq!(
        dispatcher
            .resolve_url(&RequestSpec::get("https://other.example.com/a?b=c").requiring_api_version())
            .unwrap(),
        "https://other.example.com/v1/a?b=c"
    );
}

#[test]
fn version_requirement_without_configured_version_fails() {
    let (transport, _) = ScriptedTransport::replying(vec![]);
    let dispatcher = Dispatcher::new(transport, &HarnessConfig::default());
    let error = dispatcher
        .resolve_url(&RequestSpec::get("/x").requiring_api_version())
        .unwrap_err();
    assert!(matches!(error, HarnessError::InvalidRequest { .. }));
}

#[test]
fn spec_headers_override_defaults_and_authorization_wins() {
    let mut config = config();
    config
        .default_headers
        .insert("Accept".to_string(), "application/json".to_string());
    let (transport, _) = ScriptedTransport::replying(vec![]);
    let dispatcher = Dispatcher::new(transport, &config);

    let spec = RequestSpec::post("/share")
        .json(&json!({"recipients": []}))
        .unwrap()
        .header("accept", "text/plain")
        .header("Authorization", "Basic abc")
        .with(Override::Authorization(Some(bearer("T"))));
    let prepared = dispatcher.prepare(&spec).unwrap();

    let header = |name: &str| {
        prepared
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
    };
    assert_eq!(header("accept"), vec!["text/plain"]);
    assert_eq!(header("authorization"), vec!["Bearer T"]);
    assert_eq!(header("content-type"), vec!["application/json"]);
    assert_eq!(prepared.method, Method::Post);
    assert!(prepared.body.is_some());
}

#[tokio::test]
async fn last_response_is_tracked_per_session() {
    let (transport, sent) = ScriptedTransport::replying(vec![
        (404, "text/plain", "Not Found"),
        (200, "application/json", r#"{"id":"abc"}"#),
    ]);
    let shared = Dispatcher::new(transport, &config());
    let first = shared.session();
    let second = shared.session();

    assert!(first.response().is_none());
    first.send(&RequestSpec::get("/missing")).await.unwrap();
    let pending = second.send(&RequestSpec::get("/share/abc")).await.unwrap();

    assert_eq!(first.last_response().unwrap().status(), 404);
    assert_eq!(second.last_response().unwrap().status(), 200);
    assert!(shared.response().is_none());

    #[derive(serde::Deserialize)]
    struct Share {
        id: String,
    }
    assert_eq!(pending.take::<Share>().unwrap().id, "abc");
    assert_eq!(sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn non_success_status_is_not_an_error_until_asked() {
    let (transport, _) = ScriptedTransport::replying(vec![(403, "text/plain", "Only admins allowed")]);
    let dispatcher = Dispatcher::new(transport, &config());

    let pending = dispatcher.send(&RequestSpec::get("/admin")).await.unwrap();
    assert_eq!(pending.status(), 403);
    assert_eq!(pending.take::<String>().unwrap(), "Only admins allowed");
    assert!(matches!(
        pending.ensure_success(),
        Err(HarnessError::UnexpectedStatus { status: 403, .. })
    ));
}

#[tokio::test]
async fn send_until_retries_until_accepted() {
    let (transport, sent) = ScriptedTransport::replying(vec![
        (200, "application/json", r#"{"isDisabled":false}"#),
        (200, "application/json", r#"{"isDisabled":false}"#),
        (200, "application/json", r#"{"isDisabled":true}"#),
    ]);
    let dispatcher = Dispatcher::new(transport, &config());

    let pending = dispatcher
        .send_until_with(
            &RequestSpec::get("/admin/share/abc"),
            |response| {
                response
                    .json()
                    .map(|doc| doc["isDisabled"] == json!(true))
                    .unwrap_or(false)
            },
            PollPolicy::new(Duration::from_secs(2), Duration::from_millis(5)),
        )
        .await
        .unwrap();

    assert_eq!(pending.take::<serde_json::Value>().unwrap()["isDisabled"], json!(true));
    assert_eq!(sent.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn send_until_reports_last_response_on_timeout() {
    let (transport, _) = ScriptedTransport::replying(vec![]);
    let dispatcher = Dispatcher::new(transport, &config());

    let error = dispatcher
        .send_until_with(
            &RequestSpec::get("/never"),
            |response| response.status() == 201,
            PollPolicy::new(Duration::from_millis(30), Duration::from_millis(10)),
        )
        .await
        .unwrap_err();

    match error {
        HarnessError::Timeout { last_observation, .. } => {
            assert_eq!(last_observation, "status 200 body {}")
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}
