use relay_core::{HttpTransport, ModelSelection, ServerSettings};
use serde_json::Value;

fn transport(settings: ServerSettings) -> HttpTransport {
    HttpTransport::new(&settings).expect("transport")
}

#[test]
fn every_request_carries_the_shared_secret() {
    let http = transport(ServerSettings::default().with_password("s3cret"));
    let model = ModelSelection::new("A", "m1");
    let requests = [
        http.build_health(),
        http.build_list_sessions(),
        http.build_create_session(Some("t")),
        http.build_get_session("ses_1"),
        http.build_delete_session("ses_1"),
        http.build_messages("ses_1", Some(5)),
        http.build_send_message("ses_1", "hi", Some(&model)),
        http.build_abort("ses_1"),
        http.build_providers(),
    ];
    for request in requests {
        let request = request.expect("request");
        let header = request
            .headers()
            .get("authorization")
            .expect("authorization header")
            .to_str()
            .expect("ascii header");
        // base64("opencode:s3cret")
        assert_eq!(header, "Basic b3BlbmNvZGU6czNjcmV0");
    }
}

#[test]
fn no_secret_sends_no_authorization() {
    let http = transport(ServerSettings::default());
    for request in [http.build_health(), http.build_providers()] {
        assert!(request.expect("request").headers().get("authorization").is_none());
    }
}

#[test]
fn zero_limit_is_the_same_as_no_limit() {
    let http = transport(ServerSettings::default());
    let zero = http.build_messages("ses_1", Some(0)).expect("request");
    let none = http.build_messages("ses_1", None).expect("request");
    assert_eq!(zero.url(), none.url());
    assert_eq!(none.url().as_str(), "http://127.0.0.1:4096/session/ses_1/message");
}

#[test]
fn send_message_body_has_one_text_part() {
    let http = transport(ServerSettings::default());
    let request = http
        .build_send_message("ses_1", "what changed?", None)
        .expect("request");
    let body: Value = serde_json::from_slice(
        request
            .body()
            .and_then(|body| body.as_bytes())
            .expect("body bytes"),
    )
    .expect("json");
    let parts = body["parts"].as_array().expect("parts");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0]["type"], "text");
    assert_eq!(parts[0]["text"], "what changed?");
    assert!(body.get("model").is_none());
}
