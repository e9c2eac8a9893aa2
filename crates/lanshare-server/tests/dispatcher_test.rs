//! Dispatcher integration tests
//!
//! Requests are driven straight into the dispatcher with in-memory bodies,
//! so every check is deterministic:
//! - Authorization tiers on every endpoint
//! - Download bypassing the cookie gate
//! - Truncated and oversized uploads leaving the store untouched
//! - Response shapes of the JSON protocol

use std::{
    net::Ipv4Addr,
    sync::{Arc, Mutex},
};

use lanshare_core::{Capabilities, Environment, Store};
use lanshare_server::{Advertise, Dispatcher, Request, Response, Status, dispatcher};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{Value, json};

const MANAGE: &str = "0123456789abcdef0123456789abcdef";
const REMOTE: &str = "cafebabe";

#[derive(Clone)]
struct TestEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl Environment for TestEnv {
    fn unix_time(&self) -> i64 {
        1_700_000_000
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("rng mutex poisoned").fill_bytes(buffer);
    }
}

fn dispatcher_with_form_limit(max_form_bytes: usize) -> Dispatcher<TestEnv> {
    let env = TestEnv { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(7))) };
    let advertise = Advertise {
        port: 8042,
        ipv4: Some(Ipv4Addr::new(192, 168, 1, 20)),
        ipv6: Some("fd00::20".parse().unwrap()),
    };
    Dispatcher::new(
        Arc::new(Store::new(env)),
        Capabilities::from_tokens(MANAGE, REMOTE),
        advertise,
        max_form_bytes,
    )
}

fn test_dispatcher() -> Dispatcher<TestEnv> {
    dispatcher_with_form_limit(dispatcher::DEFAULT_MAX_FORM_BYTES)
}

fn request(method: &str, target: &str, token: Option<&str>) -> Request {
    let req = Request::new(method, target).unwrap();
    match token {
        Some(token) => req.with_header("Cookie", &format!("ak={token}")),
        None => req,
    }
}

async fn call(d: &Dispatcher<TestEnv>, req: Request, body: &[u8]) -> Response {
    let req = req.with_header("Content-Length", &body.len().to_string());
    let mut body = body;
    d.handle(&req, &mut body).await
}

fn json_body(resp: &Response) -> Value {
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.header_value("content-type"), Some("application/json"));
    serde_json::from_slice(resp.body()).unwrap()
}

async fn add_text(d: &Dispatcher<TestEnv>, token: &str, text: &str) -> Value {
    let req = request("POST", "/api/addText", Some(token));
    json_body(&call(d, req, format!("text={text}").as_bytes()).await)
}

async fn add_file(d: &Dispatcher<TestEnv>, token: &str, name: &str, data: &[u8]) -> Value {
    let target = format!("/api/addFile?name={name}&size={}", data.len());
    json_body(&call(d, request("POST", &target, Some(token)), data).await)
}

async fn list(d: &Dispatcher<TestEnv>) -> Vec<Value> {
    let resp = call(d, request("GET", "/api/getMsgList", Some(MANAGE)), b"").await;
    let body = json_body(&resp);
    assert_eq!(body["ret"], 0);
    body["data"].as_array().unwrap().clone()
}

#[tokio::test]
async fn example_scenario() {
    let d = test_dispatcher();

    assert_eq!(add_text(&d, MANAGE, "hello").await, json!({"ret": 0}));
    assert_eq!(add_file(&d, MANAGE, "a.txt", b"world").await, json!({"ret": 0}));

    let messages = list(&d).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages[0],
        json!({"id": 1, "kind": 0, "createdAt": 1_700_000_000, "label": "hello"})
    );
    assert_eq!(messages[1]["id"], 2);
    assert_eq!(messages[1]["kind"], 1);
    assert_eq!(messages[1]["label"], "a.txt");
    assert_eq!(messages[1]["size"], 5);

    let key = messages[1]["key"].as_str().unwrap().to_string();
    assert_eq!(key.len(), 32);

    // No cookie at all: the key alone is enough
    let resp = call(&d, request("GET", &format!("/api/download?k={key}"), None), b"").await;
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.body(), b"world");

    let resp = call(&d, request("GET", "/api/delete?id=2", Some(MANAGE)), b"").await;
    assert_eq!(json_body(&resp), json!({"ret": 0}));

    let resp = call(&d, request("GET", &format!("/api/download?k={key}"), None), b"").await;
    assert_eq!(resp.status(), Status::NotFound);
    assert!(resp.body().is_empty());

    let messages = list(&d).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], 1);
}

#[tokio::test]
async fn unauthenticated_requests_are_refused() {
    let d = test_dispatcher();
    add_text(&d, MANAGE, "secret").await;

    for target in [
        "/api/getMsgList",
        "/api/addText",
        "/api/addFile?name=a&size=1",
        "/api/delete?id=1",
        "/api/getAccessInfo",
        "/api/unknown",
    ] {
        for token in [None, Some(""), Some("wrong"), Some(&MANAGE[..31])] {
            let resp = call(&d, request("POST", target, token), b"text=x").await;
            assert_eq!(json_body(&resp), json!({"ret": -1}), "{target} with {token:?}");
        }
    }

    assert_eq!(d.store().len(), 1);
}

#[tokio::test]
async fn remote_access_can_add_and_list_but_not_delete() {
    let d = test_dispatcher();

    assert_eq!(add_text(&d, REMOTE, "from+phone").await, json!({"ret": 0}));
    assert_eq!(add_file(&d, REMOTE, "photo.jpg", &[1, 2, 3]).await, json!({"ret": 0}));

    let resp = call(&d, request("GET", "/api/getMsgList", Some(REMOTE)), b"").await;
    let body = json_body(&resp);
    assert_eq!(body["data"][0]["label"], "from phone");

    let resp = call(&d, request("GET", "/api/delete?id=1", Some(REMOTE)), b"").await;
    assert_eq!(json_body(&resp), json!({"ret": -1}));
    assert_eq!(d.store().len(), 2);

    let resp = call(&d, request("GET", "/api/unknown", Some(REMOTE)), b"").await;
    assert_eq!(json_body(&resp), json!({"ret": -1}));
}

#[tokio::test]
async fn unknown_api_path_is_empty_for_manage() {
    let d = test_dispatcher();
    let resp = call(&d, request("GET", "/api/unknown", Some(MANAGE)), b"").await;
    assert_eq!(resp.status(), Status::Ok);
    assert!(resp.body().is_empty());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let d = test_dispatcher();
    add_text(&d, MANAGE, "once").await;

    for target in ["/api/delete?id=1", "/api/delete?id=1", "/api/delete?id=99", "/api/delete?id=x"]
    {
        let resp = call(&d, request("GET", target, Some(MANAGE)), b"").await;
        assert_eq!(json_body(&resp), json!({"ret": 0}), "{target}");
    }
    assert!(d.store().is_empty());
}

#[tokio::test]
async fn truncated_upload_is_rejected() {
    let d = test_dispatcher();

    // Declared size 100, only 50 bytes arrive
    let req = request("POST", "/api/addFile?name=big.bin&size=100", Some(MANAGE));
    let resp = call(&d, req, &[7u8; 50]).await;
    assert_eq!(json_body(&resp), json!({"ret": -3}));

    // Content-Length large enough, body ends early anyway
    let req = request("POST", "/api/addFile?name=big.bin&size=100", Some(MANAGE))
        .with_header("Content-Length", "100");
    let mut body: &[u8] = &[7u8; 50];
    let resp = d.handle(&req, &mut body).await;
    assert_eq!(json_body(&resp), json!({"ret": -3}));

    assert!(d.store().is_empty());
}

#[tokio::test]
async fn upload_parameters_are_required() {
    let d = test_dispatcher();

    for target in [
        "/api/addFile?size=3",
        "/api/addFile?name=a.txt",
        "/api/addFile?name=&size=3",
        "/api/addFile?name=a.txt&size=0",
        "/api/addFile?name=a.txt&size=-1",
        "/api/addFile?name=a.txt&size=2147483648",
        "/api/addFile?name=a.txt&size=abc",
    ] {
        let resp = call(&d, request("POST", target, Some(MANAGE)), b"abc").await;
        assert_eq!(json_body(&resp), json!({"ret": -2}), "{target}");
    }
    assert!(d.store().is_empty());
}

#[tokio::test]
async fn upload_reads_exactly_the_declared_size() {
    let d = test_dispatcher();

    let req = request("POST", "/api/addFile?name=a.bin&size=3", Some(MANAGE));
    let resp = call(&d, req, b"abcdef").await;
    assert_eq!(json_body(&resp), json!({"ret": 0}));

    let messages = list(&d).await;
    assert_eq!(messages[0]["size"], 3);
    let key = messages[0]["key"].as_str().unwrap();
    let resp = call(&d, request("GET", &format!("/api/download?k={key}"), None), b"").await;
    assert_eq!(resp.body(), b"abc");
}

#[tokio::test]
async fn missing_text_field_stores_empty_text() {
    let d = test_dispatcher();
    let resp = call(&d, request("POST", "/api/addText", Some(MANAGE)), b"other=1").await;
    assert_eq!(json_body(&resp), json!({"ret": 0}));
    assert_eq!(list(&d).await[0]["label"], "");
}

#[tokio::test]
async fn text_is_form_decoded() {
    let d = test_dispatcher();
    add_text(&d, MANAGE, "a%26b%3Dc+d%E2%9C%93").await;
    assert_eq!(list(&d).await[0]["label"], "a&b=c d\u{2713}");
}

#[tokio::test]
async fn oversized_form_is_rejected() {
    let d = dispatcher_with_form_limit(16);
    let body = format!("text={}", "x".repeat(32));
    let resp = call(&d, request("POST", "/api/addText", Some(MANAGE)), body.as_bytes()).await;
    assert_eq!(json_body(&resp), json!({"ret": -2}));
    assert!(d.store().is_empty());
}

#[tokio::test]
async fn short_form_body_is_truncated() {
    let d = test_dispatcher();
    let req = request("POST", "/api/addText", Some(MANAGE)).with_header("Content-Length", "64");
    let mut body: &[u8] = b"text=partial";
    let resp = d.handle(&req, &mut body).await;
    assert_eq!(json_body(&resp), json!({"ret": -3}));
    assert!(d.store().is_empty());
}

#[tokio::test]
async fn download_headers() {
    let d = test_dispatcher();
    add_file(&d, MANAGE, "r%C3%A9sum%C3%A9.pdf", b"%PDF").await;
    let key = list(&d).await[0]["key"].as_str().unwrap().to_string();

    let resp = call(&d, request("GET", &format!("/api/download?k={key}"), None), b"").await;
    assert_eq!(resp.header_value("content-type"), Some("application/octet-stream"));
    assert_eq!(resp.header_value("x-content-type-options"), Some("nosniff"));
    assert_eq!(
        resp.header_value("content-disposition"),
        Some(
            "attachment; filename=\"r%C3%A9sum%C3%A9.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        )
    );

    let resp = call(&d, request("GET", &format!("/api/download?k={key}&p=1"), None), b"").await;
    assert_eq!(resp.header_value("content-type"), Some("application/pdf"));
    assert!(resp.header_value("content-disposition").unwrap().starts_with("inline;"));
    assert_eq!(resp.body(), b"%PDF");
}

#[tokio::test]
async fn download_with_bad_key_is_not_found() {
    let d = test_dispatcher();
    add_file(&d, MANAGE, "a.txt", b"x").await;

    for target in [
        "/api/download",
        "/api/download?k=",
        "/api/download?k=short",
        "/api/download?k=00000000000000000000000000000000",
    ] {
        let resp = call(&d, request("GET", target, Some(MANAGE)), b"").await;
        assert_eq!(resp.status(), Status::NotFound, "{target}");
        assert!(resp.body().is_empty());
    }
}

#[tokio::test]
async fn text_messages_are_not_downloadable() {
    let d = test_dispatcher();
    add_text(&d, MANAGE, "hello").await;
    assert!(list(&d).await[0].get("key").is_none());
}

#[tokio::test]
async fn access_info_hands_out_remote_token() {
    let d = test_dispatcher();
    for token in [MANAGE, REMOTE] {
        let resp = call(&d, request("GET", "/api/getAccessInfo", Some(token)), b"").await;
        assert_eq!(
            json_body(&resp),
            json!({
                "ret": 0,
                "data": {
                    "url": "http://192.168.1.20:8042/",
                    "urlV6": "http://[fd00::20]:8042/",
                    "ak": REMOTE,
                }
            })
        );
    }
}

#[tokio::test]
async fn uploaded_markup_is_never_rendered_inline() {
    let d = test_dispatcher();
    let script = b"<script>fetch('/api/delete?id=1')</script>";
    for name in ["evil.html", "evil.svg", "evil.xhtml"] {
        assert_eq!(add_file(&d, REMOTE, name, script).await, json!({"ret": 0}));
    }

    for message in list(&d).await {
        let key = message["key"].as_str().unwrap();
        let resp = call(&d, request("GET", &format!("/api/download?k={key}&p=1"), None), b"").await;
        assert_eq!(resp.status(), Status::Ok);
        assert_eq!(
            resp.header_value("content-type"),
            Some("application/octet-stream"),
            "{}",
            message["label"]
        );
        assert_eq!(resp.header_value("x-content-type-options"), Some("nosniff"));
        assert_eq!(resp.header_value("content-security-policy"), Some("sandbox"));
    }
}

#[test]
fn body_is_wanted_only_for_accepted_uploads() {
    let d = test_dispatcher();
    let upload = |target: &str, token: Option<&str>, len: u64| {
        request("POST", target, token).with_header("Content-Length", &len.to_string())
    };

    assert!(d.wants_body(&upload("/api/addFile?name=a.bin&size=10", Some(REMOTE), 10)));
    assert!(d.wants_body(&upload("/api/addText", Some(MANAGE), 10)));

    // Rejected from the head alone
    assert!(!d.wants_body(&upload("/api/addFile?name=a.bin&size=10", None, 10)));
    assert!(!d.wants_body(&upload("/api/addFile?name=a.bin", Some(MANAGE), 10)));
    assert!(!d.wants_body(&upload("/api/addFile?name=a.bin&size=10", Some(MANAGE), 5)));
    assert!(!d.wants_body(&upload("/api/getMsgList", Some(MANAGE), 10)));
}
