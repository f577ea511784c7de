//! REST client behavior against a mock API server.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Method, Request};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cryogonal::rest::{LimitKey, MajorParameter, Client};
use cryogonal::{constants, ClientConfig, Error, Snowflake, Token};

const CHANNEL: Snowflake = Snowflake::new(1);

fn channel_key() -> LimitKey {
    LimitKey::new("get_channel", MajorParameter::ChannelId(CHANNEL))
}

fn get(server: &MockServer, path: &str) -> Request {
    let url = format!("{}{}", server.uri(), path).parse().unwrap();
    Request::new(Method::GET, url)
}

fn post(server: &MockServer, path: &str, body: &str) -> Request {
    let url = format!("{}{}", server.uri(), path).parse().unwrap();
    let mut request = Request::new(Method::POST, url);
    *request.body_mut() = Some(body.to_string().into());
    request
}

/// A reset timestamp comfortably in the future, in Unix seconds.
fn far_reset() -> String {
    let reset = SystemTime::now() + std::time::Duration::from_secs(60);
    reset
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string()
}

fn limited_response(status: u16, bucket: &str, limit: u32, remaining: u32) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("x-ratelimit-limit", limit.to_string().as_str())
        .insert_header("x-ratelimit-remaining", remaining.to_string().as_str())
        .insert_header("x-ratelimit-reset", far_reset().as_str())
        .insert_header("x-ratelimit-bucket", bucket)
}

#[tokio::test]
async fn success_injects_headers_and_learns_the_bucket() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/1"))
        .and(header("authorization", "Bot token"))
        .and(header("user-agent", constants::USER_AGENT))
        .respond_with(limited_response(200, "abc", 5, 4).set_body_json(json!({"id": "1"})))
        .mount(&server)
        .await;

    let client = Client::new(Token::new("Bot token"));
    let key = channel_key();
    let response = client.send(get(&server, "/channels/1"), &key).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let bucket = client.limits().lookup(&key).expect("bucket learned");
    assert_eq!(bucket.limit(), 5);
    assert_eq!(bucket.remaining(), 4);

    let by_id = client.limits().lookup_id("abc").expect("indexed by id");
    assert!(Arc::ptr_eq(&bucket, &by_id));
}

#[tokio::test]
async fn empty_token_sends_no_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gateway"))
        .respond_with(limited_response(200, "gw", 2, 1).set_body_json(json!({"url": "wss://x"})))
        .mount(&server)
        .await;

    let client = Client::new(Token::new(""));
    let key = LimitKey::new("get_gateway", MajorParameter::None);
    client.send(get(&server, "/gateway"), &key).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn rate_limited_request_is_retried_with_its_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "50")
                .set_body_json(json!({
                    "message": "You are being rate limited.",
                    "retry_after": 50,
                    "global": false
                })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(limited_response(200, "msg", 5, 4).set_body_json(json!({"id": "2"})))
        .mount(&server)
        .await;

    let client = Client::new(Token::new("Bot token"));
    let key = LimitKey::new("create_message", MajorParameter::ChannelId(CHANNEL));
    let body = r#"{"content":"hi"}"#;
    let response = client
        .send(post(&server, "/channels/1/messages", body), &key)
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Both attempts carried the full body.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.body, body.as_bytes());
    }
}

#[tokio::test]
async fn persistent_rate_limiting_exhausts_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/1"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "10")
                .set_body_json(json!({
                    "message": "You are being rate limited.",
                    "retry_after": 10,
                    "global": false
                })),
        )
        .mount(&server)
        .await;

    let config = ClientConfig {
        max_attempts: 2,
        ..ClientConfig::default()
    };
    let client = Client::with_config(Token::new("Bot token"), config);
    let result = client.send(get(&server, "/channels/1"), &channel_key()).await;
    assert!(matches!(result, Err(Error::MaxAttemptsExceeded(2))));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn global_rate_limit_parks_the_global_key() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/1"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "30")
                .set_body_json(json!({
                    "message": "You are being rate limited.",
                    "retry_after": 30,
                    "global": true
                })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/channels/1"))
        .respond_with(limited_response(200, "abc", 5, 4).set_body_json(json!({"id": "1"})))
        .mount(&server)
        .await;

    let client = Client::new(Token::new("Bot token"));
    client
        .send(get(&server, "/channels/1"), &channel_key())
        .await
        .unwrap();

    let global = client
        .limits()
        .lookup(&LimitKey::GLOBAL)
        .expect("global bucket installed");
    assert_eq!(global.limit(), 0);
}

#[tokio::test]
async fn client_errors_surface_the_parsed_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(limited_response(400, "msg", 5, 4).set_body_json(json!({
            "code": 50035,
            "message": "Invalid Form Body",
            "errors": {
                "content": {
                    "_errors": [
                        {"code": "BASE_TYPE_REQUIRED", "message": "This field is required"}
                    ]
                }
            }
        })))
        .mount(&server)
        .await;

    let client = Client::new(Token::new("Bot token"));
    let key = LimitKey::new("create_message", MajorParameter::ChannelId(CHANNEL));
    let result = client
        .send(post(&server, "/channels/1/messages", "{}"), &key)
        .await;

    match result {
        Err(Error::Api { status, error }) => {
            assert_eq!(status, 400);
            assert_eq!(error.code, 50_035);
            assert!(error.to_string().contains("Invalid Form Body (50035)"));
            assert!(error
                .to_string()
                .contains(r#""content" This field is required (BASE_TYPE_REQUIRED)"#));
        }
        other => panic!("expected an API error, got {other:?}"),
    }

    // 4xx responses are not retried.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_errors_other_than_502_do_not_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/1"))
        .respond_with(limited_response(500, "abc", 5, 4).set_body_string("oops"))
        .mount(&server)
        .await;

    let client = Client::new(Token::new("Bot token"));
    let result = client.send(get(&server, "/channels/1"), &channel_key()).await;

    match result {
        Err(Error::Api { status, error }) => {
            assert_eq!(status, 500);
            assert_eq!(error.message, "oops");
        }
        other => panic!("expected an API error, got {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn tokens_with_illegal_header_characters_fail_before_sending() {
    let client = Client::new(Token::new("Bot bad\ntoken"));
    let request = Request::new(Method::GET, "http://localhost:9/".parse().unwrap());
    let result = client.send(request, &channel_key()).await;
    assert!(matches!(result, Err(Error::MalformedToken)));
}

#[tokio::test]
async fn responses_without_rate_limit_headers_are_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
        .mount(&server)
        .await;

    let client = Client::new(Token::new("Bot token"));
    let result = client.send(get(&server, "/channels/1"), &channel_key()).await;
    assert!(matches!(result, Err(Error::MissingRateLimitHeaders)));
}
