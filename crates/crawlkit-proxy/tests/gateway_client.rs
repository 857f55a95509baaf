//! Integration tests for `GatewayClient` using a wiremock gateway.

use std::sync::Arc;
use std::time::Duration;

use crawlkit_http::{
    Client, HeaderValue, HttpError, LocalCookieJar, Options, Request, RequestMeta, StatusCode,
};
use crawlkit_proxy::{GatewayClient, GatewayConfig};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str, js_token: Option<&str>) -> GatewayClient {
    let mut config = GatewayConfig::new("api-token");
    config.base_url = base_url.to_owned();
    config.js_token = js_token.map(str::to_owned);
    GatewayClient::new(config, Arc::new(LocalCookieJar::new()))
        .expect("client construction should not fail")
}

fn upstream_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("pc_status", "200")
        .insert_header("original_status", "200")
        .insert_header("original_content-type", "text/html")
        .insert_header("original_content-encoding", "gzip")
        .set_body_string(body)
}

#[tokio::test]
async fn forwards_target_and_unprefixes_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("token", "api-token"))
        .and(query_param("url", "https://shop.example.com/p/1"))
        .and(query_param("request_headers", "accept:text/html"))
        .and(query_param("cookies", "session=abc"))
        .and(query_param("device", "desktop"))
        .respond_with(upstream_page("<html>product</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = Request::get("https://shop.example.com/p/1").unwrap();
    req.headers
        .insert("accept", HeaderValue::from_static("text/html"));
    req.headers
        .insert("cookie", HeaderValue::from_static("session=abc"));

    let mut resp = test_client(&server.uri(), None)
        .do_request(req)
        .await
        .expect("dispatch should succeed");

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.headers["content-type"], "text/html");
    assert!(resp.headers.get("content-encoding").is_none());
    assert!(resp.uncompressed);
    assert_eq!(resp.body.text(), "<html>product</html>");
    assert_eq!(
        resp.url().map(|u| u.as_str()),
        Some("https://shop.example.com/p/1")
    );
}

#[tokio::test]
async fn original_status_becomes_response_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("pc_status", "200")
                .insert_header("original_status", "404")
                .insert_header("original_content-encoding", "gzip"),
        )
        .mount(&server)
        .await;

    let mut resp = test_client(&server.uri(), None)
        .do_request(Request::get("https://shop.example.com/missing").unwrap())
        .await
        .expect("dispatch should succeed");

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.status_text, "404 Not Found");
    assert!(!resp.uncompressed, "empty body keeps encoding headers");
    assert_eq!(resp.headers["content-encoding"], "gzip");
    assert!(resp.body.bytes().is_empty());
}

#[tokio::test]
async fn pc_status_failure_is_a_remote_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("pc_status", "520")
                .insert_header("original_status", "0"),
        )
        .mount(&server)
        .await;

    let err = test_client(&server.uri(), None)
        .do_request(Request::get("https://shop.example.com/").unwrap())
        .await
        .expect_err("pc_status 520");

    assert!(
        matches!(err, HttpError::RemoteStatus { code: 520, .. }),
        "got {err:?}"
    );
    assert!(err.to_string().contains("520"));
}

#[tokio::test]
async fn headless_request_uses_js_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("token", "js-token"))
        .and(query_param("page_wait", "1500"))
        .respond_with(upstream_page("rendered"))
        .expect(1)
        .mount(&server)
        .await;

    let options = Options {
        enable_headless: true,
        js_wait_duration: Some(Duration::from_millis(1500)),
        ..Options::default()
    };
    let mut resp = test_client(&server.uri(), Some("js-token"))
        .do_with_options(Request::get("https://spa.example.com/").unwrap(), &options)
        .await
        .expect("dispatch should succeed");

    assert_eq!(resp.body.text(), "rendered");
}

#[tokio::test]
async fn gateway_call_is_a_bodiless_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("url", "https://shop.example.com/search?q=tea"))
        .respond_with(upstream_page("results"))
        .expect(1)
        .mount(&server)
        .await;

    test_client(&server.uri(), None)
        .do_request(Request::get("https://shop.example.com/search?q=tea").unwrap())
        .await
        .expect("dispatch should succeed");

    let received = server.received_requests().await.expect("recording enabled");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method.as_str(), "GET");
    assert!(received[0].body.is_empty());
}

#[tokio::test]
async fn post_with_body_is_rejected_before_any_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(upstream_page("results"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(upstream_page("results"))
        .expect(0)
        .mount(&server)
        .await;

    let req = Request::new("POST", "https://shop.example.com/api", Some("q=1".into())).unwrap();
    let err = test_client(&server.uri(), None)
        .do_request(req)
        .await
        .expect_err("gateway cannot carry a body");

    assert!(matches!(err, HttpError::InvalidArgument(_)), "got {err:?}");
    let received = server.received_requests().await.expect("recording enabled");
    assert!(received.is_empty(), "gateway saw {} requests", received.len());
}

#[tokio::test]
async fn deadline_bounds_the_gateway_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(upstream_page("late").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let req = Request::get("https://shop.example.com/")
        .unwrap()
        .with_meta(RequestMeta::new().with_timeout(Duration::from_millis(200)));

    let err = test_client(&server.uri(), None)
        .do_request(req)
        .await
        .expect_err("deadline should pass first");

    assert!(matches!(err, HttpError::DeadlineExceeded { .. }), "got {err:?}");
}
