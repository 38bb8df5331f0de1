use coursework::route;
use coursework::router::*;
use coursework::settings::Settings;
use serde_json::json;
use std::collections::HashMap;

fn state() -> AppState {
    AppState::new(Settings::default())
}

async fn hello(_req: Request, _state: AppState) -> Response {
    Response::ok("Hello!")
}

async fn echo_id(req: Request, _state: AppState) -> Response {
    Response::ok(req.param("id").unwrap_or("none").to_string())
}

async fn echo_body(req: Request, _state: AppState) -> Response {
    Response::ok(String::from_utf8_lossy(&req.body).to_string())
}

// ========== Response struct (JSON, HTML) ==========

#[test]
fn test_response_ok() {
    let resp = Response::ok("hello world");
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "hello world");
    assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
}

#[test]
fn test_response_forbidden_and_not_found() {
    let resp = Response::forbidden("nope");
    assert_eq!(resp.status_code, 403);
    assert_eq!(resp.body, "nope");

    let resp = Response::not_found();
    assert_eq!(resp.status_code, 404);
    assert!(resp.body.contains("404"));
}

#[test]
fn test_response_json_success() {
    let mut headers = HashMap::new();
    headers.insert("X-Test".into(), "yes".into());
    let resp = Response::json(json!({"foo": "bar"}), 201, headers);
    assert_eq!(resp.status_code, 201);
    assert_eq!(
        resp.header("Content-Type").unwrap(),
        "application/json; charset=utf-8"
    );
    assert_eq!(resp.header("X-Test").unwrap(), "yes");
    assert!(resp.body.contains("\"foo\":\"bar\""));
}

use serde::{Serialize, Serializer};

struct AlwaysFailsSerialize;

impl Serialize for AlwaysFailsSerialize {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Err(serde::ser::Error::custom("Forced failure"))
    }
}

#[test]
fn test_response_json_error_branch_always_fails() {
    let mut headers = HashMap::new();
    headers.insert("Test-Head".to_string(), "Y".to_string());
    let resp = Response::json(AlwaysFailsSerialize, 200, headers);
    assert_eq!(resp.status_code, 500);
    assert!(resp.body.contains("Serialization failed"));
    assert_eq!(
        resp.header("Content-Type").unwrap(),
        "application/json; charset=utf-8"
    );
    assert_eq!(resp.header("Test-Head").unwrap(), "Y");
}

#[test]
fn test_redirect_and_multiple_cookies() {
    let resp = Response::redirect("/")
        .with_cookie(cookie::Cookie::new("a", "1"))
        .with_cookie(cookie::Cookie::new("b", "two words"));
    assert_eq!(resp.status_code, 302);
    assert_eq!(resp.header("location"), Some("/"));
    assert_eq!(resp.set_cookies(), vec!["a=1", "b=two%20words"]);
}

#[test]
fn test_status_text_variants() {
    assert_eq!(status_text(200), "OK");
    assert_eq!(status_text(201), "Created");
    assert_eq!(status_text(302), "Found");
    assert_eq!(status_text(403), "Forbidden");
    assert_eq!(status_text(404), "Not Found");
    assert_eq!(status_text(405), "Method Not Allowed");
    assert_eq!(status_text(590), "Unknown");
}

// ========== Request helpers ==========

#[test]
fn test_request_cookies_form_and_json() {
    let req = Request::new(Method::POST, "/welcome")
        .with_header("Cookie", "username=Jo%20Ann; theme=dark")
        .with_form(&[("username", "Jo Ann"), ("email", "jo@example.com")]);
    assert_eq!(req.cookie("username").as_deref(), Some("Jo Ann"));
    assert_eq!(req.cookie("theme").as_deref(), Some("dark"));
    assert_eq!(req.cookie("missing"), None);
    let form = req.form();
    assert_eq!(form.get("username").unwrap(), "Jo Ann");
    assert_eq!(form.get("email").unwrap(), "jo@example.com");
    assert_eq!(req.content_type(), Some("application/x-www-form-urlencoded"));

    let req = Request::new(Method::POST, "/x").with_json(&json!({"n": 1}));
    let value: serde_json::Value = req.json().unwrap();
    assert_eq!(value["n"], 1);

    let req = Request::new(Method::POST, "/x")
        .with_header("Content-Type", "text/plain")
        .with_body("{\"n\": 1}");
    assert!(req.json::<serde_json::Value>().is_err());
}

// ========== Path matching ==========

#[test]
fn test_static_and_param_matching() {
    assert!(match_path("/foo", "/foo").is_some());
    let params = match_path("/user/:id", "/user/42").unwrap();
    assert_eq!(params.get("id"), Some(&"42".to_string()));
    assert!(match_path("/api/:a/:b", "/api/x/y").is_some());
    assert!(match_path("/foo/bar", "/foo/bar/qux").is_none());
    assert!(match_path("/foo/:id", "/bar/99").is_none());
    assert!(match_path("/items/:type/:id", "/items/book").is_none());
}

#[test]
fn test_params_are_percent_decoded() {
    let params = match_path("/category/:name", "/category/winter%20coats").unwrap();
    assert_eq!(params.get("name").unwrap(), "winter coats");
}

// ========== Dispatch ==========

#[tokio::test]
async fn test_route_macro_and_dispatch() {
    let mut router = Router::new();
    route!(router,
        GET "/about" => { hello },
        GET "/user/:id" => { echo_id },
        POST "/echo" => { echo_body },
    );
    router.set_app_state(state());

    let resp = router.handle(Request::new(Method::GET, "/about")).await;
    assert_eq!(resp.body, "Hello!");

    let resp = router.handle(Request::new(Method::GET, "/user/314")).await;
    assert_eq!(resp.body, "314");

    let resp = router
        .handle(Request::new(Method::POST, "/echo").with_body("payload"))
        .await;
    assert_eq!(resp.body, "payload");
}

#[tokio::test]
async fn test_unknown_path_is_404_and_wrong_method_is_405() {
    let mut router = Router::new();
    route!(router, GET "/about" => { hello });
    router.set_app_state(state());

    let resp = router.handle(Request::new(Method::GET, "/nope")).await;
    assert_eq!(resp.status_code, 404);

    let resp = router.handle(Request::new(Method::DELETE, "/about")).await;
    assert_eq!(resp.status_code, 405);
}

#[tokio::test]
async fn test_missing_state_is_500() {
    let mut router = Router::new();
    route!(router, GET "/" => { hello });
    let resp = router.handle(Request::new(Method::GET, "/")).await;
    assert_eq!(resp.status_code, 500);
}

#[tokio::test]
async fn test_middleware_execution_and_post_middleware() {
    let mut router = Router::new();
    router.add_middleware(middleware(|ctx| {
        if ctx.request.path == "/blocked" {
            Some(Response::forbidden("block"))
        } else {
            None
        }
    }));
    router.add_post_middleware(post_middleware(|_ctx, mut resp| {
        resp.body = format!("{}+PM", resp.body);
        resp
    }));
    route!(router,
        GET "/blocked" => { hello },
        GET "/open" => { hello },
    );
    router.set_app_state(state());

    let resp = router.handle(Request::new(Method::GET, "/blocked")).await;
    assert_eq!(resp.status_code, 403);
    assert_eq!(resp.body, "block+PM");

    let resp = router.handle(Request::new(Method::GET, "/open")).await;
    assert_eq!(resp.body, "Hello!+PM");
}

#[tokio::test]
async fn test_post_middleware_chain_order() {
    let mut router = Router::new();
    route!(router, GET "/a" => { hello });
    router.add_post_middleware(post_middleware(|_ctx, mut r| {
        r.body.push('1');
        r
    }));
    router.add_post_middleware(post_middleware(|_ctx, mut r| {
        r.body.push('2');
        r
    }));
    router.set_app_state(state());

    let resp = router.handle(Request::new(Method::GET, "/a")).await;
    assert_eq!(resp.body, "Hello!12");
}

#[tokio::test]
async fn test_route_middleware_sees_params_and_can_modify_them() {
    let mut router = Router::new();
    route!(router,
        GET "/hi/:id" => {
            echo_id,
            middleware(|ctx| {
                ctx.request.params.insert("id".to_string(), "overridden".to_string());
                None
            })
        },
    );
    router.set_app_state(state());

    let resp = router.handle(Request::new(Method::GET, "/hi/tomato")).await;
    assert_eq!(resp.body, "overridden");
}

#[tokio::test]
async fn test_require_json_rejects_form_bodies() {
    let mut router = Router::new();
    route!(router, POST "/echo" => { echo_body, require_json() });
    router.set_app_state(state());

    let resp = router
        .handle(Request::new(Method::POST, "/echo").with_form(&[("a", "b")]))
        .await;
    assert_eq!(resp.status_code, 400);
    assert!(resp.body.contains("must be JSON"));

    let resp = router
        .handle(Request::new(Method::POST, "/echo").with_json(&json!({"a": "b"})))
        .await;
    assert_eq!(resp.status_code, 200);
}

#[tokio::test]
async fn test_instrumented_router_stamps_start_time() {
    let mut router = Router::instrumented();
    router.add_post_middleware(post_middleware(|ctx, resp| {
        resp.with_header("X-Timed", ctx.start_time.is_some().to_string())
    }));
    route!(router, GET "/" => { hello });
    router.set_app_state(state());

    let resp = router.handle(Request::new(Method::GET, "/")).await;
    assert_eq!(resp.header("x-timed"), Some("true"));
}

// ========== Over the wire ==========

async fn spawn_echo_server() -> std::net::SocketAddr {
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let mut router = Router::new();
    route!(router, POST "/echo" => { echo_body });
    router.set_app_state(state());
    let server_addr = addr.to_string();
    tokio::spawn(async move {
        let _ = router.run_http(&server_addr).await;
    });

    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return addr;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("server did not start");
}

/// Send raw bytes and read the whole reply; the server closes after one response.
async fn exchange(addr: std::net::SocketAddr, raw: &[u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
async fn test_http_server_round_trip() {
    let addr = spawn_echo_server().await;
    let raw = exchange(
        addr,
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello",
    )
    .await;

    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(raw.contains("Content-Length: 5\r\n"));
    assert!(raw.contains("Connection: close\r\n"));
    assert!(raw.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let addr = spawn_echo_server().await;
    let raw = exchange(
        addr,
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 9999999\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
}

#[tokio::test]
async fn test_malformed_request_line_is_400() {
    let addr = spawn_echo_server().await;
    let raw = exchange(addr, b"GARBAGE\r\n\r\n").await;
    assert!(raw.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn test_non_numeric_content_length_is_400() {
    let addr = spawn_echo_server().await;
    let raw = exchange(
        addr,
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: abc\r\n\r\nhello",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn test_unknown_method_on_the_wire_is_405() {
    let addr = spawn_echo_server().await;
    let raw = exchange(addr, b"BREW /echo HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert!(raw.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
}
