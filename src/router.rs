/// Coursework micro framework: routing and HTTP serving.
///
/// This module provides the core routing, HTTP, and live-reload infrastructure
/// shared by every site in the crate. It allows for:
///
/// - Method, path and parameter-based routing of HTTP endpoints
/// - Global and route-specific middleware (pre and post)
/// - In-process dispatch through [`Router::handle`], used by tests
/// - Template hot-reload over a websocket in debug mode, fed by a file watcher
use crate::error::{AppError, Result};
use crate::orm::Db;
use crate::settings::Settings;
use crate::template::Templates;
use axum::Router as AxumRouter;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::routing::get;
use cookie::Cookie;
use futures::future::BoxFuture;
use notify::event::DataChange;
use notify::event::ModifyKind::Data;
use notify::{EventKind, RecursiveMode, Watcher};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Largest accepted request head (request line plus headers).
const MAX_HEAD_BYTES: usize = 64 * 1024;
/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Option<Arc<Db>>,
    pub settings: Settings,
    pub templates: Arc<Templates>,
}

impl AppState {
    /// State without a database, templates resolved from the settings.
    pub fn new(settings: Settings) -> Self {
        let templates = Templates::from_settings(&settings);
        AppState {
            db: None,
            settings,
            templates: Arc::new(templates),
        }
    }

    pub fn with_db(mut self, db: Arc<Db>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn db(&self) -> Result<&Db> {
        self.db
            .as_deref()
            .ok_or_else(|| AppError::Config("no database configured for this site".into()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

impl Method {
    pub fn parse(raw: &str) -> Option<Method> {
        match raw {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "PATCH" => Some(Method::PATCH),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incoming HTTP request. Header names are stored lower-cased.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request for `target`, which may carry a query string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_urlencoded(query.as_bytes())),
            None => (target, HashMap::new()),
        };
        Request {
            method,
            path: path.to_string(),
            query,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach an `application/x-www-form-urlencoded` body.
    pub fn with_form(self, fields: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(body)
    }

    /// Attach a JSON body.
    pub fn with_json<T: Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header("Content-Type", "application/json")
            .with_body(body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters, e.g. `application/json`.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Value of a request cookie, percent-decoded.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.header("cookie")?;
        Cookie::split_parse_encoded(header)
            .filter_map(|c| c.ok())
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    /// Decoded urlencoded form body.
    pub fn form(&self) -> HashMap<String, String> {
        parse_urlencoded(&self.body)
    }

    /// Deserialize the body as JSON. A body declared as something else is rejected.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(ct) = self.content_type() {
            if !ct.eq_ignore_ascii_case("application/json") {
                return Err(AppError::BadRequest(format!(
                    "Expected application/json body, got {}",
                    ct
                )));
            }
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
    }

    /// Parse a request head (request line plus headers, without the blank line).
    /// Errors carry the status code to answer with.
    pub fn parse_head(head: &str) -> std::result::Result<Request, u16> {
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return Err(400);
        };
        let method = Method::parse(method).ok_or(405u16)?;
        let mut request = Request::new(method, target);
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line.split_once(':').ok_or(400u16)?;
            request
                .headers
                .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        Ok(request)
    }
}

fn parse_urlencoded(raw: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw).into_owned().collect()
}

/// Represents the outcome of an HTTP handler.
/// Supports HTML, JSON, redirects, cookies and custom status/headers.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

const HTML: &str = "text/html; charset=utf-8";
const JSON: &str = "application/json; charset=utf-8";

impl Response {
    /// HTML response with the given status.
    pub fn html(status_code: u16, body: impl Into<String>) -> Self {
        Response {
            status_code,
            body: body.into(),
            headers: vec![("Content-Type".to_string(), HTML.to_string())],
        }
    }

    /// Construct a new HTTP 200 response with HTML body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::html(200, body)
    }

    pub fn forbidden(body: impl Into<String>) -> Self {
        Self::html(403, body)
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::html(400, body)
    }

    pub fn not_found() -> Self {
        Self::html(404, "404 Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Self::html(405, "405 Method Not Allowed")
    }

    pub fn internal_error() -> Self {
        Self::html(500, "500 Internal Server Error")
    }

    /// 302 redirect to `location`.
    pub fn redirect(location: &str) -> Self {
        Response {
            status_code: 302,
            body: String::new(),
            headers: vec![("Location".to_string(), location.to_string())],
        }
    }

    /// Construct a new HTTP JSON response.
    /// Accepts any serde-serializable payload, status, and custom headers.
    pub fn json<T: Serialize>(data: T, status_code: u16, headers: HashMap<String, String>) -> Self {
        let mut headers: Vec<(String, String)> = headers.into_iter().collect();
        headers.push(("Content-Type".to_string(), JSON.to_string()));
        match serde_json::to_string(&data) {
            Ok(body) => Response {
                status_code,
                body,
                headers,
            },
            Err(e) => {
                log::error!("Response serialization failed: {}", e);
                Response {
                    status_code: 500,
                    body: "{\"error\": \"Serialization failed\"}".to_string(),
                    headers,
                }
            }
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Append a `Set-Cookie` header; the value is percent-encoded.
    pub fn with_cookie(self, cookie: Cookie<'_>) -> Self {
        let value = cookie.encoded().to_string();
        self.with_header("Set-Cookie", value)
    }

    /// First header with this name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All `Set-Cookie` values, in the order they were added.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Per-request data visible to middleware.
pub struct RequestContext {
    pub request: Request,
    pub start_time: Option<Instant>,
}

/// Async handler for an HTTP route.
pub type Handler = Arc<dyn Fn(Request, AppState) -> BoxFuture<'static, Response> + Send + Sync>;

/// Pre-processing middleware executed before the handler.
/// If a middleware returns Some(Response), request handling stops and this response is sent.
pub type Middleware = Arc<dyn Fn(&mut RequestContext) -> Option<Response> + Send + Sync>;

/// Post-processing middleware executed after the handler.
pub type PostMiddleware = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

/// Wrap an async fn `(Request, AppState) -> Response` into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req: Request, state: AppState| -> BoxFuture<'static, Response> {
        Box::pin(f(req, state))
    })
}

pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(&mut RequestContext) -> Option<Response> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn post_middleware<F>(f: F) -> PostMiddleware
where
    F: Fn(&RequestContext, Response) -> Response + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Stamps the request start time for [`access_log`].
pub fn request_timer() -> Middleware {
    middleware(|ctx| {
        ctx.start_time = Some(Instant::now());
        None
    })
}

/// Logs method, path, status and elapsed time of every response.
pub fn access_log() -> PostMiddleware {
    post_middleware(|ctx, response| {
        let elapsed = ctx
            .start_time
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or_default();
        log::info!(
            "{} {} -> {} ({:.1} ms)",
            ctx.request.method,
            ctx.request.path,
            response.status_code,
            elapsed
        );
        response
    })
}

/// Route middleware rejecting bodies that are not declared as JSON.
pub fn require_json() -> Middleware {
    middleware(|ctx| match ctx.request.content_type() {
        Some(ct) if ct.eq_ignore_ascii_case("application/json") => None,
        _ => Some(
            AppError::BadRequest("Request body must be JSON".into()).into_response(),
        ),
    })
}

/// A registered HTTP route and its associated handler + middleware.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// The main application router.
/// Manages all HTTP routes and global middleware.
#[derive(Clone)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
}

/// Serializes and sends an HTTP Response over a raw TCP socket connection.
async fn send_response(socket: &mut TcpStream, response: Response) {
    let mut headers = String::new();
    for (key, value) in &response.headers {
        headers.push_str(&format!("{}: {}\r\n", key, value));
    }

    let response_text = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        response.status_code,
        status_text(response.status_code),
        response.body.len(),
        headers,
        response.body
    );

    if let Err(e) = socket.write_all(response_text.as_bytes()).await {
        log::debug!("Failed to write response: {}", e);
    }
}

/// Maps status codes to HTTP status text for responses.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Read one request from the socket. `Ok(None)` means the peer closed
/// without sending anything; errors carry the status code to answer with.
async fn read_request(socket: &mut TcpStream) -> std::result::Result<Option<Request>, u16> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.map_err(|_| 400u16)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(400);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(400);
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut request = Request::parse_head(&head)?;

    let content_length = match request.header("content-length") {
        Some(raw) => raw.parse::<usize>().map_err(|_| 400u16)?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(413);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.map_err(|_| 400u16)?;
        if n == 0 {
            return Err(400);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    request.body = body;
    Ok(Some(request))
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty application router.
    pub fn new() -> Self {
        Router {
            routes: Vec::new(),
            middlewares: Vec::new(),
            post_middlewares: Vec::new(),
            app_state: None,
        }
    }

    /// A router that times and access-logs every request.
    pub fn instrumented() -> Self {
        let mut router = Self::new();
        router.add_middleware(request_timer());
        router.add_post_middleware(access_log());
        router
    }

    /// Register an HTTP route with method, path pattern, handler, and any route-specific middleware.
    pub fn add_route(
        &mut self,
        method: Method,
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            method,
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    /// Add a global pre-middleware to be run before all HTTP handlers.
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Add a post-middleware to be run after each HTTP handler.
    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    /// Run a request through middleware and the matching route.
    pub async fn handle(&self, request: Request) -> Response {
        let Some(state) = self.app_state.clone() else {
            log::error!("App state not set in Router");
            return Response::internal_error();
        };
        let mut ctx = RequestContext {
            request,
            start_time: None,
        };
        let mut response = self.dispatch(&mut ctx, state).await;
        for post_middleware in &self.post_middlewares {
            response = (post_middleware)(&ctx, response);
        }
        response
    }

    async fn dispatch(&self, ctx: &mut RequestContext, state: AppState) -> Response {
        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(ctx) {
                return response;
            }
        }

        let mut path_matched = false;
        for route in &self.routes {
            let Some(params) = match_path(&route.path_pattern, &ctx.request.path) else {
                continue;
            };
            path_matched = true;
            if route.method != ctx.request.method {
                continue;
            }
            ctx.request.params = params;
            for middleware in &route.middlewares {
                if let Some(response) = (middleware)(ctx) {
                    return response;
                }
            }
            return (route.handler)(ctx.request.clone(), state).await;
        }

        if path_matched {
            Response::method_not_allowed()
        } else {
            Response::not_found()
        }
    }

    /// Watches the template directory for changes; notifies via WS broadcast for live-reload.
    fn setup_ws_reload_watcher(&self, template_path: PathBuf, sender: broadcast::Sender<String>) {
        tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(32);
            let watcher = notify::recommended_watcher(move |res| {
                let _ = tx.blocking_send(res);
            });
            let mut watcher = match watcher {
                Ok(w) => w,
                Err(e) => {
                    log::error!("Failed to create template watcher: {:?}", e);
                    return;
                }
            };
            if let Err(e) = watcher.watch(&template_path, RecursiveMode::Recursive) {
                log::error!("Cannot watch {}: {:?}", template_path.display(), e);
                return;
            }

            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        if let EventKind::Modify(Data(DataChange::Content)) = event.kind {
                            if let Some(file_name) = event
                                .paths
                                .first()
                                .and_then(|p| p.file_name())
                                .and_then(|n| n.to_str())
                            {
                                log::info!("Template changed: {}", file_name);
                                let _ = sender.send("reload".to_string());
                            }
                        }
                    }
                    Err(e) => log::error!("Watch error: {:?}", e),
                }
            }
        });
    }

    /// Launch the HTTP server, plus the live-reload websocket server in debug mode.
    pub async fn run(&mut self, settings: Settings) -> Result<()> {
        let http_addr = settings.http_addr();
        let ws_handle = if settings.debug {
            let ws_self = self.clone();
            let ws_addr = settings.ws_addr();
            let ws_settings = settings.clone();
            Some(tokio::spawn(async move {
                ws_self.run_ws(&ws_addr, ws_settings).await
            }))
        } else {
            None
        };

        self.run_http(&http_addr).await?;

        if let Some(handle) = ws_handle {
            handle
                .await
                .map_err(|e| AppError::Config(format!("websocket task failed: {}", e)))??;
        }
        Ok(())
    }

    /// Start the HTTP server. Uses a plain TcpListener and manual HTTP parsing,
    /// one request per connection.
    pub async fn run_http(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("HTTP Server running on http://{}", addr);
        let router = Arc::new(self.clone());

        loop {
            let (mut socket, peer) = listener.accept().await?;
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let response = match read_request(&mut socket).await {
                    Ok(Some(request)) => router.handle(request).await,
                    Ok(None) => return,
                    Err(status) => {
                        log::debug!("Rejected request from {}: {}", peer, status);
                        Response::html(status, status_text(status))
                    }
                };
                send_response(&mut socket, response).await;
            });
        }
    }

    /// Axum router serving the `/ws/reload` endpoint.
    pub fn build_ws_axum_router(&self, reload_sender: broadcast::Sender<String>) -> AxumRouter {
        AxumRouter::new().route(
            "/ws/reload",
            get(move |ws: WebSocketUpgrade| {
                let tx = reload_sender.clone();
                async move {
                    ws.on_upgrade(move |mut socket| async move {
                        let mut rx = tx.subscribe();
                        log::info!("Hot Reload WebSocket client connected");
                        while let Ok(msg) = rx.recv().await {
                            if socket.send(Message::Text(msg.into())).await.is_err() {
                                break;
                            }
                        }
                    })
                }
            }),
        )
    }

    /// Start the live-reload websocket server and its template watcher.
    pub async fn run_ws(&self, addr: &str, settings: Settings) -> Result<()> {
        let (sender, _) = broadcast::channel::<String>(10);
        self.setup_ws_reload_watcher(PathBuf::from(&settings.template.dir), sender.clone());

        let app = self.build_ws_axum_router(sender);
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| AppError::Config(format!("invalid websocket address {}: {}", addr, e)))?;
        let listener = TcpListener::bind(addr).await?;
        log::info!("Live reload running at ws://{}/ws/reload", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Register routes: `route!(router, GET "/" => { index }, POST "/x" => { create, require_json() })`.
#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            $router.add_route(
                $crate::router::Method::$method,
                $path,
                $crate::router::handler($handler),
                vec![$($middleware),*]
            );
        )*
    };
}

/// Matches a path pattern (e.g. `/foo/:id`) against a real path,
/// extracting percent-decoded parameters, or None if not matched.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            if a.is_empty() {
                return None;
            }
            let value = percent_encoding::percent_decode_str(a).decode_utf8_lossy();
            params.insert(name.to_string(), value.into_owned());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}
