//! Template engine for the coursework sites.
//!
//! A small Django/Jinja-flavoured engine.
//!
//! Workflow:
//! 1. `Templates::render` loads the requested template from the template directory.
//! 2. `tokenize_template` splits content into Text, Variable, and Tag tokens.
//! 3. `parse_tokens` and `parse_nodes` build an AST of `Node`.
//! 4. If the template `{% extends %}` another one, the parent is loaded the same way
//!    (recursively) and the child's top-level `Block`s replace the parent's blocks by name.
//! 5. `render_nodes` walks the merged AST and outputs HTML, resolving (escaped) variables,
//!    `if`/`if not` conditions, `for` loops, `{% tailwind %}` and `{% livereload %}`.
//!
//! Runtime logging is controlled via `set_display_logs`.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::router::Response;
use crate::settings::Settings;

/// Global switch for enabling/disabling internal template logs
static DISPLAY_LOGS: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(false));

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{\{.*?\}\}|\{%.*?%\})").expect("valid token regex"));

/// Deepest `extends` chain followed before giving up.
const MAX_EXTENDS_DEPTH: usize = 8;

/// Enable or disable internal debug logs for the template engine
pub fn set_display_logs(enabled: bool) {
    DISPLAY_LOGS.store(enabled, Ordering::Relaxed);
}

/// Internal debug: logs only if DISPLAY_LOGS is true
macro_rules! tdebug {
    ($($arg:tt)+) => {
        if DISPLAY_LOGS.load(Ordering::Relaxed) {
            debug!($($arg)+);
        }
    }
}

/// Supported value types for template context
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateValue {
    Null,
    String(String),
    Bool(bool),
    Number(f64),
    List(Vec<TemplateValue>),
    Object(HashMap<String, TemplateValue>),
}

impl TemplateValue {
    /// Convert the value to a string for rendering
    pub fn as_string(&self) -> String {
        match self {
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Number(n) => n.to_string(),
            TemplateValue::Null | TemplateValue::List(_) | TemplateValue::Object(_) => {
                String::new()
            }
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Null => false,
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::Bool(b) => *b,
            TemplateValue::Number(n) => *n != 0.0,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Object(map) => !map.is_empty(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TemplateValue::Null,
            serde_json::Value::Bool(b) => TemplateValue::Bool(b),
            serde_json::Value::Number(n) => TemplateValue::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => TemplateValue::String(s),
            serde_json::Value::Array(items) => {
                TemplateValue::List(items.into_iter().map(TemplateValue::from_json).collect())
            }
            serde_json::Value::Object(map) => TemplateValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, TemplateValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::String(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::String(s)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl From<f64> for TemplateValue {
    fn from(n: f64) -> Self {
        TemplateValue::Number(n)
    }
}

impl From<i64> for TemplateValue {
    fn from(n: i64) -> Self {
        TemplateValue::Number(n as f64)
    }
}

impl<T: Into<TemplateValue>> From<Vec<T>> for TemplateValue {
    fn from(items: Vec<T>) -> Self {
        TemplateValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(TemplateValue::Null)
    }
}

/// Template rendering context.
pub type Context = HashMap<String, TemplateValue>;

/// Token types extracted from the template
#[derive(Debug, Clone)]
pub enum Token {
    Text(String),     // Plain text
    Variable(String), // {{ variable }}
    Tag(String),      // {% tag %}
}

/// AST node types for the template engine
#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Variable(String),
    If {
        condition: String,
        negated: bool,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    For {
        var_name: String,
        list_name: String,
        body: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
    },
    Extends(String), // {% extends "base.html" %}
    Tailwind,        // {% tailwind %}
    LiveReload,      // {% livereload %}
}

/// Splits template source into text, `{{ variable }}` and `{% tag %}` tokens.
pub fn tokenize_template(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for found in TOKEN_RE.find_iter(content) {
        if found.start() > cursor {
            tokens.push(Token::Text(content[cursor..found.start()].to_string()));
        }
        let raw = found.as_str();
        let inner = raw[2..raw.len() - 2].trim().to_string();
        if raw.starts_with("{{") {
            tdebug!("tokenize: Variable '{}'", inner);
            tokens.push(Token::Variable(inner));
        } else {
            tdebug!("tokenize: Tag '{}'", inner);
            tokens.push(Token::Tag(inner));
        }
        cursor = found.end();
    }
    if cursor < content.len() {
        tokens.push(Token::Text(content[cursor..].to_string()));
    }
    tokens
}

/// Builds the AST for a whole token stream.
pub fn parse_tokens(tokens: &[Token]) -> Vec<Node> {
    let mut idx = 0;
    parse_nodes(tokens, &mut idx, &[])
}

/// Tag at `idx`, if the token there is one.
fn tag_at(tokens: &[Token], idx: usize) -> Option<&str> {
    match tokens.get(idx) {
        Some(Token::Tag(tag)) => Some(tag.trim()),
        _ => None,
    }
}

/// Consumes tokens until one of `end_tags` (left unconsumed) or the end of input.
fn parse_nodes(tokens: &[Token], idx: &mut usize, end_tags: &[&str]) -> Vec<Node> {
    let mut nodes = Vec::new();
    while let Some(token) = tokens.get(*idx) {
        let tag = match token {
            Token::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                *idx += 1;
                continue;
            }
            Token::Variable(expr) => {
                nodes.push(Node::Variable(expr.clone()));
                *idx += 1;
                continue;
            }
            Token::Tag(tag) => tag.trim(),
        };
        if end_tags.contains(&tag) {
            break;
        }
        *idx += 1;

        let (keyword, rest) = match tag.split_once(' ') {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (tag, ""),
        };
        match keyword {
            "extends" => nodes.push(Node::Extends(rest.trim_matches('"').to_string())),
            "block" => {
                let body = parse_nodes(tokens, idx, &["endblock"]);
                *idx += 1;
                nodes.push(Node::Block {
                    name: rest.to_string(),
                    body,
                });
            }
            "if" => {
                let then_body = parse_nodes(tokens, idx, &["else", "endif"]);
                let else_body = if tag_at(tokens, *idx) == Some("else") {
                    *idx += 1;
                    parse_nodes(tokens, idx, &["endif"])
                } else {
                    Vec::new()
                };
                *idx += 1;
                let (negated, condition) = match rest.strip_prefix("not ") {
                    Some(condition) => (true, condition.trim()),
                    None => (false, rest),
                };
                nodes.push(Node::If {
                    condition: condition.to_string(),
                    negated,
                    then_body,
                    else_body,
                });
            }
            "for" => match rest.split_whitespace().collect::<Vec<_>>()[..] {
                [var_name, "in", list_name] => {
                    let body = parse_nodes(tokens, idx, &["endfor"]);
                    *idx += 1;
                    nodes.push(Node::For {
                        var_name: var_name.to_string(),
                        list_name: list_name.to_string(),
                        body,
                    });
                }
                _ => {
                    tdebug!("Malformed for tag '{}'", tag);
                }
            },
            "tailwind" => nodes.push(Node::Tailwind),
            "livereload" => nodes.push(Node::LiveReload),
            _ => {
                tdebug!("Skipping unknown tag '{}'", tag);
            }
        }
    }
    nodes
}

/// Looks up `a.b.c` through nested objects.
fn resolve_variable<'a>(name: &str, context: &'a Context) -> Option<&'a TemplateValue> {
    let mut keys = name.split('.');
    let first = context.get(keys.next()?)?;
    keys.try_fold(first, |value, key| match value {
        TemplateValue::Object(map) => map.get(key),
        _ => None,
    })
}

/// Escapes text for safe inclusion in HTML bodies and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Merges child blocks into base AST by matching block names
fn merge_blocks(nodes: &[Node], child_blocks: &HashMap<String, Vec<Node>>) -> Vec<Node> {
    nodes
        .iter()
        .map(|node| match node {
            Node::Block { name, body } => match child_blocks.get(name) {
                Some(child) => Node::Block {
                    name: name.clone(),
                    body: child.clone(),
                },
                None => Node::Block {
                    name: name.clone(),
                    body: merge_blocks(body, child_blocks),
                },
            },
            Node::If {
                condition,
                negated,
                then_body,
                else_body,
            } => Node::If {
                condition: condition.clone(),
                negated: *negated,
                then_body: merge_blocks(then_body, child_blocks),
                else_body: merge_blocks(else_body, child_blocks),
            },
            Node::For {
                var_name,
                list_name,
                body,
            } => Node::For {
                var_name: var_name.clone(),
                list_name: list_name.clone(),
                body: merge_blocks(body, child_blocks),
            },
            other => other.clone(),
        })
        .collect()
}

/// Renders the AST into HTML. Live reload is off.
pub fn render_nodes(nodes: &[Node], context: &Context) -> String {
    let mut out = String::new();
    render_into(&mut out, nodes, context, None);
    out
}

fn render_into(out: &mut String, nodes: &[Node], context: &Context, reload_port: Option<u16>) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Variable(expr) => {
                let (name, safe) = match expr.strip_suffix("|safe") {
                    Some(name) => (name.trim(), true),
                    None => (expr.as_str(), false),
                };
                if let Some(val) = resolve_variable(name, context) {
                    if safe {
                        out.push_str(&val.as_string());
                    } else {
                        out.push_str(&escape_html(&val.as_string()));
                    }
                }
            }
            Node::If {
                condition,
                negated,
                then_body,
                else_body,
            } => {
                let truthy = resolve_variable(condition, context)
                    .map(TemplateValue::is_truthy)
                    .unwrap_or(false);
                if truthy != *negated {
                    render_into(out, then_body, context, reload_port);
                } else {
                    render_into(out, else_body, context, reload_port);
                }
            }
            Node::For {
                var_name,
                list_name,
                body,
            } => {
                if let Some(TemplateValue::List(items)) = resolve_variable(list_name, context) {
                    let mut local = context.clone();
                    for item in items {
                        local.insert(var_name.clone(), item.clone());
                        render_into(out, body, &local, reload_port);
                    }
                }
            }
            Node::Block { body, .. } => render_into(out, body, context, reload_port),
            Node::Extends(_) => {}
            Node::Tailwind => {
                tdebug!("Inserting Tailwind CDN link");
                out.push_str(r#"<script src="https://cdn.tailwindcss.com"></script>"#);
            }
            Node::LiveReload => {
                if let Some(port) = reload_port {
                    out.push_str(&format!(
                        "<script>new WebSocket(\"ws://\" + location.hostname + \":{}/ws/reload\")\
                         .onmessage = () => location.reload();</script>",
                        port
                    ));
                }
            }
        }
    }
}

/// Loads and renders templates from one directory.
#[derive(Clone, Debug)]
pub struct Templates {
    dir: PathBuf,
    live_reload_port: Option<u16>,
}

impl Templates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Templates {
            dir: dir.into(),
            live_reload_port: None,
        }
    }

    /// Directory from the settings; live reload follows debug mode.
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.template.debug {
            set_display_logs(true);
        }
        Templates {
            dir: PathBuf::from(&settings.template.dir),
            live_reload_port: settings.debug.then_some(settings.ws_port),
        }
    }

    pub fn with_live_reload(mut self, port: Option<u16>) -> Self {
        self.live_reload_port = port;
        self
    }

    /// Parse `name` and everything it extends into a single merged AST.
    fn load_tree(&self, name: &str, depth: usize) -> Result<Vec<Node>, String> {
        if depth > MAX_EXTENDS_DEPTH {
            return Err(format!("Template '{}' extends too deeply", name));
        }
        let content = std::fs::read_to_string(self.dir.join(name))
            .map_err(|_| format!("Template '{}' not found", name))?;
        let nodes = parse_tokens(&tokenize_template(&content));
        tdebug!("AST for {}: {:?}", name, nodes);

        let mut child_blocks = HashMap::new();
        let mut base: Option<String> = None;
        for node in &nodes {
            match node {
                Node::Extends(b) => base = Some(b.clone()),
                Node::Block { name, body } => {
                    child_blocks.insert(name.clone(), body.clone());
                }
                _ => {}
            }
        }

        match base {
            Some(base) => {
                let base_nodes = self.load_tree(&base, depth + 1)?;
                let merged = merge_blocks(&base_nodes, &child_blocks);
                tdebug!("Merged AST for {}: {:?}", name, merged);
                Ok(merged)
            }
            None => Ok(nodes),
        }
    }

    /// Render a template to an HTML string.
    pub fn render_to_string(&self, name: &str, context: &Context) -> Result<String, String> {
        let tree = self.load_tree(name, 0)?;
        let mut out = String::new();
        render_into(&mut out, &tree, context, self.live_reload_port);
        Ok(out)
    }

    /// Render a template into a 200 HTML response, or a 404 when it cannot be loaded.
    pub fn render(&self, name: &str, context: &Context) -> Response {
        match self.render_to_string(name, context) {
            Ok(html) => Response::ok(html),
            Err(message) => {
                log::error!("{}", message);
                Response::html(404, escape_html(&message))
            }
        }
    }
}
