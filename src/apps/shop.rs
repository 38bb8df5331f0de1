//! JSON CRUD API over products, orders and users.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::error::AppError;
use crate::models::{Order, Product, User};
use crate::orm::{self, Resource};
use crate::route;
use crate::router::{AppState, Request, Response, Router, require_json};

fn json_response<T: serde::Serialize>(data: T, status: u16) -> Response {
    Response::json(data, status, HashMap::new())
}

fn not_found<R: Resource>() -> Response {
    json_response(json!({ "error": format!("{} not found", R::LABEL) }), 404)
}

/// Client mistakes become `{"error": "<Label> <action> failed", "detail": ...}`.
fn failure<R: Resource>(action: &str, err: AppError) -> Response {
    match err {
        AppError::NotFound(_) => not_found::<R>(),
        err if err.is_client_error() => {
            log::info!("{} {} failed: {}", R::LABEL, action, err);
            json_response(
                json!({
                    "error": format!("{} {} failed", R::LABEL, action),
                    "detail": err.to_string(),
                }),
                400,
            )
        }
        err => err.into_response(),
    }
}

/// Ids follow the `int` converter: anything but a non-negative integer does not match.
fn item_id(req: &Request) -> Option<i64> {
    let raw = req.param("id")?;
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

async fn list_all<R: Resource>(_req: Request, state: AppState) -> Response {
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return e.into_response(),
    };
    match orm::list::<R>(db).await {
        Ok(rows) => json_response(rows, 200),
        Err(e) => e.into_response(),
    }
}

async fn get_one<R: Resource>(req: Request, state: AppState) -> Response {
    let Some(id) = item_id(&req) else {
        return not_found::<R>();
    };
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return e.into_response(),
    };
    match orm::get::<R>(db, id).await {
        Ok(row) => json_response(row, 200),
        Err(e) => failure::<R>("lookup", e),
    }
}

async fn create_one<R: Resource>(req: Request, state: AppState) -> Response {
    let body: Value = match req.json() {
        Ok(body) => body,
        Err(e) => return failure::<R>("creation", e),
    };
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return e.into_response(),
    };
    match orm::create::<R>(db, body).await {
        Ok(row) => json_response(row, 201),
        Err(e) => failure::<R>("creation", e),
    }
}

async fn update_one<R: Resource>(req: Request, state: AppState) -> Response {
    let Some(id) = item_id(&req) else {
        return not_found::<R>();
    };
    let patch: Value = match req.json() {
        Ok(patch) => patch,
        Err(e) => return failure::<R>("update", e),
    };
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return e.into_response(),
    };
    match orm::update::<R>(db, id, patch).await {
        Ok(row) => json_response(row, 200),
        Err(e) => failure::<R>("update", e),
    }
}

async fn delete_one<R: Resource>(req: Request, state: AppState) -> Response {
    let Some(id) = item_id(&req) else {
        return not_found::<R>();
    };
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return e.into_response(),
    };
    match orm::delete::<R>(db, id).await {
        Ok(row) => json_response(row, 200),
        Err(e) => failure::<R>("deletion", e),
    }
}

/// Mount the five CRUD routes for `R` under `base`.
pub fn mount<R: Resource>(router: &mut Router, base: &str) {
    let item = format!("{}/:id", base);
    route!(router,
        GET base => { list_all::<R> },
        POST base => { create_one::<R>, require_json() },
        GET &item => { get_one::<R> },
        PUT &item => { update_one::<R>, require_json() },
        DELETE &item => { delete_one::<R> },
    );
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::instrumented();
    mount::<Product>(&mut router, "/products");
    mount::<Order>(&mut router, "/orders");
    mount::<User>(&mut router, "/users");
    router.set_app_state(state);
    router
}
