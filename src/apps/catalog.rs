//! Static catalog pages: a home page and category / product pages extending it.

use crate::route;
use crate::router::{AppState, Request, Response, Router};
use crate::template::Context;

async fn home(_req: Request, state: AppState) -> Response {
    state.templates.render("base.html", &Context::new())
}

async fn category(req: Request, state: AppState) -> Response {
    let mut context = Context::new();
    context.insert(
        "category_name".to_string(),
        req.param("category_name").unwrap_or_default().into(),
    );
    state.templates.render("category.html", &context)
}

async fn product(req: Request, state: AppState) -> Response {
    let mut context = Context::new();
    context.insert(
        "product_name".to_string(),
        req.param("product_name").unwrap_or_default().into(),
    );
    state.templates.render("product.html", &context)
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::instrumented();
    route!(router,
        GET "/" => { home },
        GET "/category/:category_name" => { category },
        GET "/product/:product_name" => { product },
    );
    router.set_app_state(state);
    router
}
