//! Cookie "session" demo: remember a visitor's name and email in cookies.

use cookie::{Cookie, SameSite};

use crate::route;
use crate::router::{AppState, Request, Response, Router};
use crate::template::Context;

const USERNAME_COOKIE: &str = "username";
const EMAIL_COOKIE: &str = "email";

fn visitor_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").removal().build()
}

async fn index(req: Request, state: AppState) -> Response {
    let mut context = Context::new();
    context.insert("username".to_string(), req.cookie(USERNAME_COOKIE).into());
    state.templates.render("index.html", &context)
}

async fn welcome(req: Request, state: AppState) -> Response {
    let form = req.form();
    let field = |name: &str| {
        form.get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let (Some(username), Some(email)) = (field("username"), field("email")) else {
        return Response::bad_request("Both username and email are required.");
    };

    let mut context = Context::new();
    context.insert("username".to_string(), username.clone().into());
    context.insert("email".to_string(), email.clone().into());
    let response = state.templates.render("welcome.html", &context);
    if response.status_code != 200 {
        return response;
    }
    log::info!("Remembering visitor {}", username);
    response
        .with_cookie(visitor_cookie(USERNAME_COOKIE, username))
        .with_cookie(visitor_cookie(EMAIL_COOKIE, email))
}

async fn logout(_req: Request, _state: AppState) -> Response {
    Response::redirect("/")
        .with_cookie(removal_cookie(USERNAME_COOKIE))
        .with_cookie(removal_cookie(EMAIL_COOKIE))
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::instrumented();
    route!(router,
        GET "/" => { index },
        POST "/welcome" => { welcome },
        POST "/logout" => { logout },
    );
    router.set_app_state(state);
    router
}
