//! User registration form backed by the `users` table.
//!
//! GET renders the form with a CSRF token; POST validates it, stores the user
//! with a hashed password and redirects back with a one-shot flash message.

use std::collections::HashMap;

use cookie::{Cookie, SameSite};
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::error::AppError;
use crate::models::User;
use crate::orm;
use crate::route;
use crate::router::{AppState, Request, Response, Router};
use crate::template::{Context, TemplateValue};

const CSRF_COOKIE: &str = "csrf_token";
const FLASH_COOKIE: &str = "flash";
const REQUIRED: &str = "This field is required.";
const EMAIL_TAKEN: &str = "This email is already registered.";

#[derive(Debug, Default, Clone, Validate)]
pub struct RegistrationForm {
    #[validate(length(min = 2, max = 50, message = "Field must be between 2 and 50 characters long."))]
    pub first_name: String,
    #[validate(length(min = 2, max = 50, message = "Field must be between 2 and 50 characters long."))]
    pub last_name: String,
    #[validate(
        email(message = "Invalid email address."),
        length(max = 120, message = "Field cannot be longer than 120 characters.")
    )]
    pub email: String,
    #[validate(length(min = 6, max = 200, message = "Field must be between 6 and 200 characters long."))]
    pub password: String,
}

impl RegistrationForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let get = |name: &str| fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default();
        RegistrationForm {
            first_name: get("first_name"),
            last_name: get("last_name"),
            email: get("email"),
            // Passwords are taken verbatim.
            password: fields.get("password").cloned().unwrap_or_default(),
        }
    }

    /// Per-field error messages; empty when the form is valid.
    pub fn errors(&self) -> HashMap<String, Vec<String>> {
        let mut errors: HashMap<String, Vec<String>> = HashMap::new();
        if let Err(validation) = self.validate() {
            for (field, errs) in validation.field_errors() {
                let messages = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                errors.insert(field.to_string(), messages);
            }
        }
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("password", &self.password),
        ] {
            if value.is_empty() {
                errors.insert(field.to_string(), vec![REQUIRED.to_string()]);
            }
        }
        errors
    }
}

/// Expected form token for a CSRF cookie nonce.
pub fn csrf_token(secret: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn flash_message(category: &str) -> Option<&'static str> {
    match category {
        "success" => Some("You have registered successfully!"),
        _ => None,
    }
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn render_form(
    state: &AppState,
    nonce: &str,
    form: &RegistrationForm,
    errors: &HashMap<String, Vec<String>>,
    flash: Option<&str>,
) -> Response {
    let mut values = HashMap::new();
    values.insert("first_name".to_string(), form.first_name.as_str().into());
    values.insert("last_name".to_string(), form.last_name.as_str().into());
    values.insert("email".to_string(), form.email.as_str().into());

    let error_map: HashMap<String, TemplateValue> = errors
        .iter()
        .map(|(field, messages)| (field.clone(), messages.clone().into()))
        .collect();

    let mut context = Context::new();
    context.insert("form".to_string(), TemplateValue::Object(values));
    context.insert("errors".to_string(), TemplateValue::Object(error_map));
    context.insert(
        "csrf_token".to_string(),
        csrf_token(&state.settings.secret_key, nonce).into(),
    );
    context.insert("flash".to_string(), flash.into());
    state.templates.render("register.html", &context)
}

async fn show_form(req: Request, state: AppState) -> Response {
    let (nonce, fresh) = match req.cookie(CSRF_COOKIE) {
        Some(nonce) => (nonce, false),
        None => (uuid::Uuid::new_v4().to_string(), true),
    };
    let flash = req
        .cookie(FLASH_COOKIE)
        .and_then(|category| flash_message(&category));

    let mut response = render_form(
        &state,
        &nonce,
        &RegistrationForm::default(),
        &HashMap::new(),
        flash,
    );
    if fresh {
        response = response.with_cookie(session_cookie(CSRF_COOKIE, nonce));
    }
    if req.cookie(FLASH_COOKIE).is_some() {
        response = response.with_cookie(Cookie::build(FLASH_COOKIE).path("/").removal().build());
    }
    response
}

async fn submit_form(req: Request, state: AppState) -> Response {
    let fields = req.form();
    let nonce = req.cookie(CSRF_COOKIE).unwrap_or_default();
    let submitted = fields.get(CSRF_COOKIE).map(String::as_str).unwrap_or_default();
    if nonce.is_empty() || submitted != csrf_token(&state.settings.secret_key, &nonce) {
        log::warn!("Registration rejected: CSRF token missing or invalid");
        return Response::bad_request("The CSRF token is missing or invalid.");
    }

    let form = RegistrationForm::from_fields(&fields);
    let mut errors = form.errors();
    if !errors.is_empty() {
        return render_form(&state, &nonce, &form, &errors, None);
    }

    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return e.into_response(),
    };
    match User::find_by_email(db, &form.email).await {
        Ok(Some(_)) => {
            errors.insert("email".to_string(), vec![EMAIL_TAKEN.to_string()]);
            return render_form(&state, &nonce, &form, &errors, None);
        }
        Ok(None) => {}
        Err(e) => return e.into_response(),
    }

    let body = serde_json::json!({
        "first_name": form.first_name,
        "last_name": form.last_name,
        "email": form.email,
        "password": form.password,
    });
    match orm::create::<User>(db, body).await {
        Ok(user) => {
            log::info!("Registered user {} ({})", user.id, user.email);
            Response::redirect("/register")
                .with_cookie(session_cookie(FLASH_COOKIE, "success".to_string()))
        }
        // Lost a race with another registration for the same address.
        Err(AppError::Conflict(_)) => {
            errors.insert("email".to_string(), vec![EMAIL_TAKEN.to_string()]);
            render_form(&state, &nonce, &form, &errors, None)
        }
        Err(e) => e.into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::instrumented();
    route!(router,
        GET "/register" => { show_form },
        POST "/register" => { submit_form },
    );
    router.set_app_state(state);
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn valid_form_has_no_errors() {
        let form = RegistrationForm::from_fields(&fields(&[
            ("first_name", "Ivan"),
            ("last_name", "Petrov"),
            ("email", "ivan@example.com"),
            ("password", "secret1"),
        ]));
        assert!(form.errors().is_empty());
    }

    #[test]
    fn missing_and_short_fields_are_reported() {
        let form = RegistrationForm::from_fields(&fields(&[
            ("first_name", "I"),
            ("email", "not-an-email"),
            ("password", "123"),
        ]));
        let errors = form.errors();
        assert_eq!(
            errors["first_name"],
            vec!["Field must be between 2 and 50 characters long."]
        );
        assert_eq!(errors["last_name"], vec![REQUIRED]);
        assert_eq!(errors["email"], vec!["Invalid email address."]);
        assert!(errors.contains_key("password"));
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let form = RegistrationForm::from_fields(&fields(&[
            ("first_name", "Ян"),
            ("last_name", "Ли"),
            ("email", "yan@example.com"),
            ("password", "пароль"),
        ]));
        assert!(form.errors().is_empty());
    }

    #[test]
    fn csrf_token_depends_on_secret_and_nonce() {
        let token = csrf_token("secret", "nonce");
        assert_eq!(token, csrf_token("secret", "nonce"));
        assert_ne!(token, csrf_token("other", "nonce"));
        assert_ne!(token, csrf_token("secret", "other"));
    }
}
