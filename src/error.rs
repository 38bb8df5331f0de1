use std::collections::HashMap;

use sqlx::error::ErrorKind;
use thiserror::Error;

use crate::router::Response;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Integrity violation: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    /// Constraint failures are the client's fault, everything else is ours.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return AppError::Conflict(db_err.message().to_string());
                }
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let reasons: Vec<String> = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                format!("{}: {}", field, reasons.join(", "))
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join("; "))
    }
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::BadRequest(_) | AppError::Validation(_) | AppError::Conflict(_) => 400,
            AppError::Json(_) => 400,
            _ => 500,
        }
    }

    /// Whether the failure was caused by what the client sent.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        if status >= 500 {
            log::error!("Request failed: {}", self);
        }
        let message = if status >= 500 {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        Response::json(
            serde_json::json!({ "error": message }),
            status,
            HashMap::new(),
        )
    }
}

impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        err.into_response()
    }
}
