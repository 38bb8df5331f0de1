pub mod apps;
pub mod cli;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod models;
pub mod orm;
pub mod password;
pub mod router;
pub mod settings;
pub mod template;

pub use error::{AppError, Result};

inventory::collect!(crate::orm::Migration);
