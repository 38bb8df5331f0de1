use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub dir: String,
    /// Enables the engine's internal debug logs.
    pub debug: bool,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        TemplateSettings {
            dir: "templates".to_string(),
            debug: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    /// Port of the live-reload websocket server, only bound in debug mode.
    pub ws_port: u16,
    pub database_url: String,
    pub secret_key: String,
    pub template: TemplateSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            host: "127.0.0.1".to_string(),
            port: 5000,
            ws_port: 5001,
            database_url: "sqlite::memory:".to_string(),
            secret_key: "change-me".to_string(),
            template: TemplateSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file. Missing keys keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&raw)
            }
            None => Ok(Settings::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }
}
