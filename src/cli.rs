//! Command-line flags shared by the site binaries.

use std::path::PathBuf;

use clap::Args;

use crate::error::Result;
use crate::settings::Settings;

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// TOML settings file; replaces the site defaults, flags still win
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// SQLite URL, e.g. sqlite:shop.db
    #[arg(long)]
    pub database: Option<String>,

    /// Template directory
    #[arg(long)]
    pub templates: Option<String>,

    /// Debug mode: live template reload over a websocket
    #[arg(long)]
    pub debug: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl ServeArgs {
    /// Resolve settings: site defaults, or the config file when given, then flags.
    pub fn resolve(&self, defaults: Settings) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(Some(path))?,
            None => defaults,
        };
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(database) = &self.database {
            settings.database_url = database.clone();
        }
        if let Some(templates) = &self.templates {
            settings.template.dir = templates.clone();
        }
        if self.debug {
            settings.debug = true;
        }
        Ok(settings)
    }
}
