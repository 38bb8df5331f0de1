use std::sync::Arc;

use clap::Parser;
use coursework::apps::registration;
use coursework::cli::ServeArgs;
use coursework::logging;
use coursework::models::User;
use coursework::orm::{Db, Model};
use coursework::router::AppState;
use coursework::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "register-site")]
#[command(about = "User registration form backed by SQLite")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.serve.verbose);

    let mut defaults = Settings::default();
    defaults.database_url = "sqlite:users.db".to_string();
    defaults.template.dir = "templates/register".to_string();
    let settings = cli.serve.resolve(defaults)?;
    if settings.secret_key == Settings::default().secret_key {
        log::warn!("Using the built-in secret_key; set one in a config file outside the classroom");
    }

    let db = Arc::new(Db::connect(&settings.database_url).await?);
    User::migrate(db.clone()).await?;

    let state = AppState::new(settings.clone()).with_db(db);
    let mut router = registration::router(state);
    router.run(settings).await?;
    Ok(())
}
