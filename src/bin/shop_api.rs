use std::sync::Arc;

use clap::Parser;
use coursework::apps::shop;
use coursework::cli::ServeArgs;
use coursework::logging;
use coursework::orm::{Db, auto_migrate};
use coursework::router::AppState;
use coursework::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "shop-api")]
#[command(about = "JSON CRUD API over products, orders and users")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.serve.verbose);

    let mut defaults = Settings::default();
    defaults.port = 8000;
    defaults.database_url = "sqlite:shop.db".to_string();
    let settings = cli.serve.resolve(defaults)?;

    let db = Arc::new(Db::connect(&settings.database_url).await?);
    auto_migrate(db.clone()).await?;

    let state = AppState::new(settings.clone()).with_db(db);
    let mut router = shop::router(state);
    router.run(settings).await?;
    Ok(())
}
