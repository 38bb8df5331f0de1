use clap::Parser;
use coursework::apps::catalog;
use coursework::cli::ServeArgs;
use coursework::logging;
use coursework::router::AppState;
use coursework::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "catalog-site")]
#[command(about = "Home, category and product pages rendered from templates")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.serve.verbose);

    let mut defaults = Settings::default();
    defaults.template.dir = "templates/catalog".to_string();
    let settings = cli.serve.resolve(defaults)?;

    let mut router = catalog::router(AppState::new(settings.clone()));
    router.run(settings).await?;
    Ok(())
}
