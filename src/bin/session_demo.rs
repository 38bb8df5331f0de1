use clap::Parser;
use coursework::apps::session;
use coursework::cli::ServeArgs;
use coursework::logging;
use coursework::router::AppState;
use coursework::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "session-demo")]
#[command(about = "Remembers a visitor's name and email in cookies")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.serve.verbose);

    let mut defaults = Settings::default();
    defaults.template.dir = "templates/session".to_string();
    let settings = cli.serve.resolve(defaults)?;

    let mut router = session::router(AppState::new(settings.clone()));
    router.run(settings).await?;
    Ok(())
}
