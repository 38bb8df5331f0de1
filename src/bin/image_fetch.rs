use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use coursework::downloader::{self, DownloadOptions, Strategy, threaded};
use coursework::logging;

#[derive(Parser, Debug)]
#[command(name = "image-fetch")]
#[command(about = "Download images from specified URLs.")]
struct Cli {
    /// List of image URLs
    #[arg(required = true, num_args = 1..)]
    urls: Vec<String>,

    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Run a single strategy instead of all three
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Pool size for the thread and process strategies
    #[arg(long)]
    workers: Option<usize>,

    /// Download the URLs in this process and exit (used by the process strategy)
    #[arg(long, hide = true)]
    worker: bool,

    #[arg(long, help = "Enable verbose output")]
    verbose: bool,
}

fn run_worker(cli: &Cli) -> ExitCode {
    let client = match reqwest::blocking::Client::builder().build() {
        Ok(client) => client,
        Err(e) => {
            log::error!("Cannot build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    for url in &cli.urls {
        threaded::download_one(&client, url, &cli.output_dir);
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.verbose);

    if cli.worker {
        return run_worker(&cli);
    }

    let worker_program = match std::env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Cannot locate own executable: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let options = DownloadOptions {
        output_dir: cli.output_dir.clone(),
        workers: cli.workers,
        worker_program,
    };
    let strategies = match cli.strategy {
        Some(strategy) => vec![strategy],
        None => Strategy::ALL.to_vec(),
    };

    for (i, strategy) in strategies.iter().enumerate() {
        println!("Downloading images using {}:", strategy.approach());
        match downloader::run_timed(*strategy, &cli.urls, &options) {
            Ok((report, elapsed)) => {
                log::info!(
                    "{}: {} saved, {} skipped",
                    strategy.label(),
                    report.saved.len(),
                    report.skipped
                );
                let spacer = if i + 1 < strategies.len() { "\n" } else { "" };
                println!(
                    "{} Time: {:.2} seconds{}",
                    strategy.label(),
                    elapsed.as_secs_f64(),
                    spacer
                );
            }
            Err(e) => {
                log::error!("{} strategy failed: {}", strategy.label(), e);
                eprintln!("❌ {} strategy failed: {}", strategy.label(), e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
