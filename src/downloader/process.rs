//! Fixed pool of child processes, one child per URL.
//!
//! Each child is the downloader executable itself started with [`WORKER_FLAG`];
//! it downloads its URL and prints the usual `Downloaded: <name>` line, which
//! the parent reads back to build its report.

use std::path::Path;
use std::process::{Command, Stdio};

use super::{DownloadReport, Outcome, run_pool};
use crate::error::Result;

/// Hidden flag switching the executable into single-download worker mode.
pub const WORKER_FLAG: &str = "--worker";

const DOWNLOADED_PREFIX: &str = "Downloaded: ";

/// One child per cpu.
pub fn default_workers() -> usize {
    super::available_cpus()
}

pub fn download_all(
    program: &Path,
    urls: &[String],
    output_dir: &Path,
    workers: usize,
) -> Result<DownloadReport> {
    log::debug!(
        "Starting {} worker processes of {} for {} urls",
        workers,
        program.display(),
        urls.len()
    );
    Ok(run_pool(urls, workers, |url| run_child(program, url, output_dir)))
}

fn run_child(program: &Path, url: &str, output_dir: &Path) -> Outcome {
    let output = Command::new(program)
        .arg(WORKER_FLAG)
        .arg("--output-dir")
        .arg(output_dir)
        .arg(url)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output();
    let output = match output {
        Ok(output) => output,
        Err(e) => {
            log::error!("Could not start worker {}: {}", program.display(), e);
            return Outcome::Skipped;
        }
    };
    if !output.status.success() {
        log::warn!("Worker for {} exited with {}", url, output.status);
        return Outcome::Skipped;
    }
    parse_worker_output(&String::from_utf8_lossy(&output.stdout))
}

/// Echo the worker's output and turn it into an outcome.
fn parse_worker_output(stdout: &str) -> Outcome {
    let mut outcome = Outcome::Skipped;
    for line in stdout.lines() {
        println!("{}", line);
        if let Some(name) = line.strip_prefix(DOWNLOADED_PREFIX) {
            outcome = Outcome::Saved(name.to_string());
        }
    }
    outcome
}
