//! Batch image downloader with three interchangeable execution strategies.
//!
//! Every strategy handles each URL independently: a 200 response is saved
//! under the URL's last path segment, anything else is skipped.

pub mod asynchronous;
pub mod process;
pub mod threaded;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    Threads,
    Processes,
    Async,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Threads, Strategy::Processes, Strategy::Async];

    /// Word used in the "Downloading images using ..." heading.
    pub fn approach(&self) -> &'static str {
        match self {
            Strategy::Threads => "multithreading",
            Strategy::Processes => "multiprocessing",
            Strategy::Async => "asynchronous approach",
        }
    }

    /// Word used in the "<Label> Time: ..." summary.
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Threads => "Multithreading",
            Strategy::Processes => "Multiprocessing",
            Strategy::Async => "Asynchronous",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Saved(String),
    Skipped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// File names written, in completion order.
    pub saved: Vec<String>,
    pub skipped: usize,
}

impl DownloadReport {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Saved(name) => self.saved.push(name),
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

impl FromIterator<Outcome> for DownloadReport {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        let mut report = DownloadReport::default();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub output_dir: PathBuf,
    /// Pool size; each strategy has its own default.
    pub workers: Option<usize>,
    /// Executable re-invoked in worker mode by the process strategy.
    pub worker_program: PathBuf,
}

/// Local file name for a URL: its last path segment, percent-decoded.
/// `None` when there is no usable name (e.g. a trailing slash).
pub fn file_name_for(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let name = percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name)
}

pub(crate) fn announce(filename: &str) {
    println!("Downloaded: {}", filename);
}

pub(crate) fn target_path(output_dir: &Path, filename: &str) -> PathBuf {
    output_dir.join(filename)
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs `job` once per URL on `workers` scoped threads that pull from a shared cursor.
pub(crate) fn run_pool<F>(urls: &[String], workers: usize, job: F) -> DownloadReport
where
    F: Fn(&str) -> Outcome + Sync,
{
    let cursor = AtomicUsize::new(0);
    let workers = workers.clamp(1, urls.len().max(1));
    let (cursor, job) = (&cursor, &job);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut outcomes = Vec::new();
                    while let Some(url) = urls.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                        outcomes.push(job(url));
                    }
                    outcomes
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(outcomes) => outcomes,
                Err(_) => {
                    log::error!("A download worker panicked");
                    Vec::new()
                }
            })
            .collect()
    })
}

/// Run one strategy to completion.
pub fn run_strategy(
    strategy: Strategy,
    urls: &[String],
    options: &DownloadOptions,
) -> Result<DownloadReport> {
    std::fs::create_dir_all(&options.output_dir)?;
    match strategy {
        Strategy::Threads => {
            let workers = options.workers.unwrap_or_else(threaded::default_workers);
            threaded::download_all(urls, &options.output_dir, workers)
        }
        Strategy::Processes => {
            let workers = options.workers.unwrap_or_else(process::default_workers);
            process::download_all(&options.worker_program, urls, &options.output_dir, workers)
        }
        Strategy::Async => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(asynchronous::download_all(urls, &options.output_dir))
        }
    }
}

/// Run a strategy and measure its wall-clock time.
pub fn run_timed(
    strategy: Strategy,
    urls: &[String],
    options: &DownloadOptions,
) -> Result<(DownloadReport, Duration)> {
    let start = Instant::now();
    let report = run_strategy(strategy, urls, options)?;
    Ok((report, start.elapsed()))
}
