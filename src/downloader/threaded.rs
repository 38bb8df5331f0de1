//! Fixed pool of OS threads sharing one blocking HTTP client.

use std::fs::File;
use std::path::Path;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};

use super::{DownloadReport, Outcome, announce, file_name_for, run_pool, target_path};
use crate::error::Result;

/// Same sizing rule as a typical thread-pool executor: cpus + 4, capped at 32.
pub fn default_workers() -> usize {
    (super::available_cpus() + 4).min(32)
}

/// Download every URL using `workers` threads sharing one client.
pub fn download_all(urls: &[String], output_dir: &Path, workers: usize) -> Result<DownloadReport> {
    let client = Client::builder().build()?;
    log::debug!("Starting {} download threads for {} urls", workers, urls.len());
    Ok(run_pool(urls, workers, |url| download_one(&client, url, output_dir)))
}

fn save_body(response: &mut Response, path: &Path) -> Result<u64> {
    let mut file = File::create(path)?;
    Ok(response.copy_to(&mut file)?)
}

/// Fetch one URL and stream a 200 body to disk.
pub fn download_one(client: &Client, url: &str, output_dir: &Path) -> Outcome {
    let Some(filename) = file_name_for(url) else {
        log::warn!("No file name in {}, skipping", url);
        return Outcome::Skipped;
    };
    let mut response = match client.get(url).send() {
        Ok(response) => response,
        Err(e) => {
            log::warn!("Request to {} failed: {}", url, e);
            return Outcome::Skipped;
        }
    };
    if response.status() != StatusCode::OK {
        log::debug!("Skipping {}: HTTP {}", url, response.status());
        return Outcome::Skipped;
    }

    let path = target_path(output_dir, &filename);
    match save_body(&mut response, &path) {
        Ok(bytes) => {
            log::debug!("Wrote {} bytes to {}", bytes, path.display());
            announce(&filename);
            Outcome::Saved(filename)
        }
        Err(e) => {
            log::warn!("Could not save {}: {}", path.display(), e);
            Outcome::Skipped
        }
    }
}
