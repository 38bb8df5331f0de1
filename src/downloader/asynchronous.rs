//! Cooperative downloads: one async client, every URL in flight at once.

use std::path::Path;

use futures::future::join_all;
use reqwest::{Client, StatusCode};

use super::{DownloadReport, Outcome, announce, file_name_for, target_path};
use crate::error::Result;

pub async fn download_all(urls: &[String], output_dir: &Path) -> Result<DownloadReport> {
    let client = Client::builder().build()?;
    let tasks = urls.iter().map(|url| download_one(&client, url, output_dir));
    Ok(join_all(tasks).await.into_iter().collect())
}

pub async fn download_one(client: &Client, url: &str, output_dir: &Path) -> Outcome {
    let Some(filename) = file_name_for(url) else {
        log::warn!("No file name in {}, skipping", url);
        return Outcome::Skipped;
    };
    let response = match client.get(url).send().await {
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
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Reading body of {} failed: {}", url, e);
            return Outcome::Skipped;
        }
    };

    let path = target_path(output_dir, &filename);
    match tokio::fs::write(&path, &body).await {
        Ok(()) => {
            announce(&filename);
            Outcome::Saved(filename)
        }
        Err(e) => {
            log::warn!("Could not save {}: {}", path.display(), e);
            Outcome::Skipped
        }
    }
}
