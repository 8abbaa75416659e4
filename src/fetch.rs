use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::FetchRow;
use crate::listing::Listing;

const BASE_BACKOFF_MS: u64 = 2000;
const MAX_BACKOFF_MS: u64 = 60_000;

/// A report page as it came back from the server.
pub struct FetchedPage {
    pub listing: Listing,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: i64,
}

impl FetchedPage {
    pub fn log_row(&self) -> FetchRow {
        FetchRow {
            url: self.listing.url.clone(),
            status: self.status,
            error: self.error.clone(),
            latency_ms: Some(self.latency_ms),
        }
    }
}

/// Fetch report pages concurrently. Every listing yields exactly one
/// `FetchedPage`, failed ones carrying the error instead of a body.
pub async fn fetch_pages(
    client: &reqwest::Client,
    config: &Config,
    listings: Vec<Listing>,
) -> Result<Vec<FetchedPage>> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let total = listings.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send pages, this loop collects them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchedPage>(config.concurrency * 2);

    for listing in listings {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let max_retries = config.max_retries;

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else { return };
            let page = fetch_with_retry(&client, listing, max_retries).await;
            let _ = tx.send(page).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut pages = Vec::with_capacity(total);
    let mut errors = 0usize;
    while let Some(page) = rx.recv().await {
        if page.error.is_some() {
            errors += 1;
        }
        pages.push(page);
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, total - errors, errors);

    // Completion order is arbitrary; process oldest crashes first.
    pages.sort_by(|a, b| a.listing.date.cmp(&b.listing.date).then_with(|| a.listing.url.cmp(&b.listing.url)));
    Ok(pages)
}

async fn fetch_with_retry(client: &reqwest::Client, listing: Listing, max_retries: u32) -> FetchedPage {
    let mut attempt = 0;
    loop {
        let page = fetch_one(client, &listing).await;

        let retryable = match page.status {
            Some(code) => is_retryable(code),
            None => page.error.is_some(),
        };

        if !retryable || attempt >= max_retries {
            if let Some(e) = &page.error {
                warn!("Giving up on {}: {}", listing.url, e);
            }
            return page;
        }

        let backoff = backoff_for(attempt);
        warn!(
            "Fetch failed for {} (attempt {}/{}), backing off {:.1}s",
            listing.url,
            attempt + 1,
            max_retries,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

async fn fetch_one(client: &reqwest::Client, listing: &Listing) -> FetchedPage {
    let start = Instant::now();
    let result = async {
        let resp = client.get(&listing.url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    }
    .await;
    let latency_ms = start.elapsed().as_millis() as i64;

    match result {
        Ok((status, body)) if status.is_success() => FetchedPage {
            listing: listing.clone(),
            html: Some(body),
            status: Some(status.as_u16()),
            error: None,
            latency_ms,
        },
        Ok((status, _)) => FetchedPage {
            listing: listing.clone(),
            html: None,
            status: Some(status.as_u16()),
            error: Some(format!("HTTP {}", status)),
            latency_ms,
        },
        Err(e) => FetchedPage {
            listing: listing.clone(),
            html: None,
            status: e.status().map(|s| s.as_u16()),
            error: Some(e.to_string()),
            latency_ms,
        },
    }
}

/// 2s, 4s, 8s ... capped at one minute.
fn backoff_for(attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Rate limiting and server-side failures are worth another attempt.
fn is_retryable(code: u16) -> bool {
    StatusCode::from_u16(code)
        .map(|s| s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
        .unwrap_or(false)
}
