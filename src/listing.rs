use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Url;
use tracing::info;

use crate::config::Config;
use crate::parser::text::clean_text;

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").unwrap());
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static LISTING_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"on ([A-Za-z]+ \d{1,2}, \d{4})$").unwrap());

const INPUT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y"];

/// One crash on the results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub title: String,
    pub url: String,
    pub date: NaiveDate,
}

impl Listing {
    /// The `caseno` query parameter, if the report URL carries one.
    pub fn case_hint(&self) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == "caseno")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    }
}

/// Parse a date typed on the command line. Unlike report dates this is
/// strict: a range we cannot read stops the run.
pub fn parse_input_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if let Some(date) = INPUT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Ok(date);
    }
    // Bare MMDDYYYY.
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let num = |range: std::ops::Range<usize>| s[range].parse::<u32>().ok();
        if let (Some(m), Some(d), Some(y)) = (num(0..2), num(2..4), num(4..8)) {
            if let Some(date) = NaiveDate::from_ymd_opt(y as i32, m, d) {
                return Ok(date);
            }
        }
    }
    bail!("Could not parse date: {}", s)
}

/// Fetch the results page and keep the crashes dated inside `[start, end]`.
pub async fn fetch_listings(
    client: &reqwest::Client,
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Listing>> {
    info!("Fetching results page: {}", config.results_url);
    let html = client
        .get(&config.results_url)
        .send()
        .await
        .context("Failed to reach results page")?
        .error_for_status()
        .context("Results page returned an error status")?
        .text()
        .await
        .context("Failed to read results page")?;

    let base = Url::parse(&config.base_url)
        .with_context(|| format!("Invalid base URL {}", config.base_url))?;
    let listings = find_listings(&html, &base, start, end);
    info!("Listings in range: {}", listings.len());
    Ok(listings)
}

/// Scan anchors whose text ends with `on <Month D, YYYY>`.
pub fn find_listings(html: &str, base: &Url, start: NaiveDate, end: NaiveDate) -> Vec<Listing> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let title = clean_text(&caps[2])
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let date_str = LISTING_DATE_RE.captures(&title)?.get(1)?.as_str().to_string();
            let date = NaiveDate::parse_from_str(&date_str, "%B %d, %Y").ok()?;
            if date < start || date > end {
                return None;
            }
            let href = HREF_RE
                .captures(&caps[1])
                .and_then(|h| h.get(1).or_else(|| h.get(2)))?
                .as_str();
            let href = crate::parser::text::decode_entities(href);
            let url = base.join(&href).ok()?.to_string();
            Some(Listing { title, url, date })
        })
        .collect()
}
