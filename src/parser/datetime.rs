use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{3,4}").unwrap());

/// Text formats tried after the compact all-digit ones.
const TEXT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%m-%d-%Y"];

/// Normalize a crash date to `YYYY-MM-DD`.
///
/// Formats are tried in a fixed order and the first that yields a real
/// calendar date wins. Unrecognized input comes back trimmed but otherwise
/// untouched, so downstream code can tell an unparsed date from a parsed one.
pub fn normalize_date(raw: &str) -> String {
    let s = raw.trim();
    parse_date(s)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| s.to_string())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_compact_date(s).or_else(|| {
        TEXT_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    })
}

/// `MMDDYYYY`, then `YYYYMMDD`, then `MMDDYY`.
fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let num = |range: std::ops::Range<usize>| s[range].parse::<u32>().ok();
    match s.len() {
        8 => {
            let mmddyyyy = NaiveDate::from_ymd_opt(num(4..8)? as i32, num(0..2)?, num(2..4)?);
            mmddyyyy.or_else(|| NaiveDate::from_ymd_opt(num(0..4)? as i32, num(4..6)?, num(6..8)?))
        }
        6 => NaiveDate::from_ymd_opt(expand_two_digit_year(num(4..6)?), num(0..2)?, num(2..4)?),
        _ => None,
    }
}

/// 00-68 land in the 2000s, 69-99 in the 1900s.
fn expand_two_digit_year(yy: u32) -> i32 {
    if yy < 69 {
        2000 + yy as i32
    } else {
        1900 + yy as i32
    }
}

/// Normalize a crash time to `HH:MM`.
///
/// Military-style digit runs are the common case, so the first run of 3-4
/// digits is taken before trying a strict `HH:MM` parse (`"930"` becomes
/// `"09:30"`). Anything else is returned trimmed.
pub fn normalize_time(raw: &str) -> String {
    let s = raw.trim();
    if let Some(m) = DIGIT_RUN_RE.find(s) {
        let padded = format!("{:0>4}", m.as_str());
        return format!("{}:{}", &padded[..2], &padded[2..]);
    }
    match NaiveTime::parse_from_str(s, "%H:%M") {
        Ok(t) => t.format("%H:%M").to_string(),
        Err(_) => s.to_string(),
    }
}
