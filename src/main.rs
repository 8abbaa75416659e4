mod config;
mod db;
mod fetch;
mod listing;
mod parser;

use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use config::Config;

#[derive(Parser)]
#[command(name = "crash_scraper", about = "Iowa crash report scraper")]
struct Cli {
    /// SQLite database path (overrides CRASH_DB_PATH)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse and store every crash listed between two dates
    Run {
        /// First crash date (2024-01-31, 01/31/2024, January 31, 2024, 01312024)
        start: String,
        /// Last crash date, inclusive
        end: String,
        /// Max reports to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Parse a saved report page and print the result as JSON
    Parse {
        /// HTML file to parse
        path: String,
        /// Case number to use when the page has none
        #[arg(long)]
        fallback_id: Option<String>,
    },
    /// Stored reports table, newest first
    Reports {
        /// Earliest crash date
        #[arg(long)]
        from: Option<String>,
        /// Latest crash date
        #[arg(long)]
        to: Option<String>,
        /// County name contains
        #[arg(short, long)]
        county: Option<String>,
        /// Report type contains
        #[arg(short = 't', long = "type")]
        report_type: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show stored row counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = cli.db {
        config.db_path = path;
    }

    let result = match cli.command {
        Commands::Run { start, end, limit } => {
            let start = listing::parse_input_date(&start)?;
            let end = listing::parse_input_date(&end)?;
            if start > end {
                bail!("Start date {} is after end date {}", start, end);
            }

            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;

            let client = reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .context("Failed to build HTTP client")?;

            println!("Searching results page for crashes from {} to {} ...", start, end);
            let mut listings = listing::fetch_listings(&client, &config, start, end).await?;
            if listings.is_empty() {
                println!("No crash listings found in the results list for that date range.");
                return Ok(());
            }
            if let Some(n) = limit {
                listings.truncate(n);
            }

            let t_fetch = Instant::now();
            println!("Fetching {} report pages...", listings.len());
            let pages = fetch::fetch_pages(&client, &config, listings).await?;
            let log: Vec<_> = pages.iter().map(|p| p.log_row()).collect();
            db::save_fetches(&conn, &log)?;
            println!("Fetched in {:.1}s", t_fetch.elapsed().as_secs_f64());

            let counts = process_pages(&conn, &pages)?;
            counts.print();
            Ok(())
        }
        Commands::Parse { path, fallback_id } => {
            let html = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path))?;
            let doc = parser::parse(&html, fallback_id.as_deref());
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        Commands::Reports { from, to, county, report_type, limit } => {
            let from = from.map(|d| listing::parse_input_date(&d)).transpose()?;
            let to = to.map(|d| listing::parse_input_date(&d)).transpose()?;
            let from = from.map(|d| d.format("%Y-%m-%d").to_string());
            let to = to.map(|d| d.format("%Y-%m-%d").to_string());

            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_reports(
                &conn,
                &db::ReportFilter {
                    from: from.as_deref(),
                    to: to.as_deref(),
                    county: county.as_deref(),
                    report_type: report_type.as_deref(),
                    limit,
                },
            )?;
            if rows.is_empty() {
                println!("No reports found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<14} | {:<10} | {:<5} | {:<12} | {:<14} | {:<32} | {:>3} | {:>3}",
                "#", "Case", "Date", "Time", "County", "Type", "Location", "Veh", "Inj"
            );
            println!("{}", "-".repeat(118));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<14} | {:<10} | {:<5} | {:<12} | {:<14} | {:<32} | {:>3} | {:>3}",
                    i + 1,
                    truncate(&r.case_number, 14),
                    truncate(&r.crash_date, 10),
                    truncate(&r.crash_time, 5),
                    truncate(&r.county, 12),
                    truncate(&r.report_type, 14),
                    truncate(&r.location, 32),
                    r.vehicles,
                    r.injuries,
                );
            }
            println!("\n{} reports", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Reports:        {}", s.reports);
            println!("Vehicles:       {}", s.vehicles);
            println!("Injuries:       {}", s.injuries);
            println!("Fatalities:     {}", s.fatalities);
            println!("Motor carriers: {}", s.motor_carriers);
            println!("Fetches:        {}", s.fetches);
            println!("Fetch errors:   {}", s.fetch_errors);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

#[derive(Default)]
struct ProcessCounts {
    new_reports: usize,
    updated_reports: usize,
    skipped: usize,
    fetch_errors: usize,
    vehicles: usize,
    injuries: usize,
    motor_carriers: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} new and {} updated reports ({} vehicles, {} injuries, {} motor carriers).",
            self.new_reports, self.updated_reports, self.vehicles, self.injuries, self.motor_carriers,
        );
        if self.skipped > 0 || self.fetch_errors > 0 {
            println!(
                "Skipped {} pages without a case number, {} pages that failed to fetch.",
                self.skipped, self.fetch_errors,
            );
        }
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[fetch::FetchedPage],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts::default();

    for chunk in pages.chunks(200) {
        let docs: Vec<_> = chunk
            .par_iter()
            .map(|page| {
                page.html.as_deref().map(|html| {
                    let hint = page.listing.case_hint();
                    (page, parser::parse(html, hint.as_deref()))
                })
            })
            .collect();

        for entry in docs {
            let Some((page, doc)) = entry else {
                counts.fetch_errors += 1;
                continue;
            };
            let existed = match doc.report.case_number.as_deref() {
                Some(case_number) => db::report_exists(conn, case_number)?,
                None => false,
            };
            let outcome = db::save_document(conn, &doc)?;
            if !outcome.saved {
                tracing::warn!(
                    url = %page.listing.url,
                    preview = ?doc.preview,
                    "missing case_number, skipped"
                );
                counts.skipped += 1;
                continue;
            }
            if existed {
                counts.updated_reports += 1;
            } else {
                counts.new_reports += 1;
            }
            counts.vehicles += outcome.vehicles;
            counts.injuries += outcome.injuries;
            counts.motor_carriers += outcome.motor_carriers;
            tracing::debug!(url = %page.listing.url, "saved report");
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
