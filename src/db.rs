use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension};

use crate::parser::labels::LABEL_SHAPE;
use crate::parser::records::{Injury, MotorCarrier, ParsedDocument, Vehicle};

/// A value that is nothing but a field label, e.g. `Make:`. Appears when a
/// field is blank on the page and the extractor runs on into the next label.
static LABEL_ARTIFACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{LABEL_SHAPE}$")).unwrap());

const INJURY_TYPES: &[&str] = &["Injured", "Fatality"];

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating database directory {}", dir.display()))?;
        }
    }
    let conn = Connection::open(path).with_context(|| format!("opening database {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reports (
            case_number  TEXT PRIMARY KEY,
            report_type  TEXT,
            county       TEXT,
            crash_date   TEXT,
            crash_time   TEXT,
            location     TEXT,
            officer_name TEXT,
            post         TEXT,
            assisted_by  TEXT,
            summary      TEXT,
            updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_reports_date ON reports(crash_date);
        CREATE INDEX IF NOT EXISTS idx_reports_county ON reports(county);

        CREATE TABLE IF NOT EXISTS vehicles (
            id             INTEGER PRIMARY KEY,
            case_number    TEXT NOT NULL REFERENCES reports(case_number),
            vehicle_number INTEGER NOT NULL,
            year           TEXT,
            make           TEXT,
            type           TEXT,
            towed_by       TEXT,
            driver_name    TEXT,
            age            TEXT,
            city_state     TEXT,
            UNIQUE(case_number, vehicle_number)
        );

        CREATE TABLE IF NOT EXISTS injuries (
            id                     INTEGER PRIMARY KEY,
            case_number            TEXT NOT NULL REFERENCES reports(case_number),
            injury_index           INTEGER NOT NULL,
            type                   TEXT NOT NULL,
            name                   TEXT,
            age                    TEXT,
            city_state             TEXT,
            seatbelt_use           TEXT,
            life_saved_by_seatbelt TEXT,
            transported_to         TEXT,
            transported_by         TEXT,
            UNIQUE(case_number, injury_index)
        );

        -- carrier_key is the DOT/MCC number, or the carrier name when the
        -- number is missing.
        CREATE TABLE IF NOT EXISTS motor_carriers (
            id              INTEGER PRIMARY KEY,
            case_number     TEXT NOT NULL REFERENCES reports(case_number),
            carrier_key     TEXT NOT NULL,
            carrier_name    TEXT,
            usdot_or_mcc    TEXT,
            city_state      TEXT,
            hazmat_involved TEXT,
            UNIQUE(case_number, carrier_key)
        );

        CREATE TABLE IF NOT EXISTS fetches (
            id          INTEGER PRIMARY KEY,
            url         TEXT NOT NULL,
            status      INTEGER,
            error       TEXT,
            latency_ms  INTEGER,
            fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Filters ──

pub fn is_label_artifact(value: &str) -> bool {
    LABEL_ARTIFACT_RE.is_match(value.trim())
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !is_label_artifact(v))
}

/// Vehicles whose year is a bare label were mis-segmented.
pub fn keep_vehicle(v: &Vehicle) -> bool {
    !v.year.as_deref().is_some_and(is_label_artifact)
}

pub fn keep_injury(i: &Injury) -> bool {
    i.kind.as_deref().is_some_and(|k| INJURY_TYPES.contains(&k))
}

/// Key a carrier is stored under; `None` means the entry is dropped.
pub fn carrier_key(c: &MotorCarrier) -> Option<&str> {
    present(&c.usdot_or_mcc).or_else(|| present(&c.carrier_name))
}

// ── Saving ──

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub saved: bool,
    pub vehicles: usize,
    pub injuries: usize,
    pub motor_carriers: usize,
}

/// Upsert one parsed document by natural keys. Documents without a case
/// number are skipped; sub-records that fail the filters above are dropped.
pub fn save_document(conn: &Connection, doc: &ParsedDocument) -> Result<SaveOutcome> {
    let r = &doc.report;
    let Some(case_number) = r.case_number.as_deref() else {
        return Ok(SaveOutcome::default());
    };

    let mut outcome = SaveOutcome {
        saved: true,
        ..Default::default()
    };

    let tx = conn.unchecked_transaction()?;
    {
        tx.execute(
            "INSERT INTO reports
             (case_number, report_type, county, crash_date, crash_time, location,
              officer_name, post, assisted_by, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(case_number) DO UPDATE SET
               report_type = excluded.report_type,
               county = excluded.county,
               crash_date = excluded.crash_date,
               crash_time = excluded.crash_time,
               location = excluded.location,
               officer_name = excluded.officer_name,
               post = excluded.post,
               assisted_by = excluded.assisted_by,
               summary = excluded.summary,
               updated_at = datetime('now')",
            rusqlite::params![
                case_number, r.report_type, r.county, r.crash_date, r.crash_time,
                r.location, r.officer_name, r.post, r.assisted_by, r.summary,
            ],
        )?;

        let mut v_stmt = tx.prepare(
            "INSERT INTO vehicles
             (case_number, vehicle_number, year, make, type, towed_by, driver_name, age, city_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(case_number, vehicle_number) DO UPDATE SET
               year = excluded.year,
               make = excluded.make,
               type = excluded.type,
               towed_by = excluded.towed_by,
               driver_name = excluded.driver_name,
               age = excluded.age,
               city_state = excluded.city_state",
        )?;
        for v in doc.vehicles.iter().filter(|v| keep_vehicle(v)) {
            v_stmt.execute(rusqlite::params![
                case_number, v.vehicle_number, v.year, v.make, v.kind,
                v.towed_by, v.driver_name, v.age, v.city_state,
            ])?;
            outcome.vehicles += 1;
        }

        let mut i_stmt = tx.prepare(
            "INSERT INTO injuries
             (case_number, injury_index, type, name, age, city_state, seatbelt_use,
              life_saved_by_seatbelt, transported_to, transported_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(case_number, injury_index) DO UPDATE SET
               type = excluded.type,
               name = excluded.name,
               age = excluded.age,
               city_state = excluded.city_state,
               seatbelt_use = excluded.seatbelt_use,
               life_saved_by_seatbelt = excluded.life_saved_by_seatbelt,
               transported_to = excluded.transported_to,
               transported_by = excluded.transported_by",
        )?;
        for i in doc.injuries.iter().filter(|i| keep_injury(i)) {
            i_stmt.execute(rusqlite::params![
                case_number, i.injury_index, i.kind, i.name, i.age, i.city_state,
                i.seatbelt_use, i.life_saved_by_seatbelt, i.transported_to, i.transported_by,
            ])?;
            outcome.injuries += 1;
        }

        let mut c_stmt = tx.prepare(
            "INSERT INTO motor_carriers
             (case_number, carrier_key, carrier_name, usdot_or_mcc, city_state, hazmat_involved)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(case_number, carrier_key) DO UPDATE SET
               carrier_name = excluded.carrier_name,
               usdot_or_mcc = excluded.usdot_or_mcc,
               city_state = excluded.city_state,
               hazmat_involved = excluded.hazmat_involved",
        )?;
        for c in &doc.motor_carriers {
            let Some(key) = carrier_key(c) else { continue };
            c_stmt.execute(rusqlite::params![
                case_number,
                key,
                present(&c.carrier_name),
                present(&c.usdot_or_mcc),
                c.city_state,
                c.hazmat_involved,
            ])?;
            outcome.motor_carriers += 1;
        }
    }
    tx.commit()?;
    Ok(outcome)
}

pub struct FetchRow {
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn save_fetches(conn: &Connection, rows: &[FetchRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO fetches (url, status, error, latency_ms) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rows {
            stmt.execute(rusqlite::params![r.url, r.status, r.error, r.latency_ms])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Reports listing ──

#[derive(Debug, Default)]
pub struct ReportFilter<'a> {
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub county: Option<&'a str>,
    pub report_type: Option<&'a str>,
    pub limit: usize,
}

pub struct ReportRow {
    pub case_number: String,
    pub crash_date: String,
    pub crash_time: String,
    pub county: String,
    pub report_type: String,
    pub location: String,
    pub vehicles: usize,
    pub injuries: usize,
}

/// Newest crashes first, narrowed by an inclusive date range and
/// case-insensitive substring matches on county and report type.
pub fn fetch_reports(conn: &Connection, filter: &ReportFilter) -> Result<Vec<ReportRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(from) = filter.from {
        conditions.push(format!("r.crash_date >= ?{}", params.len() + 1));
        params.push(Box::new(from.to_string()));
    }
    if let Some(to) = filter.to {
        conditions.push(format!("r.crash_date <= ?{}", params.len() + 1));
        params.push(Box::new(to.to_string()));
    }
    if let Some(county) = filter.county {
        conditions.push(format!("r.county LIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{}%", county)));
    }
    if let Some(kind) = filter.report_type {
        conditions.push(format!("r.report_type LIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{}%", kind)));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT r.case_number, COALESCE(r.crash_date,''), COALESCE(r.crash_time,''),
                COALESCE(r.county,''), COALESCE(r.report_type,''), COALESCE(r.location,''),
                (SELECT COUNT(*) FROM vehicles v WHERE v.case_number = r.case_number),
                (SELECT COUNT(*) FROM injuries i WHERE i.case_number = r.case_number)
         FROM reports r{}
         ORDER BY r.crash_date DESC, r.crash_time DESC, r.case_number
         LIMIT {}",
        where_clause, filter.limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(ReportRow {
                case_number: row.get(0)?,
                crash_date: row.get(1)?,
                crash_time: row.get(2)?,
                county: row.get(3)?,
                report_type: row.get(4)?,
                location: row.get(5)?,
                vehicles: row.get(6)?,
                injuries: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn report_exists(conn: &Connection, case_number: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM reports WHERE case_number = ?1",
            [case_number],
            |r| r.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ── Stats ──

pub struct Stats {
    pub reports: usize,
    pub vehicles: usize,
    pub injuries: usize,
    pub fatalities: usize,
    pub motor_carriers: usize,
    pub fetches: usize,
    pub fetch_errors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        reports: count("SELECT COUNT(*) FROM reports")?,
        vehicles: count("SELECT COUNT(*) FROM vehicles")?,
        injuries: count("SELECT COUNT(*) FROM injuries")?,
        fatalities: count("SELECT COUNT(*) FROM injuries WHERE type = 'Fatality'")?,
        motor_carriers: count("SELECT COUNT(*) FROM motor_carriers")?,
        fetches: count("SELECT COUNT(*) FROM fetches")?,
        fetch_errors: count("SELECT COUNT(*) FROM fetches WHERE error IS NOT NULL")?,
    })
}
