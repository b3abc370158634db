//! Offline store check: schema, per-record blob integrity and model mix.

use std::path::Path;

use photosim_store::embedding::decode_f32_le;
use photosim_store::DB_FILE;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{error, info};

/// Result of validating a data directory.
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub db_valid: bool,
    pub photos: i64,
    /// Record count per model tag.
    pub models: Vec<(String, i64)>,
    pub dimensions: Vec<usize>,
    /// Ids whose stored embedding cannot be decoded.
    pub corrupt: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn empty() -> Self {
        Self {
            db_valid: false,
            photos: 0,
            models: Vec::new(),
            dimensions: Vec::new(),
            corrupt: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Schema intact and every record readable.
    pub fn is_healthy(&self) -> bool {
        self.db_valid && self.errors.is_empty()
    }
}

/// Validate the store under `data_dir` without modifying it.
pub fn validate(data_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::empty();

    let db_path = data_dir.join("vectordb").join(DB_FILE);
    if !db_path.exists() {
        report
            .errors
            .push(format!("Database not found: {}", db_path.display()));
        return report;
    }

    let conn = match Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("Failed to open database: {}", e));
            return report;
        }
    };

    match table_exists(&conn, "images") {
        Ok(true) => {}
        Ok(false) => {
            report.errors.push("Missing required table: images".into());
            return report;
        }
        Err(e) => {
            report.errors.push(format!("Error checking table images: {}", e));
            return report;
        }
    }

    let columns = get_column_names(&conn, "images");
    for col in ["id", "location", "embedding", "dim", "model", "indexed_at"] {
        if !columns.iter().any(|c| c == col) {
            report
                .errors
                .push(format!("images table missing column: {}", col));
        }
    }
    if !report.errors.is_empty() {
        return report;
    }
    report.db_valid = true;

    if let Err(e) = scan_records(&conn, &mut report) {
        report.errors.push(format!("Failed to scan records: {}", e));
    }

    if report.models.len() > 1 {
        report.warnings.push(format!(
            "{} model tags present; photos from different models are not comparable",
            report.models.len()
        ));
    }
    if !report.corrupt.is_empty() {
        report.errors.push(format!(
            "{} records have corrupt embeddings; re-index them",
            report.corrupt.len()
        ));
    }

    if report.is_healthy() {
        info!("Store validated: {} photos", report.photos);
    } else {
        error!("Store validation failed: {} errors", report.errors.len());
    }
    report
}

fn scan_records(conn: &Connection, report: &mut ValidationReport) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("SELECT id, embedding, dim, model FROM images ORDER BY id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        let dim: i64 = row.get(2)?;
        let model: String = row.get(3)?;
        report.photos += 1;

        match decode_f32_le(&blob) {
            Some(v) if v.len() as i64 == dim && v.iter().all(|x| x.is_finite()) => {
                if !report.dimensions.contains(&v.len()) {
                    report.dimensions.push(v.len());
                }
            }
            _ => report.corrupt.push(id),
        }

        match report.models.iter_mut().find(|(m, _)| *m == model) {
            Some((_, n)) => *n += 1,
            None => report.models.push((model, 1)),
        }
    }
    report.dimensions.sort_unstable();
    Ok(())
}

/// Print a validation report to stdout.
pub fn print_report(report: &ValidationReport) {
    println!("=== PhotoSim Store Report ===");
    println!();
    println!("Database valid:     {}", if report.db_valid { "YES" } else { "NO" });
    println!("Photos:             {}", report.photos);
    println!("Dimensions:         {:?}", report.dimensions);
    for (model, n) in &report.models {
        println!("Model {:<13} {}", format!("{}:", model), n);
    }
    println!("Corrupt records:    {}", report.corrupt.len());

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
        for id in report.corrupt.iter().take(20) {
            println!("  - corrupt: {}", id);
        }
    }

    println!();
    if report.is_healthy() {
        println!("Status: OK");
    } else {
        println!("Status: INVALID");
    }
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn get_column_names(conn: &Connection, table: &str) -> Vec<String> {
    let sql = format!("PRAGMA table_info({})", table);
    let Ok(mut stmt) = conn.prepare(&sql) else {
        return Vec::new();
    };
    stmt.query_map([], |row| row.get::<_, String>(1))
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}
