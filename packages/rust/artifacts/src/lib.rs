//! Export files: timestamped JSON + CSV of the final grant set.
//!
//! Every file is written atomically: content goes to `.{name}.tmp` in the
//! target directory, then is renamed into place.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use grantscout_shared::{Complexity, GrantField, GrantRecord, GrantScoutError, NOT_FOUND, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Per-stage counts recorded in the JSON export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportCounts {
    pub pages_crawled: usize,
    pub chunks_extracted: usize,
    pub chunks_failed: usize,
    pub records_extracted: usize,
    pub records_from_feeds: usize,
    pub records_in_scope: usize,
    pub duplicates_dropped: usize,
    pub records_exported: usize,
}

/// Run metadata written alongside the grants.
#[derive(Debug, Clone)]
pub struct ExportMeta {
    /// `YYYYMMDD_HHMMSS`, used in filenames.
    pub run_timestamp: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub seeds: Vec<String>,
    pub feeds: Vec<String>,
    pub model: Option<String>,
    pub counts: ExportCounts,
}

/// Where an export landed.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub json_sha256: String,
    pub csv_sha256: String,
}

#[derive(Serialize)]
struct ExportSources<'a> {
    seeds: &'a [String],
    feeds: &'a [String],
    model: Option<&'a str>,
    counts: &'a ExportCounts,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    extraction_timestamp: String,
    sources: ExportSources<'a>,
    grants: &'a [GrantRecord],
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Write `grants_{ts}.json` and `grants_{ts}.csv` into `output_dir`.
#[instrument(skip_all, fields(output_dir = %output_dir.display(), grants = records.len()))]
pub fn export(records: &[GrantRecord], output_dir: &Path, meta: &ExportMeta) -> Result<ExportPaths> {
    std::fs::create_dir_all(output_dir).map_err(|e| GrantScoutError::io(output_dir, e))?;

    let doc = ExportDocument {
        extraction_timestamp: meta.extraction_timestamp.to_rfc3339(),
        sources: ExportSources {
            seeds: &meta.seeds,
            feeds: &meta.feeds,
            model: meta.model.as_deref(),
            counts: &meta.counts,
        },
        grants: records,
    };
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|e| GrantScoutError::Conversion(format!("JSON export failed: {e}")))?;
    let csv = grants_to_csv(records)?;

    let json_path = output_dir.join(format!("grants_{}.json", meta.run_timestamp));
    let csv_path = output_dir.join(format!("grants_{}.csv", meta.run_timestamp));

    write_atomic(&json_path, json.as_bytes())?;
    write_atomic(&csv_path, csv.as_bytes())?;

    let paths = ExportPaths {
        json_sha256: sha256_hex(json.as_bytes()),
        csv_sha256: sha256_hex(csv.as_bytes()),
        json: json_path,
        csv: csv_path,
    };

    info!(
        json = %paths.json.display(),
        csv = %paths.csv.display(),
        csv_sha256 = %paths.csv_sha256,
        "export written"
    );
    Ok(paths)
}

/// Write `content` to `path` via a same-directory temp file and rename.
/// A failed write or rename removes the temp file.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let filename = path
        .file_name()
        .ok_or_else(|| GrantScoutError::validation(format!("not a file path: {}", path.display())))?
        .to_string_lossy();
    let temp = dir.join(format!(".{filename}.tmp"));

    let result = std::fs::write(&temp, content)
        .map_err(|e| GrantScoutError::io(&temp, e))
        .and_then(|()| std::fs::rename(&temp, path).map_err(|e| GrantScoutError::io(path, e)));

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    if result.is_ok() {
        debug!(path = %path.display(), bytes = content.len(), "file written");
    }
    result
}

/// Pretty JSON written atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| GrantScoutError::Conversion(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, json.as_bytes())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Render grants as CSV: the 11 headers in fixed order, RFC 4180 quoting.
pub fn grants_to_csv(records: &[GrantRecord]) -> Result<String> {
    let rows: Vec<Vec<&str>> = records.iter().map(|r| r.to_row().to_vec()).collect();
    render_csv(&GrantField::headers(), &rows)
}

/// Write an arbitrary table as CSV, atomically.
pub fn write_table<S: AsRef<str>>(path: &Path, headers: &[&str], rows: &[Vec<S>]) -> Result<()> {
    let csv = render_csv(headers, rows)?;
    write_atomic(path, csv.as_bytes())
}

fn render_csv<S: AsRef<str>>(headers: &[&str], rows: &[Vec<S>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(headers)
        .map_err(|e| GrantScoutError::Conversion(format!("CSV write failed: {e}")))?;
    for row in rows {
        writer
            .write_record(row.iter().map(AsRef::<str>::as_ref))
            .map_err(|e| GrantScoutError::Conversion(format!("CSV write failed: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| GrantScoutError::Conversion(format!("CSV flush failed: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| GrantScoutError::Conversion(format!("CSV is not UTF-8: {e}")))
}

/// Read an exported grants CSV back into records.
pub fn read_grants_csv(path: &Path) -> Result<Vec<GrantRecord>> {
    let file = std::fs::File::open(path).map_err(|e| GrantScoutError::io(path, e))?;
    parse_grants_csv(file)
}

/// Parse grants CSV from any reader.
///
/// Columns are matched by header name, so order does not matter and unknown
/// columns (such as `Expired`) are ignored. `Grant Name` is required; any
/// other missing column, and every blank cell, reads as "not found".
pub fn parse_grants_csv<R: Read>(reader: R) -> Result<Vec<GrantRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| GrantScoutError::parse(format!("CSV header: {e}")))?
        .clone();

    let columns: Vec<(GrantField, usize)> = GrantField::ALL
        .into_iter()
        .filter_map(|field| {
            headers
                .iter()
                .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(field.header()))
                .map(|idx| (field, idx))
        })
        .collect();

    if !columns.iter().any(|(f, _)| *f == GrantField::GrantName) {
        return Err(GrantScoutError::validation("CSV has no 'Grant Name' column"));
    }

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| GrantScoutError::parse(format!("CSV row {}: {e}", line + 2)))?;
        let mut record = GrantRecord::default();

        for (field, idx) in &columns {
            let value = row.get(*idx).unwrap_or("").trim();
            if value.is_empty() {
                continue;
            }
            if *field == GrantField::LevelOfComplexity {
                record.level_of_complexity = Complexity::parse(value)
                    .or_else(|| Complexity::infer(value))
                    .unwrap_or_default();
            } else {
                let _ = record.set(*field, value);
            }
        }

        if record.grant_name == NOT_FOUND && row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        records.push(record);
    }

    Ok(records)
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gs-artifacts-test-{}", Uuid::now_v7()))
    }

    fn grant(name: &str) -> GrantRecord {
        GrantRecord {
            grant_name: name.into(),
            administering_body: "Department of Health, Disability and Ageing".into(),
            grant_purpose: "Support \"digital health\" pilots,\nstate-wide".into(),
            application_deadline: "31 March 2025 (5pm AEST)".into(),
            funding_amount: "AUD $50,000".into(),
            level_of_complexity: Complexity::Moderate,
            ..GrantRecord::default()
        }
    }

    fn meta() -> ExportMeta {
        ExportMeta {
            run_timestamp: "20250701_093000".into(),
            extraction_timestamp: Utc::now(),
            seeds: vec!["https://www.health.gov.au/grants".into()],
            feeds: vec!["grantconnect".into()],
            model: Some("openai/gpt-4o-mini".into()),
            counts: ExportCounts {
                records_exported: 2,
                ..Default::default()
            },
        }
    }

    #[test]
    fn export_writes_timestamped_json_and_csv() {
        let dir = temp_dir();
        let records = vec![grant("Health Grant"), grant("AI Grant")];

        let paths = export(&records, &dir, &meta()).unwrap();
        assert_eq!(paths.json.file_name().unwrap(), "grants_20250701_093000.json");
        assert_eq!(paths.csv.file_name().unwrap(), "grants_20250701_093000.csv");
        assert_eq!(paths.csv_sha256.len(), 64);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert!(json["extraction_timestamp"].is_string());
        assert_eq!(json["sources"]["feeds"][0], "grantconnect");
        assert_eq!(json["sources"]["counts"]["records_exported"], 2);
        assert_eq!(json["grants"][1]["Grant Name"], "AI Grant");
        assert_eq!(json["grants"][0]["Co-contribution Requirements"], "not found");
        assert_eq!(json["grants"][0]["Level of Complexity"], "Moderate");

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn csv_header_order_is_fixed() {
        let csv = grants_to_csv(&[]).unwrap();
        assert_eq!(
            csv.trim_end(),
            "Grant Name,Administering Body,Grant Purpose,Application Deadline,Funding Amount,\
             Co-contribution Requirements,Eligibility Criteria,Assessment Criteria,\
             Application Complexity,Web Link,Level of Complexity"
        );
    }

    #[test]
    fn csv_round_trip_preserves_fields() {
        let dir = temp_dir();
        let records = vec![grant("Health Grant"), grant("Research, Innovation & AI")];

        let paths = export(&records, &dir, &meta()).unwrap();
        let back = read_grants_csv(&paths.csv).unwrap();
        assert_eq!(back, records);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn csv_reader_ignores_expired_and_reordered_columns() {
        let data = "Expired,Web Link,Grant Name,Level of Complexity\n\
                    TRUE,https://example.gov.au/g,Closed Grant,Very Complex,\n\
                    FALSE,,Open Grant,\n";
        let records = parse_grants_csv(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].grant_name, "Closed Grant");
        assert_eq!(records[0].web_link, "https://example.gov.au/g");
        assert_eq!(records[0].level_of_complexity, Complexity::VeryComplex);
        assert_eq!(records[1].web_link, NOT_FOUND);
        assert_eq!(records[1].administering_body, NOT_FOUND);
    }

    #[test]
    fn csv_without_grant_name_rejected() {
        let err = parse_grants_csv("Title,Body\nx,y\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Grant Name"));
    }

    #[test]
    fn write_table_is_atomic_and_quoted() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("table.csv");

        write_table(&path, &["A", "B"], &[vec!["1, 2".to_string(), "plain".to_string()]]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "A,B\n\"1, 2\",plain\n");
        assert!(!dir.join(".table.csv.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_atomic_failure_leaves_no_temp() {
        let dir = temp_dir();
        std::fs::create_dir_all(dir.join("occupied")).unwrap();

        // Renaming a file over a non-empty directory fails.
        std::fs::write(dir.join("occupied").join("x"), "x").unwrap();
        let result = write_atomic(&dir.join("occupied"), b"data");
        assert!(result.is_err());
        assert!(!dir.join(".occupied.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
