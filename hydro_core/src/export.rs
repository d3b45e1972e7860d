//! Snapshot export.
//!
//! Writes the session's readings, daily totals or the full dashboard to a
//! file on demand. Nothing here is ever read back. Files are written to a
//! temp file in the destination directory and renamed into place.

use crate::ledger::Ledger;
use crate::tracker::Dashboard;
use crate::{DailyBucket, Error, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// What a file name asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// `timestamp,intake_ml` per reading
    Readings,
    /// `day,ml` per calendar day
    Daily,
    /// Pretty-printed dashboard snapshot
    Json,
}

impl ExportFormat {
    /// `.json` gives JSON, `*daily.csv` gives daily totals, any other `.csv`
    /// gives raw readings.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("json") => Ok(ExportFormat::Json),
            Some("csv") => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if stem.ends_with("daily") {
                    Ok(ExportFormat::Daily)
                } else {
                    Ok(ExportFormat::Readings)
                }
            }
            _ => Err(Error::Other(format!(
                "Cannot export to {:?}: use a .csv or .json file name",
                path
            ))),
        }
    }
}

#[derive(Serialize)]
struct ReadingRow {
    timestamp: String,
    intake_ml: u32,
}

#[derive(Serialize)]
struct DailyRow {
    day: String,
    ml: u32,
}

/// File name for an export started at `now`
pub fn default_file_name(now: DateTime<Local>) -> String {
    format!("hydro-{}.csv", now.format("%Y%m%d-%H%M%S"))
}

pub fn write_readings_csv(ledger: &Ledger, path: &Path) -> Result<()> {
    write_atomically(path, |file| {
        let mut writer = headerless(file);
        writer.write_record(["timestamp", "intake_ml"])?;
        for reading in ledger.readings() {
            writer.serialize(ReadingRow {
                timestamp: reading.timestamp.to_rfc3339(),
                intake_ml: reading.intake_ml,
            })?;
        }
        writer.flush()?;
        Ok(())
    })?;
    tracing::info!("Exported {} readings to {:?}", ledger.len(), path);
    Ok(())
}

pub fn write_daily_csv(buckets: &[DailyBucket], path: &Path) -> Result<()> {
    write_atomically(path, |file| {
        let mut writer = headerless(file);
        writer.write_record(["day", "ml"])?;
        for bucket in buckets {
            writer.serialize(DailyRow {
                day: bucket.day_key(),
                ml: bucket.ml,
            })?;
        }
        writer.flush()?;
        Ok(())
    })?;
    tracing::info!("Exported {} daily totals to {:?}", buckets.len(), path);
    Ok(())
}

pub fn write_json(dashboard: &Dashboard, path: &Path) -> Result<()> {
    write_atomically(path, |file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, dashboard)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    })?;
    tracing::info!("Exported dashboard to {:?}", path);
    Ok(())
}

/// Write whichever format `path` names
pub fn export(ledger: &Ledger, dashboard: &Dashboard, path: &Path) -> Result<ExportFormat> {
    let format = ExportFormat::from_path(path)?;
    match format {
        ExportFormat::Readings => write_readings_csv(ledger, path)?,
        ExportFormat::Daily => write_daily_csv(&dashboard.daily, path)?,
        ExportFormat::Json => write_json(dashboard, path)?,
    }
    Ok(format)
}

/// Header row is written by hand so empty exports still carry it
fn headerless(file: &File) -> csv::Writer<&File> {
    csv::WriterBuilder::new().has_headers(false).from_writer(file)
}

fn write_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let temp = NamedTempFile::new_in(&dir)?;
    fill(temp.as_file())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tracker::Tracker;
    use crate::transport::scripted::ScriptedTransport;
    use crate::IntakeReading;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.append(IntakeReading::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            100,
        ));
        ledger.append(IntakeReading::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            250,
        ));
        ledger
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/today.CSV")).unwrap(),
            ExportFormat::Readings
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("may-daily.csv")).unwrap(),
            ExportFormat::Daily
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("snapshot.json")).unwrap(),
            ExportFormat::Json
        );
        assert!(ExportFormat::from_path(Path::new("notes.txt")).is_err());
        assert!(ExportFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_readings_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("readings.csv");

        write_readings_csv(&sample_ledger(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["timestamp", "intake_ml"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "2024-05-01T08:00:00+00:00");
        assert_eq!(&rows[1][1], "250");
    }

    #[test]
    fn test_daily_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("daily.csv");
        let buckets = vec![
            DailyBucket {
                day: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                ml: 250,
            },
            DailyBucket {
                day: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                ml: 80,
            },
        ];

        write_daily_csv(&buckets, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "day,ml\n2024-05-01,250\n2024-05-02,80\n");
    }

    #[test]
    fn test_export_json_snapshot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("snapshot.json");
        let tracker = Tracker::new(ScriptedTransport::new(), &Config::default())
            .with_ledger(sample_ledger());
        let dashboard = tracker.dashboard();

        let format = export(tracker.ledger(), &dashboard, &path).unwrap();

        assert_eq!(format, ExportFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["intake_ml"], 250);
        assert_eq!(value["goal"]["goal_ml"], 2450);
        assert_eq!(value["state"]["state"], "disconnected");
        assert_eq!(value["readings"], 2);
        assert_eq!(value["goal"]["goal_reached"], false);
        assert_eq!(value["history"]["highest_ml"], 250);
        assert_eq!(value["history"]["total_records"], 2);
    }

    #[test]
    fn test_export_replaces_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("readings.csv");
        std::fs::write(&path, "stale contents").unwrap();

        write_readings_csv(&Ledger::new(), &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "timestamp,intake_ml\n");
    }

    #[test]
    fn test_default_file_name() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 7, 5, 9).unwrap();
        assert_eq!(default_file_name(now), "hydro-20240501-070509.csv");
    }
}
