use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use taxy::{RideHistory, RideRecord};

pub const CSV_COLUMNS: [&str; 14] = [
    "ride_id",
    "started_at",
    "completed_at",
    "pickup_location",
    "dropoff_location",
    "distance_miles",
    "duration",
    "total_due",
    "currency",
    "license_plate",
    "pickup_lat",
    "pickup_lng",
    "dropoff_lat",
    "dropoff_lng",
];

/// Both output names carry the same timestamp so one run's pair sorts and
/// reads together.
pub fn export_paths(dir: &Path, now: DateTime<Local>) -> (PathBuf, PathBuf) {
    let stamp = now.format("%Y%m%d_%H%M%S");
    (
        dir.join(format!("robotaxi_history_{stamp}.csv")),
        dir.join(format!("robotaxi_history_{stamp}.json")),
    )
}

pub fn write_csv(records: &[RideRecord], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).wrap_err_with(|| format!("cannot write {}", path.display()))?;

    writer
        .write_record(CSV_COLUMNS)
        .wrap_err_with(|| format!("cannot write {}", path.display()))?;
    for record in records {
        writer
            .write_record(csv_row(record))
            .wrap_err_with(|| format!("cannot write {}", path.display()))?;
    }
    writer
        .flush()
        .wrap_err_with(|| format!("cannot write {}", path.display()))
}

/// The raw per-ride payload, untouched, for when the typed columns turn out
/// to have dropped something someone needed.
pub fn write_json(history: &RideHistory, path: &Path) -> Result<()> {
    let file =
        File::create(path).wrap_err_with(|| format!("cannot write {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &history.raw)
        .wrap_err_with(|| format!("cannot write {}", path.display()))
}

fn csv_row(record: &RideRecord) -> [String; 14] {
    [
        text(&record.ride_id),
        timestamp(&record.ride_started_at),
        timestamp(&record.ride_completed_at),
        text(&record.pickup_location_name),
        text(&record.dropoff_location_name),
        number(record.total_distance_miles),
        duration(record.total_duration_seconds),
        number(record.total_due),
        text(&record.currency_code),
        text(&record.license_plate),
        number(record.pickup_location_latitude),
        number(record.pickup_location_longitude),
        number(record.dropoff_location_latitude),
        number(record.dropoff_location_longitude),
    ]
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn timestamp(value: &Option<String>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => parsed.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => value.clone(),
    }
}

fn duration(seconds: Option<i64>) -> String {
    let Some(seconds) = seconds else {
        return String::new();
    };
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
