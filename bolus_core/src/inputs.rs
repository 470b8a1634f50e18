//! Loaders for the JSON input files.
//!
//! Glucose values arrive in mg/dL and are converted to mmol/L here, so the
//! rest of the crate only sees one unit.

use crate::{
    mgdl_to_mmol, ActivityEvent, CircadianCurve, Error, GlucoseReading, ProfileSnapshot, Result,
    TrendDirection,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// CGM entry as written by the uploader (newest first)
#[derive(Debug, Deserialize)]
struct SgvEntry {
    sgv: f64,
    #[serde(default)]
    direction: Option<String>,
    /// Epoch milliseconds
    #[serde(default)]
    date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ExerciseEntry {
    time: i64,
}

#[derive(Debug, Deserialize)]
struct StepsEntry {
    time: i64,
    steps: u32,
}

#[derive(Debug, Deserialize)]
struct CircadianFile {
    sinus: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ProjectionStartFile {
    /// mg/dL
    start: f64,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Other(format!("timestamp out of range: {}", ms)))
}

/// Most recent reading from `sgv.json`.
///
/// Readings without a `date` are stamped with `now`.
pub fn load_latest_reading(path: &Path, now: DateTime<Utc>) -> Result<GlucoseReading> {
    let entries: Vec<SgvEntry> = read_json(path)?;
    let latest = entries
        .into_iter()
        .next()
        .ok_or_else(|| Error::Other(format!("no glucose readings in {:?}", path)))?;

    let timestamp = match latest.date {
        Some(ms) => millis(ms)?,
        None => now,
    };

    let reading = GlucoseReading {
        value_mmol: mgdl_to_mmol(latest.sgv),
        timestamp,
        trend: latest.direction.map(TrendDirection::from),
    };
    tracing::debug!(
        "Latest reading {:.1} mmol/L ({:?}) at {}",
        reading.value_mmol,
        reading.trend,
        reading.timestamp
    );
    Ok(reading)
}

/// Profile snapshots from `profile.json`. A missing file yields none.
pub fn load_profiles(path: &Path) -> Result<Vec<ProfileSnapshot>> {
    if !path.exists() {
        tracing::warn!("No profile file found at {:?}", path);
        return Ok(Vec::new());
    }
    let snapshots: Vec<ProfileSnapshot> = read_json(path)?;
    tracing::debug!("Loaded {} profile snapshots", snapshots.len());
    Ok(snapshots)
}

/// Exercise sessions from `exercise.json` for the dosing path.
///
/// A missing file means no exercise. A file that is present but cannot be
/// parsed is a configuration error: dropping a session would remove the
/// sensitivity boost and raise the dose.
pub fn load_exercise(path: &Path) -> Result<Vec<ActivityEvent>> {
    if !path.exists() {
        tracing::debug!("No exercise file found at {:?}", path);
        return Ok(Vec::new());
    }
    let entries: Vec<ExerciseEntry> = read_json(path)
        .map_err(|e| Error::Config(format!("exercise log at {:?} unreadable: {}", path, e)))?;
    let events = entries
        .into_iter()
        .map(|entry| millis(entry.time).map(ActivityEvent::exercise))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| Error::Config(format!("exercise log at {:?}: {}", path, e)))?;

    tracing::debug!("Loaded {} exercise sessions", events.len());
    Ok(events)
}

/// Exercise and step samples for the projection. Missing files are empty,
/// malformed entries are skipped with a warning, and the valid remainder is
/// kept.
pub fn load_activity(exercise_path: &Path, steps_path: &Path) -> Result<Vec<ActivityEvent>> {
    let mut events: Vec<ActivityEvent> = read_tolerant::<ExerciseEntry>(exercise_path)
        .into_iter()
        .filter_map(|entry| millis(entry.time).ok().map(ActivityEvent::exercise))
        .collect();

    events.extend(
        read_tolerant::<StepsEntry>(steps_path)
            .into_iter()
            .filter_map(|entry| {
                millis(entry.time)
                    .ok()
                    .map(|time| ActivityEvent::steps(time, entry.steps))
            }),
    );

    tracing::debug!("Loaded {} activity events", events.len());
    Ok(events)
}

fn read_tolerant<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    if !path.exists() {
        tracing::debug!("No activity file found at {:?}", path);
        return Vec::new();
    }
    let values: Vec<serde_json::Value> = match read_json(path) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!("Failed to read {:?}: {}. Ignoring file.", path, e);
            return Vec::new();
        }
    };

    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping entry {} of {:?}: {}", index, path, e);
                None
            }
        })
        .collect()
}

/// The 24-value curve from `sinuscurves.json`. Any defect is a
/// configuration error.
pub fn load_circadian_curve(path: &Path) -> Result<CircadianCurve> {
    let file: CircadianFile = read_json(path).map_err(|e| {
        Error::Config(format!("circadian curve at {:?} unreadable: {}", path, e))
    })?;
    CircadianCurve::new(file.sinus)
}

/// Projection starting glucose from `sgv_start.json`, in mmol/L
pub fn load_projection_start(path: &Path) -> Result<f64> {
    let file: ProjectionStartFile = read_json(path)?;
    Ok(mgdl_to_mmol(file.start))
}
