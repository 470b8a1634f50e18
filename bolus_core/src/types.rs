//! Core domain types for the autobolus engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Glucose readings, units and trend tags
//! - Dosing profiles and their Nightscout-style snapshots
//! - Insulin-on-board entries and activity events
//! - Dosing decisions and the circadian curve
//!
//! All glucose values inside the engine are mmol/L. Conversion from mg/dL
//! happens once, where data enters the crate.

use crate::{Error, Result};
use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Glucose Units
// ============================================================================

/// mg/dL per mmol/L
pub const MGDL_PER_MMOL: f64 = 18.0;

pub fn mgdl_to_mmol(mgdl: f64) -> f64 {
    mgdl / MGDL_PER_MMOL
}

pub fn mmol_to_mgdl(mmol: f64) -> f64 {
    mmol * MGDL_PER_MMOL
}

/// Unit a profile's glucose-valued fields are expressed in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GlucoseUnits {
    #[serde(rename = "mg/dl", alias = "mg/dL", alias = "mgdl")]
    MgDl,
    #[default]
    #[serde(rename = "mmol", alias = "mmol/L", alias = "mmol/l")]
    Mmol,
}

impl GlucoseUnits {
    /// Convert a value in these units to mmol/L
    pub fn to_mmol(self, value: f64) -> f64 {
        match self {
            GlucoseUnits::MgDl => mgdl_to_mmol(value),
            GlucoseUnits::Mmol => value,
        }
    }
}

// ============================================================================
// Glucose Readings
// ============================================================================

/// Qualitative rate-of-change tag attached to a CGM reading
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum TrendDirection {
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    #[default]
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    NotComputable,
    RateOutOfRange,
    /// Any tag this crate does not know by name
    Other(String),
}

impl TrendDirection {
    /// Whether the tag indicates a falling glucose value.
    ///
    /// Any tag containing "Down" counts, including unknown ones.
    pub fn is_falling(&self) -> bool {
        match self {
            TrendDirection::FortyFiveDown
            | TrendDirection::SingleDown
            | TrendDirection::DoubleDown => true,
            TrendDirection::Other(tag) => tag.contains("Down"),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrendDirection::DoubleUp => "DoubleUp",
            TrendDirection::SingleUp => "SingleUp",
            TrendDirection::FortyFiveUp => "FortyFiveUp",
            TrendDirection::Flat => "Flat",
            TrendDirection::FortyFiveDown => "FortyFiveDown",
            TrendDirection::SingleDown => "SingleDown",
            TrendDirection::DoubleDown => "DoubleDown",
            TrendDirection::NotComputable => "NOT COMPUTABLE",
            TrendDirection::RateOutOfRange => "RATE OUT OF RANGE",
            TrendDirection::Other(tag) => tag,
        }
    }
}

impl From<&str> for TrendDirection {
    fn from(tag: &str) -> Self {
        match tag {
            "DoubleUp" => TrendDirection::DoubleUp,
            "SingleUp" => TrendDirection::SingleUp,
            "FortyFiveUp" => TrendDirection::FortyFiveUp,
            "Flat" => TrendDirection::Flat,
            "FortyFiveDown" => TrendDirection::FortyFiveDown,
            "SingleDown" => TrendDirection::SingleDown,
            "DoubleDown" => TrendDirection::DoubleDown,
            "NOT COMPUTABLE" | "NotComputable" => TrendDirection::NotComputable,
            "RATE OUT OF RANGE" | "RateOutOfRange" => TrendDirection::RateOutOfRange,
            other => TrendDirection::Other(other.to_string()),
        }
    }
}

impl From<String> for TrendDirection {
    fn from(tag: String) -> Self {
        TrendDirection::from(tag.as_str())
    }
}

impl From<TrendDirection> for String {
    fn from(trend: TrendDirection) -> Self {
        trend.as_str().to_string()
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recent CGM reading, already converted to mmol/L
#[derive(Clone, Debug, PartialEq)]
pub struct GlucoseReading {
    pub value_mmol: f64,
    pub timestamp: DateTime<Utc>,
    /// Absent trend is treated as `Flat`
    pub trend: Option<TrendDirection>,
}

impl GlucoseReading {
    pub fn trend_or_default(&self) -> TrendDirection {
        self.trend.clone().unwrap_or_default()
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// The three values the dose computation reads from a profile (mmol/L based)
#[derive(Clone, Debug, PartialEq)]
pub struct DosingProfile {
    /// Glucose drop per unit of insulin
    pub sensitivity_factor: f64,
    /// Grams of carbohydrate offset by one unit
    pub carb_ratio: f64,
    /// Glucose value above which correction triggers
    pub target_high: f64,
}

impl DosingProfile {
    /// Reject non-positive or non-finite sensitivity and carb ratio
    pub fn validate(&self) -> Result<()> {
        if !(self.sensitivity_factor.is_finite() && self.sensitivity_factor > 0.0) {
            return Err(Error::Config(format!(
                "sensitivity factor must be positive, got {}",
                self.sensitivity_factor
            )));
        }
        if !(self.carb_ratio.is_finite() && self.carb_ratio > 0.0) {
            return Err(Error::Config(format!(
                "carb ratio must be positive, got {}",
                self.carb_ratio
            )));
        }
        if !self.target_high.is_finite() {
            return Err(Error::Config("target_high must be a finite number".into()));
        }
        Ok(())
    }
}

/// One entry of a time-of-day schedule (`sens`, `carbratio`, `target_high`)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// A named profile inside a snapshot's store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfileStore {
    #[serde(default)]
    pub units: Option<GlucoseUnits>,
    #[serde(default)]
    pub sens: Vec<ScheduleEntry>,
    #[serde(default)]
    pub carbratio: Vec<ScheduleEntry>,
    #[serde(default)]
    pub target_high: Vec<ScheduleEntry>,
}

/// A profile snapshot as uploaded by the looping system
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfileSnapshot {
    /// Activation time in epoch milliseconds
    pub mills: i64,
    #[serde(default)]
    pub store: HashMap<String, ProfileStore>,
}

// ============================================================================
// Insulin on Board and Activity
// ============================================================================

/// A delivered dose. Entries are only ever appended and trimmed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IobEntry {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub insulin: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Exercise,
    Steps,
}

/// Exercise session or step-count sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActivityEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub kind: ActivityKind,
    /// Step count, only meaningful for `Steps`
    #[serde(default)]
    pub count: Option<u32>,
}

impl ActivityEvent {
    pub fn exercise(time: DateTime<Utc>) -> Self {
        Self {
            time,
            kind: ActivityKind::Exercise,
            count: None,
        }
    }

    pub fn steps(time: DateTime<Utc>, count: u32) -> Self {
        Self {
            time,
            kind: ActivityKind::Steps,
            count: Some(count),
        }
    }
}

// ============================================================================
// Decisions and Curves
// ============================================================================

/// A dose the engine decided to give
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DosingDecision {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub insulin_units: f64,
    pub event_type: String,
    pub rationale: String,
    /// True when the dose was reduced to fit the remaining IOB headroom
    pub capped: bool,
}

impl DosingDecision {
    /// The IOB entry recorded once delivery is confirmed
    pub fn to_iob_entry(&self) -> IobEntry {
        IobEntry {
            time: self.timestamp,
            insulin: self.insulin_units,
        }
    }
}

/// Hour-of-day multipliers for hepatic glucose release, index = hour
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CircadianCurve([f64; 24]);

impl CircadianCurve {
    pub const HOURS: usize = 24;

    /// Build a curve from exactly 24 finite multipliers
    pub fn new(values: Vec<f64>) -> Result<Self> {
        let len = values.len();
        let values: [f64; 24] = values.try_into().map_err(|_| {
            Error::Config(format!(
                "circadian curve must have {} values, got {}",
                Self::HOURS,
                len
            ))
        })?;

        if let Some(hour) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::Config(format!(
                "circadian curve value at hour {} is not a finite number",
                hour
            )));
        }

        Ok(Self(values))
    }

    /// A curve of all ones (no circadian modulation)
    pub fn flat() -> Self {
        Self([1.0; 24])
    }

    /// Multiplier for an hour in 0..=23
    pub fn at(&self, hour: u32) -> Option<f64> {
        self.0.get(hour as usize).copied()
    }

    pub fn values(&self) -> &[f64; 24] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for CircadianCurve {
    type Error = Error;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::new(values)
    }
}

impl<'de> Deserialize<'de> for CircadianCurve {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = Vec::<f64>::deserialize(deserializer)?;
        CircadianCurve::new(values).map_err(serde::de::Error::custom)
    }
}

/// Evaluation instant of a cycle.
///
/// `local_hour` is the caller's wall-clock hour; no timezone normalization
/// happens inside the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleClock {
    pub now: DateTime<Utc>,
    pub local_hour: u32,
}

impl CycleClock {
    pub fn new(now: DateTime<Utc>, local_hour: u32) -> Self {
        Self { now, local_hour }
    }

    /// Clock for the current instant in the system's local timezone
    pub fn local_now() -> Self {
        let local = Local::now();
        Self {
            now: local.with_timezone(&Utc),
            local_hour: local.hour(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_falling_tags() {
        assert!(TrendDirection::DoubleDown.is_falling());
        assert!(TrendDirection::FortyFiveDown.is_falling());
        assert!(TrendDirection::from("SlightlyDown").is_falling());
        assert!(!TrendDirection::Flat.is_falling());
        assert!(!TrendDirection::DoubleUp.is_falling());
        assert!(!TrendDirection::NotComputable.is_falling());
    }

    #[test]
    fn test_absent_trend_defaults_to_flat() {
        let reading = GlucoseReading {
            value_mmol: 8.0,
            timestamp: Utc::now(),
            trend: None,
        };
        assert_eq!(reading.trend_or_default(), TrendDirection::Flat);
    }

    #[test]
    fn test_trend_serde_uses_nightscout_tags() {
        let trend: TrendDirection = serde_json::from_str("\"NOT COMPUTABLE\"").unwrap();
        assert_eq!(trend, TrendDirection::NotComputable);
        assert_eq!(
            serde_json::to_string(&TrendDirection::SingleDown).unwrap(),
            "\"SingleDown\""
        );
    }

    #[test]
    fn test_circadian_curve_requires_24_values() {
        assert!(CircadianCurve::new(vec![1.0; 24]).is_ok());
        assert!(matches!(
            CircadianCurve::new(vec![1.0; 23]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            serde_json::from_str::<CircadianCurve>("[1.0, 2.0]"),
            Err(_)
        ));
    }

    #[test]
    fn test_circadian_curve_rejects_nan() {
        let mut values = vec![1.0; 24];
        values[7] = f64::NAN;
        assert!(matches!(CircadianCurve::new(values), Err(Error::Config(_))));
    }

    #[test]
    fn test_profile_units_conversion() {
        assert!((GlucoseUnits::MgDl.to_mmol(180.0) - 10.0).abs() < 1e-12);
        assert_eq!(GlucoseUnits::Mmol.to_mmol(9.0), 9.0);
        let units: GlucoseUnits = serde_json::from_str("\"mg/dl\"").unwrap();
        assert_eq!(units, GlucoseUnits::MgDl);
    }

    #[test]
    fn test_iob_entry_time_is_epoch_millis() {
        let entry: IobEntry =
            serde_json::from_str(r#"{"time": 1700000000000, "insulin": 0.3}"#).unwrap();
        assert_eq!(entry.time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(entry.insulin, 0.3);
    }

    #[test]
    fn test_profile_validation() {
        let profile = DosingProfile {
            sensitivity_factor: 2.0,
            carb_ratio: 10.0,
            target_high: 9.0,
        };
        assert!(profile.validate().is_ok());

        let bad = DosingProfile {
            sensitivity_factor: 0.0,
            ..profile.clone()
        };
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let bad = DosingProfile {
            carb_ratio: -1.0,
            ..profile
        };
        assert!(matches!(bad.validate(), Err(Error::Config(_))));
    }
}
