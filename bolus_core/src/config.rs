//! Configuration file support for autobolus.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/autobolus/config.toml`,
//! then environment overrides are applied.
//!
//! The liver model and the dose computation read separate variables:
//! `AUTOBOLUS_LIVER_ISF`/`AUTOBOLUS_LIVER_CR` feed only the `liver` command,
//! `AUTOBOLUS_DOSING_ISF`/`AUTOBOLUS_DOSING_CR` (mmol/L) replace the active
//! profile's values. `AUTOBOLUS_API_URL` and `AUTOBOLUS_API_KEY` configure
//! submission.

use crate::{mgdl_to_mmol, Error, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_LIVER_ISF: &str = "AUTOBOLUS_LIVER_ISF";
pub const ENV_LIVER_CR: &str = "AUTOBOLUS_LIVER_CR";
pub const ENV_DOSING_ISF: &str = "AUTOBOLUS_DOSING_ISF";
pub const ENV_DOSING_CR: &str = "AUTOBOLUS_DOSING_CR";
pub const ENV_API_URL: &str = "AUTOBOLUS_API_URL";
pub const ENV_API_KEY: &str = "AUTOBOLUS_API_KEY";

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub dosing: DosingConfig,

    #[serde(default)]
    pub activity: ActivityConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub liver: LiverConfig,

    #[serde(default)]
    pub submission: SubmissionConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Safety bounds and profile selection for the dose computation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DosingConfig {
    /// Maximum insulin on board inside the IOB window, in units
    #[serde(default = "default_iob_cap")]
    pub iob_cap: f64,

    #[serde(default = "default_iob_window_minutes")]
    pub iob_window_minutes: i64,

    #[serde(default = "default_min_dose")]
    pub min_dose: f64,

    #[serde(default = "default_max_dose")]
    pub max_dose: f64,

    /// Glucose must exceed target_high by strictly more than this
    #[serde(default = "default_trigger_delta")]
    pub trigger_delta: f64,

    #[serde(default = "default_profile_max_age_hours")]
    pub profile_max_age_hours: i64,

    #[serde(default = "default_profile_name")]
    pub profile_name: String,

    #[serde(default = "default_event_type")]
    pub event_type: String,

    /// Number of IOB entries kept on disk
    #[serde(default = "default_iob_retention")]
    pub iob_retention: usize,

    /// Replaces the profile's sensitivity factor (mmol/L per U)
    #[serde(default)]
    pub sensitivity_override: Option<f64>,

    /// Replaces the profile's carb ratio (g per U)
    #[serde(default)]
    pub carb_ratio_override: Option<f64>,
}

impl Default for DosingConfig {
    fn default() -> Self {
        Self {
            iob_cap: default_iob_cap(),
            iob_window_minutes: default_iob_window_minutes(),
            min_dose: default_min_dose(),
            max_dose: default_max_dose(),
            trigger_delta: default_trigger_delta(),
            profile_max_age_hours: default_profile_max_age_hours(),
            profile_name: default_profile_name(),
            event_type: default_event_type(),
            iob_retention: default_iob_retention(),
            sensitivity_override: None,
            carb_ratio_override: None,
        }
    }
}

/// Exercise and sleep sensitivity parameters.
///
/// The dosing path looks back `dosing_exercise_window_minutes` for exercise
/// only; the projection path looks back `projection_window_minutes` for
/// exercise or step samples above `step_threshold`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_exercise_multiplier")]
    pub exercise_multiplier: f64,

    #[serde(default = "default_sleep_multiplier")]
    pub sleep_multiplier: f64,

    #[serde(default = "default_sleep_start_hour")]
    pub sleep_start_hour: u32,

    /// Exclusive
    #[serde(default = "default_sleep_end_hour")]
    pub sleep_end_hour: u32,

    #[serde(default = "default_dosing_exercise_window_minutes")]
    pub dosing_exercise_window_minutes: i64,

    #[serde(default = "default_projection_window_minutes")]
    pub projection_window_minutes: i64,

    #[serde(default = "default_step_threshold")]
    pub step_threshold: u32,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            exercise_multiplier: default_exercise_multiplier(),
            sleep_multiplier: default_sleep_multiplier(),
            sleep_start_hour: default_sleep_start_hour(),
            sleep_end_hour: default_sleep_end_hour(),
            dosing_exercise_window_minutes: default_dosing_exercise_window_minutes(),
            projection_window_minutes: default_projection_window_minutes(),
            step_threshold: default_step_threshold(),
        }
    }
}

/// Forward glucose simulation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// mmol/L per U before activity adjustment (50 mg/dL per U)
    #[serde(default = "default_base_sensitivity")]
    pub base_sensitivity: f64,

    #[serde(default = "default_projection_carb_ratio")]
    pub carb_ratio: f64,

    /// Hepatic glucose release in grams per hour
    #[serde(default = "default_hourly_carb_impact")]
    pub hourly_carb_impact: f64,

    #[serde(default = "default_horizon_minutes")]
    pub horizon_minutes: u32,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            base_sensitivity: default_base_sensitivity(),
            carb_ratio: default_projection_carb_ratio(),
            hourly_carb_impact: default_hourly_carb_impact(),
            horizon_minutes: default_horizon_minutes(),
            interval_minutes: default_interval_minutes(),
        }
    }
}

/// Inputs of the standalone hepatic infusion report, in the units of the
/// `sinuscurves.json` pipeline (mg/dL per U). Never used for dosing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LiverConfig {
    #[serde(default)]
    pub sensitivity: Option<f64>,

    #[serde(default)]
    pub carb_ratio: Option<f64>,
}

/// Remote dosing-log endpoint. The API key is never read from or written
/// to the config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            timeout_seconds: default_timeout_seconds(),
            api_key: None,
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("autobolus")
}

fn default_iob_cap() -> f64 {
    1.5
}

fn default_iob_window_minutes() -> i64 {
    60
}

fn default_min_dose() -> f64 {
    0.05
}

fn default_max_dose() -> f64 {
    0.3
}

fn default_trigger_delta() -> f64 {
    0.5
}

fn default_profile_max_age_hours() -> i64 {
    24
}

fn default_profile_name() -> String {
    "OpenAPS Autosync".into()
}

fn default_event_type() -> String {
    "Auto Correction".into()
}

fn default_iob_retention() -> usize {
    50
}

fn default_exercise_multiplier() -> f64 {
    1.3
}

fn default_sleep_multiplier() -> f64 {
    0.8
}

fn default_sleep_start_hour() -> u32 {
    0
}

fn default_sleep_end_hour() -> u32 {
    6
}

fn default_dosing_exercise_window_minutes() -> i64 {
    120
}

fn default_projection_window_minutes() -> i64 {
    60
}

fn default_step_threshold() -> u32 {
    500
}

fn default_base_sensitivity() -> f64 {
    mgdl_to_mmol(50.0)
}

fn default_projection_carb_ratio() -> f64 {
    10.0
}

fn default_hourly_carb_impact() -> f64 {
    10.0
}

fn default_horizon_minutes() -> u32 {
    60
}

fn default_interval_minutes() -> u32 {
    5
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Apply the process environment's overrides and validate the result
    pub fn with_env_overrides(mut self) -> Result<Self> {
        self.apply_env_overrides(|key| std::env::var(key).ok())?;
        self.validate()?;
        Ok(self)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("autobolus").join("config.toml")
    }

    /// Apply overrides from a variable lookup (normally the process
    /// environment). Numeric values that do not parse are configuration
    /// errors.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_LIVER_ISF) {
            self.liver.sensitivity = Some(parse_positive(ENV_LIVER_ISF, &raw)?);
        }
        if let Some(raw) = lookup(ENV_LIVER_CR) {
            self.liver.carb_ratio = Some(parse_positive(ENV_LIVER_CR, &raw)?);
        }
        if let Some(raw) = lookup(ENV_DOSING_ISF) {
            self.dosing.sensitivity_override = Some(parse_positive(ENV_DOSING_ISF, &raw)?);
        }
        if let Some(raw) = lookup(ENV_DOSING_CR) {
            self.dosing.carb_ratio_override = Some(parse_positive(ENV_DOSING_CR, &raw)?);
        }
        if let Some(url) = lookup(ENV_API_URL) {
            self.submission.api_url = Some(url);
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.submission.api_key = Some(SecretString::new(key));
        }
        Ok(())
    }

    /// Semantic validation of the loaded values
    pub fn validate(&self) -> Result<()> {
        let dosing = &self.dosing;
        if !(dosing.iob_cap > 0.0) {
            return Err(Error::Config("dosing.iob_cap must be positive".into()));
        }
        if dosing.iob_window_minutes <= 0 {
            return Err(Error::Config(
                "dosing.iob_window_minutes must be positive".into(),
            ));
        }
        if !(dosing.min_dose > 0.0) || dosing.min_dose > dosing.max_dose {
            return Err(Error::Config(format!(
                "dosing bounds invalid: min_dose {} max_dose {}",
                dosing.min_dose, dosing.max_dose
            )));
        }
        // Every entry that can still count toward the cap must survive the trim
        let min_retention = (dosing.iob_cap / dosing.min_dose - 1e-9).ceil() as usize;
        if dosing.iob_retention < min_retention {
            return Err(Error::Config(format!(
                "dosing.iob_retention {} must be at least {} (iob_cap / min_dose)",
                dosing.iob_retention, min_retention
            )));
        }
        for (name, value) in [
            ("dosing.sensitivity_override", dosing.sensitivity_override),
            ("dosing.carb_ratio_override", dosing.carb_ratio_override),
            ("liver.sensitivity", self.liver.sensitivity),
            ("liver.carb_ratio", self.liver.carb_ratio),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(Error::Config(format!("{} must be positive", name)));
                }
            }
        }

        let activity = &self.activity;
        if activity.sleep_start_hour > 23 || activity.sleep_end_hour > 24 {
            return Err(Error::Config(format!(
                "sleep hours out of range: {}..{}",
                activity.sleep_start_hour, activity.sleep_end_hour
            )));
        }
        if !(activity.exercise_multiplier > 0.0) || !(activity.sleep_multiplier > 0.0) {
            return Err(Error::Config("activity multipliers must be positive".into()));
        }

        let projection = &self.projection;
        if !(projection.base_sensitivity > 0.0) || !(projection.carb_ratio > 0.0) {
            return Err(Error::Config(
                "projection sensitivity and carb ratio must be positive".into(),
            ));
        }

        Ok(())
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(Error::Config(format!(
            "{} must be a positive number, got {:?}",
            key, raw
        ))),
    }
}
