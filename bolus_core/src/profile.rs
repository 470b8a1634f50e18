//! Effective dosing profile resolution.

use crate::{DosingProfile, Error, ProfileSnapshot, ProfileStore, Result, ScheduleEntry};
use chrono::{DateTime, Duration, Utc};

/// Pick the most recent snapshot activated within `max_age` of `now` whose
/// store contains `name`, and read its first schedule values as mmol/L.
///
/// Fails with `Error::NoProfile` when nothing qualifies.
pub fn resolve_profile(
    snapshots: &[ProfileSnapshot],
    name: &str,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<DosingProfile> {
    let cutoff = (now - max_age).timestamp_millis();

    let (mills, store) = snapshots
        .iter()
        .filter(|s| s.mills >= cutoff)
        .filter_map(|s| s.store.get(name).map(|store| (s.mills, store)))
        .max_by_key(|(mills, _)| *mills)
        .ok_or_else(|| {
            Error::NoProfile(format!(
                "no '{}' profile activated in the last {} hours",
                name,
                max_age.num_hours()
            ))
        })?;

    tracing::debug!("Using profile '{}' activated at {}", name, mills);
    read_store(store)
}

fn read_store(store: &ProfileStore) -> Result<DosingProfile> {
    let units = store.units.unwrap_or_default();
    let profile = DosingProfile {
        sensitivity_factor: units.to_mmol(first_value(&store.sens, "sens")?),
        carb_ratio: first_value(&store.carbratio, "carbratio")?,
        target_high: units.to_mmol(first_value(&store.target_high, "target_high")?),
    };
    profile.validate()?;
    Ok(profile)
}

fn first_value(schedule: &[ScheduleEntry], field: &str) -> Result<f64> {
    schedule
        .first()
        .map(|e| e.value)
        .ok_or_else(|| Error::Config(format!("profile has an empty '{}' schedule", field)))
}
