//! Forward glucose projection.
//!
//! Simulates the next hour of glucose from a starting value, adding the
//! liver's contribution at every interval. Sensitivity is adjusted for
//! activity once, at the start, and held for the whole horizon.

use crate::{
    activity::{ActivitySensitivityAdjuster, ActivityWindow, SensitivityMode},
    config::{ActivityConfig, ProjectionConfig},
    ActivityEvent, CircadianCurve, CycleClock, Error, LiverInfusionModel, Result,
};

#[derive(Clone, Debug)]
pub struct GlucoseProjector {
    config: ProjectionConfig,
    adjuster: ActivitySensitivityAdjuster,
    circadian: Option<CircadianCurve>,
}

impl GlucoseProjector {
    pub fn new(config: ProjectionConfig, activity: &ActivityConfig) -> Result<Self> {
        if config.interval_minutes == 0 {
            return Err(Error::Config("projection interval must be positive".into()));
        }
        if config.horizon_minutes == 0 || config.horizon_minutes % config.interval_minutes != 0 {
            return Err(Error::Config(format!(
                "projection horizon {} must be a positive multiple of interval {}",
                config.horizon_minutes, config.interval_minutes
            )));
        }
        // Validates sensitivity, carb ratio and hourly release up front
        LiverInfusionModel::with_hourly_release(
            config.base_sensitivity,
            config.carb_ratio,
            config.hourly_carb_impact,
        )?;

        Ok(Self {
            config,
            adjuster: ActivitySensitivityAdjuster::new(ActivityWindow::projection(activity)),
            circadian: None,
        })
    }

    /// Scale each step by the multiplier of the hour it falls in
    pub fn with_circadian(mut self, curve: CircadianCurve) -> Self {
        self.circadian = Some(curve);
        self
    }

    pub fn project(
        &self,
        start_glucose: f64,
        events: &[ActivityEvent],
        clock: &CycleClock,
    ) -> Result<Projection> {
        let adjustment = self.adjuster.adjust(self.config.base_sensitivity, events, clock);
        let interval_fraction = f64::from(self.config.interval_minutes) / 60.0;
        // Per-interval release in grams, expressed per hour for the liver model
        let liver = LiverInfusionModel::with_hourly_release(
            adjustment.sensitivity,
            self.config.carb_ratio,
            self.config.hourly_carb_impact * interval_fraction * 12.0,
        )?;

        let steps = (self.config.horizon_minutes / self.config.interval_minutes) as usize;
        let rises = (0..steps)
            .map(|i| {
                let minutes = (i as u32) * self.config.interval_minutes;
                let hour = (clock.local_hour + minutes / 60) % 24;
                match &self.circadian {
                    Some(curve) => liver.modulated(hour, curve),
                    None => Ok(liver.baseline_infusion()),
                }
            })
            .collect::<Result<Vec<f64>>>()?;

        tracing::debug!(
            "Projecting {} steps from {:.2} with sensitivity {:.3} ({:?})",
            steps,
            start_glucose,
            adjustment.sensitivity,
            adjustment.mode
        );

        Ok(Projection {
            start: start_glucose,
            rises,
            sensitivity: adjustment.sensitivity,
            mode: adjustment.mode,
        })
    }
}

/// A finite projected trajectory. Iterating never consumes it.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    start: f64,
    rises: Vec<f64>,
    sensitivity: f64,
    mode: SensitivityMode,
}

impl Projection {
    /// Running glucose after each interval
    pub fn iter(&self) -> ProjectionIter<'_> {
        ProjectionIter {
            current: self.start,
            rises: self.rises.iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.rises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rises.is_empty()
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn mode(&self) -> SensitivityMode {
        self.mode
    }

    /// Values rounded to whole numbers after `scale` (e.g. to mg/dL for display)
    pub fn rounded(&self, scale: f64) -> Vec<i64> {
        self.iter().map(|v| (v * scale).round() as i64).collect()
    }
}

impl<'a> IntoIterator for &'a Projection {
    type Item = f64;
    type IntoIter = ProjectionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ProjectionIter<'a> {
    current: f64,
    rises: std::slice::Iter<'a, f64>,
}

impl Iterator for ProjectionIter<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let rise = self.rises.next()?;
        self.current += rise;
        Some(self.current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rises.size_hint()
    }
}

impl ExactSizeIterator for ProjectionIter<'_> {}
