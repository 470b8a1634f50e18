//! Hepatic glucose release model.
//!
//! The liver releases roughly 10 g of glucose per hour. Expressed through
//! the profile's sensitivity and carb ratio that is a glucose rise per
//! 5-minute interval, optionally scaled by an hour-of-day multiplier.

use crate::{CircadianCurve, Error, Result};

/// Grams of glucose released per hour
pub const DEFAULT_HOURLY_RELEASE: f64 = 10.0;

/// 5-minute intervals per hour
pub const INTERVALS_PER_HOUR: f64 = 12.0;

#[derive(Clone, Debug, PartialEq)]
pub struct LiverInfusionModel {
    sensitivity_factor: f64,
    carb_ratio: f64,
    hourly_release: f64,
}

impl LiverInfusionModel {
    /// Fails with `Error::Config` if either factor is non-positive
    pub fn new(sensitivity_factor: f64, carb_ratio: f64) -> Result<Self> {
        Self::with_hourly_release(sensitivity_factor, carb_ratio, DEFAULT_HOURLY_RELEASE)
    }

    pub fn with_hourly_release(
        sensitivity_factor: f64,
        carb_ratio: f64,
        hourly_release: f64,
    ) -> Result<Self> {
        if !(sensitivity_factor.is_finite() && sensitivity_factor > 0.0) {
            return Err(Error::Config(format!(
                "sensitivity factor must be positive, got {}",
                sensitivity_factor
            )));
        }
        if !(carb_ratio.is_finite() && carb_ratio > 0.0) {
            return Err(Error::Config(format!(
                "carb ratio must be positive, got {}",
                carb_ratio
            )));
        }
        if !(hourly_release.is_finite() && hourly_release >= 0.0) {
            return Err(Error::Config(format!(
                "hourly release must be non-negative, got {}",
                hourly_release
            )));
        }

        Ok(Self {
            sensitivity_factor,
            carb_ratio,
            hourly_release,
        })
    }

    /// Glucose rise per 5-minute interval before circadian modulation
    pub fn baseline_infusion(&self) -> f64 {
        (self.sensitivity_factor / self.carb_ratio) * (self.hourly_release / INTERVALS_PER_HOUR)
    }

    /// Baseline scaled by the curve's multiplier for `hour` (local, 0..=23)
    pub fn modulated(&self, hour: u32, curve: &CircadianCurve) -> Result<f64> {
        let multiplier = curve
            .at(hour)
            .ok_or_else(|| Error::Config(format!("hour {} is outside 0..=23", hour)))?;
        Ok(self.baseline_infusion() * multiplier)
    }
}

/// `(sensitivity_factor / carb_ratio) * (10 / 12)`
pub fn baseline_infusion(sensitivity_factor: f64, carb_ratio: f64) -> Result<f64> {
    Ok(LiverInfusionModel::new(sensitivity_factor, carb_ratio)?.baseline_infusion())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_curve_equals_baseline() {
        let model = LiverInfusionModel::new(50.0, 10.0).unwrap();
        let baseline = model.baseline_infusion();
        assert!((baseline - 4.1667).abs() < 1e-4);

        let curve = CircadianCurve::flat();
        for hour in 0..24 {
            assert_eq!(model.modulated(hour, &curve).unwrap(), baseline);
        }
    }

    #[test]
    fn test_modulation_uses_hour_index() {
        let mut values = vec![1.0; 24];
        values[3] = 1.5;
        values[15] = 0.5;
        let curve = CircadianCurve::new(values).unwrap();
        let model = LiverInfusionModel::new(2.0, 10.0).unwrap();
        let baseline = model.baseline_infusion();

        assert!((model.modulated(3, &curve).unwrap() - baseline * 1.5).abs() < 1e-12);
        assert!((model.modulated(15, &curve).unwrap() - baseline * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_positive_factors() {
        assert!(matches!(LiverInfusionModel::new(0.0, 10.0), Err(Error::Config(_))));
        assert!(matches!(LiverInfusionModel::new(50.0, -1.0), Err(Error::Config(_))));
        assert!(matches!(baseline_infusion(f64::NAN, 10.0), Err(Error::Config(_))));
    }

    #[test]
    fn test_hour_out_of_range() {
        let model = LiverInfusionModel::new(50.0, 10.0).unwrap();
        let result = model.modulated(24, &CircadianCurve::flat());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_custom_hourly_release() {
        let model = LiverInfusionModel::with_hourly_release(50.0, 10.0, 12.0).unwrap();
        assert!((model.baseline_infusion() - 5.0).abs() < 1e-12);
    }
}
