//! Carbohydrate absorption model.
//!
//! Carbs enter the bloodstream over a fixed window following a Gaussian
//! curve. The curve is normalized over the integer minutes of the window so
//! that the per-minute amounts sum to the meal's total carbs.

use once_cell::sync::Lazy;

/// Absorption window in minutes
pub const ABSORPTION_WINDOW_MINUTES: u32 = 180;

/// Minute of peak absorption
pub const PEAK_MINUTE: f64 = 60.0;

pub const STD_DEV_MINUTES: f64 = 30.0;

static DEFAULT_MODEL: Lazy<CarbAbsorptionModel> =
    Lazy::new(|| CarbAbsorptionModel::new(PEAK_MINUTE, STD_DEV_MINUTES, ABSORPTION_WINDOW_MINUTES));

/// Gaussian absorption curve with a precomputed normalization sum
#[derive(Clone, Debug, PartialEq)]
pub struct CarbAbsorptionModel {
    peak: f64,
    std_dev: f64,
    window: u32,
    normalization: f64,
}

impl CarbAbsorptionModel {
    pub fn new(peak: f64, std_dev: f64, window: u32) -> Self {
        let normalization = (0..=window)
            .map(|t| gaussian(f64::from(t), peak, std_dev))
            .sum();
        Self {
            peak,
            std_dev,
            window,
            normalization,
        }
    }

    /// Shared model with the standard 60/30/180 parameters
    pub fn standard() -> &'static CarbAbsorptionModel {
        &DEFAULT_MODEL
    }

    /// Grams absorbed at `minutes_since_meal`.
    ///
    /// Zero outside `[0, window]`. Negative or non-finite totals absorb nothing.
    pub fn absorbed_grams(&self, total_carbs: f64, minutes_since_meal: f64) -> f64 {
        if !total_carbs.is_finite() || total_carbs <= 0.0 {
            return 0.0;
        }
        if !(0.0..=f64::from(self.window)).contains(&minutes_since_meal) {
            return 0.0;
        }

        let proportion = gaussian(minutes_since_meal, self.peak, self.std_dev) / self.normalization;
        total_carbs * proportion
    }

    /// `(minute, grams)` samples across the window every `step_minutes`
    pub fn curve(&self, total_carbs: f64, step_minutes: u32) -> Vec<(u32, f64)> {
        let step = step_minutes.max(1) as usize;
        (0..=self.window)
            .step_by(step)
            .map(|t| (t, self.absorbed_grams(total_carbs, f64::from(t))))
            .collect()
    }

    pub fn window_minutes(&self) -> u32 {
        self.window
    }
}

impl Default for CarbAbsorptionModel {
    fn default() -> Self {
        DEFAULT_MODEL.clone()
    }
}

/// Grams absorbed at `minutes_since_meal` under the standard model
pub fn absorbed_grams(total_carbs: f64, minutes_since_meal: f64) -> f64 {
    DEFAULT_MODEL.absorbed_grams(total_carbs, minutes_since_meal)
}

fn gaussian(x: f64, mean: f64, sigma: f64) -> f64 {
    (-0.5 * ((x - mean) / sigma).powi(2)).exp()
}
