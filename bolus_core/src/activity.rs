//! Exercise, step and sleep driven sensitivity adjustment.
//!
//! Two look-back windows exist and are kept apart on purpose: the dosing
//! path only considers exercise sessions in the last two hours, the
//! projection path considers exercise or high step counts in the last hour.

use crate::{config::ActivityConfig, ActivityEvent, ActivityKind, CycleClock};
use chrono::Duration;

/// Half-open local hour range `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SleepRange {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SleepRange {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Ranges with `start > end` wrap around midnight
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Default for SleepRange {
    fn default() -> Self {
        Self::new(0, 6)
    }
}

/// Which events count as recent activity, and whether sleep applies
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityWindow {
    pub exercise_window: Duration,
    /// `(window, threshold)`: step samples strictly above `threshold`
    pub steps: Option<(Duration, u32)>,
    pub sleep: Option<SleepRange>,
    pub exercise_multiplier: f64,
    pub sleep_multiplier: f64,
}

impl ActivityWindow {
    /// Exercise in the last 2 hours, no sleep adjustment
    pub fn dosing(config: &ActivityConfig) -> Self {
        Self {
            exercise_window: Duration::minutes(config.dosing_exercise_window_minutes),
            steps: None,
            sleep: None,
            exercise_multiplier: config.exercise_multiplier,
            sleep_multiplier: config.sleep_multiplier,
        }
    }

    /// Exercise or steps above threshold in the last hour, sleep range applies
    pub fn projection(config: &ActivityConfig) -> Self {
        let window = Duration::minutes(config.projection_window_minutes);
        Self {
            exercise_window: window,
            steps: Some((window, config.step_threshold)),
            sleep: Some(SleepRange::new(
                config.sleep_start_hour,
                config.sleep_end_hour,
            )),
            exercise_multiplier: config.exercise_multiplier,
            sleep_multiplier: config.sleep_multiplier,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensitivityMode {
    Exercise,
    Steps,
    Sleep,
    Normal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Adjustment {
    pub sensitivity: f64,
    pub mode: SensitivityMode,
}

/// Stateless: every call is a pure function of its arguments
#[derive(Clone, Debug, PartialEq)]
pub struct ActivitySensitivityAdjuster {
    window: ActivityWindow,
}

impl ActivitySensitivityAdjuster {
    pub fn new(window: ActivityWindow) -> Self {
        Self { window }
    }

    pub fn adjust(
        &self,
        base_sensitivity: f64,
        events: &[ActivityEvent],
        clock: &CycleClock,
    ) -> Adjustment {
        let mode = self.mode(events, clock);
        let multiplier = match mode {
            SensitivityMode::Exercise | SensitivityMode::Steps => self.window.exercise_multiplier,
            SensitivityMode::Sleep => self.window.sleep_multiplier,
            SensitivityMode::Normal => 1.0,
        };

        Adjustment {
            sensitivity: base_sensitivity * multiplier,
            mode,
        }
    }

    fn mode(&self, events: &[ActivityEvent], clock: &CycleClock) -> SensitivityMode {
        let recent_exercise = events.iter().any(|e| {
            e.kind == ActivityKind::Exercise && clock.now - e.time < self.window.exercise_window
        });
        if recent_exercise {
            return SensitivityMode::Exercise;
        }

        if let Some((window, threshold)) = self.window.steps {
            let recent_steps = events.iter().any(|e| {
                e.kind == ActivityKind::Steps
                    && e.count.unwrap_or(0) > threshold
                    && clock.now - e.time < window
            });
            if recent_steps {
                return SensitivityMode::Steps;
            }
        }

        match self.window.sleep {
            Some(range) if range.contains(clock.local_hour) => SensitivityMode::Sleep,
            _ => SensitivityMode::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn clock(hour: u32) -> CycleClock {
        CycleClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(), hour)
    }

    fn dosing() -> ActivitySensitivityAdjuster {
        ActivitySensitivityAdjuster::new(ActivityWindow::dosing(&ActivityConfig::default()))
    }

    fn projection() -> ActivitySensitivityAdjuster {
        ActivitySensitivityAdjuster::new(ActivityWindow::projection(&ActivityConfig::default()))
    }

    #[test]
    fn test_recent_exercise_boosts_sensitivity() {
        let c = clock(14);
        let events = vec![ActivityEvent::exercise(c.now - Duration::minutes(90))];
        let adj = dosing().adjust(2.0, &events, &c);
        assert_eq!(adj.mode, SensitivityMode::Exercise);
        assert!((adj.sensitivity - 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_dosing_window_is_two_hours_exclusive() {
        let c = clock(14);
        let events = vec![ActivityEvent::exercise(c.now - Duration::minutes(120))];
        assert_eq!(dosing().adjust(2.0, &events, &c).mode, SensitivityMode::Normal);
    }

    #[test]
    fn test_projection_window_is_one_hour() {
        let c = clock(14);
        let events = vec![ActivityEvent::exercise(c.now - Duration::minutes(90))];
        assert_eq!(projection().adjust(50.0, &events, &c).mode, SensitivityMode::Normal);
    }

    #[test]
    fn test_steps_only_count_on_projection_path() {
        let c = clock(14);
        let events = vec![ActivityEvent::steps(c.now - Duration::minutes(30), 800)];

        let adj = projection().adjust(50.0, &events, &c);
        assert_eq!(adj.mode, SensitivityMode::Steps);
        assert!((adj.sensitivity - 65.0).abs() < 1e-9);

        assert_eq!(dosing().adjust(50.0, &events, &c).mode, SensitivityMode::Normal);
    }

    #[test]
    fn test_step_threshold_is_strict() {
        let c = clock(14);
        let events = vec![ActivityEvent::steps(c.now - Duration::minutes(10), 500)];
        assert_eq!(projection().adjust(50.0, &events, &c).mode, SensitivityMode::Normal);
    }

    #[test]
    fn test_sleep_reduces_sensitivity() {
        let adj = projection().adjust(50.0, &[], &clock(3));
        assert_eq!(adj.mode, SensitivityMode::Sleep);
        assert!((adj.sensitivity - 40.0).abs() < 1e-9);

        assert_eq!(projection().adjust(50.0, &[], &clock(6)).mode, SensitivityMode::Normal);
    }

    #[test]
    fn test_activity_takes_precedence_over_sleep() {
        let c = clock(2);
        let events = vec![ActivityEvent::exercise(c.now - Duration::minutes(5))];
        assert_eq!(projection().adjust(50.0, &events, &c).mode, SensitivityMode::Exercise);
    }

    #[test]
    fn test_dosing_path_ignores_sleep() {
        assert_eq!(dosing().adjust(2.0, &[], &clock(3)).sensitivity, 2.0);
    }

    #[test]
    fn test_sleep_range_wraps_midnight() {
        let range = SleepRange::new(22, 6);
        assert!(range.contains(23));
        assert!(range.contains(0));
        assert!(range.contains(5));
        assert!(!range.contains(6));
        assert!(!range.contains(12));
    }
}
