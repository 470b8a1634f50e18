//! Dose decision engine.
//!
//! One decision cycle goes `Idle → Evaluating → {NoDose, CappedDose,
//! FullDose, Rejected}`:
//!
//! 1. Resolve the active profile (most recent in the last 24h) or abort
//! 2. Boost sensitivity after recent exercise
//! 3. Stop if insulin on board in the last hour has reached the cap
//! 4. Correct only if glucose is more than 0.5 above target and not falling
//! 5. Clamp the correction to the per-dose bounds, then to the remaining
//!    IOB headroom, and round to hundredths
//! 6. Submit; append to the IOB log only once the sink confirms

use crate::{
    activity::{ActivitySensitivityAdjuster, ActivityWindow, SensitivityMode},
    config::{ActivityConfig, DosingConfig},
    iob::IobLog,
    profile::resolve_profile,
    sink::{DoseRecord, DoseSink},
    ActivityEvent, CycleClock, DosingDecision, DosingProfile, Error, GlucoseReading,
    ProfileSnapshot, Result,
};
use chrono::Duration;
use secrecy::SecretString;
use uuid::Uuid;

/// Float slack for cap comparisons on summed doses
const EPSILON: f64 = 1e-9;

/// Everything a cycle reads
#[derive(Clone, Copy, Debug)]
pub struct CycleInput<'a> {
    pub reading: &'a GlucoseReading,
    pub profiles: &'a [ProfileSnapshot],
    pub activity: &'a [ActivityEvent],
    pub clock: CycleClock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoDoseReason {
    /// Insulin on board already at the cap
    IobCapReached,
    /// Trend indicates falling glucose
    FallingTrend,
    /// Glucose not far enough above target
    BelowThreshold,
    /// Remaining headroom rounds below the minimum dose
    HeadroomExhausted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DoseOutcome {
    NoDose {
        reason: NoDoseReason,
        rationale: String,
    },
    Dose(DosingDecision),
}

/// Result of the pure evaluation step, with the figures that led to it
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub profile: DosingProfile,
    /// Sensitivity after the exercise adjustment
    pub sensitivity: f64,
    pub mode: SensitivityMode,
    pub iob_total: f64,
    pub delta: f64,
    pub outcome: DoseOutcome,
}

/// Terminal state of a cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    NoDose,
    CappedDose,
    FullDose,
    Rejected,
}

#[derive(Debug)]
pub enum CycleOutcome {
    NoDose {
        reason: NoDoseReason,
        rationale: String,
    },
    Delivered(DosingDecision),
    /// The sink failed; the IOB log was left untouched
    Rejected {
        decision: DosingDecision,
        error: Error,
    },
}

#[derive(Debug)]
pub struct CycleReport {
    pub evaluation: Evaluation,
    pub outcome: CycleOutcome,
    /// The log to persist: updated only when delivery was confirmed
    pub iob: IobLog,
}

impl CycleReport {
    pub fn state(&self) -> CycleState {
        match &self.outcome {
            CycleOutcome::NoDose { .. } => CycleState::NoDose,
            CycleOutcome::Delivered(d) if d.capped => CycleState::CappedDose,
            CycleOutcome::Delivered(_) => CycleState::FullDose,
            CycleOutcome::Rejected { .. } => CycleState::Rejected,
        }
    }

    /// Whether the returned IOB log differs from the one passed in
    pub fn iob_changed(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Delivered(_))
    }
}

pub struct DoseDecisionEngine {
    config: DosingConfig,
    adjuster: ActivitySensitivityAdjuster,
}

impl DoseDecisionEngine {
    pub fn new(config: DosingConfig, activity: &ActivityConfig) -> Self {
        Self {
            config,
            adjuster: ActivitySensitivityAdjuster::new(ActivityWindow::dosing(activity)),
        }
    }

    pub fn config(&self) -> &DosingConfig {
        &self.config
    }

    /// Decide without side effects.
    ///
    /// Errors are fatal for the cycle: `NoProfile` when no profile is active,
    /// `Config` for invalid sensitivity, carb ratio or glucose value.
    pub fn decide(&self, input: &CycleInput<'_>, iob: &IobLog) -> Result<Evaluation> {
        let profile = self.effective_profile(input)?;

        let reading = input.reading;
        if !reading.value_mmol.is_finite() {
            return Err(Error::Config(format!(
                "glucose reading is not a finite number: {}",
                reading.value_mmol
            )));
        }

        let adjustment =
            self.adjuster
                .adjust(profile.sensitivity_factor, input.activity, &input.clock);
        if adjustment.mode == SensitivityMode::Exercise {
            tracing::info!(
                "Exercise detected, sensitivity {:.2} -> {:.2}",
                profile.sensitivity_factor,
                adjustment.sensitivity
            );
        }
        let sensitivity = adjustment.sensitivity;

        let now = input.clock.now;
        let iob_total = iob.total_within(now, Duration::minutes(self.config.iob_window_minutes));
        let cap = self.config.iob_cap;
        let delta = reading.value_mmol - profile.target_high;
        let trend = reading.trend_or_default();

        let no_dose = |reason, rationale: String| DoseOutcome::NoDose { reason, rationale };

        let outcome = if iob_total + EPSILON >= cap {
            no_dose(
                NoDoseReason::IobCapReached,
                format!(
                    "IOB cap hit: {:.2}U in last {} min (cap {:.2}U)",
                    iob_total, self.config.iob_window_minutes, cap
                ),
            )
        } else if trend.is_falling() {
            no_dose(
                NoDoseReason::FallingTrend,
                format!(
                    "BG {:.1} mmol/L, delta {:.2}, trend {} is falling",
                    reading.value_mmol, delta, trend
                ),
            )
        } else if delta <= self.config.trigger_delta {
            no_dose(
                NoDoseReason::BelowThreshold,
                format!(
                    "BG {:.1} mmol/L, delta {:.2} not above {:.2}, trend {}",
                    reading.value_mmol, delta, self.config.trigger_delta, trend
                ),
            )
        } else {
            self.correction(reading, delta, sensitivity, iob_total, input.clock)
        };

        Ok(Evaluation {
            profile,
            sensitivity,
            mode: adjustment.mode,
            iob_total,
            delta,
            outcome,
        })
    }

    /// Decide, submit and account for one cycle.
    ///
    /// The IOB log goes in by value and comes back in the report, appended
    /// only on confirmed delivery. A sink failure is reported in the outcome
    /// rather than returned as an error, so the caller can carry on.
    pub fn run_cycle(
        &self,
        input: &CycleInput<'_>,
        iob: IobLog,
        sink: &mut dyn DoseSink,
        secret: &SecretString,
    ) -> Result<CycleReport> {
        let evaluation = self.decide(input, &iob)?;

        let decision = match evaluation.outcome.clone() {
            DoseOutcome::NoDose { reason, rationale } => {
                tracing::info!("No bolus ({:?}): {}", reason, rationale);
                return Ok(CycleReport {
                    evaluation,
                    outcome: CycleOutcome::NoDose { reason, rationale },
                    iob,
                });
            }
            DoseOutcome::Dose(decision) => decision,
        };

        let record = DoseRecord::new(&decision, secret.clone());
        match sink.submit(&record) {
            Ok(()) => {
                tracing::info!(
                    "AutoBolus {:.2}U sent. BG: {:.1} mmol/L, Sens: {:.2}",
                    decision.insulin_units,
                    input.reading.value_mmol,
                    evaluation.sensitivity
                );
                let iob = iob.append(decision.to_iob_entry(), self.config.iob_retention);
                Ok(CycleReport {
                    evaluation,
                    outcome: CycleOutcome::Delivered(decision),
                    iob,
                })
            }
            Err(error) => {
                tracing::warn!("Bolus of {:.2}U not confirmed: {}", decision.insulin_units, error);
                Ok(CycleReport {
                    evaluation,
                    outcome: CycleOutcome::Rejected { decision, error },
                    iob,
                })
            }
        }
    }

    fn effective_profile(&self, input: &CycleInput<'_>) -> Result<DosingProfile> {
        let mut profile = resolve_profile(
            input.profiles,
            &self.config.profile_name,
            input.clock.now,
            Duration::hours(self.config.profile_max_age_hours),
        )?;

        if let Some(isf) = self.config.sensitivity_override {
            profile.sensitivity_factor = isf;
        }
        if let Some(cr) = self.config.carb_ratio_override {
            profile.carb_ratio = cr;
        }
        profile.validate()?;
        Ok(profile)
    }

    fn correction(
        &self,
        reading: &GlucoseReading,
        delta: f64,
        sensitivity: f64,
        iob_total: f64,
        clock: CycleClock,
    ) -> DoseOutcome {
        let min = self.config.min_dose;
        let max = self.config.max_dose;
        let raw = (delta / sensitivity).clamp(min, max);
        let remaining = self.config.iob_cap - iob_total;

        let (dose, capped) = if raw > remaining {
            (floor_cents(remaining), true)
        } else {
            (round_cents(raw), false)
        };

        if dose + EPSILON < min {
            return DoseOutcome::NoDose {
                reason: NoDoseReason::HeadroomExhausted,
                rationale: format!(
                    "remaining IOB headroom {:.2}U is below the minimum dose {:.2}U",
                    remaining, min
                ),
            };
        }

        let rationale = format!(
            "BG {:.1} mmol/L, delta {:.2}, ISF {:.2}, IOB {:.2}U -> {:.2}U{}",
            reading.value_mmol,
            delta,
            sensitivity,
            iob_total,
            dose,
            if capped { " (capped to IOB headroom)" } else { "" }
        );

        DoseOutcome::Dose(DosingDecision {
            id: Uuid::new_v4(),
            timestamp: clock.now,
            insulin_units: dose,
            event_type: self.config.event_type.clone(),
            rationale,
            capped,
        })
    }
}

fn round_cents(units: f64) -> f64 {
    (units * 100.0).round() / 100.0
}

/// Round down so a capped dose never exceeds its headroom
fn floor_cents(units: f64) -> f64 {
    ((units * 100.0) + EPSILON).floor().max(0.0) / 100.0
}
