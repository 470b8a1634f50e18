#![forbid(unsafe_code)]

//! Core domain model and decision logic for the autobolus engine.
//!
//! This crate provides:
//! - Domain types (readings, profiles, IOB entries, activity, decisions)
//! - Physiological models (carb absorption, liver infusion, activity sensitivity)
//! - Forward glucose projection
//! - The dose decision engine and its submission sink
//! - IOB log persistence and input file loaders

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod carbs;
pub mod liver;
pub mod activity;
pub mod projection;
pub mod profile;
pub mod iob;
pub mod sink;
pub mod inputs;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use carbs::CarbAbsorptionModel;
pub use liver::LiverInfusionModel;
pub use activity::{ActivitySensitivityAdjuster, ActivityWindow, SensitivityMode, SleepRange};
pub use projection::{GlucoseProjector, Projection};
pub use iob::{IobLog, IobStore};
pub use sink::{DoseRecord, DoseSink, HttpDoseSink};
pub use engine::{
    CycleInput, CycleOutcome, CycleReport, CycleState, DoseDecisionEngine, DoseOutcome,
    NoDoseReason,
};
