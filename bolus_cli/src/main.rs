use bolus_core::inputs::{
    load_activity, load_circadian_curve, load_exercise, load_latest_reading, load_profiles,
    load_projection_start,
};
use bolus_core::*;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};

const SGV_FILE: &str = "sgv.json";
const PROFILE_FILE: &str = "profile.json";
const IOB_FILE: &str = "iobHistory.json";
const EXERCISE_FILE: &str = "exercise.json";
const STEPS_FILE: &str = "steps.json";
const CIRCADIAN_FILE: &str = "sinuscurves.json";
const PROJECTION_START_FILE: &str = "sgv_start.json";

#[derive(Parser)]
#[command(name = "autobolus")]
#[command(about = "Closed-loop insulin micro-dosing decision engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one dosing decision cycle (default)
    Dose {
        /// Show the decision without submitting or recording it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show hepatic glucose infusion for the current hour
    Liver {
        /// Local hour to evaluate (0-23), defaults to now
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: Option<u32>,

        /// Write the modulated value as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Simulate glucose over the next hour
    Project {
        /// Modulate liver release with the circadian curve
        #[arg(long)]
        circadian: bool,

        /// Write the simulated curve (mg/dL) as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the absorption curve for a meal
    Carbs {
        /// Grams of carbohydrate
        grams: f64,

        /// Minutes between samples
        #[arg(long, default_value_t = 10)]
        step: u32,
    },
}

fn main() {
    dotenvy::dotenv().ok();
    bolus_core::logging::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    }
    .with_env_overrides()?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());

    match cli.command {
        Some(Commands::Dose { dry_run }) => cmd_dose(&data_dir, dry_run, &config),
        Some(Commands::Liver { hour, output }) => cmd_liver(&data_dir, hour, output, &config),
        Some(Commands::Project { circadian, output }) => {
            cmd_project(&data_dir, circadian, output, &config)
        }
        Some(Commands::Carbs { grams, step }) => cmd_carbs(grams, step),
        None => cmd_dose(&data_dir, false, &config),
    }
}

fn cmd_dose(data_dir: &Path, dry_run: bool, config: &Config) -> Result<()> {
    let clock = CycleClock::local_now();
    let store = IobStore::new(data_dir.join(IOB_FILE));

    // Held until the cycle's IOB update is on disk
    let _lock = store.lock()?;

    let reading = load_latest_reading(&data_dir.join(SGV_FILE), clock.now)?;
    let profiles = load_profiles(&data_dir.join(PROFILE_FILE))?;
    // Dosing only looks at exercise
    let activity = load_exercise(&data_dir.join(EXERCISE_FILE))?;
    let iob = store.load()?;

    let engine = DoseDecisionEngine::new(config.dosing.clone(), &config.activity);
    let input = CycleInput {
        reading: &reading,
        profiles: &profiles,
        activity: &activity,
        clock,
    };

    if dry_run {
        let evaluation = engine.decide(&input, &iob)?;
        match &evaluation.outcome {
            DoseOutcome::Dose(decision) => {
                println!("Would bolus {:.2}U: {}", decision.insulin_units, decision.rationale);
            }
            DoseOutcome::NoDose { rationale, .. } => println!("No bolus: {}", rationale),
        }
        println!("\n[Dry run - nothing submitted]");
        return Ok(());
    }

    let (mut sink, secret) = submission_sink(config)?;
    let report = engine.run_cycle(&input, iob, &mut sink, &secret)?;

    if report.iob_changed() {
        store.save(&report.iob)?;
    }

    match &report.outcome {
        CycleOutcome::NoDose { rationale, .. } => println!("No bolus: {}", rationale),
        CycleOutcome::Delivered(decision) => {
            println!(
                "✓ AutoBolus {:.2}U sent. BG: {:.1} mmol/L, Sens: {:.2}",
                decision.insulin_units, reading.value_mmol, report.evaluation.sensitivity
            );
            if decision.capped {
                println!("  Capped to remaining IOB headroom");
            }
        }
        CycleOutcome::Rejected { decision, error } => {
            eprintln!(
                "✗ Bolus of {:.2}U not confirmed: {}",
                decision.insulin_units, error
            );
        }
    }

    Ok(())
}

fn submission_sink(config: &Config) -> Result<(HttpDoseSink, SecretString)> {
    let url = config.submission.api_url.clone().ok_or_else(|| {
        Error::Config(format!(
            "no submission URL; set {} or submission.api_url",
            config::ENV_API_URL
        ))
    })?;
    let secret = config
        .submission
        .api_key
        .clone()
        .ok_or_else(|| Error::Config(format!("{} is not set", config::ENV_API_KEY)))?;
    let sink = HttpDoseSink::new(
        url,
        std::time::Duration::from_secs(config.submission.timeout_seconds),
    )?;
    Ok((sink, secret))
}

fn cmd_liver(
    data_dir: &Path,
    hour: Option<u32>,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let (Some(isf), Some(cr)) = (config.liver.sensitivity, config.liver.carb_ratio) else {
        return Err(Error::Config(format!(
            "{} and {} (or liver.sensitivity and liver.carb_ratio) must be set",
            config::ENV_LIVER_ISF,
            config::ENV_LIVER_CR
        )));
    };

    let curve = load_circadian_curve(&data_dir.join(CIRCADIAN_FILE))?;
    let hour = hour.unwrap_or_else(|| CycleClock::local_now().local_hour);

    let model = LiverInfusionModel::with_hourly_release(
        isf,
        cr,
        config.projection.hourly_carb_impact,
    )?;
    let modulated = model.modulated(hour, &curve)?;

    println!("Base liver glucose infusion: {:.4}", model.baseline_infusion());
    println!("Liver glucose infusion at hour {}: {:.4}", hour, modulated);

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string(&modulated)?)?;
        println!("✓ Wrote {}", path.display());
    }

    Ok(())
}

fn cmd_project(
    data_dir: &Path,
    circadian: bool,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let clock = CycleClock::local_now();
    let start = load_projection_start(&data_dir.join(PROJECTION_START_FILE))?;
    let activity = load_activity(
        &data_dir.join(EXERCISE_FILE),
        &data_dir.join(STEPS_FILE),
    )?;

    let mut projector = GlucoseProjector::new(config.projection.clone(), &config.activity)?;
    if circadian {
        projector = projector.with_circadian(load_circadian_curve(&data_dir.join(CIRCADIAN_FILE))?);
    }
    let projection = projector.project(start, &activity, &clock)?;
    let curve = projection.rounded(MGDL_PER_MMOL);

    println!("BG start: {:.0} mg/dL", mmol_to_mgdl(start));
    println!("Mode: {:?}", projection.mode());
    println!("Simulated BG (1 hour): {:?}", curve);

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&curve)?)?;
        println!("✓ Simulated BG curve saved to {}", path.display());
    }

    Ok(())
}

fn cmd_carbs(grams: f64, step: u32) -> Result<()> {
    if !(grams.is_finite() && grams >= 0.0) {
        return Err(Error::Config(format!(
            "carbs must be a non-negative number, got {}",
            grams
        )));
    }

    println!("Absorption curve for {}g carbs\n", grams);
    for (minute, absorbed) in CarbAbsorptionModel::standard().curve(grams, step) {
        println!("Minute {}: {:.2}g", minute, absorbed);
    }
    Ok(())
}
