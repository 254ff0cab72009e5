//! fitassist CLI - Command-line interface for the fitassist advisory engine
//!
//! Commands:
//! - trend: Derive the trend frame from daily records
//! - forecast: Forecast a metric at several day offsets
//! - classify: Classify the latest week with a stored model
//! - watchdog: Run the safety and goal rules
//! - report: Full advisory pass (forecast, classification, alerts, final state)
//! - analyze: Caloric efficiency, composition changes and correlations
//! - train: Train the compliance classifier and save it
//! - doctor: Diagnose configuration and model health

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use fitassist::analysis::{
    body_composition_changes, caloric_efficiency, correlation_report, summarize,
};
use fitassist::classifier::ModelStore;
use fitassist::forecast::derive_forecast_composition;
use fitassist::{
    AdvisoryConfig, AdvisoryPipeline, ComputeError, DailyFrame, GoalInfo, Metric, Sex,
    UserProfile, PRODUCER_NAME, VERSION,
};

/// fitassist - Trend, forecast and safety advisories for body-weight tracking
#[derive(Parser)]
#[command(name = "fitassist")]
#[command(version = VERSION)]
#[command(about = "Turn daily health records into trends, forecasts and advisories", long_about = None)]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Advisory configuration JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Daily records JSON file (use - for stdin)
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Output file path (use - for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct ProfileArgs {
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    dob: NaiveDate,

    /// Sex used for RMR coefficients (male or female)
    #[arg(long)]
    sex: Sex,

    /// Height in centimetres
    #[arg(long, default_value = "0")]
    height_cm: f64,
}

impl ProfileArgs {
    fn profile(&self) -> Result<UserProfile, CliFailure> {
        if !self.height_cm.is_finite() || self.height_cm < 0.0 {
            return Err(CliFailure::InvalidArgument(format!(
                "height must be a non-negative number, got {}",
                self.height_cm
            )));
        }
        Ok(UserProfile::new(self.dob, self.sex, self.height_cm))
    }
}

#[derive(Args)]
struct GoalArgs {
    /// Goal weight in kg
    #[arg(long, requires = "goal_date")]
    goal_weight: Option<f64>,

    /// Goal date (YYYY-MM-DD)
    #[arg(long, requires = "goal_weight")]
    goal_date: Option<NaiveDate>,

    /// Evaluation date for staleness checks (defaults to today)
    #[arg(long)]
    today: Option<NaiveDate>,
}

impl GoalArgs {
    fn goal(&self) -> Option<GoalInfo> {
        match (self.goal_weight, self.goal_date) {
            (Some(weight_kg), Some(date)) => Some(GoalInfo { weight_kg, date }),
            _ => None,
        }
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the trend frame from daily records
    Trend {
        #[command(flatten)]
        io: InputArgs,
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Forecast a metric at several day offsets
    Forecast {
        #[command(flatten)]
        io: InputArgs,
        #[command(flatten)]
        profile: ProfileArgs,

        /// Metric to forecast
        #[arg(long, default_value = "Weight")]
        target: Metric,

        /// Day offsets (comma separated, defaults to the configured offsets)
        #[arg(long, value_delimiter = ',')]
        offsets: Vec<u32>,

        /// Also derive fat mass, lean mass and RMR from weight and body fat forecasts
        #[arg(long)]
        composition: bool,
    },

    /// Classify the latest week with a stored model
    Classify {
        #[command(flatten)]
        io: InputArgs,
        #[command(flatten)]
        profile: ProfileArgs,

        /// Model JSON file
        #[arg(long)]
        model: PathBuf,
    },

    /// Run the safety and goal rules
    Watchdog {
        #[command(flatten)]
        io: InputArgs,
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        goal: GoalArgs,
    },

    /// Full advisory pass
    Report {
        #[command(flatten)]
        io: InputArgs,
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        goal: GoalArgs,

        /// Model JSON file (classification is reported as failed without one)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Caloric efficiency, composition changes and correlations
    Analyze {
        #[command(flatten)]
        io: InputArgs,
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Train the compliance classifier from one or more record files
    Train {
        /// Daily records JSON files
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        #[command(flatten)]
        profile: ProfileArgs,

        /// Where to save the trained model
        #[arg(long)]
        model: PathBuf,

        /// Output file for the training report (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Diagnose configuration and model health
    Doctor {
        /// Check a model file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| error.message.clone())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    let config = match &cli.config {
        Some(path) => AdvisoryConfig::from_file(path)?,
        None => AdvisoryConfig::default(),
    };

    match cli.command {
        Commands::Trend { io, profile } => {
            let pipeline = AdvisoryPipeline::new(config);
            let frame = pipeline.prepare(&read_records(&io.input)?, &profile.profile()?)?;
            write_json(&io, &frame)
        }

        Commands::Forecast {
            io,
            profile,
            target,
            offsets,
            composition,
        } => {
            let mut config = config;
            if !offsets.is_empty() {
                config.forecast_offsets = offsets;
            }
            cmd_forecast(&io, &profile.profile()?, target, composition, config)
        }

        Commands::Classify { io, profile, model } => {
            let mut pipeline = AdvisoryPipeline::new(config).with_model_store(ModelStore::new(model));
            let frame = pipeline.prepare(&read_records(&io.input)?, &profile.profile()?)?;
            let prediction = pipeline.classify(&frame)?;
            write_json(&io, &prediction)
        }

        Commands::Watchdog { io, profile, goal } => {
            let profile = profile.profile()?;
            let pipeline = AdvisoryPipeline::new(config);
            let frame = pipeline.prepare(&read_records(&io.input)?, &profile)?;
            let alerts = fitassist::Watchdog::from_config(pipeline.config()).run(
                &frame,
                &profile,
                goal.goal().as_ref(),
                goal.today(),
            );
            write_json(&io, &alerts)
        }

        Commands::Report {
            io,
            profile,
            goal,
            model,
        } => {
            let mut pipeline = AdvisoryPipeline::new(config);
            if let Some(model) = model {
                pipeline = pipeline.with_model_store(ModelStore::new(model));
            }
            let frame = DailyFrame::from_records_json(&read_input(&io.input)?)?;
            let report = pipeline.run(&frame, &profile.profile()?, goal.goal().as_ref(), goal.today());
            write_json(&io, &report)
        }

        Commands::Analyze { io, profile } => {
            let pipeline = AdvisoryPipeline::new(config);
            let frame = pipeline.prepare(&read_records(&io.input)?, &profile.profile()?)?;
            let analysis = serde_json::json!({
                "summary": summarize(&frame),
                "efficiency": caloric_efficiency(&frame).ok(),
                "composition": body_composition_changes(&frame).ok(),
                "correlations": correlation_report(&frame),
            });
            write_json(&io, &analysis)
        }

        Commands::Train {
            input,
            profile,
            model,
            output,
            pretty,
        } => {
            let frames = input
                .iter()
                .map(|path| Ok(DailyFrame::from_records_json(&read_input(path)?)?))
                .collect::<Result<Vec<_>, CliFailure>>()?;
            let mut pipeline = AdvisoryPipeline::new(config).with_model_store(ModelStore::new(model));
            let report = pipeline.retrain(&frames, &profile.profile()?)?;
            let io = InputArgs {
                input: PathBuf::from("-"),
                output,
                pretty,
            };
            write_json(&io, &report)
        }

        Commands::Doctor { model, json } => cmd_doctor(cli.config.as_deref(), model.as_deref(), json),
    }
}

fn cmd_forecast(
    io: &InputArgs,
    profile: &UserProfile,
    target: Metric,
    composition: bool,
    config: AdvisoryConfig,
) -> Result<(), CliFailure> {
    let pipeline = AdvisoryPipeline::new(config);
    let frame = pipeline.prepare(&read_records(&io.input)?, profile)?;
    let result = pipeline.forecast(&frame, target, profile)?;

    if !composition {
        return write_json(io, &result);
    }
    if target != Metric::Weight {
        return Err(CliFailure::InvalidArgument(
            "--composition requires --target Weight".to_string(),
        ));
    }
    let body_fat = match pipeline.forecast(&frame, Metric::BodyFatPercentage, profile) {
        Ok(bf) => Some(bf),
        Err(e) => {
            tracing::warn!(error = %e, "body fat forecast unavailable; composition left undefined");
            None
        }
    };
    let rows = derive_forecast_composition(&result, body_fat.as_ref(), profile);
    write_json(
        io,
        &serde_json::json!({
            "forecast": result,
            "body_fat": body_fat,
            "composition": rows,
        }),
    )
}

fn cmd_doctor(config: Option<&Path>, model: Option<&Path>, json: bool) -> Result<(), CliFailure> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("fitassist version {VERSION}"),
    });

    if let Some(path) = config {
        checks.push(match AdvisoryConfig::from_file(path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (forecast window {} days, offsets {:?})",
                    config.forecast.window,
                    config.offsets()
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {e}"),
            },
        });
    }

    if let Some(path) = model {
        let store = ModelStore::new(path);
        checks.push(if !store.exists() {
            DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Warning,
                message: "Model file does not exist; run 'fitassist train'".to_string(),
            }
        } else {
            match store.load() {
                Ok(model) => DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Model valid ({} classes)", model.classes().len()),
                },
                Err(e) => DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load model: {e}"),
                },
            }
        });
    }

    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdin) {
            "stdin is a TTY; pass records with --input".to_string()
        } else {
            "stdin is a pipe (records can be read from -)".to_string()
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("fitassist Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(CliFailure::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(path: &Path) -> Result<String, CliFailure> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn read_records(path: &Path) -> Result<fitassist::DailyRecords, CliFailure> {
    Ok(serde_json::from_str(&read_input(path)?)?)
}

fn write_json<T: serde::Serialize>(io: &InputArgs, value: &T) -> Result<(), CliFailure> {
    let mut text = if io.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    text.push('\n');

    if io.output.to_string_lossy() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(text.as_bytes())?;
        handle.flush()?;
    } else {
        fs::write(&io.output, text)?;
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    InvalidArgument(String),
    DoctorFailed,
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<ComputeError> for CliFailure {
    fn from(e: ComputeError) -> Self {
        CliFailure::Compute(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Compute(e) => {
                let hint = match &e {
                    ComputeError::MissingColumn(_) => "Check that the records contain the metric",
                    ComputeError::InsufficientData { .. } => "Provide a longer daily history",
                    ComputeError::ModelUnavailable(_) => "Run 'fitassist train' to create a model",
                    ComputeError::UnknownMetric(_) => "Use one of the supported metric names",
                    ComputeError::InvalidProfile(_) => "Check --dob, --sex and --height-cm",
                    ComputeError::InvalidConfig(_) => "Check the configuration file values",
                    _ => "Check input format",
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Input must be an object of ISO dates to metric values".to_string()),
            },
            CliFailure::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: None,
            },
            CliFailure::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
