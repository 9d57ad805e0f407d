//! Credence CLI - Command-line interface for the Credence scoring engine
//!
//! Commands:
//! - score: Score a recorded frame log (batch mode)
//! - run: Score frames streamed on stdin, printing live indicators (streaming mode)
//! - doctor: Diagnose configuration and classifier health
//! - schema: Print input/output schema information

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use uuid::Uuid;

use credence::classifier::Classifier;
use credence::config::EngineConfig;
use credence::extractor::{categories, parse_frames_ndjson, LandmarkFrame};
use credence::recorder::classifier_from_config;
use credence::report::{JsonFileStore, ReportAssembler, ReportStore};
use credence::sampler::Dispatch;
use credence::transcript::parse_analysis;
use credence::{
    replay_session, EngineError, SessionRecorder, ENGINE_VERSION, PRODUCER_NAME,
};

/// Credence - behavioral-signal credibility scoring for recorded interviews
#[derive(Parser)]
#[command(name = "credence")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Score interview recordings from facial blendshape streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a recorded frame log (batch mode)
    Score {
        /// Input file path, NDJSON frames (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Raw transcript-analysis model output to attach to the report
        #[arg(long)]
        analysis: Option<PathBuf>,

        /// Emit a full session report instead of the bare summary
        #[arg(long)]
        report: bool,

        /// Also save the report into this directory as <session id>.json
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Score frames streamed on stdin (streaming mode)
    Run {
        /// Classifier dispatch mode
        #[arg(long)]
        dispatch: Option<DispatchArg>,

        /// Flush output after each frame
        #[arg(long, default_value = "true")]
        flush: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Diagnose configuration and classifier health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

/// Engine settings shared by every scoring command
#[derive(Args)]
struct EngineArgs {
    /// Engine config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Classifier base URL, e.g. http://localhost:5001
    #[arg(long)]
    endpoint: Option<String>,

    /// Classify every Nth recorded frame
    #[arg(long)]
    sample_every: Option<u32>,

    /// Classifier request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl EngineArgs {
    /// Config file (or defaults) with command-line overrides applied
    fn load(&self) -> Result<EngineConfig, CredenceCliError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(endpoint) = &self.endpoint {
            config.classifier.endpoint = Some(endpoint.clone());
        }
        if let Some(n) = self.sample_every {
            config.sample_every_n_frames = n;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.classifier.timeout_ms = timeout_ms;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON on one line
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum DispatchArg {
    /// Classifier runs on the frame path
    Inline,
    /// Classifier runs on a worker thread, latest job wins
    Background,
}

impl From<DispatchArg> for Dispatch {
    fn from(arg: DispatchArg) -> Self {
        match arg {
            DispatchArg::Inline => Dispatch::Inline,
            DispatchArg::Background => Dispatch::Background,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (NDJSON landmark frames)
    Input,
    /// Output schema (session report)
    Output,
}

fn main() -> ExitCode {
    // Logs go to stderr; set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CredenceCliError> {
    match cli.command {
        Commands::Score {
            input,
            output,
            analysis,
            report,
            store,
            output_format,
            engine,
        } => cmd_score(
            &input,
            &output,
            analysis.as_deref(),
            report,
            store.as_deref(),
            &output_format,
            &engine,
        ),
        Commands::Run {
            dispatch,
            flush,
            engine,
        } => cmd_run(dispatch, flush, &engine),
        Commands::Doctor { json, engine } => cmd_doctor(&engine, json),
        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_score(
    input: &Path,
    output: &Path,
    analysis: Option<&Path>,
    report: bool,
    store: Option<&Path>,
    output_format: &OutputFormat,
    engine: &EngineArgs,
) -> Result<(), CredenceCliError> {
    let config = engine.load()?;

    // Read input
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let frames = parse_frames_ndjson(&input_data)?;
    if frames.is_empty() {
        log::warn!("no frames in input, scoring an empty session");
    }

    let classifier = classifier_from_config(&config);
    let summary = replay_session(frames, &config, classifier)?;

    let output_data = if report || analysis.is_some() || store.is_some() {
        let transcript = match analysis {
            Some(path) => Some(parse_analysis(&fs::read_to_string(path)?)),
            None => None,
        };
        let report = ReportAssembler::assemble(Uuid::new_v4(), summary, transcript);
        if let Some(dir) = store {
            JsonFileStore::open(dir)?.save(&report)?;
        }
        format_output(&report, output_format)?
    } else {
        format_output(&summary, output_format)?
    };

    // Write output
    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(
    dispatch: Option<DispatchArg>,
    flush: bool,
    engine: &EngineArgs,
) -> Result<(), CredenceCliError> {
    let mut config = engine.load()?;
    if let Some(dispatch) = dispatch {
        config.classifier.dispatch = dispatch.into();
    }

    let mut recorder = SessionRecorder::from_config(config)?;
    recorder.start()?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let frame: LandmarkFrame = serde_json::from_str(trimmed).map_err(|e| {
            CredenceCliError::ParseError(format!(
                "Failed to parse frame on line {}: {}",
                index + 1,
                e
            ))
        })?;

        match recorder.process_frame(&frame) {
            Ok(Some(live)) => {
                writeln!(stdout, "{}", serde_json::to_string(&live)?)?;
                if flush {
                    stdout.flush()?;
                }
            }
            Ok(None) => {}
            // Out-of-order frames are dropped; the recording continues
            Err(e @ EngineError::OutOfOrderFrame { .. }) => log::warn!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }

    let completed = recorder.stop()?;
    writeln!(stdout, "{}", serde_json::to_string(&completed)?)?;
    stdout.flush()?;

    Ok(())
}

fn cmd_doctor(engine: &EngineArgs, json: bool) -> Result<(), CredenceCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Credence version {}", ENGINE_VERSION),
    });

    // Config file and overrides
    let config = match engine.load() {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Sampling every {} frames, rolling window {} frames, {:?} dispatch",
                    config.sample_every_n_frames,
                    config.rolling_window_frames,
                    config.classifier.dispatch
                ),
            });
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            None
        }
    };

    // Classifier health
    if let Some(config) = &config {
        let check = match classifier_from_config(config) {
            None => DoctorCheck {
                name: "classifier".to_string(),
                status: CheckStatus::Warning,
                message: "No classifier endpoint configured; scores use stress only".to_string(),
            },
            Some(classifier) => classifier_check(classifier),
        };
        checks.push(check);
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Credence Doctor Report");
        println!("======================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CredenceCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn classifier_check(classifier: Arc<dyn Classifier>) -> DoctorCheck {
    match classifier.health() {
        Ok(health) if health.model_loaded => DoctorCheck {
            name: "classifier".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} is up with a model loaded", classifier.name()),
        },
        Ok(_) => DoctorCheck {
            name: "classifier".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} is up but reports no model loaded", classifier.name()),
        },
        Err(e) => DoctorCheck {
            name: "classifier".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} unreachable: {}", classifier.name(), e),
        },
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), CredenceCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input: NDJSON, one landmark frame per line");
                println!();
                println!("- timestamp: RFC 3339 capture time");
                println!("- faces: list of detected faces (zero or one), each a list of");
                println!("  {{ categoryName, score }} blendshapes with score in [0, 1]");
                println!("- image: optional base64 or data URL frame for the classifier");
                println!();
                println!("Blendshape categories read (missing ones count as 0):");
                for name in categories::ALL {
                    println!("  - {}", name);
                }
                println!();
                println!("Frames without a face are skipped.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output: session report");
                println!();
                println!("- sessionId, createdAt, producer: {{ name, version }}");
                println!("- summary:");
                println!("  - averageStress, minStress, maxStress: stress in [0, 1]");
                println!("  - expression / authenticity: {{ last, average }} classifier view");
                println!("  - credibilityScore: integer 0-100, higher is more credible");
                println!("  - status: high (>= 70), medium (40-69), low (< 40)");
                println!("  - frameCount: records the summary was computed from");
                println!("- summaryText: e.g. \"High credibility (82/100)\"");
                println!(
                    "- transcript: optional {{ status: completed, analysis }} or {{ status: failed, error }}"
                );
            }
        }
    }

    Ok(())
}

fn format_output<T: serde::Serialize>(
    value: &T,
    format: &OutputFormat,
) -> Result<String, CredenceCliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(value)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)?),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "credence.landmark_frame",
        "description": "One captured frame with landmark blendshapes",
        "type": "object",
        "required": ["timestamp"],
        "properties": {
            "timestamp": { "type": "string", "format": "date-time" },
            "faces": {
                "type": "array",
                "maxItems": 1,
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["categoryName", "score"],
                        "properties": {
                            "categoryName": { "type": "string" },
                            "score": { "type": "number", "minimum": 0, "maximum": 1 }
                        }
                    }
                }
            },
            "image": { "type": "string" }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let axis = serde_json::json!({
        "type": "object",
        "properties": {
            "last": {
                "type": ["object", "null"],
                "properties": {
                    "label": { "type": "string" },
                    "confidence": { "type": "number" },
                    "probabilities": { "type": "object" }
                }
            },
            "average": {
                "type": ["object", "null"],
                "properties": {
                    "label": { "type": "string" },
                    "probability": { "type": "number" },
                    "meanProbabilities": { "type": "object" },
                    "samples": { "type": "integer" }
                }
            }
        }
    });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "credence.session_report",
        "description": "Credence session report",
        "type": "object",
        "required": ["sessionId", "createdAt", "producer", "summary", "summaryText"],
        "properties": {
            "sessionId": { "type": "string", "format": "uuid" },
            "createdAt": { "type": "string", "format": "date-time" },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" }
                }
            },
            "summary": {
                "type": "object",
                "required": [
                    "averageStress",
                    "maxStress",
                    "minStress",
                    "credibilityScore",
                    "status"
                ],
                "properties": {
                    "averageStress": { "type": "number" },
                    "maxStress": { "type": "number" },
                    "minStress": { "type": "number" },
                    "expression": axis.clone(),
                    "authenticity": axis,
                    "credibilityScore": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "status": { "type": "string", "enum": ["high", "medium", "low"] },
                    "frameCount": { "type": "integer" }
                }
            },
            "summaryText": { "type": "string" },
            "transcript": {
                "type": "object",
                "required": ["status"],
                "properties": {
                    "status": { "type": "string", "enum": ["completed", "failed"] },
                    "analysis": { "type": "object" },
                    "error": { "type": "string" }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum CredenceCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for CredenceCliError {
    fn from(e: io::Error) -> Self {
        CredenceCliError::Io(e)
    }
}

impl From<EngineError> for CredenceCliError {
    fn from(e: EngineError) -> Self {
        CredenceCliError::Engine(e)
    }
}

impl From<serde_json::Error> for CredenceCliError {
    fn from(e: serde_json::Error) -> Self {
        CredenceCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CredenceCliError> for CliError {
    fn from(e: CredenceCliError) -> Self {
        match e {
            CredenceCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CredenceCliError::Engine(EngineError::Config(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'credence doctor' to check the configuration".to_string()),
            },
            CredenceCliError::Engine(EngineError::Io(e)) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CredenceCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(
                    "Ensure input matches the frame schema ('credence schema input')".to_string(),
                ),
            },
            CredenceCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CredenceCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            CredenceCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
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
