//! Lens CLI - Command-line interface for Session Lens
//!
//! Commands:
//! - analyze: Analyze one recorded session
//! - overview: Analyze a batch of sessions and roll them up
//! - page: Analyze one URL across a batch of sessions
//! - trends: Bucket a batch of sessions by start day
//! - patterns: Print the built-in pattern tables

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use session_lens::logging::{init_tracing, LogFormat};
use session_lens::overview::SessionInput;
use session_lens::patterns::PatternConfig;
use session_lens::pipeline::{parse_events, parse_meta, SessionAnalyzer};
use session_lens::trends::DEFAULT_TREND_DAYS;
use session_lens::types::SessionMeta;
use session_lens::{AnalysisError, EventNormalizer, LENS_VERSION};

/// Lens - Behavioral analysis for recorded browsing sessions
#[derive(Parser)]
#[command(name = "lens")]
#[command(version = LENS_VERSION)]
#[command(about = "Turn recorded session events into UX insights", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one session's events
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Session metadata JSON file
        #[arg(long)]
        meta: Option<PathBuf>,

        /// Input format
        #[arg(long, value_enum, default_value = "json")]
        input_format: InputFormat,

        /// Pattern configuration JSON file
        #[arg(long)]
        patterns: Option<PathBuf>,

        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze many sessions (one session object per line) into an overview
    Overview {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Pattern configuration JSON file
        #[arg(long)]
        patterns: Option<PathBuf>,

        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze one URL across many sessions (one session object per line)
    Page {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Page URL to analyze, e.g. /pricing
        #[arg(long)]
        url: String,

        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Daily trends over many sessions (one session object per line)
    Trends {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Window length in days (1-90)
        #[arg(long, default_value_t = DEFAULT_TREND_DAYS)]
        days: u32,

        /// Last day of the window, YYYY-MM-DD (defaults to today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Pattern configuration JSON file
        #[arg(long)]
        patterns: Option<PathBuf>,

        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the built-in pattern tables as JSON
    Patterns,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// JSON array of events
    Json,
    /// Newline-delimited JSON (one event per line)
    Ndjson,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level, cli.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), LensCliError> {
    match command {
        Commands::Analyze {
            input,
            meta,
            input_format,
            patterns,
            pretty,
            output,
        } => cmd_analyze(
            &input,
            meta.as_deref(),
            input_format,
            patterns.as_deref(),
            pretty,
            output.as_deref(),
        ),

        Commands::Overview {
            input,
            patterns,
            pretty,
            output,
        } => cmd_overview(&input, patterns.as_deref(), pretty, output.as_deref()),

        Commands::Page {
            input,
            url,
            pretty,
            output,
        } => {
            let sessions = read_sessions(&input)?;
            let analysis = SessionAnalyzer::new().page_analysis(&url, &sessions);
            write_output(output.as_deref(), &to_json(&analysis, pretty)?)
        }

        Commands::Trends {
            input,
            days,
            today,
            patterns,
            pretty,
            output,
        } => {
            let analyzer = build_analyzer(patterns.as_deref())?;
            let sessions = read_sessions(&input)?;
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            let trends = analyzer.trends(sessions, days, today);
            write_output(output.as_deref(), &to_json(&trends, pretty)?)
        }

        Commands::Patterns => {
            let json = serde_json::to_string_pretty(&PatternConfig::default())?;
            write_output(None, &json)
        }
    }
}

fn cmd_analyze(
    input: &Path,
    meta: Option<&Path>,
    input_format: InputFormat,
    patterns: Option<&Path>,
    pretty: bool,
    output: Option<&Path>,
) -> Result<(), LensCliError> {
    let analyzer = build_analyzer(patterns)?;
    let meta = match meta {
        Some(path) => parse_meta(&fs::read_to_string(path)?)?,
        None => SessionMeta::default(),
    };

    let input_data = read_input(input)?;
    let result = match input_format {
        InputFormat::Json => analyzer.analyze(&parse_events(&input_data)?, &meta),
        InputFormat::Ndjson => {
            analyzer.analyze_events(EventNormalizer::parse_ndjson(&input_data)?, &meta)
        }
    };

    write_output(output, &to_json(&result, pretty)?)
}

fn cmd_overview(
    input: &Path,
    patterns: Option<&Path>,
    pretty: bool,
    output: Option<&Path>,
) -> Result<(), LensCliError> {
    let analyzer = build_analyzer(patterns)?;
    let sessions = read_sessions(input)?;
    let overview = analyzer.overview(sessions);
    write_output(output, &to_json(&overview, pretty)?)
}

/// Read NDJSON sessions, one `{"session_id", "meta", "events"}` per line
fn read_sessions(input: &Path) -> Result<Vec<SessionInput>, LensCliError> {
    let reader: Box<dyn BufRead> = if is_stdin(input) {
        ensure_piped_stdin()?;
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(input)?))
    };

    let mut sessions = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let session: SessionInput = serde_json::from_str(trimmed).map_err(|e| {
            LensCliError::ParseError(format!("Failed to parse session on line {}: {}", line_num + 1, e))
        })?;
        sessions.push(session);
    }

    if sessions.is_empty() {
        return Err(LensCliError::NoSessions);
    }
    Ok(sessions)
}

fn build_analyzer(patterns: Option<&Path>) -> Result<SessionAnalyzer, LensCliError> {
    match patterns {
        Some(path) => {
            let config = PatternConfig::from_json(&fs::read_to_string(path)?)?;
            Ok(SessionAnalyzer::from_config(&config)?)
        }
        None => Ok(SessionAnalyzer::new()),
    }
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn ensure_piped_stdin() -> Result<(), LensCliError> {
    if atty::is(atty::Stream::Stdin) {
        return Err(LensCliError::InteractiveStdin);
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String, LensCliError> {
    if is_stdin(path) {
        ensure_piped_stdin()?;
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, LensCliError> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn write_output(output: Option<&Path>, json: &str) -> Result<(), LensCliError> {
    match output {
        Some(path) if !is_stdin(path) => fs::write(path, format!("{}\n", json))?,
        _ => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum LensCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    ParseError(String),
    NoSessions,
    InteractiveStdin,
}

impl From<io::Error> for LensCliError {
    fn from(e: io::Error) -> Self {
        LensCliError::Io(e)
    }
}

impl From<AnalysisError> for LensCliError {
    fn from(e: AnalysisError) -> Self {
        LensCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for LensCliError {
    fn from(e: serde_json::Error) -> Self {
        LensCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LensCliError> for CliError {
    fn from(e: LensCliError) -> Self {
        match e {
            LensCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LensCliError::Analysis(e @ AnalysisError::InvalidPattern { .. }) => CliError {
                code: "PATTERN_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'lens patterns' to see a valid pattern configuration".to_string()),
            },
            LensCliError::Analysis(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Events must be a JSON array of recorder events".to_string()),
            },
            LensCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LensCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be {\"session_id\", \"meta\", \"events\"}".to_string()),
            },
            LensCliError::NoSessions => CliError {
                code: "NO_SESSIONS".to_string(),
                message: "No sessions found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            LensCliError::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "Refusing to read events from an interactive terminal".to_string(),
                hint: Some("Pipe input into the command or pass a file with -i".to_string()),
            },
        }
    }
}
