use std::io::{self, BufWriter, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use logsift_logs::{FilterCriteria, FilterEngine, LineStream, LogLevel, PatternKind, Source};

mod config;
mod report;

use config::{ColorChoice, Config, OutputFormat};
use report::{Report, RunInfo};

/// logsift - stream, filter and summarise text log files
#[derive(Parser, Debug)]
#[command(name = "logsift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log files to analyse (standard input when none are given or for "-")
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Keep lines containing this text (repeatable, any may match)
    #[arg(short = 'k', long = "keyword", value_name = "TEXT", conflicts_with = "regex")]
    keywords: Vec<String>,

    /// Keep lines matching this regular expression (repeatable)
    #[arg(short = 'e', long = "regex", value_name = "REGEX")]
    regex: Vec<String>,

    /// Minimum severity (trace, debug, info, warn, error, fatal)
    #[arg(short, long, value_name = "LEVEL")]
    level: Option<LogLevel>,

    /// Keep lines at or after this time
    #[arg(long, value_name = "TIME", value_parser = parse_since_arg)]
    since: Option<DateTime<Utc>>,

    /// Keep lines at or before this time
    #[arg(long, value_name = "TIME", value_parser = parse_until_arg)]
    until: Option<DateTime<Utc>>,

    /// chrono format of the timestamp at the start of each line
    #[arg(long, value_name = "FORMAT")]
    timestamp_format: Option<String>,

    /// Match patterns case-sensitively
    #[arg(short = 's', long)]
    case_sensitive: bool,

    /// Keep lines that do NOT match the patterns
    #[arg(short = 'v', long)]
    invert_match: bool,

    /// Only print the summary, not the matching lines
    #[arg(short, long)]
    count_only: bool,

    /// Skip unreadable sources instead of failing
    #[arg(long)]
    continue_on_error: bool,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// When to use colors
    #[arg(long, value_enum)]
    color: Option<ColorChoice>,

    /// Path to a TOML config file (default: ./logsift.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn parse_since_arg(value: &str) -> Result<DateTime<Utc>, String> {
    logsift_logs::parse_since(value).map_err(|e| e.to_string())
}

fn parse_until_arg(value: &str) -> Result<DateTime<Utc>, String> {
    logsift_logs::parse_until(value).map_err(|e| e.to_string())
}

/// `RUST_LOG` directives, or `warn` when unset or invalid
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so reports on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        // A closed pipe (e.g. `| head`) is not a failure
        Err(e) if is_broken_pipe(&e) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::BrokenPipe)
}

/// Merge command-line flags over config-file defaults
fn build_criteria(args: &Args, config: &Config) -> FilterCriteria {
    let (kind, patterns) = if args.regex.is_empty() {
        (PatternKind::Substring, args.keywords.clone())
    } else {
        (PatternKind::Regex, args.regex.clone())
    };

    let mut criteria = FilterCriteria::new()
        .with_patterns(kind, patterns)
        .with_time_range(args.since, args.until)
        .case_sensitive(args.case_sensitive || config.case_sensitive);
    criteria.min_level = args.level;
    criteria.invert = args.invert_match;
    criteria.timestamp_format = args
        .timestamp_format
        .clone()
        .or_else(|| config.timestamp_format.clone());
    for (name, pattern) in &config.categories {
        criteria = criteria.with_category(name.clone(), pattern.clone());
    }
    criteria
}

fn use_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal(),
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let criteria = build_criteria(&args, &config);

    // Fail on bad patterns and unreadable sources before printing anything
    let engine = FilterEngine::new(criteria).context("invalid filter criteria")?;
    let sources: Vec<Source> = args.files.iter().map(|p| Source::from_arg(p)).collect();
    let stream = LineStream::open(sources, args.continue_on_error || config.continue_on_error)?;

    let format = args.format.unwrap_or(config.format);
    let color = format == OutputFormat::Text && use_color(args.color.unwrap_or(config.color));
    let criteria = engine.criteria();
    let info = RunInfo {
        sources: stream.sources().to_vec(),
        patterns: criteria.patterns.clone(),
        regex: criteria.pattern_kind == PatternKind::Regex,
        invert: criteria.invert,
        case_sensitive: criteria.case_sensitive,
        min_level: criteria.min_level,
        since: criteria.since,
        until: criteria.until,
        count_only: args.count_only,
    };

    let stdout = io::stdout();
    let mut report = Report::new(BufWriter::new(stdout.lock()), format, color, info);
    report.header()?;

    let highlight = color && !criteria.invert;
    let summary = logsift_logs::analyze::<_, anyhow::Error>(stream, &engine, |result| {
        let spans = if highlight {
            engine.find_matches(&result.line.raw)
        } else {
            Vec::new()
        };
        report.write_match(result, &spans)?;
        Ok(())
    })?;

    report.summary(&summary)?;
    Ok(())
}
