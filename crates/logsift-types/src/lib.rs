//! Shared types for logsift
//!
//! This crate contains the data model passed between the line stream, the
//! filter engine, the aggregator and the report renderer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Sources
// ============================================================================

/// Where a line was read from
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    Stdin,
    File(PathBuf),
}

impl Source {
    /// Build a source from a command-line argument (`-` means stdin)
    pub fn from_arg(arg: &Path) -> Self {
        if arg.as_os_str() == "-" {
            Self::Stdin
        } else {
            Self::File(arg.to_path_buf())
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("<stdin>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level, ordered from least to most severe
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// Parse log level from common formats
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" | "trc" | "trce" => Some(Self::Trace),
            "debug" | "dbg" | "debg" => Some(Self::Debug),
            "info" | "inf" | "information" | "notice" => Some(Self::Info),
            "warn" | "warning" | "wrn" => Some(Self::Warn),
            "error" | "err" | "erro" => Some(Self::Error),
            "fatal" | "panic" | "critical" | "crit" | "ftl" | "emerg" | "alert" => {
                Some(Self::Fatal)
            }
            _ => None,
        }
    }

    /// Full upper-case label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown log level '{s}'"))
    }
}

/// A single line read from a source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// 1-based line number within the source
    pub line_number: u64,

    /// Source the line was read from
    pub source: Source,

    /// Line content without the trailing newline
    pub raw: String,
}

impl LogLine {
    pub fn new(source: Source, line_number: u64, raw: String) -> Self {
        Self {
            line_number,
            source,
            raw,
        }
    }
}

/// A line that satisfied every active filter criterion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub line: LogLine,

    /// Detected log level
    pub level: Option<LogLevel>,

    /// Parsed timestamp (if available)
    pub timestamp: Option<DateTime<Utc>>,

    /// Custom categories whose pattern matched this line
    pub tags: Vec<String>,

    /// Set when a time bound was active but no timestamp could be parsed
    pub untimed: bool,
}

impl MatchResult {
    pub fn new(line: LogLine) -> Self {
        Self {
            line,
            level: None,
            timestamp: None,
            tags: Vec::new(),
            untimed: false,
        }
    }
}

// ============================================================================
// Summary Types
// ============================================================================

/// Per-source line counts
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: Source,
    pub scanned: u64,
    pub matched: u64,
}

impl SourceSummary {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            scanned: 0,
            matched: 0,
        }
    }
}

/// A source that could not be read and was skipped
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source: Source,
    pub reason: String,
}

/// Aggregated counts for one run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub lines_scanned: u64,
    pub lines_matched: u64,

    /// Matched lines per detected level
    pub levels: BTreeMap<LogLevel, u64>,

    /// Matched lines per custom category
    pub tags: BTreeMap<String, u64>,

    /// Matched lines exempted from a time bound because no timestamp parsed
    pub untimed_lines: u64,

    pub sources: Vec<SourceSummary>,
    pub skipped: Vec<SkippedSource>,
}

impl Summary {
    /// Count for a single level (zero when absent)
    pub fn level_count(&self, level: LogLevel) -> u64 {
        self.levels.get(&level).copied().unwrap_or(0)
    }

    /// Matched lines with no detectable level
    pub fn unleveled(&self) -> u64 {
        self.lines_matched
            .saturating_sub(self.levels.values().sum::<u64>())
    }
}
