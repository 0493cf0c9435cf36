use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};

use logsift_types::LogLevel;

use crate::AnalyzeError;

/// Formats tried in order when no explicit timestamp format is configured
const DEFAULT_TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d/%b/%Y:%H:%M:%S %z",
    "%Y-%m-%d",
];

/// How many leading words of a plain-text line are searched for a level
const LEVEL_SEARCH_WORDS: usize = 6;

/// Structure extracted from one raw line
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Option<LogLevel>,
}

/// Log parser for extracting timestamps and levels from raw log lines
#[derive(Clone, Debug)]
pub struct LogParser {
    /// Explicit timestamp format; `None` means auto-detect
    format: Option<String>,
}

impl LogParser {
    /// Parser that auto-detects common timestamp layouts
    pub fn new() -> Self {
        Self { format: None }
    }

    /// Parser bound to one chrono strftime format
    pub fn with_format(format: &str) -> Result<Self, AnalyzeError> {
        let invalid = format.trim().is_empty()
            || StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
        if invalid {
            return Err(AnalyzeError::InvalidTimestampFormat {
                format: format.to_string(),
            });
        }

        Ok(Self {
            format: Some(format.to_string()),
        })
    }

    /// Configured timestamp format, if any
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Parse a raw log line into its timestamp and level
    pub fn parse(&self, raw: &str) -> ParsedLine {
        let (mut timestamp, content) = self.extract_timestamp(raw);

        let level = match Self::try_parse_json(content) {
            Some(fields) => {
                if timestamp.is_none() {
                    timestamp = self.extract_timestamp_from_json(&fields);
                }
                Self::extract_level_from_json(&fields)
            }
            None => Self::extract_level_from_text(content),
        };

        ParsedLine { timestamp, level }
    }

    /// Extract a timestamp from the beginning of a line, returning the rest
    pub fn extract_timestamp<'a>(&self, raw: &'a str) -> (Option<DateTime<Utc>>, &'a str) {
        let trimmed = raw.trim_start();
        let candidate = trimmed.strip_prefix('[').unwrap_or(trimmed);

        let parsed = match &self.format {
            Some(format) => parse_prefix(candidate, format),
            None => Self::detect_prefix(candidate),
        };

        match parsed {
            Some((ts, rest)) => {
                let rest = rest.strip_prefix(']').unwrap_or(rest).trim_start();
                (Some(ts), rest)
            }
            None => (None, raw),
        }
    }

    fn detect_prefix(candidate: &str) -> Option<(DateTime<Utc>, &str)> {
        // RFC 3339 first token (format: 2024-01-15T10:30:00.123456789Z)
        let token_end = candidate
            .find(|c: char| c.is_whitespace() || c == ']')
            .unwrap_or(candidate.len());
        if let Ok(ts) = DateTime::parse_from_rfc3339(&candidate[..token_end]) {
            return Some((ts.with_timezone(&Utc), &candidate[token_end..]));
        }

        // %Y accepts any digit count; "15-01-2024" must not read as year 15
        DEFAULT_TIMESTAMP_FORMATS
            .iter()
            .filter_map(|format| parse_prefix(candidate, format))
            .find(|(ts, _)| (1000..=9999).contains(&ts.year()))
    }

    /// Try to parse content as a JSON object
    fn try_parse_json(content: &str) -> Option<Map<String, Value>> {
        let trimmed = content.trim();
        if !trimmed.starts_with('{') {
            return None;
        }

        match serde_json::from_str(trimmed).ok()? {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    fn extract_timestamp_from_json(&self, fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
        ["timestamp", "time", "ts", "@timestamp", "datetime"]
            .iter()
            .filter_map(|key| fields.get(*key)?.as_str())
            .find_map(|s| self.extract_timestamp(s).0)
    }

    /// Extract log level from JSON fields
    fn extract_level_from_json(fields: &Map<String, Value>) -> Option<LogLevel> {
        let level_fields = [
            "level",
            "lvl",
            "severity",
            "log.level",
            "loglevel",
            "log_level",
            "Level",
            "LEVEL",
        ];

        for field in level_fields {
            match fields.get(field) {
                Some(Value::String(s)) => return LogLevel::parse(s),
                Some(Value::Number(n)) => {
                    // Bunyan/pino numeric levels
                    if let Some(num) = n.as_u64() {
                        return Some(match num {
                            0..=10 => LogLevel::Trace,
                            11..=20 => LogLevel::Debug,
                            21..=30 => LogLevel::Info,
                            31..=40 => LogLevel::Warn,
                            41..=50 => LogLevel::Error,
                            _ => LogLevel::Fatal,
                        });
                    }
                }
                _ => {}
            }
        }

        None
    }

    /// Extract log level from the first few words of plain text
    ///
    /// Recognises `[ERROR]`, `ERROR:`, `<error>`, `level=error` and bare words.
    /// The earliest word wins, so a level keyword later in the message text
    /// does not override the one in the header.
    fn extract_level_from_text(content: &str) -> Option<LogLevel> {
        content
            .split_whitespace()
            .take(LEVEL_SEARCH_WORDS)
            .find_map(level_word)
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret one whitespace-delimited word as a level keyword
fn level_word(word: &str) -> Option<LogLevel> {
    let word = ["level=", "lvl=", "severity="]
        .iter()
        .find_map(|prefix| {
            word.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &word[prefix.len()..])
        })
        .unwrap_or(word);

    let word = word.trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | '<' | '>' | ':' | '|' | ',' | '"'));

    match word.to_ascii_uppercase().as_str() {
        "TRACE" => Some(LogLevel::Trace),
        "DEBUG" => Some(LogLevel::Debug),
        "INFO" => Some(LogLevel::Info),
        "WARN" | "WARNING" => Some(LogLevel::Warn),
        "ERROR" | "ERR" => Some(LogLevel::Error),
        "FATAL" | "PANIC" | "CRITICAL" | "CRIT" => Some(LogLevel::Fatal),
        _ => None,
    }
}

/// Parse a timestamp at the start of `s` with `format`, returning the rest
///
/// Offset-bearing formats keep their offset; naive ones are read as UTC and
/// date-only ones as midnight UTC.
fn parse_prefix<'a>(s: &'a str, format: &str) -> Option<(DateTime<Utc>, &'a str)> {
    if let Ok((ts, rest)) = DateTime::parse_and_remainder(s, format) {
        return Some((ts.with_timezone(&Utc), rest));
    }
    if let Ok((ts, rest)) = NaiveDateTime::parse_and_remainder(s, format) {
        return Some((ts.and_utc(), rest));
    }
    if let Ok((date, rest)) = NaiveDate::parse_and_remainder(s, format) {
        return Some((date.and_time(NaiveTime::MIN).and_utc(), rest));
    }
    None
}

/// Parse a `--since` value; a bare date means the start of that day
pub fn parse_since(value: &str) -> Result<DateTime<Utc>, AnalyzeError> {
    parse_bound(value, NaiveTime::MIN)
}

/// Parse an `--until` value; a bare date means the end of that day
pub fn parse_until(value: &str) -> Result<DateTime<Utc>, AnalyzeError> {
    let end_of_day = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
    parse_bound(value, end_of_day)
}

fn parse_bound(value: &str, date_only_time: NaiveTime) -> Result<DateTime<Utc>, AnalyzeError> {
    let trimmed = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(date_only_time).and_utc());
    }

    Err(AnalyzeError::InvalidTimeBound {
        value: value.to_string(),
    })
}
