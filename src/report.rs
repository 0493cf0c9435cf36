//! Rendering of matched lines and the final summary

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize};
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use logsift_logs::{LogLevel, MatchResult, Source, Summary};

use crate::config::OutputFormat;

const RULE_WIDTH: usize = 50;

/// Description of the run, shown in the report header
#[derive(Debug, Default)]
pub struct RunInfo {
    pub sources: Vec<Source>,
    pub patterns: Vec<String>,
    pub regex: bool,
    pub invert: bool,
    pub case_sensitive: bool,
    pub min_level: Option<LogLevel>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub count_only: bool,
}

/// Get display color for a log level
fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Trace => Color::DarkGrey,
        LogLevel::Debug => Color::Cyan,
        LogLevel::Info => Color::Green,
        LogLevel::Warn => Color::Yellow,
        LogLevel::Error => Color::Red,
        LogLevel::Fatal => Color::Magenta,
    }
}

/// One matched line in JSON output
#[derive(Serialize)]
struct MatchRecord<'a> {
    source: &'a Source,
    line: u64,
    level: Option<LogLevel>,
    timestamp: Option<DateTime<Utc>>,
    tags: &'a [String],
    text: &'a str,
}

#[derive(Serialize)]
struct SummaryRecord<'a> {
    summary: &'a Summary,
}

/// Streaming report writer
pub struct Report<W: Write> {
    out: W,
    format: OutputFormat,
    color: bool,
    info: RunInfo,
}

impl<W: Write> Report<W> {
    pub fn new(out: W, format: OutputFormat, color: bool, info: RunInfo) -> Self {
        Self {
            out,
            format,
            color,
            info,
        }
    }

    /// Prefix lines with their source when reading several
    fn show_source(&self) -> bool {
        self.info.sources.len() > 1
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dim().to_string()
        } else {
            text.to_string()
        }
    }

    fn rule(&mut self) -> io::Result<()> {
        let rule = self.dim(&"-".repeat(RULE_WIDTH));
        writeln!(self.out, "{rule}")
    }

    /// Banner with the active options (text format only)
    pub fn header(&mut self) -> io::Result<()> {
        if self.format != OutputFormat::Text {
            return Ok(());
        }

        let title = format!("= = = logsift v{} = = =", env!("CARGO_PKG_VERSION"));
        let title = if self.color {
            title.green().bold().to_string()
        } else {
            title
        };
        let lines = self.option_lines();

        self.rule()?;
        writeln!(self.out, "{title}")?;
        self.rule()?;
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        self.rule()
    }

    fn option_lines(&self) -> Vec<String> {
        let info = &self.info;
        let mut lines = Vec::new();

        // Every file may have been skipped; stdin is only read when none were given
        let sources = if info.sources.is_empty() {
            "(none)".to_string()
        } else {
            info.sources
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!("Log sources: {sources}"));

        if info.patterns.is_empty() {
            lines.push("No pattern provided, all log entries will be considered.".to_string());
        } else {
            let kind = if info.regex { "Regex patterns" } else { "Keywords" };
            let case = if info.case_sensitive { "case-sensitive" } else { "case-insensitive" };
            let invert = if info.invert { ", inverted" } else { "" };
            lines.push(format!("{kind} provided: {} ({case}{invert})", info.patterns.join(", ")));
        }
        if let Some(level) = info.min_level {
            lines.push(format!("Minimum level: {level}"));
        }
        if info.since.is_some() || info.until.is_some() {
            let fmt = |t: Option<DateTime<Utc>>| t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "*".to_string());
            lines.push(format!("Time range: {} .. {}", fmt(info.since), fmt(info.until)));
        }
        lines.push(format!(
            "Count only mode: {}",
            if info.count_only { "Enabled" } else { "Disabled" }
        ));
        lines
    }

    /// Write one matched line; `highlights` are byte spans to emphasise
    pub fn write_match(&mut self, result: &MatchResult, highlights: &[(usize, usize)]) -> io::Result<()> {
        if self.info.count_only {
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                let record = MatchRecord {
                    source: &result.line.source,
                    line: result.line.line_number,
                    level: result.level,
                    timestamp: result.timestamp,
                    tags: &result.tags,
                    text: &result.line.raw,
                };
                serde_json::to_writer(&mut self.out, &record)?;
                writeln!(self.out)
            }
            OutputFormat::Text => {
                let prefix = if self.show_source() {
                    format!("{}:", result.line.source)
                } else {
                    String::new()
                };
                let position = self.dim(&format!(" {}{} ::", prefix, result.line.line_number));
                let text = self.highlight(&result.line.raw, result.level, highlights);
                writeln!(self.out, "{position} {text}")
            }
        }
    }

    fn highlight(&self, raw: &str, level: Option<LogLevel>, spans: &[(usize, usize)]) -> String {
        if !self.color {
            return raw.to_string();
        }

        let base = level.map(level_color).unwrap_or(Color::Reset);
        let mut out = String::with_capacity(raw.len() + 16);
        let mut cursor = 0;
        for &(start, end) in spans {
            // Spans are sorted; skip any overlapping an emitted one
            if start < cursor || end > raw.len() {
                continue;
            }
            out.push_str(&raw[cursor..start].with(base).to_string());
            out.push_str(&raw[start..end].yellow().bold().to_string());
            cursor = end;
        }
        out.push_str(&raw[cursor..].with(base).to_string());
        out
    }

    /// Final summary and footer
    pub fn summary(&mut self, summary: &Summary) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            serde_json::to_writer(&mut self.out, &SummaryRecord { summary })?;
            writeln!(self.out)?;
            return self.out.flush();
        }

        if !self.info.count_only && summary.lines_matched > 0 {
            self.rule()?;
        }
        writeln!(self.out, "Total log entries: {}", summary.lines_scanned)?;
        writeln!(self.out, "Total filtered log entries: {}", summary.lines_matched)?;

        if !summary.levels.is_empty() {
            writeln!(self.out, "\nBy level:")?;
            let mut rows: Vec<(String, u64, Option<Color>)> = LogLevel::ALL
                .iter()
                .rev()
                .filter_map(|level| {
                    let count = summary.level_count(*level);
                    (count > 0).then(|| (level.label().to_string(), count, Some(level_color(*level))))
                })
                .collect();
            let unleveled = summary.unleveled();
            if unleveled > 0 {
                rows.push(("(none)".to_string(), unleveled, None));
            }
            self.table(&rows)?;
        }

        if !summary.tags.is_empty() {
            writeln!(self.out, "\nBy category:")?;
            let rows: Vec<_> = summary
                .tags
                .iter()
                .map(|(name, count)| (name.clone(), *count, None))
                .collect();
            self.table(&rows)?;
        }

        if summary.sources.len() > 1 {
            writeln!(self.out, "\nBy source:")?;
            let width = summary
                .sources
                .iter()
                .map(|s| s.source.to_string().width())
                .max()
                .unwrap_or(0);
            for s in &summary.sources {
                let name = pad(&s.source.to_string(), width);
                writeln!(self.out, "  {name}  {:>8} scanned  {:>8} matched", s.scanned, s.matched)?;
            }
        }

        if summary.untimed_lines > 0 {
            writeln!(
                self.out,
                "\nLines without a parseable timestamp (time range not applied): {}",
                summary.untimed_lines
            )?;
        }

        if !summary.skipped.is_empty() {
            let heading = self.paint("Skipped sources:", Color::Yellow);
            writeln!(self.out, "\n{heading}")?;
            for skipped in &summary.skipped {
                writeln!(self.out, "  {}: {}", skipped.source, skipped.reason)?;
            }
        }

        self.rule()?;
        let done = self.paint("Log analysis completed.", Color::Green);
        writeln!(self.out, "{done}")?;
        self.out.flush()
    }

    fn table(&mut self, rows: &[(String, u64, Option<Color>)]) -> io::Result<()> {
        let width = rows.iter().map(|(label, _, _)| label.width()).max().unwrap_or(0);
        for (label, count, color) in rows {
            let label = pad(label, width);
            let label = match color {
                Some(color) => self.paint(&label, *color),
                None => label,
            };
            writeln!(self.out, "  {label}  {count:>8}")?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// Right-pad to a display width
fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_logs::{LogLine, SkippedSource, SourceSummary};

    fn info() -> RunInfo {
        RunInfo {
            sources: vec![Source::File("app.log".into())],
            patterns: vec!["boom".to_string()],
            ..Default::default()
        }
    }

    fn render(format: OutputFormat, info: RunInfo, f: impl FnOnce(&mut Report<Vec<u8>>)) -> String {
        let mut report = Report::new(Vec::new(), format, false, info);
        f(&mut report);
        String::from_utf8(report.into_inner()).unwrap()
    }

    fn sample_summary() -> Summary {
        let mut summary = Summary {
            lines_scanned: 2,
            lines_matched: 1,
            ..Default::default()
        };
        summary.levels.insert(LogLevel::Error, 1);
        summary.sources.push(SourceSummary {
            source: Source::File("app.log".into()),
            scanned: 2,
            matched: 1,
        });
        summary
    }

    fn sample_match() -> MatchResult {
        MatchResult {
            level: Some(LogLevel::Error),
            ..MatchResult::new(LogLine::new(Source::File("app.log".into()), 1, "2024-01-01 ERROR boom".into()))
        }
    }

    #[test]
    fn test_text_report() {
        let out = render(OutputFormat::Text, info(), |r| {
            r.header().unwrap();
            r.write_match(&sample_match(), &[(17, 21)]).unwrap();
            r.summary(&sample_summary()).unwrap();
        });

        assert!(out.contains("Keywords provided: boom (case-insensitive)"));
        assert!(out.contains(" 1 :: 2024-01-01 ERROR boom"));
        assert!(out.contains("Total log entries: 2"));
        assert!(out.contains("Total filtered log entries: 1"));
        assert!(out.contains("ERROR"));
        assert!(out.contains("Log analysis completed."));
        assert!(!out.contains('\u{1b}'), "no escape codes without color");
    }

    #[test]
    fn test_no_readable_sources_in_header() {
        let info = RunInfo {
            sources: Vec::new(),
            ..info()
        };
        let out = render(OutputFormat::Text, info, |r| r.header().unwrap());
        assert!(out.contains("Log sources: (none)"));
        assert!(!out.contains("<stdin>"));
    }

    #[test]
    fn test_count_only_hides_lines() {
        let info = RunInfo {
            count_only: true,
            ..info()
        };
        let out = render(OutputFormat::Text, info, |r| {
            r.write_match(&sample_match(), &[]).unwrap();
            r.summary(&sample_summary()).unwrap();
        });
        assert!(!out.contains(":: 2024-01-01 ERROR boom"));
        assert!(out.contains("Total log entries: 2"));
    }

    #[test]
    fn test_source_prefix_with_several_sources() {
        let info = RunInfo {
            sources: vec![Source::File("a.log".into()), Source::File("b.log".into())],
            ..Default::default()
        };
        let out = render(OutputFormat::Text, info, |r| {
            r.write_match(&sample_match(), &[]).unwrap();
        });
        assert!(out.contains("app.log:1 ::"));
    }

    #[test]
    fn test_skipped_and_untimed_reported() {
        let mut summary = sample_summary();
        summary.untimed_lines = 3;
        summary.skipped.push(SkippedSource {
            source: Source::File("gone.log".into()),
            reason: "No such file or directory".into(),
        });
        let out = render(OutputFormat::Text, info(), |r| r.summary(&summary).unwrap());
        assert!(out.contains("Skipped sources:"));
        assert!(out.contains("gone.log: No such file or directory"));
        assert!(out.contains("(time range not applied): 3"));
    }

    #[test]
    fn test_json_lines() {
        let out = render(OutputFormat::Json, info(), |r| {
            r.header().unwrap();
            r.write_match(&sample_match(), &[]).unwrap();
            r.summary(&sample_summary()).unwrap();
        });

        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["source"], "app.log");
        assert_eq!(lines[0]["level"], "ERROR");
        assert_eq!(lines[1]["summary"]["lines_scanned"], 2);
        assert_eq!(lines[1]["summary"]["levels"]["ERROR"], 1);
    }

    #[test]
    fn test_highlight_with_color() {
        let report = Report::new(Vec::new(), OutputFormat::Text, true, info());
        let out = report.highlight("an error here", None, &[(3, 8)]);
        assert!(out.contains('\u{1b}'));
        assert!(out.contains("error"));
    }

    #[test]
    fn test_pad_uses_display_width() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("日本", 5), "日本 ");
    }
}
