use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use logsift_types::{LogLevel, LogLine, MatchResult};

use crate::{AnalyzeError, LogParser};

/// How pattern strings are interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PatternKind {
    /// Literal text, matched anywhere in the line
    #[default]
    Substring,
    /// Regular expression
    Regex,
}

/// User-supplied matching configuration
///
/// Every field left at its default imposes no constraint.
#[derive(Clone, Debug, Default)]
pub struct FilterCriteria {
    /// Patterns to look for (any may match)
    pub patterns: Vec<String>,
    pub pattern_kind: PatternKind,
    pub case_sensitive: bool,
    /// Select lines that do NOT match the patterns
    pub invert: bool,

    /// Minimum severity
    pub min_level: Option<LogLevel>,

    /// Inclusive lower time bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper time bound
    pub until: Option<DateTime<Utc>>,
    /// chrono format for line timestamps (auto-detect when absent)
    pub timestamp_format: Option<String>,

    /// Named regexes used to tag matching lines
    pub categories: Vec<(String, String)>,
}

impl FilterCriteria {
    /// Criteria that match every line
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patterns<I, S>(mut self, kind: PatternKind, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pattern_kind = kind;
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn with_time_range(
        mut self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn with_category(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.categories.push((name.into(), pattern.into()));
        self
    }

    pub fn has_time_bounds(&self) -> bool {
        self.since.is_some() || self.until.is_some()
    }
}

/// Compiled filter for log lines
///
/// All patterns and formats are validated by [`FilterEngine::new`], so a bad
/// configuration is reported before any input is read.
#[derive(Clone)]
pub struct FilterEngine {
    criteria: FilterCriteria,

    /// One compiled regex per pattern (empty = no pattern constraint)
    patterns: Vec<Regex>,

    /// Category name and its compiled pattern
    categories: Vec<(String, Regex)>,

    parser: LogParser,
}

impl FilterEngine {
    /// Compile criteria into an engine
    pub fn new(criteria: FilterCriteria) -> Result<Self, AnalyzeError> {
        let patterns = criteria
            .patterns
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| {
                let source = match criteria.pattern_kind {
                    PatternKind::Substring => regex::escape(p),
                    PatternKind::Regex => p.clone(),
                };
                compile(p, &source, criteria.case_sensitive)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let categories = criteria
            .categories
            .iter()
            .map(|(name, pattern)| Ok((name.clone(), compile(pattern, pattern, true)?)))
            .collect::<Result<Vec<_>, AnalyzeError>>()?;

        let parser = match &criteria.timestamp_format {
            Some(format) => LogParser::with_format(format)?,
            None => LogParser::new(),
        };

        if let (Some(since), Some(until)) = (criteria.since, criteria.until) {
            if since > until {
                return Err(AnalyzeError::InvalidTimeRange {
                    since: since.to_rfc3339(),
                    until: until.to_rfc3339(),
                });
            }
        }

        debug!(
            patterns = patterns.len(),
            categories = categories.len(),
            min_level = ?criteria.min_level,
            "compiled filter criteria"
        );

        Ok(Self {
            criteria,
            patterns,
            categories,
            parser,
        })
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.criteria.min_level.is_none()
            && !self.criteria.has_time_bounds()
    }

    /// Evaluate one line against every active criterion
    pub fn evaluate(&self, line: LogLine) -> Option<MatchResult> {
        if !self.pattern_matches(&line.raw) {
            return None;
        }

        let parsed = self.parser.parse(&line.raw);

        if let Some(min_level) = self.criteria.min_level {
            match parsed.level {
                Some(level) if level >= min_level => {}
                _ => return None,
            }
        }

        // Lines without a parseable timestamp are exempt from the time bounds
        let mut untimed = false;
        if self.criteria.has_time_bounds() {
            match parsed.timestamp {
                Some(ts) if !self.in_range(ts) => return None,
                Some(_) => {}
                None => untimed = true,
            }
        }

        let tags = self
            .categories
            .iter()
            .filter(|(_, re)| re.is_match(&line.raw))
            .map(|(name, _)| name.clone())
            .collect();

        Some(MatchResult {
            line,
            level: parsed.level,
            timestamp: parsed.timestamp,
            tags,
            untimed,
        })
    }

    /// Lazily filter a stream of lines, passing errors through
    pub fn matches<'a, I, E>(&'a self, lines: I) -> impl Iterator<Item = Result<MatchResult, E>> + 'a
    where
        I: IntoIterator<Item = Result<LogLine, E>>,
        I::IntoIter: 'a,
        E: 'a,
    {
        lines.into_iter().filter_map(move |line| match line {
            Ok(line) => self.evaluate(line).map(Ok),
            Err(e) => Some(Err(e)),
        })
    }

    /// Find all pattern match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans: Vec<(usize, usize)> = self
            .patterns
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
            .collect();
        spans.sort_unstable();
        spans
    }

    fn pattern_matches(&self, text: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let hit = self.patterns.iter().any(|re| re.is_match(text));
        hit != self.criteria.invert
    }

    fn in_range(&self, ts: DateTime<Utc>) -> bool {
        self.criteria.since.is_none_or(|since| ts >= since)
            && self.criteria.until.is_none_or(|until| ts <= until)
    }
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("patterns", &self.criteria.patterns)
            .field("kind", &self.criteria.pattern_kind)
            .field("min_level", &self.criteria.min_level)
            .field("since", &self.criteria.since)
            .field("until", &self.criteria.until)
            .field("invert", &self.criteria.invert)
            .finish()
    }
}

fn compile(pattern: &str, source: &str, case_sensitive: bool) -> Result<Regex, AnalyzeError> {
    RegexBuilder::new(source)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| AnalyzeError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
