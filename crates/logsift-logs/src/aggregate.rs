use tracing::debug;

use logsift_types::{LogLine, MatchResult, SkippedSource, Source, SourceSummary, Summary};

/// Running counters for one analysis
///
/// Holds only counters, so memory use does not grow with the input.
#[derive(Debug, Default)]
pub struct Aggregator {
    summary: Summary,

    /// Frozen result of the first `finalize` call
    snapshot: Option<Summary>,

    /// Entry in `summary.sources` for the source being read
    current: Option<usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator that lists `sources` even if they turn out to be empty
    pub fn for_sources(sources: &[Source]) -> Self {
        let mut aggregator = Self::new();
        aggregator.summary.sources = sources.iter().cloned().map(SourceSummary::new).collect();
        aggregator
    }

    /// Count a scanned line, matched or not
    pub fn observe(&mut self, line: &LogLine) {
        if self.is_finalized() {
            return;
        }
        self.summary.lines_scanned += 1;

        // Line 1 starts the next source, even when the same path is read again
        let index = match self.current {
            Some(i) if line.line_number != 1 && self.is_current(i, &line.source) => i,
            _ => self.next_entry(&line.source),
        };
        self.current = Some(index);
        self.summary.sources[index].scanned += 1;
    }

    /// Count a line that passed the filter
    pub fn record(&mut self, result: &MatchResult) {
        if self.is_finalized() {
            return;
        }
        let summary = &mut self.summary;
        summary.lines_matched += 1;

        if let Some(level) = result.level {
            *summary.levels.entry(level).or_insert(0) += 1;
        }
        for tag in &result.tags {
            *summary.tags.entry(tag.clone()).or_insert(0) += 1;
        }
        if result.untimed {
            summary.untimed_lines += 1;
        }

        let index = match self.current {
            Some(i) if self.is_current(i, &result.line.source) => i,
            _ => self.next_entry(&result.line.source),
        };
        self.current = Some(index);
        self.summary.sources[index].matched += 1;
    }

    /// Note a source that was skipped because it could not be read
    pub fn skip(&mut self, skipped: SkippedSource) {
        if self.is_finalized() {
            return;
        }
        self.summary.skipped.push(skipped);
    }

    pub fn is_finalized(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Freeze and return the summary
    ///
    /// The first call takes the snapshot; later calls return the same
    /// snapshot and further updates are ignored.
    pub fn finalize(&mut self) -> Summary {
        if let Some(snapshot) = &self.snapshot {
            return snapshot.clone();
        }

        debug!(
            scanned = self.summary.lines_scanned,
            matched = self.summary.lines_matched,
            "summary finalized"
        );
        let snapshot = std::mem::take(&mut self.summary);
        self.snapshot = Some(snapshot.clone());
        snapshot
    }

    fn is_current(&self, index: usize, source: &Source) -> bool {
        self.summary
            .sources
            .get(index)
            .is_some_and(|entry| &entry.source == source)
    }

    /// First entry for `source` after the current one, created if missing
    fn next_entry(&mut self, source: &Source) -> usize {
        let start = self.current.map_or(0, |i| i + 1);
        let sources = &mut self.summary.sources;
        match sources.iter().skip(start).position(|s| &s.source == source) {
            Some(offset) => start + offset,
            None => {
                sources.push(SourceSummary::new(source.clone()));
                sources.len() - 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_types::LogLevel;

    fn line(source: &str, n: u64) -> LogLine {
        LogLine::new(Source::File(source.into()), n, format!("line {n}"))
    }

    fn matched(line: LogLine, level: Option<LogLevel>, tags: &[&str]) -> MatchResult {
        MatchResult {
            level,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..MatchResult::new(line)
        }
    }

    #[test]
    fn test_empty_aggregation() {
        let summary = Aggregator::new().finalize();
        assert_eq!(summary, Summary::default());
        assert_eq!(summary.lines_scanned, 0);
        assert_eq!(summary.lines_matched, 0);
    }

    #[test]
    fn test_counts_levels_tags_and_sources() {
        let mut agg = Aggregator::for_sources(&[
            Source::File("a.log".into()),
            Source::File("empty.log".into()),
        ]);

        for n in 1..=3 {
            agg.observe(&line("a.log", n));
        }
        agg.record(&matched(line("a.log", 1), Some(LogLevel::Error), &["db"]));
        agg.record(&matched(line("a.log", 3), None, &["db", "timeout"]));

        let summary = agg.finalize();
        assert_eq!(summary.lines_scanned, 3);
        assert_eq!(summary.lines_matched, 2);
        assert_eq!(summary.level_count(LogLevel::Error), 1);
        assert_eq!(summary.unleveled(), 1);
        assert_eq!(summary.tags.get("db"), Some(&2));
        assert_eq!(summary.tags.get("timeout"), Some(&1));

        assert_eq!(summary.sources.len(), 2);
        assert_eq!(summary.sources[0].scanned, 3);
        assert_eq!(summary.sources[0].matched, 2);
        assert_eq!(summary.sources[1].scanned, 0);
    }

    #[test]
    fn test_repeated_source_counted_per_entry() {
        let log = Source::File("a.log".into());
        let mut agg = Aggregator::for_sources(&[log.clone(), log.clone()]);

        for _ in 0..2 {
            for n in 1..=2 {
                let l = line("a.log", n);
                agg.observe(&l);
                agg.record(&MatchResult::new(l));
            }
        }

        let summary = agg.finalize();
        let counts: Vec<(u64, u64)> = summary.sources.iter().map(|s| (s.scanned, s.matched)).collect();
        assert_eq!(counts, vec![(2, 2), (2, 2)]);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut agg = Aggregator::new();
        agg.observe(&line("a.log", 1));
        agg.record(&matched(line("a.log", 1), Some(LogLevel::Info), &[]));

        let first = agg.finalize();
        agg.observe(&line("a.log", 2));
        agg.skip(SkippedSource {
            source: Source::Stdin,
            reason: "late".into(),
        });
        let second = agg.finalize();

        assert_eq!(first, second);
        assert_eq!(second.lines_scanned, 1);
        assert!(agg.is_finalized());
    }

    #[test]
    fn test_untimed_and_skipped() {
        let mut agg = Aggregator::new();
        let mut result = matched(line("a.log", 1), None, &[]);
        result.untimed = true;
        agg.observe(&result.line);
        agg.record(&result);
        agg.skip(SkippedSource {
            source: Source::File("gone.log".into()),
            reason: "No such file or directory".into(),
        });

        let summary = agg.finalize();
        assert_eq!(summary.untimed_lines, 1);
        assert_eq!(summary.skipped.len(), 1);
    }
}
