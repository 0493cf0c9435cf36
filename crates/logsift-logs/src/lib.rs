//! Log processing for logsift
//!
//! This crate provides the line stream, parsing, filtering and aggregation
//! stages of the analysis pipeline.

mod aggregate;
mod error;
mod filter;
mod parser;
mod stream;

pub use aggregate::Aggregator;
pub use error::AnalyzeError;
pub use filter::{FilterCriteria, FilterEngine, PatternKind};
pub use parser::{LogParser, ParsedLine, parse_since, parse_until};
pub use stream::LineStream;

// Re-export types used in our public API
pub use logsift_types::{
    LogLevel, LogLine, MatchResult, SkippedSource, Source, SourceSummary, Summary,
};

/// Run the whole pipeline, handing each match to `on_match` as it is found
///
/// Every line is filtered and counted before the next one is read. Skipped
/// sources are folded into the returned summary. An error from `on_match`
/// stops the run.
pub fn analyze<F, E>(
    mut stream: LineStream,
    engine: &FilterEngine,
    mut on_match: F,
) -> Result<Summary, E>
where
    F: FnMut(&MatchResult) -> Result<(), E>,
    E: From<AnalyzeError>,
{
    let mut aggregator = Aggregator::for_sources(stream.sources());

    for line in stream.by_ref() {
        let line = line?;
        aggregator.observe(&line);
        if let Some(result) = engine.evaluate(line) {
            on_match(&result)?;
            aggregator.record(&result);
        }
    }

    for skipped in stream.skipped() {
        aggregator.skip(skipped.clone());
    }

    Ok(aggregator.finalize())
}
