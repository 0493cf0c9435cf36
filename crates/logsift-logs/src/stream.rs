use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

use tracing::{debug, warn};

use logsift_types::{LogLine, SkippedSource, Source};

use crate::AnalyzeError;

/// An input waiting to be read
enum Pending {
    Source(Source),
    Reader(Source, Box<dyn BufRead>),
}

impl Pending {
    fn source(&self) -> &Source {
        match self {
            Self::Source(source) | Self::Reader(source, _) => source,
        }
    }
}

/// The single source currently being read
struct OpenInput {
    source: Source,
    reader: Box<dyn BufRead>,
    line_number: u64,
}

/// Lazy, line-by-line reader over an ordered list of sources
///
/// Sources are read one after another in the order given. At most one file
/// handle is open at a time; it is dropped when its source is exhausted,
/// when reading fails, or when the stream itself is dropped.
pub struct LineStream {
    pending: VecDeque<Pending>,
    current: Option<OpenInput>,
    continue_on_error: bool,

    /// Sources accepted for reading, in order
    sources: Vec<Source>,
    skipped: Vec<SkippedSource>,

    /// Set once the stream is exhausted or has failed
    finished: bool,

    /// Reused line buffer
    buf: Vec<u8>,
}

impl LineStream {
    /// Open a stream over `sources` (standard input when empty)
    ///
    /// Every file is probed before any line is produced. Without
    /// `continue_on_error` the first unreadable source fails the whole call;
    /// with it, the source is recorded as skipped and left out.
    pub fn open(sources: Vec<Source>, continue_on_error: bool) -> Result<Self, AnalyzeError> {
        let sources = if sources.is_empty() {
            vec![Source::Stdin]
        } else {
            sources
        };

        let mut stream = Self::empty(continue_on_error);
        for source in sources {
            match probe(&source) {
                Ok(()) => stream.push(Pending::Source(source)),
                Err(e) if continue_on_error => {
                    let err = AnalyzeError::unreadable(&source, e);
                    stream.record_skipped(err);
                }
                Err(e) => return Err(AnalyzeError::unreadable(&source, e)),
            }
        }

        Ok(stream)
    }

    /// Stream over a single already-open reader
    pub fn from_reader(source: Source, reader: impl BufRead + 'static) -> Self {
        let mut stream = Self::empty(false);
        stream.push(Pending::Reader(source, Box::new(reader)));
        stream
    }

    /// Append another reader after the sources already queued
    pub fn chain_reader(mut self, source: Source, reader: impl BufRead + 'static) -> Self {
        self.push(Pending::Reader(source, Box::new(reader)));
        self
    }

    /// Skip sources that fail partway through instead of ending the stream
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    fn empty(continue_on_error: bool) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            continue_on_error,
            sources: Vec::new(),
            skipped: Vec::new(),
            finished: false,
            buf: Vec::with_capacity(256),
        }
    }

    fn push(&mut self, pending: Pending) {
        self.sources.push(pending.source().clone());
        self.pending.push_back(pending);
    }

    /// Sources accepted for reading, in read order
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Sources skipped so far because they could not be read
    pub fn skipped(&self) -> &[SkippedSource] {
        &self.skipped
    }

    /// Record a failure; returns the error if it must end the stream
    fn fail(&mut self, err: AnalyzeError) -> Option<AnalyzeError> {
        if !self.continue_on_error {
            self.finished = true;
            return Some(err);
        }
        self.record_skipped(err);
        None
    }

    fn record_skipped(&mut self, err: AnalyzeError) {
        warn!("{err}, skipping");
        if let AnalyzeError::SourceUnreadable { input, reason } = err {
            self.skipped.push(SkippedSource {
                source: input,
                reason,
            });
        }
    }

    fn open_input(pending: Pending) -> Result<OpenInput, AnalyzeError> {
        let (source, reader) = match pending {
            Pending::Reader(source, reader) => (source, reader),
            Pending::Source(Source::Stdin) => {
                (Source::Stdin, Box::new(io::stdin().lock()) as Box<dyn BufRead>)
            }
            Pending::Source(source) => {
                let file = open_file(&source)?;
                (source, Box::new(BufReader::new(file)) as Box<dyn BufRead>)
            }
        };

        debug!(source = %source, "opened source");
        Ok(OpenInput {
            source,
            reader,
            line_number: 0,
        })
    }
}

impl Iterator for LineStream {
    type Item = Result<LogLine, AnalyzeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if self.current.is_none() {
                let Some(pending) = self.pending.pop_front() else {
                    self.finished = true;
                    return None;
                };
                match Self::open_input(pending) {
                    Ok(input) => self.current = Some(input),
                    Err(err) => {
                        if let Some(err) = self.fail(err) {
                            return Some(Err(err));
                        }
                    }
                }
                continue;
            }

            let Some(input) = self.current.as_mut() else {
                continue;
            };

            self.buf.clear();
            match input.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    debug!(source = %input.source, lines = input.line_number, "closed source");
                    self.current = None;
                }
                Ok(_) => {
                    input.line_number += 1;
                    trim_line_ending(&mut self.buf);
                    let raw = String::from_utf8_lossy(&self.buf).into_owned();
                    return Some(Ok(LogLine::new(input.source.clone(), input.line_number, raw)));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    let err = AnalyzeError::SourceUnreadable {
                        input: input.source.clone(),
                        reason: format!("read failed after line {}: {e}", input.line_number),
                    };
                    self.current = None;
                    if let Some(err) = self.fail(err) {
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("sources", &self.sources)
            .field("current", &self.current.as_ref().map(|c| &c.source))
            .field("skipped", &self.skipped)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Check that a source can be opened, releasing the handle immediately
fn probe(source: &Source) -> io::Result<()> {
    match source {
        Source::Stdin => Ok(()),
        Source::File(path) => {
            if path.is_dir() {
                return Err(io::Error::other("is a directory"));
            }
            File::open(path).map(drop)
        }
    }
}

fn open_file(source: &Source) -> Result<File, AnalyzeError> {
    let Source::File(path) = source else {
        return Err(AnalyzeError::unreadable(source, "not a file"));
    };
    File::open(path).map_err(|e| AnalyzeError::unreadable(source, e))
}

fn trim_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn mem(name: &str, text: &str) -> (Source, Cursor<Vec<u8>>) {
        (Source::File(name.into()), Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_lines_are_numbered_per_source() {
        let (a, ra) = mem("a.log", "one\ntwo\n");
        let (b, rb) = mem("b.log", "three");
        let lines: Vec<LogLine> = LineStream::from_reader(a.clone(), ra)
            .chain_reader(b.clone(), rb)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            lines,
            vec![
                LogLine::new(a.clone(), 1, "one".into()),
                LogLine::new(a, 2, "two".into()),
                LogLine::new(b, 1, "three".into()),
            ]
        );
    }

    #[test]
    fn test_crlf_and_empty_lines() {
        let (a, ra) = mem("a.log", "x\r\n\r\n\ny\n");
        let raws: Vec<String> = LineStream::from_reader(a, ra)
            .map(|l| l.unwrap().raw)
            .collect();
        assert_eq!(raws, vec!["x", "", "", "y"]);
    }

    #[test]
    fn test_empty_reader_yields_nothing() {
        let (a, ra) = mem("empty.log", "");
        let mut stream = LineStream::from_reader(a, ra);
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let reader = Cursor::new(b"ok \xff\xfe bytes\n".to_vec());
        let line = LineStream::from_reader(Source::Stdin, reader)
            .next()
            .unwrap()
            .unwrap();
        assert!(line.raw.starts_with("ok "));
        assert!(line.raw.ends_with(" bytes"));
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("device gone"));
            }
            self.served = true;
            let data = b"first\n";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_read_failure_ends_stream() {
        let reader = BufReader::new(FailingReader { served: false });
        let mut stream = LineStream::from_reader(Source::File("dev.log".into()), reader);

        assert_eq!(stream.next().unwrap().unwrap().raw, "first");
        match stream.next() {
            Some(Err(AnalyzeError::SourceUnreadable { input, reason })) => {
                assert_eq!(input, Source::File("dev.log".into()));
                assert!(reason.contains("device gone"));
            }
            other => panic!("expected SourceUnreadable, got {other:?}"),
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_read_failure_skipped_with_continue_on_error() {
        let failing = BufReader::new(FailingReader { served: false });
        let (b, rb) = mem("b.log", "second\n");
        let mut stream = LineStream::from_reader(Source::File("dev.log".into()), failing)
            .chain_reader(b, rb)
            .continue_on_error(true);

        assert_eq!(stream.next().unwrap().unwrap().raw, "first");
        assert_eq!(stream.next().unwrap().unwrap().raw, "second");
        assert!(stream.next().is_none());

        assert_eq!(stream.skipped().len(), 1);
        assert_eq!(stream.skipped()[0].source, Source::File("dev.log".into()));
        assert!(stream.skipped()[0].reason.contains("device gone"));
    }

    #[test]
    fn test_missing_file_fails_open() {
        let missing = Source::File("/definitely/not/here.log".into());
        match LineStream::open(vec![missing.clone()], false) {
            Err(AnalyzeError::SourceUnreadable { input, .. }) => assert_eq!(input, missing),
            other => panic!("expected SourceUnreadable, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_skipped_with_continue_on_error() {
        let missing = Source::File("/definitely/not/here.log".into());
        let mut stream = LineStream::open(vec![missing.clone()], true).unwrap();
        assert!(stream.sources().is_empty());
        assert_eq!(stream.skipped().len(), 1);
        assert_eq!(stream.skipped()[0].source, missing);
        assert!(stream.next().is_none());
    }
}
