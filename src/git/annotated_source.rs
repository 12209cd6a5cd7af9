use std::os::fd::RawFd;
use std::rc::Rc;

use super::blame::{blame_args, BlameParser};
use super::commit::Commit;
use super::registry::CommitRegistry;
use crate::error::GitError;
use crate::process::{EventSource, Launcher, ProcessReader, ReaderSink, DEFAULT_CHUNK_SIZE};

/// One row of a blamed file.
#[derive(Debug, Clone)]
pub struct AnnotatedSourceLine {
    text: String,
    commit: Rc<Commit>,
    orig_line: usize,
    final_line: usize,
}

impl AnnotatedSourceLine {
    pub fn new(text: String, commit: Rc<Commit>, orig_line: usize, final_line: usize) -> Self {
        Self {
            text,
            commit,
            orig_line,
            final_line,
        }
    }

    /// The line exactly as git printed it.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The line without trailing whitespace.
    pub fn display_text(&self) -> &str {
        self.text.trim_end()
    }

    pub fn commit(&self) -> &Rc<Commit> {
        &self.commit
    }

    /// Line number in the commit that introduced the line (1-based).
    pub fn orig_line(&self) -> usize {
        self.orig_line
    }

    /// Line number in the blamed revision (1-based).
    pub fn final_line(&self) -> usize {
        self.final_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Completed,
    Failed,
}

pub type CompletedCallback = Box<dyn FnOnce(&AnnotatedSource, Result<(), GitError>)>;

/// Feeds stdout into the parser and remembers how the session ended.
struct BlameSink<'a> {
    parser: &'a mut BlameParser,
    registry: &'a CommitRegistry,
    outcome: Option<Result<(), GitError>>,
}

impl ReaderSink for BlameSink<'_> {
    fn on_stdout(&mut self, data: &[u8]) -> Result<(), GitError> {
        self.parser.feed(data, self.registry)
    }

    fn on_completed(&mut self, result: Result<(), GitError>) {
        self.outcome = Some(result);
    }
}

/// The blame of one file at one revision, loaded asynchronously.
///
/// Lines become visible only once loading has succeeded; until then, and
/// after a failure, the source is empty.
pub struct AnnotatedSource {
    reader: ProcessReader,
    registry: CommitRegistry,
    parser: BlameParser,
    lines: Vec<AnnotatedSourceLine>,
    state: LoadState,
    file: String,
    revision: String,
    on_completed: Option<CompletedCallback>,
}

impl AnnotatedSource {
    pub fn new(launcher: Rc<dyn Launcher>, registry: CommitRegistry) -> Self {
        Self::with_chunk_size(launcher, registry, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(
        launcher: Rc<dyn Launcher>,
        registry: CommitRegistry,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader: ProcessReader::with_chunk_size(launcher, chunk_size),
            registry,
            parser: BlameParser::new(),
            lines: Vec::new(),
            state: LoadState::Idle,
            file: String::new(),
            revision: String::new(),
            on_completed: None,
        }
    }

    /// Start blaming `file` at `revision`.
    ///
    /// Any fetch still in flight is dropped and its callback never runs.
    /// Spawn failures are returned here; everything later is reported once
    /// through `on_completed`.
    pub fn fetch<F>(&mut self, file: &str, revision: &str, on_completed: F) -> Result<(), GitError>
    where
        F: FnOnce(&AnnotatedSource, Result<(), GitError>) + 'static,
    {
        self.reader.reset();
        self.on_completed = None;
        self.parser.reset();
        self.lines.clear();
        self.file = file.to_string();
        self.revision = revision.to_string();

        // git would parse a leading dash as one of its own options
        if revision.is_empty() || revision.starts_with('-') {
            self.state = LoadState::Failed;
            return Err(GitError::Spawn {
                program: self.reader.program().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid revision {:?}", revision),
                ),
            });
        }

        if let Err(e) = self.reader.start(&blame_args(file, revision)) {
            self.state = LoadState::Failed;
            return Err(e);
        }

        log::info!("loading blame for {} at {}", file, revision);
        self.state = LoadState::Loading;
        self.on_completed = Some(Box::new(on_completed));
        Ok(())
    }

    /// Stop loading without reporting anything.
    pub fn cancel(&mut self) {
        if self.state == LoadState::Loading {
            self.reader.reset();
            self.on_completed = None;
            self.parser.reset();
            self.state = LoadState::Idle;
        }
    }

    pub fn dispatch(&mut self) {
        if self.state != LoadState::Loading {
            return;
        }

        let mut sink = BlameSink {
            parser: &mut self.parser,
            registry: &self.registry,
            outcome: None,
        };
        self.reader.dispatch(&mut sink);

        if let Some(outcome) = sink.outcome {
            self.finish(outcome);
        }
    }

    fn finish(&mut self, outcome: Result<(), GitError>) {
        let result = outcome.and_then(|()| self.parser.finish(&self.registry));

        let result = match result {
            Ok(lines) => {
                log::info!("loaded {} lines of {}", lines.len(), self.file);
                self.lines = lines;
                self.state = LoadState::Completed;
                Ok(())
            }
            Err(e) => {
                log::warn!("blame of {} at {} failed: {}", self.file, self.revision, e);
                self.lines.clear();
                self.state = LoadState::Failed;
                Err(e)
            }
        };
        self.parser.reset();

        if let Some(callback) = self.on_completed.take() {
            callback(self, result);
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&AnnotatedSourceLine> {
        self.lines.get(index)
    }

    pub fn lines(&self) -> &[AnnotatedSourceLine] {
        &self.lines
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn registry(&self) -> &CommitRegistry {
        &self.registry
    }
}

impl EventSource for AnnotatedSource {
    fn watched_fds(&self, fds: &mut Vec<RawFd>) {
        self.reader.watched_fds(fds);
    }

    fn is_active(&self) -> bool {
        self.is_loading()
    }

    fn dispatch(&mut self) {
        AnnotatedSource::dispatch(self);
    }
}
