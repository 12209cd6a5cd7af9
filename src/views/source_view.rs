use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::Rc;

use serde::Serialize;

use crate::config::ViewConfig;
use crate::error::GitError;
use crate::git::{AnnotatedSource, AnnotatedSourceLine, Commit, CommitRegistry, Rgb};
use crate::process::{EventSource, Launcher, DEFAULT_CHUNK_SIZE};

/// One rendered row of the source view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub hash: String,
    pub line: usize,
    pub author: String,
    pub date: String,
    pub text: String,
    pub color: String,
    #[serde(skip)]
    pub background: Rgb,
    #[serde(skip)]
    pub foreground: Rgb,
}

type Outcome = Rc<RefCell<Option<Result<(), GitError>>>>;

/// Blame view that keeps showing the last good source while a new one loads.
pub struct SourceView {
    launcher: Rc<dyn Launcher>,
    registry: CommitRegistry,
    chunk_size: usize,
    config: ViewConfig,
    painted: Option<AnnotatedSource>,
    loading: Option<AnnotatedSource>,
    outcome: Outcome,
    error: Option<GitError>,
}

impl SourceView {
    pub fn new(launcher: Rc<dyn Launcher>, registry: CommitRegistry, config: ViewConfig) -> Self {
        Self {
            launcher,
            registry,
            chunk_size: DEFAULT_CHUNK_SIZE,
            config,
            painted: None,
            loading: None,
            outcome: Rc::new(RefCell::new(None)),
            error: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Start loading `file` at `revision`. A load already in progress is
    /// dropped; the painted source stays until this one succeeds.
    pub fn load(&mut self, file: &str, revision: &str) -> Result<(), GitError> {
        self.loading = None;
        self.outcome.borrow_mut().take();

        let mut source = AnnotatedSource::with_chunk_size(
            Rc::clone(&self.launcher),
            self.registry.clone(),
            self.chunk_size,
        );
        let slot = Rc::clone(&self.outcome);
        source.fetch(file, revision, move |_, result| {
            *slot.borrow_mut() = Some(result);
        })?;
        self.loading = Some(source);
        Ok(())
    }

    pub fn dispatch(&mut self) {
        if let Some(loading) = self.loading.as_mut() {
            loading.dispatch();
        }

        let outcome = self.outcome.borrow_mut().take();
        match outcome {
            Some(Ok(())) => {
                self.painted = self.loading.take();
                self.error = None;
            }
            Some(Err(e)) => {
                self.loading = None;
                self.error = Some(e);
            }
            None => {}
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    /// The last load that failed after starting, cleared by the next success.
    pub fn error(&self) -> Option<&GitError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<GitError> {
        self.error.take()
    }

    pub fn source(&self) -> Option<&AnnotatedSource> {
        self.painted.as_ref()
    }

    pub fn line_count(&self) -> usize {
        self.painted.as_ref().map_or(0, AnnotatedSource::line_count)
    }

    /// Commit that last touched the 1-based `line`.
    pub fn commit_at(&self, line: usize) -> Option<Rc<Commit>> {
        let index = line.checked_sub(1)?;
        self.painted
            .as_ref()?
            .line(index)
            .map(|l| Rc::clone(l.commit()))
    }

    pub fn rows(&self) -> Vec<Row> {
        self.painted
            .as_ref()
            .map(|source| source.lines().iter().map(|l| self.row(l)).collect())
            .unwrap_or_default()
    }

    fn row(&self, line: &AnnotatedSourceLine) -> Row {
        let commit = line.commit();
        let info = commit.info();
        let background = commit.color();

        Row {
            hash: commit.short_hash(self.config.hash_length).to_string(),
            line: line.final_line(),
            author: info.author.clone().unwrap_or_default(),
            date: info.format_date(self.config.date_format),
            text: line.display_text().to_string(),
            color: background.to_hex(),
            background,
            foreground: background.inverted(),
        }
    }

    /// Render a row for a terminal.
    pub fn format_row(&self, row: &Row) -> String {
        let hash = if self.config.color {
            format!(
                "\x1b[48;2;{};{};{}m\x1b[38;2;{};{};{}m{}\x1b[0m",
                row.background.r,
                row.background.g,
                row.background.b,
                row.foreground.r,
                row.foreground.g,
                row.foreground.b,
                row.hash
            )
        } else {
            row.hash.clone()
        };

        let mut out = hash;
        if !row.author.is_empty() || !row.date.is_empty() {
            out.push_str(&format!(" {:12.12} {:>14}", row.author, row.date));
        }
        if self.config.show_line_numbers {
            out.push_str(&format!(" {:>5}", row.line));
        }
        out.push_str(" | ");
        out.push_str(&row.text);
        out
    }
}

impl EventSource for SourceView {
    fn watched_fds(&self, fds: &mut Vec<RawFd>) {
        if let Some(loading) = &self.loading {
            loading.watched_fds(fds);
        }
    }

    fn is_active(&self) -> bool {
        self.is_loading()
    }

    fn dispatch(&mut self) {
        SourceView::dispatch(self);
    }
}
