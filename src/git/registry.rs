use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::rc::Rc;

use super::commit::{Commit, LogState};
use super::raw_log::{log_args, parse_raw_log};
use crate::error::GitError;
use crate::process::{EventSource, Launcher, ProcessReader, ReaderSink, DEFAULT_CHUNK_SIZE};

/// Collects `git log` output for one commit.
#[derive(Default)]
struct LogSink {
    output: Vec<u8>,
    outcome: Option<Result<(), GitError>>,
}

impl ReaderSink for LogSink {
    fn on_stdout(&mut self, data: &[u8]) -> Result<(), GitError> {
        self.output.extend_from_slice(data);
        Ok(())
    }

    fn on_completed(&mut self, result: Result<(), GitError>) {
        self.outcome = Some(result);
    }
}

struct LogFetch {
    commit: Rc<Commit>,
    reader: ProcessReader,
    sink: LogSink,
}

struct Inner {
    launcher: Rc<dyn Launcher>,
    chunk_size: usize,
    commits: RefCell<HashMap<String, Rc<Commit>>>,
    fetches: RefCell<Vec<LogFetch>>,
}

/// Canonical store of the commits seen while browsing.
///
/// Cloning gives another handle to the same registry.
#[derive(Clone)]
pub struct CommitRegistry {
    inner: Rc<Inner>,
}

impl CommitRegistry {
    pub fn new(launcher: Rc<dyn Launcher>) -> Self {
        Self::with_chunk_size(launcher, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(launcher: Rc<dyn Launcher>, chunk_size: usize) -> Self {
        Self {
            inner: Rc::new(Inner {
                launcher,
                chunk_size,
                commits: RefCell::new(HashMap::new()),
                fetches: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The commit for `hash`, created on first sighting.
    pub fn resolve(&self, hash: &str) -> Rc<Commit> {
        let mut commits = self.inner.commits.borrow_mut();
        if let Some(commit) = commits.get(hash) {
            return Rc::clone(commit);
        }

        log::debug!("new commit {}", hash);
        let commit = Rc::new(Commit::new(hash));
        commits.insert(hash.to_string(), Rc::clone(&commit));
        commit
    }

    pub fn lookup(&self, hash: &str) -> Option<Rc<Commit>> {
        self.inner.commits.borrow().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.commits.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.commits.borrow().is_empty()
    }

    /// Parents of `commit`, known once its log has been fetched.
    pub fn parents(&self, commit: &Commit) -> Vec<Rc<Commit>> {
        commit
            .parent_hashes()
            .iter()
            .map(|hash| self.resolve(hash))
            .collect()
    }

    pub fn pending_fetches(&self) -> usize {
        self.inner.fetches.borrow().len()
    }

    /// Start fetching the log message of `commit` unless it is already
    /// loaded or on its way.
    pub fn fetch_log(&self, commit: &Rc<Commit>) {
        if commit.has_log_data() || commit.is_fetching_log() {
            return;
        }

        let mut reader =
            ProcessReader::with_chunk_size(Rc::clone(&self.inner.launcher), self.inner.chunk_size);
        if let Err(e) = reader.start(&log_args(commit.hash())) {
            log::warn!("could not fetch log for {}: {}", commit.hash(), e);
            commit.set_log_state(LogState::Failed(e.to_string()));
            commit.notify_log_updated();
            return;
        }

        log::info!("fetching log for {}", commit.hash());
        commit.set_log_state(LogState::Fetching);
        self.inner.fetches.borrow_mut().push(LogFetch {
            commit: Rc::clone(commit),
            reader,
            sink: LogSink::default(),
        });
    }

    /// Drive every in-flight log fetch and settle the finished ones.
    pub fn dispatch(&self) {
        let finished = {
            let mut fetches = self.inner.fetches.borrow_mut();
            for fetch in fetches.iter_mut() {
                fetch.reader.dispatch(&mut fetch.sink);
            }

            let mut finished = Vec::new();
            let mut index = 0;
            while index < fetches.len() {
                if fetches[index].sink.outcome.is_some() {
                    finished.push(fetches.remove(index));
                } else {
                    index += 1;
                }
            }
            finished
        };

        // Borrows are released so observers can call back into the registry
        for fetch in finished {
            self.settle(fetch);
        }
    }

    fn settle(&self, mut fetch: LogFetch) {
        let outcome = fetch.sink.outcome.take().unwrap_or(Ok(()));
        let state = match outcome.and_then(|()| parse_raw_log(&fetch.sink.output)) {
            Ok(data) => {
                for parent in &data.parents {
                    self.resolve(parent);
                }
                LogState::Loaded(data)
            }
            Err(e) => {
                log::warn!("log fetch for {} failed: {}", fetch.commit.hash(), e);
                LogState::Failed(e.to_string())
            }
        };

        fetch.commit.set_log_state(state);
        fetch.commit.notify_log_updated();
    }
}

impl EventSource for CommitRegistry {
    fn watched_fds(&self, fds: &mut Vec<RawFd>) {
        for fetch in self.inner.fetches.borrow().iter() {
            fetch.reader.watched_fds(fds);
        }
    }

    fn is_active(&self) -> bool {
        self.pending_fetches() > 0
    }

    fn dispatch(&mut self) {
        CommitRegistry::dispatch(self);
    }
}
