use std::os::fd::RawFd;
use std::rc::Rc;

use super::launcher::{ChildProcess, ExitStatus, Launcher, PipeStream, ReadStatus};
use crate::error::{GitError, StreamKind};

pub const DEFAULT_CHUNK_SIZE: usize = 512;

const GENERIC_FAILURE: &str = "process failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Running,
    Completing,
}

/// Receives the output of a [`ProcessReader`] session.
pub trait ReaderSink {
    /// Called with each stdout chunk as it arrives. Returning an error aborts
    /// the session; the error becomes the completion result.
    fn on_stdout(&mut self, data: &[u8]) -> Result<(), GitError>;

    /// Called exactly once per session.
    fn on_completed(&mut self, result: Result<(), GitError>);
}

struct Session {
    child: Box<dyn ChildProcess>,
    // None once the stream has reached EOF
    stdout: Option<Box<dyn PipeStream>>,
    stderr: Option<Box<dyn PipeStream>>,
    exit: Option<ExitStatus>,
    error_text: Vec<u8>,
}

impl Session {
    fn is_finished(&self) -> bool {
        self.exit.is_some() && self.stdout.is_none() && self.stderr.is_none()
    }

    /// Drop the pipes and make sure the child is gone.
    fn close(mut self, kill_child: bool) {
        self.stdout = None;
        self.stderr = None;

        if kill_child && self.exit.is_none() {
            let pid = self.child.pid();
            if let Err(e) = self.child.terminate() {
                log::warn!("failed to terminate git process {}: {}", pid, e);
            }
        }
    }
}

/// Runs one git process at a time and reports its output.
///
/// Stdout is pushed to a [`ReaderSink`] chunk by chunk, stderr is kept to
/// build the failure message. The session completes once the child has
/// exited and both pipes have hit EOF.
pub struct ProcessReader {
    launcher: Rc<dyn Launcher>,
    session: Option<Session>,
    state: ReaderState,
    buf: Vec<u8>,
}

impl ProcessReader {
    pub fn new(launcher: Rc<dyn Launcher>) -> Self {
        Self::with_chunk_size(launcher, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(launcher: Rc<dyn Launcher>, chunk_size: usize) -> Self {
        Self {
            launcher,
            session: None,
            state: ReaderState::Idle,
            buf: vec![0; chunk_size.max(1)],
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn program(&self) -> &str {
        self.launcher.program()
    }

    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.child.pid())
    }

    /// Start `git <args...>`, silently discarding any previous session.
    pub fn start(&mut self, args: &[&str]) -> Result<(), GitError> {
        self.reset();

        let program = self.launcher.program().to_string();
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.clone());
        argv.extend(args.iter().map(|a| a.to_string()));

        if let Some(bad) = argv.iter().find(|a| a.contains('\0')) {
            return Err(GitError::Spawn {
                program,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("argument contains a NUL byte: {:?}", bad),
                ),
            });
        }

        let spawned = self
            .launcher
            .spawn(&argv)
            .map_err(|source| GitError::Spawn { program, source })?;

        log::debug!("git session started: pid {} {:?}", spawned.child.pid(), args);

        self.session = Some(Session {
            child: spawned.child,
            stdout: Some(spawned.stdout),
            stderr: Some(spawned.stderr),
            exit: None,
            error_text: Vec::new(),
        });
        self.state = ReaderState::Running;
        Ok(())
    }

    /// Tear down the current session without reporting completion.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            log::debug!("discarding git session pid {}", session.child.pid());
            session.close(true);
        }
        self.state = ReaderState::Idle;
    }

    pub fn watched_fds(&self, fds: &mut Vec<RawFd>) {
        if let Some(session) = &self.session {
            fds.extend(session.stdout.as_ref().and_then(|s| s.raw_fd()));
            fds.extend(session.stderr.as_ref().and_then(|s| s.raw_fd()));
        }
    }

    /// Read whatever is available without blocking and check for completion.
    pub fn dispatch(&mut self, sink: &mut dyn ReaderSink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Err(e) = Self::pump_stdout(session, &mut self.buf, sink) {
            self.abort(e, sink);
            return;
        }

        if let Err(e) = Self::pump_stderr(session, &mut self.buf) {
            self.abort(e, sink);
            return;
        }

        if session.exit.is_none() {
            match session.child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("git pid {} exited with {}", session.child.pid(), status);
                    session.exit = Some(status);
                }
                Ok(None) => {}
                Err(e) => {
                    self.abort(GitError::Wait(e), sink);
                    return;
                }
            }
        }

        if session.is_finished() {
            self.complete(sink);
        }
    }

    fn pump_stdout(
        session: &mut Session,
        buf: &mut [u8],
        sink: &mut dyn ReaderSink,
    ) -> Result<(), GitError> {
        while let Some(stream) = session.stdout.as_mut() {
            match stream.read_chunk(buf) {
                Ok(ReadStatus::Data(n)) => sink.on_stdout(&buf[..n])?,
                Ok(ReadStatus::WouldBlock) => break,
                Ok(ReadStatus::Eof) => session.stdout = None,
                Err(source) => {
                    return Err(GitError::Read {
                        stream: StreamKind::Stdout,
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    fn pump_stderr(session: &mut Session, buf: &mut [u8]) -> Result<(), GitError> {
        while let Some(stream) = session.stderr.as_mut() {
            match stream.read_chunk(buf) {
                Ok(ReadStatus::Data(n)) => session.error_text.extend_from_slice(&buf[..n]),
                Ok(ReadStatus::WouldBlock) => break,
                Ok(ReadStatus::Eof) => session.stderr = None,
                Err(source) => {
                    return Err(GitError::Read {
                        stream: StreamKind::Stderr,
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    fn complete(&mut self, sink: &mut dyn ReaderSink) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.state = ReaderState::Completing;

        let result = match session.exit {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(GitError::Exit {
                status,
                message: failure_message(status, &session.error_text),
            }),
            None => Ok(()),
        };
        session.close(false);

        sink.on_completed(result);
        self.state = ReaderState::Idle;
    }

    fn abort(&mut self, error: GitError, sink: &mut dyn ReaderSink) {
        self.state = ReaderState::Completing;
        if let Some(session) = self.session.take() {
            log::debug!("aborting git pid {}: {}", session.child.pid(), error);
            session.close(true);
        }

        sink.on_completed(Err(error));
        self.state = ReaderState::Idle;
    }
}

impl Drop for ProcessReader {
    fn drop(&mut self) {
        self.reset();
    }
}

fn failure_message(status: ExitStatus, stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim_end();
    if !text.is_empty() {
        return text.to_string();
    }
    match status {
        ExitStatus::Signaled(signal) => format!("process terminated by signal {}", signal),
        ExitStatus::Exited(_) => GENERIC_FAILURE.to_string(),
    }
}
