//! Scripted launcher for driving readers deterministically in tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

use super::launcher::{ChildProcess, ExitStatus, Launcher, PipeStream, ReadStatus, SpawnedChild};

enum Step {
    Data(Vec<u8>),
    Error(io::ErrorKind),
    Eof,
}

#[derive(Default)]
struct Pipe {
    steps: VecDeque<Step>,
    at_eof: bool,
}

impl Pipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        if self.at_eof {
            return Ok(ReadStatus::Eof);
        }
        match self.steps.pop_front() {
            None => Ok(ReadStatus::WouldBlock),
            Some(Step::Eof) => {
                self.at_eof = true;
                Ok(ReadStatus::Eof)
            }
            Some(Step::Error(kind)) => Err(io::Error::new(kind, "scripted read failure")),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.steps.push_front(Step::Data(data.split_off(n)));
                }
                Ok(ReadStatus::Data(n))
            }
        }
    }
}

#[derive(Default)]
struct ChildState {
    stdout: Pipe,
    stderr: Pipe,
    exit: Option<ExitStatus>,
    wait_error: Option<io::ErrorKind>,
    terminated: bool,
    reaped: bool,
}

/// Test-side handle on one scripted child.
#[derive(Clone, Default)]
pub struct ScriptedChild {
    state: Rc<RefCell<ChildState>>,
}

impl ScriptedChild {
    pub fn push_stdout(&self, data: &[u8]) {
        self.state
            .borrow_mut()
            .stdout
            .steps
            .push_back(Step::Data(data.to_vec()));
    }

    pub fn push_stderr(&self, data: &[u8]) {
        self.state
            .borrow_mut()
            .stderr
            .steps
            .push_back(Step::Data(data.to_vec()));
    }

    pub fn close_stdout(&self) {
        self.state.borrow_mut().stdout.steps.push_back(Step::Eof);
    }

    pub fn close_stderr(&self) {
        self.state.borrow_mut().stderr.steps.push_back(Step::Eof);
    }

    pub fn fail_stdout(&self, kind: io::ErrorKind) {
        self.state
            .borrow_mut()
            .stdout
            .steps
            .push_back(Step::Error(kind));
    }

    pub fn fail_stderr(&self, kind: io::ErrorKind) {
        self.state
            .borrow_mut()
            .stderr
            .steps
            .push_back(Step::Error(kind));
    }

    pub fn fail_wait(&self, kind: io::ErrorKind) {
        self.state.borrow_mut().wait_error = Some(kind);
    }

    pub fn exit(&self, code: i32) {
        self.state.borrow_mut().exit = Some(ExitStatus::Exited(code));
    }

    pub fn kill_with(&self, signal: i32) {
        self.state.borrow_mut().exit = Some(ExitStatus::Signaled(signal));
    }

    /// Queue the full output of a process that exits with `code`.
    pub fn finish(&self, stdout: &[u8], stderr: &[u8], code: i32) {
        if !stdout.is_empty() {
            self.push_stdout(stdout);
        }
        if !stderr.is_empty() {
            self.push_stderr(stderr);
        }
        self.close_stdout();
        self.close_stderr();
        self.exit(code);
    }

    pub fn was_terminated(&self) -> bool {
        self.state.borrow().terminated
    }

    pub fn is_reaped(&self) -> bool {
        self.state.borrow().reaped
    }
}

struct ScriptedStdout(ScriptedChild);
struct ScriptedStderr(ScriptedChild);

impl PipeStream for ScriptedStdout {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        self.0.state.borrow_mut().stdout.read(buf)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

impl PipeStream for ScriptedStderr {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        self.0.state.borrow_mut().stderr.read(buf)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

struct ScriptedProcess {
    pid: u32,
    child: ScriptedChild,
}

impl ChildProcess for ScriptedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let mut state = self.child.state.borrow_mut();
        if let Some(kind) = state.wait_error.take() {
            return Err(io::Error::new(kind, "scripted wait failure"));
        }
        if state.exit.is_some() {
            state.reaped = true;
        }
        Ok(state.exit)
    }

    fn terminate(&mut self) -> io::Result<()> {
        let mut state = self.child.state.borrow_mut();
        if state.exit.is_none() {
            state.terminated = true;
            state.exit = Some(ExitStatus::Signaled(15));
        }
        state.reaped = true;
        Ok(())
    }
}

/// Launcher whose children are fed by the test.
///
/// Every spawn creates a fresh [`ScriptedChild`]; queue output on it before
/// or after the reader starts.
#[derive(Default)]
pub struct ScriptedLauncher {
    spawned: RefCell<Vec<(Vec<String>, ScriptedChild)>>,
    prepared: RefCell<VecDeque<ScriptedChild>>,
    spawn_error: Cell<Option<io::ErrorKind>>,
}

impl ScriptedLauncher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Child that the next spawn will hand out, so output can be queued early.
    pub fn prepare(&self) -> ScriptedChild {
        let child = ScriptedChild::default();
        self.prepared.borrow_mut().push_back(child.clone());
        child
    }

    pub fn fail_next_spawn(&self, kind: io::ErrorKind) {
        self.spawn_error.set(Some(kind));
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.borrow().len()
    }

    pub fn child(&self, index: usize) -> ScriptedChild {
        self.spawned.borrow()[index].1.clone()
    }

    pub fn last_child(&self) -> ScriptedChild {
        let spawned = self.spawned.borrow();
        spawned[spawned.len() - 1].1.clone()
    }

    pub fn argv(&self, index: usize) -> Vec<String> {
        self.spawned.borrow()[index].0.clone()
    }

    /// Children that were spawned but never reaped.
    pub fn live_children(&self) -> usize {
        self.spawned
            .borrow()
            .iter()
            .filter(|(_, child)| !child.is_reaped())
            .count()
    }
}

impl Launcher for ScriptedLauncher {
    fn program(&self) -> &str {
        "git"
    }

    fn spawn(&self, argv: &[String]) -> io::Result<SpawnedChild> {
        if let Some(kind) = self.spawn_error.take() {
            return Err(io::Error::new(kind, "scripted spawn failure"));
        }

        let child = self.prepared.borrow_mut().pop_front().unwrap_or_default();
        let pid = 1000 + self.spawned.borrow().len() as u32;
        self.spawned.borrow_mut().push((argv.to_vec(), child.clone()));

        Ok(SpawnedChild {
            child: Box::new(ScriptedProcess {
                pid,
                child: child.clone(),
            }),
            stdout: Box::new(ScriptedStdout(child.clone())),
            stderr: Box::new(ScriptedStderr(child)),
        })
    }
}
