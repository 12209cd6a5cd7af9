use std::fmt;
use std::io;
use std::os::fd::RawFd;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// Decode a raw status word as filled in by `waitpid(2)`.
    #[allow(unused_unsafe)]
    pub fn from_wait_status(status: libc::c_int) -> Self {
        // Older libc releases expose the W* macros as unsafe fns
        unsafe {
            if libc::WIFSIGNALED(status) {
                ExitStatus::Signaled(libc::WTERMSIG(status))
            } else {
                ExitStatus::Exited(libc::WEXITSTATUS(status))
            }
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled(signal) => write!(f, "signal {}", signal),
        }
    }
}

/// Result of one non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Data(usize),
    WouldBlock,
    Eof,
}

/// One of the child's output pipes.
pub trait PipeStream {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus>;

    /// Descriptor to wait on for readability, if the stream is backed by one.
    fn raw_fd(&self) -> Option<RawFd>;
}

pub trait ChildProcess {
    fn pid(&self) -> u32;

    /// Reap the child if it has exited, without blocking.
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Reap, then SIGTERM and block until reaped.
    ///
    /// There is no escalation to SIGKILL: a child ignoring SIGTERM keeps this
    /// call blocked.
    fn terminate(&mut self) -> io::Result<()>;
}

pub struct SpawnedChild {
    pub child: Box<dyn ChildProcess>,
    pub stdout: Box<dyn PipeStream>,
    pub stderr: Box<dyn PipeStream>,
}

/// Starts git processes. `argv[0]` is always [`Launcher::program`].
pub trait Launcher {
    fn program(&self) -> &str;

    fn spawn(&self, argv: &[String]) -> io::Result<SpawnedChild>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_success() {
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Exited(128).success());
        assert!(!ExitStatus::Signaled(15).success());
    }

    #[test]
    fn test_exit_status_from_wait_status() {
        // Normal exit stores the code in the second byte
        assert_eq!(ExitStatus::from_wait_status(3 << 8), ExitStatus::Exited(3));
        assert_eq!(ExitStatus::from_wait_status(0), ExitStatus::Exited(0));
        // Termination by signal stores the signal number in the low bits
        assert_eq!(
            ExitStatus::from_wait_status(libc::SIGTERM),
            ExitStatus::Signaled(libc::SIGTERM)
        );
    }
}
