//! Launcher backed by real unix processes.

use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::launcher::{ChildProcess, ExitStatus, Launcher, PipeStream, ReadStatus, SpawnedChild};

pub struct SystemLauncher {
    program: String,
    work_dir: Option<PathBuf>,
}

impl SystemLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            work_dir: None,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }
}

impl Launcher for SystemLauncher {
    fn program(&self) -> &str {
        &self.program
    }

    fn spawn(&self, argv: &[String]) -> io::Result<SpawnedChild> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument list"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }

        let mut process = cmd.spawn()?;
        let mut child = SystemChild::new(process.id());

        let pipes = process
            .stdout
            .take()
            .zip(process.stderr.take())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child pipes were not captured"))
            .and_then(|(stdout, stderr)| {
                set_nonblocking(stdout.as_raw_fd())?;
                set_nonblocking(stderr.as_raw_fd())?;
                Ok((stdout, stderr))
            });

        let (stdout, stderr) = match pipes {
            Ok(pipes) => pipes,
            Err(e) => {
                if let Err(kill_err) = child.terminate() {
                    log::warn!("failed to clean up child {}: {}", child.pid, kill_err);
                }
                return Err(e);
            }
        };

        log::debug!("spawned {:?} as pid {}", argv, child.pid);

        Ok(SpawnedChild {
            child: Box::new(child),
            stdout: Box::new(SystemPipe { inner: stdout }),
            stderr: Box::new(SystemPipe { inner: stderr }),
        })
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

struct SystemPipe<R> {
    inner: R,
}

impl<R: Read + AsRawFd> PipeStream for SystemPipe<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        loop {
            return match self.inner.read(buf) {
                Ok(0) => Ok(ReadStatus::Eof),
                Ok(n) => Ok(ReadStatus::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::WouldBlock),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.inner.as_raw_fd())
    }
}

/// Child reaped through `waitpid(2)` directly so that teardown can send
/// SIGTERM rather than the SIGKILL `std::process::Child::kill` uses.
struct SystemChild {
    pid: u32,
    status: Option<ExitStatus>,
}

impl SystemChild {
    fn new(pid: u32) -> Self {
        Self { pid, status: None }
    }

    fn waitpid(&self, flags: libc::c_int) -> io::Result<Option<ExitStatus>> {
        let mut status: libc::c_int = 0;
        loop {
            let ret = unsafe { libc::waitpid(self.pid as libc::pid_t, &mut status, flags) };
            if ret == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ret == 0 {
                return Ok(None);
            }
            return Ok(Some(ExitStatus::from_wait_status(status)));
        }
    }
}

impl ChildProcess for SystemChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.waitpid(libc::WNOHANG)?;
        }
        Ok(self.status)
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.try_wait()?.is_some() {
            return Ok(());
        }

        if unsafe { libc::kill(self.pid as libc::pid_t, libc::SIGTERM) } == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err);
            }
        }

        self.status = self.waitpid(0)?;
        log::debug!("terminated pid {} ({:?})", self.pid, self.status);
        Ok(())
    }
}

impl Drop for SystemChild {
    fn drop(&mut self) {
        if self.status.is_none() {
            if let Err(e) = self.terminate() {
                log::warn!("failed to reap pid {}: {}", self.pid, e);
            }
        }
    }
}
