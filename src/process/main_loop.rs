use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Something the main loop drives: it watches file descriptors and gets
/// dispatched once per iteration while active.
pub trait EventSource {
    fn watched_fds(&self, fds: &mut Vec<RawFd>);

    fn is_active(&self) -> bool;

    fn dispatch(&mut self);
}

/// Single-threaded loop that waits on every source's pipes with `poll(2)`.
///
/// Child exit has no descriptor to wait on, so the wait is capped at the
/// poll interval; a process whose pipes already closed is reaped at most
/// one interval later.
pub struct MainLoop {
    poll_interval: Duration,
    pollfds: Vec<libc::pollfd>,
    fds: Vec<RawFd>,
}

impl MainLoop {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            pollfds: Vec::new(),
            fds: Vec::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run one wait-then-dispatch cycle. Returns `false` without waiting when
    /// no source is active.
    pub fn iterate(&mut self, sources: &mut [&mut dyn EventSource]) -> io::Result<bool> {
        if !sources.iter().any(|s| s.is_active()) {
            return Ok(false);
        }

        self.fds.clear();
        for source in sources.iter().filter(|s| s.is_active()) {
            source.watched_fds(&mut self.fds);
        }

        self.wait()?;

        for source in sources.iter_mut() {
            if source.is_active() {
                source.dispatch();
            }
        }
        Ok(true)
    }

    /// Iterate until every source is idle.
    pub fn run(&mut self, sources: &mut [&mut dyn EventSource]) -> io::Result<()> {
        while self.iterate(sources)? {}
        Ok(())
    }

    fn wait(&mut self) -> io::Result<usize> {
        self.pollfds.clear();
        self.pollfds.extend(self.fds.iter().map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        }));

        let timeout = self.poll_interval.as_millis().min(i32::MAX as u128) as libc::c_int;

        loop {
            let ret = unsafe {
                libc::poll(
                    self.pollfds.as_mut_ptr(),
                    self.pollfds.len() as libc::nfds_t,
                    timeout,
                )
            };
            if ret >= 0 {
                return Ok(ret as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        remaining: usize,
        dispatched: usize,
    }

    impl EventSource for Countdown {
        fn watched_fds(&self, _fds: &mut Vec<RawFd>) {}

        fn is_active(&self) -> bool {
            self.remaining > 0
        }

        fn dispatch(&mut self) {
            self.remaining -= 1;
            self.dispatched += 1;
        }
    }

    #[test]
    fn test_iterate_without_active_sources_returns_immediately() {
        let mut main_loop = MainLoop::new(Duration::from_secs(60));
        let mut idle = Countdown {
            remaining: 0,
            dispatched: 0,
        };
        assert!(!main_loop.iterate(&mut [&mut idle]).unwrap());
        assert_eq!(idle.dispatched, 0);
    }

    #[test]
    fn test_run_dispatches_until_idle() {
        let mut main_loop = MainLoop::new(Duration::from_millis(1));
        let mut a = Countdown {
            remaining: 3,
            dispatched: 0,
        };
        let mut b = Countdown {
            remaining: 1,
            dispatched: 0,
        };
        main_loop.run(&mut [&mut a, &mut b]).unwrap();
        assert_eq!(a.dispatched, 3);
        assert_eq!(b.dispatched, 1);
    }
}
