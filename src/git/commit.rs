use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::DateFormat;

/// Display color of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Derive a color from a commit hash. The same hash always maps to the
    /// same color, in every process.
    pub fn from_hash(hash: &str) -> Self {
        let h = xxh3_64(hash.as_bytes());
        Self::new((h >> 16) as u8, (h >> 8) as u8, h as u8)
    }

    /// Complement of this color, used for text drawn on top of it.
    pub fn inverted(self) -> Self {
        Self::new(!self.r, !self.g, !self.b)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Metadata git blame reports for a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub author: Option<String>,
    pub author_mail: Option<String>,
    pub author_time: Option<i64>,
    pub author_tz: Option<String>,
    pub committer: Option<String>,
    pub committer_mail: Option<String>,
    pub committer_time: Option<i64>,
    pub committer_tz: Option<String>,
    pub summary: Option<String>,
    pub filename: Option<String>,
    pub boundary: bool,
}

impl CommitInfo {
    pub fn format_date(&self, format: DateFormat) -> String {
        let Some(time) = self.author_time else {
            return String::new();
        };

        match format {
            DateFormat::Relative => relative_time(time, Utc::now().timestamp()),
            DateFormat::Iso => self
                .author_tz
                .as_deref()
                .and_then(parse_tz)
                .or_else(|| FixedOffset::east_opt(0))
                .and_then(|offset| offset.timestamp_opt(time, 0).single())
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S %z").to_string())
                .unwrap_or_default(),
            DateFormat::Local => match DateTime::<Utc>::from_timestamp(time, 0) {
                Some(dt) => dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
                None => String::new(),
            },
        }
    }
}

/// Parse a git timezone such as `+0530` or `-0800`.
fn parse_tz(tz: &str) -> Option<FixedOffset> {
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

pub fn relative_time(time: i64, now: i64) -> String {
    let diff = now - time;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        plural(diff / 60, "minute")
    } else if diff < 86400 {
        plural(diff / 3600, "hour")
    } else if diff < 2592000 {
        plural(diff / 86400, "day")
    } else if diff < 31536000 {
        plural(diff / 2592000, "month")
    } else {
        plural(diff / 31536000, "year")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// Result of `git log` for one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogData {
    pub parents: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogState {
    #[default]
    NotFetched,
    Fetching,
    Loaded(LogData),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type LogObserver = Rc<dyn Fn(&Commit)>;

/// A commit as seen while browsing. Shared as `Rc<Commit>`; the registry owns
/// the canonical handle.
pub struct Commit {
    hash: String,
    color: Rgb,
    info: RefCell<CommitInfo>,
    log: RefCell<LogState>,
    observers: RefCell<Vec<(HandlerId, LogObserver)>>,
    next_handler: Cell<u64>,
}

impl Commit {
    pub(crate) fn new(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            color: Rgb::from_hash(hash),
            info: RefCell::new(CommitInfo::default()),
            log: RefCell::new(LogState::NotFetched),
            observers: RefCell::new(Vec::new()),
            next_handler: Cell::new(1),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn short_hash(&self, len: usize) -> &str {
        self.hash.get(..len).unwrap_or(&self.hash)
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn info(&self) -> Ref<'_, CommitInfo> {
        self.info.borrow()
    }

    pub(crate) fn update_info(&self, f: impl FnOnce(&mut CommitInfo)) {
        f(&mut self.info.borrow_mut());
    }

    pub fn log_state(&self) -> Ref<'_, LogState> {
        self.log.borrow()
    }

    pub fn has_log_data(&self) -> bool {
        matches!(*self.log.borrow(), LogState::Loaded(_))
    }

    pub fn is_fetching_log(&self) -> bool {
        matches!(*self.log.borrow(), LogState::Fetching)
    }

    pub fn log_message(&self) -> Option<String> {
        match &*self.log.borrow() {
            LogState::Loaded(data) => Some(data.message.clone()),
            _ => None,
        }
    }

    pub fn parent_hashes(&self) -> Vec<String> {
        match &*self.log.borrow() {
            LogState::Loaded(data) => data.parents.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn set_log_state(&self, state: LogState) {
        *self.log.borrow_mut() = state;
    }

    /// Register `callback` to run whenever the log state of this commit
    /// settles (loaded or failed).
    pub fn connect_log_updated(&self, callback: impl Fn(&Commit) + 'static) -> HandlerId {
        let id = HandlerId(self.next_handler.get());
        self.next_handler.set(id.0 + 1);
        self.observers.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(handler, _)| *handler != id);
        observers.len() != before
    }

    pub(crate) fn notify_log_updated(&self) {
        // Observers may connect or disconnect while being notified
        let observers: Vec<LogObserver> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in observers {
            callback(self);
        }
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("hash", &self.hash)
            .field("color", &self.color)
            .field("info", &*self.info.borrow())
            .field("log", &*self.log.borrow())
            .finish()
    }
}
