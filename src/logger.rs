use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

use log::{LevelFilter, Log, Metadata, Record};

/// Appends `[secs.millis] [LEVEL] [module] message` lines to a file.
pub struct FileLogger {
    file: Mutex<File>,
    level: LevelFilter,
}

impl FileLogger {
    /// Open `path`, truncating whatever an earlier run left there.
    pub fn open(path: &Path, level: LevelFilter) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            level,
        })
    }
}

fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();

    // Seconds are cut to five digits to keep lines short
    format!("{}.{:03}", now.as_secs() % 100000, now.subsec_millis())
}

fn format_line(level: log::Level, module: &str, message: &std::fmt::Arguments<'_>) -> String {
    format!("[{}] [{}] [{}] {}", timestamp(), level, module, message)
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(
            record.level(),
            record.module_path().unwrap_or_else(|| record.target()),
            record.args(),
        );
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
            let _ = file.flush();
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Install the file logger as the global `log` backend.
pub fn init(path: &Path, level: LevelFilter) -> crate::error::Result<()> {
    let logger = FileLogger::open(path, level)?;
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| crate::error::Error::Config(format!("logger already installed: {}", e)))?;
    log::set_max_level(level);
    Ok(())
}
