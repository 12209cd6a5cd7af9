use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub git: GitConfig,
    pub reader: ReaderConfig,
    pub view: ViewConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    #[default]
    Relative,
    Iso,
    Local,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    pub program: String,
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    pub chunk_size: usize,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    pub hash_length: usize,
    pub show_line_numbers: bool,
    pub date_format: DateFormat,
    pub color: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub file: PathBuf,
    pub level: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            work_dir: None,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval_ms: 50,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            hash_length: 6,
            show_line_numbers: true,
            date_format: DateFormat::Relative,
            color: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: std::env::temp_dir().join("blame-browse.log"),
            level: "info".to_string(),
        }
    }
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level
            .parse()
            .map_err(|_| Error::Config(format!("unknown log level {:?}", self.level)))
    }
}

impl Config {
    /// Load the user config, falling back to defaults when there is none.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        log::debug!("loading config from {}", path.display());
        Self::parse(&content)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blame-browse").join("config.toml"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.git.program.trim().is_empty() {
            return Err(Error::Config("git.program must not be empty".to_string()));
        }
        if self.reader.chunk_size == 0 {
            return Err(Error::Config("reader.chunk_size must be greater than 0".to_string()));
        }
        if self.reader.poll_interval_ms == 0 {
            return Err(Error::Config(
                "reader.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        self.log.level_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.git.program, "git");
        assert_eq!(config.reader.chunk_size, 512);
        assert_eq!(config.reader.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.view.hash_length, 6);
        assert!(config.view.show_line_numbers);
        assert_eq!(config.view.date_format, DateFormat::Relative);
        assert_eq!(config.log.level_filter().unwrap(), LevelFilter::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_partial_sections() {
        let config = Config::parse(
            r#"
[git]
program = "/usr/local/bin/git"
work_dir = "/srv/repo"

[view]
hash_length = 10
date_format = "iso"
color = true

[log]
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(config.git.program, "/usr/local/bin/git");
        assert_eq!(config.git.work_dir, Some(PathBuf::from("/srv/repo")));
        assert_eq!(config.reader.chunk_size, 512);
        assert_eq!(config.view.hash_length, 10);
        assert_eq!(config.view.date_format, DateFormat::Iso);
        assert!(config.view.color);
        assert!(config.view.show_line_numbers);
        assert_eq!(config.log.level_filter().unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn test_parse_rejects_zero_chunk_size() {
        let err = Config::parse("[reader]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("chunk_size")));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(Config::parse("[reader]\npoll_interval_ms = 0\n").is_err());
        assert!(Config::parse("[view]\ndate_format = \"yesterday\"\n").is_err());
        assert!(Config::parse("[log]\nlevel = \"loud\"\n").is_err());
        assert!(Config::parse("[view]\nhash_lenght = 4\n").is_err());
        assert!(Config::parse("not toml at all").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reader]\nchunk_size = 4096\npoll_interval_ms = 10").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.reader.chunk_size, 4096);
        assert_eq!(config.reader.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_from_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
