use std::path::PathBuf;

use clap::Parser;

/// Browse the blame of a file, one line per source line.
#[derive(Parser, Debug)]
#[command(name = "blame-browse", version)]
#[command(after_help = "\
Examples:
  blame-browse src/main.rs                 Blame at HEAD
  blame-browse -r v1.0 src/main.rs         Blame at a tag
  blame-browse --commit 42 src/main.rs     Show the commit behind line 42
  blame-browse --json src/main.rs          JSON output for scripting")]
pub struct Cli {
    /// File to blame, relative to the repository
    pub file: String,

    /// Revision to blame at
    #[arg(long, short = 'r', default_value = "HEAD")]
    pub revision: String,

    /// Run git in this directory
    #[arg(long = "repo", short = 'C')]
    pub repo: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Color hash cells with the commit color
    #[arg(long)]
    pub color: bool,

    /// Print rows as a JSON array
    #[arg(long)]
    pub json: bool,

    /// After loading, show the commit that last touched this 1-based line
    #[arg(long, value_name = "LINE", value_parser = parse_line)]
    pub commit: Option<usize>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, value_parser = ["off", "error", "warn", "info", "debug", "trace"])]
    pub log_level: Option<String>,
}

fn parse_line(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a line number", s))?;
    if n == 0 {
        Err("line numbers start at 1".to_string())
    } else {
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["blame-browse", "src/lib.rs"]).unwrap();
        assert_eq!(cli.file, "src/lib.rs");
        assert_eq!(cli.revision, "HEAD");
        assert!(cli.repo.is_none());
        assert!(!cli.color);
        assert!(!cli.json);
        assert!(cli.commit.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_all_options() {
        let cli = Cli::try_parse_from([
            "blame-browse",
            "-r",
            "v1.0",
            "-C",
            "/tmp/repo",
            "--color",
            "--json",
            "--commit",
            "7",
            "--log-level",
            "debug",
            "README.md",
        ])
        .unwrap();
        assert_eq!(cli.revision, "v1.0");
        assert_eq!(cli.repo, Some(PathBuf::from("/tmp/repo")));
        assert!(cli.color && cli.json);
        assert_eq!(cli.commit, Some(7));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_rejects_line_zero_and_missing_file() {
        assert!(Cli::try_parse_from(["blame-browse", "--commit", "0", "a"]).is_err());
        assert!(Cli::try_parse_from(["blame-browse", "--log-level", "loud", "a"]).is_err());
        assert!(Cli::try_parse_from(["blame-browse"]).is_err());
    }
}
