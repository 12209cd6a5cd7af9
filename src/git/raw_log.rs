use super::commit::LogData;
use crate::error::GitError;

/// Arguments for the single-commit log query.
pub fn log_args(hash: &str) -> [&str; 5] {
    ["log", "--max-count=1", "--pretty=raw", "--no-color", hash]
}

/// Parse `git log --pretty=raw` output for one commit.
///
/// ```text
/// commit <hash>
/// tree <hash>
/// parent <hash>        (zero or more)
/// author <ident>
/// committer <ident>
/// gpgsig ...           (continuation lines start with a space)
///
///     message, indented by four spaces
/// ```
pub fn parse_raw_log(raw: &[u8]) -> Result<LogData, GitError> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.lines().enumerate();
    let mut parents = Vec::new();

    match lines.next() {
        Some((_, first)) if first.starts_with("commit ") => {}
        Some((_, first)) => {
            return Err(GitError::parse(1, format!("expected a commit line, found {:?}", first)))
        }
        None => return Err(GitError::parse(0, "empty log output")),
    }

    for (_, line) in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') {
            continue;
        }
        if let Some(parent) = line.strip_prefix("parent ") {
            parents.push(parent.trim().to_string());
        }
    }

    let mut message: Vec<&str> = lines
        .map(|(_, line)| line.strip_prefix("    ").unwrap_or(line))
        .collect();
    while message.last().is_some_and(|line| line.trim().is_empty()) {
        message.pop();
    }

    Ok(LogData {
        parents,
        message: message.join("\n"),
    })
}
