use std::rc::Rc;

use memchr::memchr;

use super::annotated_source::AnnotatedSourceLine;
use super::commit::{Commit, CommitInfo};
use super::registry::CommitRegistry;
use crate::error::GitError;

/// Arguments for blaming `file` as of `revision`.
pub fn blame_args<'a>(file: &'a str, revision: &'a str) -> [&'a str; 5] {
    ["blame", "--porcelain", revision, "--", file]
}

/// First line of a porcelain record:
/// `<hash> <orig line> <final line> [<lines in group>]`.
#[derive(Debug, PartialEq, Eq)]
struct Header<'a> {
    hash: &'a str,
    orig_line: usize,
    final_line: usize,
}

fn parse_header(line: &[u8]) -> Option<Header<'_>> {
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.split(' ');

    let hash = parts.next()?;
    // SHA-1 or SHA-256 object names
    if !matches!(hash.len(), 40 | 64) || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let orig_line = parts.next()?.parse().ok()?;
    let final_line = parts.next()?.parse().ok()?;
    // Group size, only present on the first line of a group
    if let Some(n) = parts.next() {
        n.parse::<usize>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }

    Some(Header {
        hash,
        orig_line,
        final_line,
    })
}

struct Record {
    commit: Rc<Commit>,
    orig_line: usize,
    final_line: usize,
    after_filename: bool,
}

enum State {
    Header,
    Fields(Record),
}

/// Incremental parser for `git blame --porcelain`.
///
/// Bytes may arrive split anywhere; partial lines are held back until their
/// newline shows up, so the result never depends on chunk boundaries.
pub struct BlameParser {
    partial: Vec<u8>,
    line_no: usize,
    state: State,
    lines: Vec<AnnotatedSourceLine>,
}

impl BlameParser {
    pub fn new() -> Self {
        Self {
            partial: Vec::new(),
            line_no: 0,
            state: State::Header,
            lines: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Source lines parsed so far.
    pub fn parsed_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn feed(&mut self, data: &[u8], registry: &CommitRegistry) -> Result<(), GitError> {
        let mut rest = data;
        while let Some(pos) = memchr(b'\n', rest) {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.partial.is_empty() {
                self.parse_line(line, registry)?;
            } else {
                self.partial.extend_from_slice(line);
                let line = std::mem::take(&mut self.partial);
                self.parse_line(&line, registry)?;
            }
        }
        self.partial.extend_from_slice(rest);
        Ok(())
    }

    /// Flush the last unterminated line and hand over the parsed lines.
    pub fn finish(&mut self, registry: &CommitRegistry) -> Result<Vec<AnnotatedSourceLine>, GitError> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.parse_line(&line, registry)?;
        }

        match self.state {
            State::Header => Ok(std::mem::take(&mut self.lines)),
            State::Fields(_) => Err(GitError::parse(
                self.line_no,
                "output ended before the source line of the last record",
            )),
        }
    }

    fn parse_line(&mut self, line: &[u8], registry: &CommitRegistry) -> Result<(), GitError> {
        self.line_no += 1;

        self.state = match std::mem::replace(&mut self.state, State::Header) {
            State::Header => self.start_record(line, registry)?,
            State::Fields(record) => self.continue_record(record, line)?,
        };
        Ok(())
    }

    fn start_record(&self, line: &[u8], registry: &CommitRegistry) -> Result<State, GitError> {
        let header = parse_header(line).ok_or_else(|| {
            GitError::parse(
                self.line_no,
                format!(
                    "expected a commit header, found {:?}",
                    String::from_utf8_lossy(line)
                ),
            )
        })?;

        Ok(State::Fields(Record {
            commit: registry.resolve(header.hash),
            orig_line: header.orig_line,
            final_line: header.final_line,
            after_filename: false,
        }))
    }

    fn continue_record(&mut self, mut record: Record, line: &[u8]) -> Result<State, GitError> {
        if let Some(text) = line.strip_prefix(b"\t") {
            self.lines.push(AnnotatedSourceLine::new(
                String::from_utf8_lossy(text).into_owned(),
                record.commit,
                record.orig_line,
                record.final_line,
            ));
            return Ok(State::Header);
        }

        if parse_header(line).is_some() {
            return Err(GitError::parse(
                self.line_no,
                "commit header where a source line was expected",
            ));
        }
        if record.after_filename {
            return Err(GitError::parse(
                self.line_no,
                "metadata after the filename field",
            ));
        }

        let owned = String::from_utf8_lossy(line);
        let line = &*owned;
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));

        let mut result = Ok(());
        record.commit.update_info(|info| {
            result = apply_field(info, key, value);
        });
        result.map_err(|reason| GitError::parse(self.line_no, reason))?;

        if key == "filename" {
            record.after_filename = true;
        }
        Ok(State::Fields(record))
    }
}

impl Default for BlameParser {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_field(info: &mut CommitInfo, key: &str, value: &str) -> Result<(), String> {
    let time = |value: &str| {
        value
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid {} {:?}", key, value))
    };

    match key {
        "author" => info.author = Some(value.to_string()),
        "author-mail" => info.author_mail = Some(strip_angle_brackets(value)),
        "author-time" => info.author_time = Some(time(value)?),
        "author-tz" => info.author_tz = Some(value.to_string()),
        "committer" => info.committer = Some(value.to_string()),
        "committer-mail" => info.committer_mail = Some(strip_angle_brackets(value)),
        "committer-time" => info.committer_time = Some(time(value)?),
        "committer-tz" => info.committer_tz = Some(value.to_string()),
        "summary" => info.summary = Some(value.to_string()),
        "filename" => info.filename = Some(value.to_string()),
        "boundary" => info.boundary = true,
        "previous" => {}
        _ => return Err(format!("unexpected metadata field {:?}", key)),
    }
    Ok(())
}

fn strip_angle_brackets(value: &str) -> String {
    value
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}
