use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;

use crate::config::DateFormat;
use crate::git::{Commit, CommitRegistry, HandlerId, LogState};

pub const LOADING_TEXT: &str = "Loading...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailRow {
    pub label: &'static str,
    pub value: String,
}

/// Details of the selected commit: hash, parents and log message.
pub struct CommitView {
    registry: CommitRegistry,
    date_format: DateFormat,
    commit: Option<(Rc<Commit>, HandlerId)>,
    updated: Rc<Cell<bool>>,
}

impl CommitView {
    pub fn new(registry: CommitRegistry, date_format: DateFormat) -> Self {
        Self {
            registry,
            date_format,
            commit: None,
            updated: Rc::new(Cell::new(false)),
        }
    }

    /// Show `commit`, requesting its log if it has not been fetched.
    pub fn set_commit(&mut self, commit: Option<Rc<Commit>>) {
        self.disconnect();

        if let Some(commit) = commit {
            let updated = Rc::clone(&self.updated);
            let handler = commit.connect_log_updated(move |_| updated.set(true));
            self.registry.fetch_log(&commit);
            self.commit = Some((commit, handler));
        }
        self.updated.set(true);
    }

    pub fn commit(&self) -> Option<&Rc<Commit>> {
        self.commit.as_ref().map(|(commit, _)| commit)
    }

    /// True once after the shown commit or its log changed.
    pub fn take_updated(&self) -> bool {
        self.updated.replace(false)
    }

    pub fn rows(&self) -> Vec<DetailRow> {
        let Some(commit) = self.commit() else {
            return Vec::new();
        };

        let mut rows = vec![DetailRow {
            label: "Commit",
            value: commit.hash().to_string(),
        }];

        {
            let info = commit.info();
            if let Some(author) = &info.author {
                let value = match &info.author_mail {
                    Some(mail) => format!("{} <{}>", author, mail),
                    None => author.clone(),
                };
                rows.push(DetailRow {
                    label: "Author",
                    value,
                });
            }
            if info.author_time.is_some() {
                rows.push(DetailRow {
                    label: "Date",
                    value: info.format_date(self.date_format),
                });
            }
        }

        for parent in self.registry.parents(commit) {
            rows.push(DetailRow {
                label: "Parent",
                value: parent.hash().to_string(),
            });
        }
        rows
    }

    pub fn log_text(&self) -> String {
        let Some(commit) = self.commit() else {
            return String::new();
        };

        match &*commit.log_state() {
            LogState::Loaded(data) => data.message.clone(),
            LogState::Failed(message) => format!("Error: {}", message),
            LogState::NotFetched | LogState::Fetching => LOADING_TEXT.to_string(),
        }
    }

    fn disconnect(&mut self) {
        if let Some((commit, handler)) = self.commit.take() {
            commit.disconnect(handler);
        }
    }
}

impl Drop for CommitView {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedLauncher;

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const HASH_C: &str = "cccccccccccccccccccccccccccccccccccccccc";

    fn raw_log() -> Vec<u8> {
        format!(
            "commit {}\ntree {}\nparent {}\nparent {}\nauthor A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\n    Merge things\n",
            HASH_A, HASH_C, HASH_B, HASH_C
        )
        .into_bytes()
    }

    fn labels(rows: &[DetailRow]) -> Vec<&'static str> {
        rows.iter().map(|r| r.label).collect()
    }

    #[test]
    fn test_empty_view() {
        let view = CommitView::new(
            CommitRegistry::new(ScriptedLauncher::new()),
            DateFormat::Relative,
        );
        assert!(view.rows().is_empty());
        assert_eq!(view.log_text(), "");
    }

    #[test]
    fn test_shows_loading_then_log() {
        let launcher = ScriptedLauncher::new();
        let registry = CommitRegistry::new(launcher.clone());
        let mut view = CommitView::new(registry.clone(), DateFormat::Relative);
        let commit = registry.resolve(HASH_A);

        view.set_commit(Some(Rc::clone(&commit)));
        assert!(view.take_updated());
        assert_eq!(view.log_text(), LOADING_TEXT);
        assert_eq!(labels(&view.rows()), vec!["Commit"]);
        assert_eq!(launcher.spawn_count(), 1);

        launcher.last_child().finish(&raw_log(), b"", 0);
        registry.dispatch();

        assert!(view.take_updated());
        assert!(!view.take_updated());
        assert_eq!(view.log_text(), "Merge things");
        let rows = view.rows();
        assert_eq!(labels(&rows), vec!["Commit", "Parent", "Parent"]);
        assert_eq!(rows[1].value, HASH_B);
        assert_eq!(rows[2].value, HASH_C);
    }

    #[test]
    fn test_failed_log_is_shown() {
        let launcher = ScriptedLauncher::new();
        let registry = CommitRegistry::new(launcher.clone());
        let mut view = CommitView::new(registry.clone(), DateFormat::Iso);

        view.set_commit(Some(registry.resolve(HASH_A)));
        launcher.last_child().finish(b"", b"fatal: bad object\n", 128);
        registry.dispatch();

        assert_eq!(view.log_text(), "Error: fatal: bad object");
    }

    #[test]
    fn test_switching_commit_disconnects_old_observer() {
        let launcher = ScriptedLauncher::new();
        let registry = CommitRegistry::new(launcher.clone());
        let mut view = CommitView::new(registry.clone(), DateFormat::Relative);
        let first = registry.resolve(HASH_A);
        let second = registry.resolve(HASH_B);

        view.set_commit(Some(Rc::clone(&first)));
        view.set_commit(Some(Rc::clone(&second)));
        view.take_updated();

        launcher.child(0).finish(&raw_log(), b"", 0);
        registry.dispatch();

        // Only the first commit settled, and nobody is watching it
        assert!(first.has_log_data());
        assert!(!view.take_updated());
        assert_eq!(view.commit().unwrap().hash(), HASH_B);
    }

    #[test]
    fn test_author_rows_from_blame_metadata() {
        let registry = CommitRegistry::new(ScriptedLauncher::new());
        let commit = registry.resolve(HASH_A);
        commit.update_info(|info| {
            info.author = Some("Alice".to_string());
            info.author_mail = Some("alice@example.com".to_string());
            info.author_time = Some(0);
            info.author_tz = Some("+0000".to_string());
        });

        let mut view = CommitView::new(registry, DateFormat::Iso);
        view.set_commit(Some(commit));
        let rows = view.rows();

        assert_eq!(labels(&rows), vec!["Commit", "Author", "Date"]);
        assert_eq!(rows[1].value, "Alice <alice@example.com>");
        assert_eq!(rows[2].value, "1970-01-01 00:00:00 +0000");
    }
}
