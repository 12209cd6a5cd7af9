use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use serde::Serialize;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::CommitRegistry;
use crate::process::{Launcher, MainLoop, SystemLauncher};
use crate::views::{CommitView, DetailRow, SourceView};

#[derive(Serialize)]
struct CommitDetails<'a> {
    rows: &'a [DetailRow],
    log: String,
}

pub struct App {
    pub config: Config,
    main_loop: MainLoop,
    registry: CommitRegistry,
    source_view: SourceView,
    commit_view: CommitView,
}

impl App {
    /// App running the configured git binary, in `repo` when given.
    pub fn new(config: Config, repo: Option<PathBuf>) -> Self {
        let mut launcher = SystemLauncher::new(config.git.program.clone());
        if let Some(dir) = repo.or_else(|| config.git.work_dir.clone()) {
            launcher = launcher.with_work_dir(dir);
        }
        Self::with_launcher(config, Rc::new(launcher))
    }

    pub fn with_launcher(config: Config, launcher: Rc<dyn Launcher>) -> Self {
        let registry = CommitRegistry::with_chunk_size(Rc::clone(&launcher), config.reader.chunk_size);
        let source_view = SourceView::new(launcher, registry.clone(), config.view.clone())
            .with_chunk_size(config.reader.chunk_size);
        let commit_view = CommitView::new(registry.clone(), config.view.date_format);

        Self {
            main_loop: MainLoop::new(config.reader.poll_interval()),
            registry,
            source_view,
            commit_view,
            config,
        }
    }

    pub fn run(&mut self, cli: &Cli, out: &mut dyn Write) -> Result<()> {
        self.load(&cli.file, &cli.revision)?;

        match cli.commit {
            Some(line) => {
                self.show_commit(line)?;
                self.write_commit(cli.json, out)
            }
            None => self.write_rows(cli.json, out),
        }
    }

    /// Blame `file` and wait until the result is painted.
    pub fn load(&mut self, file: &str, revision: &str) -> Result<()> {
        self.source_view.load(file, revision)?;
        self.main_loop.run(&mut [&mut self.source_view])?;

        if let Some(e) = self.source_view.take_error() {
            return Err(e.into());
        }
        log::info!("{} lines, {} commits", self.source_view.line_count(), self.registry.len());
        Ok(())
    }

    /// Select the commit behind the 1-based `line` and wait for its log.
    pub fn show_commit(&mut self, line: usize) -> Result<()> {
        let commit = self.source_view.commit_at(line).ok_or_else(|| {
            Error::Usage(format!(
                "line {} is out of range, the file has {} lines",
                line,
                self.source_view.line_count()
            ))
        })?;

        self.commit_view.set_commit(Some(commit));
        self.main_loop.run(&mut [&mut self.registry])?;
        Ok(())
    }

    pub fn write_rows(&self, json: bool, out: &mut dyn Write) -> Result<()> {
        let rows = self.source_view.rows();
        if json {
            serde_json::to_writer_pretty(&mut *out, &rows).map_err(std::io::Error::from)?;
            writeln!(out)?;
            return Ok(());
        }

        for row in &rows {
            writeln!(out, "{}", self.source_view.format_row(row))?;
        }
        Ok(())
    }

    pub fn write_commit(&self, json: bool, out: &mut dyn Write) -> Result<()> {
        let rows = self.commit_view.rows();
        let log = self.commit_view.log_text();

        if json {
            let details = CommitDetails { rows: &rows, log };
            serde_json::to_writer_pretty(&mut *out, &details).map_err(std::io::Error::from)?;
            writeln!(out)?;
            return Ok(());
        }

        for row in &rows {
            writeln!(out, "{:<7} {}", format!("{}:", row.label), row.value)?;
        }
        writeln!(out)?;
        for line in log.lines() {
            writeln!(out, "    {}", line)?;
        }
        Ok(())
    }
}
