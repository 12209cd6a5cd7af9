#[cfg(not(unix))]
compile_error!("blame-browse drives git through unix pipes and only builds on unix");

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod logger;
pub mod process;
pub mod views;

pub use error::{Error, GitError, Result};
