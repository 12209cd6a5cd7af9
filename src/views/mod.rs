mod commit_view;
mod source_view;

pub use commit_view::{CommitView, DetailRow, LOADING_TEXT};
pub use source_view::{Row, SourceView};
