mod annotated_source;
mod blame;
mod commit;
mod raw_log;
mod registry;

pub use annotated_source::{AnnotatedSource, AnnotatedSourceLine, CompletedCallback, LoadState};
pub use blame::{blame_args, BlameParser};
pub use commit::{relative_time, Commit, CommitInfo, HandlerId, LogData, LogState, Rgb};
pub use raw_log::{log_args, parse_raw_log};
pub use registry::CommitRegistry;
