mod launcher;
mod main_loop;
mod reader;
mod system;
#[cfg(test)]
pub mod testing;

pub use launcher::{ChildProcess, ExitStatus, Launcher, PipeStream, ReadStatus, SpawnedChild};
pub use main_loop::{EventSource, MainLoop, DEFAULT_POLL_INTERVAL};
pub use reader::{ProcessReader, ReaderSink, ReaderState, DEFAULT_CHUNK_SIZE};
pub use system::SystemLauncher;
