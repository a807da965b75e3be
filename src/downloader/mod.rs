pub mod assets;
pub mod captions;
pub mod commands;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod process;
pub mod progress;

pub use error::DownloadError;
pub use manager::{LectureSelector, PipelineManager, RunSummary, SelectAll, Selection};
pub use process::{ProcessRegistry, ProcessRunner, ToolRunner};
