pub mod api_models;
pub mod course;
pub mod curriculum;
pub mod dash;
pub mod errors;
pub mod extractor;
pub mod hls;
pub mod models;
pub mod quiz;
pub mod range;
pub mod saved;
pub mod stream_selector;

pub use errors::ParseError;
pub use models::{Course, Lecture, LectureEntry, Source};
