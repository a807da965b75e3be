pub mod client;
pub mod error;

pub use client::{Credentials, Portal, RetryPolicy, UdemyClient};
pub use error::{ApiError, IsRetryable};
