pub mod client;
pub mod constants;
pub mod logger;
pub mod utils;
