//! CLI command handlers, one per file.

mod get;
mod status;

pub use get::run_get;
pub use status::run_status;
