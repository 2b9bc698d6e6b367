//! Utility modules for kubectl-nuke

pub mod errors;
pub mod logger;
pub mod progress;
pub mod prompt;

// Re-export commonly used items
pub use errors::{NukeError, display_error_and_exit, enhance_error};
pub use logger::{log_error, log_info, log_warn};
pub use progress::WaitProgress;
pub use prompt::confirm;
