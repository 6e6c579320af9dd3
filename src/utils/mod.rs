//! Utility modules for ztp-e2e

pub mod errors;
pub mod logger;
pub mod prereqs;
pub mod progress;

// Re-export commonly used items
pub use errors::{E2eError, display_error_and_exit, enhance_error};
pub use logger::{log_error, log_info, log_warn};
pub use prereqs::{CommonPrereqs, Prerequisite};
