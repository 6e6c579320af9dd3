//! Progress indicators for long-running waits

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} ({elapsed})")
    {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Spinner shown while a condition or sampling wait is running
pub struct WaitProgress {
    pb: ProgressBar,
    resource: String,
}

impl WaitProgress {
    pub fn new(resource: &str, condition: &str) -> Self {
        let message = format!("Waiting for {} to be {}", resource, condition);
        Self {
            pb: create_spinner(&message),
            resource: resource.to_string(),
        }
    }

    pub fn finish_success(&self) {
        self.pb.finish_with_message(format!("✓ {} ready", self.resource));
    }

    pub fn finish_error(&self, error: &str) {
        self.pb
            .finish_with_message(format!("✗ {} failed: {}", self.resource, error));
    }
}

/// Run a future with a wait spinner and report the outcome on it
pub async fn with_wait_progress<F, T, E>(resource: &str, condition: &str, fut: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let progress = WaitProgress::new(resource, condition);
    match fut.await {
        Ok(value) => {
            progress.finish_success();
            Ok(value)
        }
        Err(e) => {
            progress.finish_error(&e.to_string());
            Err(e)
        }
    }
}
