//! Progress indicators for long-running operations

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Progress wrapper for polling waits
///
/// Falls back to plain progress lines when spinners are disabled.
pub struct WaitProgress {
    pb: Option<ProgressBar>,
    resource: String,
}

impl WaitProgress {
    pub fn new(resource: &str, condition: &str, spinner: bool) -> Self {
        let message = format!("Waiting for {} to be {}", resource, condition);
        let pb = if spinner {
            Some(create_spinner(&message))
        } else {
            println!("⏳ {}...", message);
            None
        };
        Self {
            pb,
            resource: resource.to_string(),
        }
    }

    pub fn update(&self, attempt: u32, max: u32) {
        let status = format!("{}: still present ({}/{})", self.resource, attempt, max);
        match &self.pb {
            Some(pb) => pb.set_message(status),
            // every fifth poll, to keep plain output readable
            None if attempt % 5 == 0 => println!("⏳ {}", status),
            None => {}
        }
    }

    pub fn finish_success(&self, message: &str) {
        match &self.pb {
            Some(pb) => pb.finish_with_message(format!("✓ {}", message)),
            None => println!("✓ {}", message),
        }
    }

    pub fn finish_error(&self, message: &str) {
        match &self.pb {
            Some(pb) => pb.finish_with_message(format!("✗ {}", message)),
            None => println!("✗ {}", message),
        }
    }
}
