//! CLI-specific progress handling for butterfly-tags
//!
//! Catalogue loads and Overpass requests have no known size, so progress is
//! shown as a spinner on stderr.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Creates a spinner for CLI display
pub fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("Failed to create progress style"),
    );
    pb
}

/// Spinner shown while the CLI waits on I/O
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Start a ticking spinner with `message`, or a hidden one when `quiet`
    pub fn new(message: &str, quiet: bool) -> Self {
        let pb = if quiet { ProgressBar::hidden() } else { create_spinner() };
        pb.set_message(message.to_string());
        if !quiet {
            pb.enable_steady_tick(Duration::from_millis(120));
        }
        Self { pb }
    }

    pub fn set_message(&self, message: &str) {
        self.pb.set_message(message.to_string());
    }

    /// Stop the spinner leaving `message` on screen
    pub fn finish(&self, message: &str) {
        self.pb.finish_with_message(message.to_string());
    }

    /// Stop the spinner and erase it
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_spinner_template() {
        let pb = create_spinner();

        // Spinners have no length
        assert_eq!(pb.length(), None);

        pb.set_message("Loading catalogue");
        pb.tick();
        pb.finish();
    }

    #[test]
    fn test_progress_manager_messages() {
        let manager = ProgressManager::new("📚 Loading", true);
        assert!(manager.pb.is_hidden());
        assert_eq!(manager.pb.message(), "📚 Loading");

        manager.set_message("🔍 Searching");
        assert_eq!(manager.pb.message(), "🔍 Searching");

        manager.finish("✅ Done");
        assert!(manager.pb.is_finished());
    }
}
