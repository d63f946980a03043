use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::ui::renderer::SpinnerHandle;

const TICK: Duration = Duration::from_millis(80);

#[derive(Debug, Default)]
pub struct NoopSpinnerHandle;

impl SpinnerHandle for NoopSpinnerHandle {
    fn set_message(&self, _message: &str) {}

    fn finish_success(&self, _message: &str) {}

    fn finish_error(&self, _message: &str) {}
}

/// One spinner line inside a shared [`MultiProgress`], so concurrent phases do not
/// overwrite each other.
#[derive(Debug, Clone)]
pub struct IndicatifSpinnerHandle {
    progress: ProgressBar,
}

impl IndicatifSpinnerHandle {
    pub fn attach(multi: &MultiProgress, label: &str) -> Self {
        let progress = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {elapsed:.dim}") {
            progress.set_style(style);
        }
        progress.set_message(label.to_owned());
        progress.enable_steady_tick(TICK);
        Self { progress }
    }
}

impl SpinnerHandle for IndicatifSpinnerHandle {
    fn set_message(&self, message: &str) {
        self.progress.set_message(message.to_owned());
    }

    fn finish_success(&self, message: &str) {
        self.progress.finish_with_message(format!("✓ {message}"));
    }

    fn finish_error(&self, message: &str) {
        self.progress.abandon_with_message(format!("✕ {message}"));
    }
}
