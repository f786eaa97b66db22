// src/progress.rs
//! Progress bar over the log index range of a run

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar wrapper; a disabled indicator ignores every call
pub struct CrawlProgress {
    bar: Option<ProgressBar>,
}

impl CrawlProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            bar: enabled.then(ProgressBar::hidden),
        }
    }

    pub fn disabled() -> Self {
        Self { bar: None }
    }

    /// Size the bar to `[start, tree_size)` and make it visible
    pub fn begin(&self, start: u64, tree_size: u64) {
        if let Some(ref bar) = self.bar {
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            bar.set_length(tree_size);
            bar.set_position(start);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec}) {msg}")
            {
                bar.set_style(style.progress_chars("=>-"));
            }
        }
    }

    pub fn set_position(&self, index: u64) {
        if let Some(ref bar) = self.bar {
            bar.set_position(index);
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        if let Some(ref bar) = self.bar {
            bar.set_message(msg.into());
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }
}

impl Drop for CrawlProgress {
    fn drop(&mut self) {
        self.finish();
    }
}
