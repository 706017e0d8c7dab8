use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

/// Single stderr progress bar shared by every scan worker. All mutations go
/// through one mutex, and site summaries print through the bar so they never
/// interleave with redraws.
pub struct ProgressManager {
    bar: Mutex<ProgressBar>,
}

impl ProgressManager {
    pub fn new(total: u64, description: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template("⏳ {msg} [{bar:30}] {pos}/{len} ({per_sec})")
                .unwrap()
                .progress_chars("▓▒░"),
        );
        bar.set_message(description.to_string());
        Self {
            bar: Mutex::new(bar),
        }
    }

    pub fn increment(&self) {
        self.bar.lock().unwrap().inc(1);
    }

    pub fn set_total(&self, total: u64) {
        self.bar.lock().unwrap().set_length(total);
    }

    /// Prints above the bar without disturbing it.
    pub fn println(&self, text: &str) {
        self.bar.lock().unwrap().println(text);
    }

    pub fn finish(&self) {
        self.bar.lock().unwrap().finish_and_clear();
    }
}
