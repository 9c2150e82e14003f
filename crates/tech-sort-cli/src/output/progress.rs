//! Progress bar adapter using indicatif.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use tech_sort_core::{ProgressEvent, ProgressSink, Verdict};

/// Renders defect pass events on stderr.
pub struct ProgressBar {
    bar: IndicatifBar,
}

impl ProgressBar {
    #[must_use]
    pub fn new() -> Self {
        let bar = IndicatifBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBar {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BatchStarted { size, pending } => {
                self.bar.reset();
                self.bar.set_length(size as u64);
                self.bar.set_message(format!("{pending} pending"));
            }
            ProgressEvent::Started { file_name, .. } => {
                self.bar.set_message(file_name);
            }
            ProgressEvent::Completed { verdict, .. } => {
                if let Verdict::Rejected(reason) = verdict {
                    self.bar.println(format!("rejected: {reason}"));
                }
                self.bar.inc(1);
            }
            ProgressEvent::Skipped { photo_id, reason } => {
                self.bar.println(format!("photo {photo_id} skipped: {reason:?}"));
            }
            ProgressEvent::Failed { photo_id, error } => {
                self.bar.println(format!("photo {photo_id} failed: {error}"));
                self.bar.inc(1);
            }
            ProgressEvent::Finished {
                processed,
                rejected,
                remaining,
            } => {
                self.bar.finish_with_message(format!(
                    "Done: {processed} processed, {rejected} rejected, {remaining} remaining"
                ));
            }
        }
    }
}
