//! Progress tracking for exports
//!
//! Workers report converted rows; the tracker keeps a running total and
//! optionally drives a terminal progress bar with throughput.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Converted-row counter shared by all workers of an export
pub struct ProgressTracker {
    processed: AtomicU64,
    start_time: Instant,
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a tracker.
    ///
    /// # Arguments
    /// * `total` - Expected row count if known
    /// * `enable_bar` - Whether to draw a progress bar on stderr
    pub fn new(total: Option<u64>, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| match total {
            Some(n) => {
                let bar = ProgressBar::with_draw_target(Some(n), ProgressDrawTarget::stderr());
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} rows {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {pos} rows {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        });

        Self {
            processed: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Tracker that only counts.
    pub fn hidden() -> Self {
        Self::new(None, false)
    }

    /// Record `rows` more converted rows.
    pub fn add(&self, rows: u64) {
        let count = self.processed.fetch_add(rows, Ordering::Relaxed) + rows;

        if let Some(ref bar) = self.bar {
            bar.set_position(count);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                bar.set_message(format!("({:.0} rows/sec)", count as f64 / elapsed));
            }
        }
    }

    /// Rows reported so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::hidden()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_accumulates() {
        let tracker = ProgressTracker::new(Some(1000), false);
        tracker.add(400);
        tracker.add(100);
        assert_eq!(tracker.processed(), 500);
        tracker.finish();
    }

    #[test]
    fn test_hidden_tracker_counts() {
        let tracker = ProgressTracker::hidden();
        tracker.add(7);
        assert_eq!(tracker.processed(), 7);
    }
}
