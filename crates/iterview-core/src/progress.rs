//! Progress tracking against the declared unit count.

use std::sync::Arc;

use crate::obs;
use crate::observer::SessionObserver;

/// Counts successful renders and reports the percentage after each one.
pub struct ProgressTracker {
    expected: u64,
    rendered: u64,
    observer: Arc<dyn SessionObserver>,
}

impl ProgressTracker {
    pub fn new(expected: u64, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            expected,
            rendered: 0,
            observer,
        }
    }

    /// Zero the counter and report 0%.
    pub fn reset(&mut self) {
        self.rendered = 0;
        self.observer.progress(0.0);
    }

    /// Count one rendered unit and report the new percentage.
    ///
    /// Delivery beyond the expected count is not capped, only logged.
    pub fn record_success(&mut self) -> f64 {
        self.rendered += 1;
        if self.rendered > self.expected {
            obs::emit_over_delivery(self.rendered, self.expected);
        }
        let percentage = self.percentage();
        self.observer.progress(percentage);
        percentage
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// `100 * rendered / expected`.
    pub fn percentage(&self) -> f64 {
        if self.expected == 0 {
            return 0.0;
        }
        self.rendered as f64 / self.expected as f64 * 100.0
    }

    /// Whether every expected unit has been rendered at least once by count.
    pub fn is_complete(&self) -> bool {
        self.rendered >= self.expected
    }

    /// Progress line for display, rounded to a whole percent.
    pub fn display(&self) -> String {
        format_progress(self.percentage())
    }
}

/// `Processing: P% complete` with `P` rounded to an integer.
pub fn format_progress(percentage: f64) -> String {
    format!("Processing: {:.0}% complete", percentage)
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("expected", &self.expected)
            .field("rendered", &self.rendered)
            .finish_non_exhaustive()
    }
}
