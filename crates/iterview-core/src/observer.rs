//! Presentation boundary.
//!
//! The core never touches presentation objects directly. It reports status
//! text, progress and per-slot content through a [`SessionObserver`], addressing
//! slots only by unit id. Render targets stay owned by whoever implements it.

use crate::record::ResultRecord;

/// Receives observable updates from a streaming session.
///
/// Callbacks run inline on the read loop, so implementations should return
/// quickly.
pub trait SessionObserver: Send + Sync {
    /// Free-text status line.
    fn status(&self, message: &str);

    /// Overall progress, `100 * rendered / expected`.
    fn progress(&self, percentage: f64);

    /// Slots `1..=count` were (re)created in the waiting state.
    fn slots_initialized(&self, count: u64);

    /// Slot `unit_id` now shows `record`.
    fn slot_rendered(&self, unit_id: u64, record: &ResultRecord);

    /// Slot `unit_id` now shows an error.
    fn slot_errored(&self, unit_id: u64, message: &str);
}

/// Observer that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn status(&self, _message: &str) {}
    fn progress(&self, _percentage: f64) {}
    fn slots_initialized(&self, _count: u64) {}
    fn slot_rendered(&self, _unit_id: u64, _record: &ResultRecord) {}
    fn slot_errored(&self, _unit_id: u64, _message: &str) {}
}
