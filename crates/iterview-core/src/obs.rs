//! Structured observability hooks for the streaming session lifecycle.
//!
//! This module provides:
//! - Session-scoped tracing spans via `SessionSpan` RAII guard
//! - Emission functions for key events: start, response, chunk, record, finish
//!
//! Lifecycle events are emitted at `info!`, per-chunk events at `debug!`, and
//! protocol anomalies at `warn!`. Filter with `RUST_LOG`.

use tracing::{debug, info, warn};

/// RAII guard that enters a session-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter("6f1c...");
/// // every event below carries session_id = "6f1c..."
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    /// Create and enter a span tagged with the session id.
    pub fn enter(session_id: &str) -> Self {
        Self {
            _span: session_span(session_id).entered(),
        }
    }
}

/// Session-scoped span for instrumenting async work.
///
/// Entered guards must not be held across `.await`; attach this with
/// `tracing::Instrument` instead.
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("iterview.session", session_id = %session_id)
}

/// Emit event: session started with its expected unit count.
pub fn emit_session_started(session_id: &str, expected: u64) {
    info!(event = "session.started", session_id = %session_id, expected = expected);
}

/// Emit event: submission response headers received.
pub fn emit_response_received(status: u16) {
    info!(event = "session.response", status = status);
}

/// Emit event: one body chunk read.
pub fn emit_chunk_received(seq: u64, len: usize) {
    debug!(event = "stream.chunk", seq = seq, len = len);
}

/// Emit event: a record was rendered into its slot.
pub fn emit_record_rendered(unit_id: u64, rendered: u64, expected: u64) {
    debug!(
        event = "stream.record_rendered",
        unit_id = unit_id,
        rendered = rendered,
        expected = expected,
    );
}

/// Emit event: a record failed validation and was dropped.
pub fn emit_record_rejected(index: usize, reason: &dyn std::fmt::Display) {
    warn!(event = "stream.record_rejected", index = index, reason = %reason);
}

/// Emit event: a record named a unit id with no slot.
pub fn emit_unknown_unit(unit_id: u64, expected: u64) {
    warn!(event = "stream.unknown_unit", unit_id = unit_id, expected = expected);
}

/// Emit event: a record arrived for a unit that was already rendered.
pub fn emit_duplicate_unit(unit_id: u64) {
    warn!(event = "stream.duplicate_unit", unit_id = unit_id);
}

/// Emit event: more successful renders than expected units.
pub fn emit_over_delivery(rendered: u64, expected: u64) {
    warn!(event = "stream.over_delivery", rendered = rendered, expected = expected);
}

/// Emit event: decoder flush at end of stream failed (not fatal).
pub fn emit_decoder_flush_error(error: &dyn std::fmt::Display) {
    warn!(event = "stream.decoder_flush_error", error = %error);
}

/// Emit event: session failed (warning level).
pub fn emit_session_failed(error: &dyn std::fmt::Display) {
    warn!(event = "session.failed", error = %error);
}

/// Emit event: session reached a terminal phase.
pub fn emit_session_finished(outcome: &str, rendered: u64, expected: u64, duration_ms: u64) {
    info!(
        event = "session.finished",
        outcome = %outcome,
        rendered = rendered,
        expected = expected,
        duration_ms = duration_ms,
    );
}
