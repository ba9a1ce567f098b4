//! Streaming session state.
//!
//! A [`StreamSession`] lives for exactly one submission. It owns the slot
//! registry and the progress tracker, tracks the lifecycle phase, and keeps
//! the last status line. Starting a new submission builds a fresh session, so
//! nothing from the previous one survives.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FailureKind, Result, StreamError};
use crate::observer::SessionObserver;
use crate::progress::ProgressTracker;
use crate::slots::SlotRegistry;

/// Largest unit count a session accepts.
pub const MAX_EXPECTED_UNITS: u64 = 10_000;

/// Declared number of units for one submission, `1..=MAX_EXPECTED_UNITS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ExpectedUnits(u64);

impl ExpectedUnits {
    pub fn new(count: u64) -> Result<Self> {
        if count == 0 {
            return Err(StreamError::InvalidSubmission(
                "iteration count must be at least 1".to_string(),
            ));
        }
        if count > MAX_EXPECTED_UNITS {
            return Err(StreamError::InvalidSubmission(format!(
                "iteration count {count} exceeds the maximum of {MAX_EXPECTED_UNITS}"
            )));
        }
        Ok(ExpectedUnits(count))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ExpectedUnits {
    type Error = StreamError;

    fn try_from(count: u64) -> Result<Self> {
        ExpectedUnits::new(count)
    }
}

impl From<ExpectedUnits> for u64 {
    fn from(units: ExpectedUnits) -> u64 {
        units.0
    }
}

impl std::fmt::Display for ExpectedUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Uploading,
    Streaming,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::PartiallyCompleted | SessionPhase::Failed
        )
    }

    /// Allowed phase changes within one session.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Uploading, Streaming)
                | (Uploading, Failed)
                | (Streaming, Completed)
                | (Streaming, PartiallyCompleted)
                | (Streaming, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Uploading => "uploading",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Completed => "completed",
            SessionPhase::PartiallyCompleted => "partially_completed",
            SessionPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    PartiallyCompleted { rendered: u64, expected: u64 },
    Failed { kind: FailureKind },
}

impl SessionOutcome {
    pub fn phase(self) -> SessionPhase {
        match self {
            SessionOutcome::Completed => SessionPhase::Completed,
            SessionOutcome::PartiallyCompleted { .. } => SessionPhase::PartiallyCompleted,
            SessionOutcome::Failed { .. } => SessionPhase::Failed,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, SessionOutcome::Completed)
    }
}

/// State of one submission's streaming interaction.
pub struct StreamSession {
    id: Uuid,
    expected: ExpectedUnits,
    phase: SessionPhase,
    status: String,
    slots: SlotRegistry,
    progress: ProgressTracker,
    observer: Arc<dyn SessionObserver>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl StreamSession {
    /// Create an idle session. Slots are allocated by [`StreamSession::begin`].
    pub fn new(expected: ExpectedUnits, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            expected,
            phase: SessionPhase::Idle,
            status: String::new(),
            slots: SlotRegistry::new(observer.clone()),
            progress: ProgressTracker::new(expected.get(), observer.clone()),
            observer,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// `Idle -> Uploading`: allocate slots, zero progress, announce the upload.
    pub fn begin(&mut self) -> Result<()> {
        self.transition(SessionPhase::Uploading)?;
        self.slots.initialize(self.expected.get());
        self.progress.reset();
        self.set_status("Uploading image and processing...");
        Ok(())
    }

    /// Move to `next`, rejecting changes the state machine does not allow.
    pub fn transition(&mut self, next: SessionPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(StreamError::InvalidTransition {
                current: self.phase.to_string(),
                requested: next.to_string(),
            });
        }
        self.phase = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record and publish a status line.
    pub fn set_status(&mut self, message: &str) {
        self.status = message.to_string();
        self.observer.status(message);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn expected(&self) -> ExpectedUnits {
        self.expected
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn slots(&self) -> &SlotRegistry {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut SlotRegistry {
        &mut self.slots
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut ProgressTracker {
        &mut self.progress
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Summary of the session; meaningful once it is terminal.
    pub fn report(&self, outcome: SessionOutcome) -> SessionReport {
        let finished_at = self.finished_at.unwrap_or_else(Utc::now);
        let duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        SessionReport {
            session_id: self.id,
            outcome,
            expected: self.expected.get(),
            rendered: self.progress.rendered(),
            percentage: self.progress.percentage(),
            status: self.status.clone(),
            started_at: self.started_at,
            finished_at,
            duration_ms,
        }
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("expected", &self.expected)
            .field("phase", &self.phase)
            .field("status", &self.status)
            .field("slots", &self.slots)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

/// Serializable summary of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub expected: u64,
    pub rendered: u64,
    pub percentage: f64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}
