//! In-memory fakes for the transport and presentation seams (testing only)
//!
//! Provides `ScriptedTransport`, which plays back a fixed list of body events,
//! and `RecordingObserver`, which keeps every observation for later assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StreamError};
use crate::observer::SessionObserver;
use crate::record::ResultRecord;
use crate::submission::Submission;
use crate::transport::{ChunkSource, SubmitResponse, Transport};

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// One update received by a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Status(String),
    Progress(f64),
    SlotsInitialized(u64),
    SlotRendered(u64, ResultRecord),
    SlotErrored(u64, String),
}

/// Observer that records everything it is told, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    observations: Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.observations()
            .into_iter()
            .filter_map(|o| match o {
                Observation::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn progress_values(&self) -> Vec<f64> {
        self.observations()
            .into_iter()
            .filter_map(|o| match o {
                Observation::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn rendered_units(&self) -> Vec<u64> {
        self.observations()
            .into_iter()
            .filter_map(|o| match o {
                Observation::SlotRendered(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses().pop()
    }

    fn push(&self, observation: Observation) {
        self.observations.lock().unwrap().push(observation);
    }
}

impl SessionObserver for RecordingObserver {
    fn status(&self, message: &str) {
        self.push(Observation::Status(message.to_string()));
    }

    fn progress(&self, percentage: f64) {
        self.push(Observation::Progress(percentage));
    }

    fn slots_initialized(&self, count: u64) {
        self.push(Observation::SlotsInitialized(count));
    }

    fn slot_rendered(&self, unit_id: u64, record: &ResultRecord) {
        self.push(Observation::SlotRendered(unit_id, record.clone()));
    }

    fn slot_errored(&self, unit_id: u64, message: &str) {
        self.push(Observation::SlotErrored(unit_id, message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// One step of a scripted response body.
#[derive(Debug, Clone)]
pub enum BodyEvent {
    /// Deliver these bytes as one chunk.
    Chunk(Bytes),
    /// Fail the read with a transport error.
    Fail(String),
    /// Never deliver anything (exercises idle timeouts).
    Stall,
}

impl BodyEvent {
    pub fn text(text: &str) -> Self {
        BodyEvent::Chunk(Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        BodyEvent::Chunk(Bytes::copy_from_slice(bytes))
    }
}

/// Transport that answers every submission with a fixed status and body.
///
/// `reads()` counts body reads across all submissions, including the read
/// that reports end of stream.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    status: u16,
    events: Vec<BodyEvent>,
    submissions: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(events: Vec<BodyEvent>) -> Self {
        Self {
            status: 200,
            events,
            submissions: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Body made of one text chunk per element.
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::new(texts.iter().map(|t| BodyEvent::text(t.as_ref())).collect())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(&self, _submission: &Submission) -> Result<SubmitResponse> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitResponse {
            status: self.status,
            body: Box::new(ScriptedBody {
                events: self.events.iter().cloned().collect(),
                reads: self.reads.clone(),
            }),
        })
    }
}

struct ScriptedBody {
    events: VecDeque<BodyEvent>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl ChunkSource for ScriptedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.events.pop_front() {
            None => Ok(None),
            Some(BodyEvent::Chunk(bytes)) => Ok(Some(bytes)),
            Some(BodyEvent::Fail(message)) => Err(StreamError::Transport(message)),
            Some(BodyEvent::Stall) => futures::future::pending().await,
        }
    }
}

/// Transport whose submission itself fails (connection refused and the like).
#[derive(Debug, Clone, Default)]
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn submit(&self, _submission: &Submission) -> Result<SubmitResponse> {
        Err(StreamError::Transport("connection refused".to_string()))
    }
}
