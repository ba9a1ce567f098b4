//! iterview core: progressive consumption of streamed iteration results
//!
//! Submits an image job and renders each iteration as soon as its result
//! arrives in the chunked response body:
//! - `ChunkDecoder`: byte chunks to text, keeping split characters intact
//! - `RecordExtractor`: text to validated `ResultRecord`s, across chunk cuts
//! - `SlotRegistry`: one pre-allocated slot per expected iteration
//! - `ProgressTracker`: rendered vs expected, as a percentage
//! - `StreamController`: the read loop and the session state machine
//!
//! Presentation is injected through `SessionObserver`; transports through
//! `Transport`/`ChunkSource`.

pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod fakes;
pub mod markup;
pub mod obs;
pub mod observer;
pub mod progress;
pub mod record;
pub mod session;
pub mod slots;
pub mod submission;
pub mod telemetry;
pub mod transport;

pub use config::ClientConfig;
pub use controller::StreamController;
pub use decoder::ChunkDecoder;
pub use error::{FailureKind, Result, StreamError};
pub use extractor::{Extraction, RecordExtractor};
pub use observer::{NullObserver, SessionObserver};
pub use progress::{format_progress, ProgressTracker};
pub use record::{validate, RecordRejection, ResultRecord};
pub use session::{
    ExpectedUnits, SessionOutcome, SessionPhase, SessionReport, StreamSession, MAX_EXPECTED_UNITS,
};
pub use slots::{RenderOutcome, Slot, SlotRegistry, SlotState};
pub use submission::{allowed_file, Submission, ALLOWED_EXTENSIONS};
pub use telemetry::init_tracing;
pub use transport::{
    ChunkSource, HttpTransport, ReplayTransport, StreamChunkSource, SubmitResponse, Transport,
};

pub use obs::{
    emit_chunk_received, emit_decoder_flush_error, emit_duplicate_unit, emit_over_delivery,
    emit_record_rejected, emit_record_rendered, emit_response_received, emit_session_failed,
    emit_session_finished, emit_session_started, emit_unknown_unit, session_span, SessionSpan,
};

/// iterview core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
