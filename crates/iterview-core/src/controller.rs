//! Stream controller: owns the read loop of a session.
//!
//! ```text
//! Idle -> Uploading -> Streaming -> Completed
//!             |            |-----> PartiallyCompleted
//!             `------------`-----> Failed
//! ```
//!
//! Each submission gets a fresh [`StreamSession`]. The controller reads one
//! chunk at a time, decodes it, extracts complete messages and applies their
//! records to slots in extraction order. Transport and parse errors end the
//! session as `Failed`; everything else is logged and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::decoder::ChunkDecoder;
use crate::error::{Result, StreamError};
use crate::extractor::{Extraction, RecordExtractor};
use crate::obs;
use crate::observer::SessionObserver;
use crate::session::{SessionOutcome, SessionPhase, SessionReport, StreamSession};
use crate::slots::RenderOutcome;
use crate::submission::Submission;
use crate::transport::{ChunkSource, Transport};

/// Drives submissions through a [`Transport`] and renders their streams.
///
/// `submit` takes `&mut self`, so a controller can only have one submission
/// in flight; starting the next one replaces the previous session.
pub struct StreamController<T: Transport> {
    transport: T,
    config: ClientConfig,
    observer: Arc<dyn SessionObserver>,
    session: Option<StreamSession>,
}

impl<T: Transport> StreamController<T> {
    pub fn new(transport: T, config: ClientConfig, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            transport,
            config,
            observer,
            session: None,
        }
    }

    /// Run one submission to a terminal phase.
    ///
    /// Never returns an error: every failure is folded into the report's
    /// outcome and the session's status line.
    pub async fn submit(&mut self, submission: &Submission) -> SessionReport {
        // dropping the previous session clears all of its slots
        let session = self.session.insert(StreamSession::new(
            submission.iterations(),
            self.observer.clone(),
        ));
        let span = obs::session_span(&session.id().to_string());

        run_session(&self.transport, &self.config, session, submission)
            .instrument(span)
            .await
    }

    /// The most recent session, if any.
    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

async fn run_session<T: Transport>(
    transport: &T,
    config: &ClientConfig,
    session: &mut StreamSession,
    submission: &Submission,
) -> SessionReport {
    obs::emit_session_started(&session.id().to_string(), session.expected().get());

    let outcome = match drive(transport, config, session, submission).await {
        Ok(outcome) => outcome,
        Err(err) => fail(session, err),
    };

    let report = session.report(outcome);
    obs::emit_session_finished(
        outcome.phase().as_str(),
        report.rendered,
        report.expected,
        report.duration_ms,
    );
    report
}

async fn drive<T: Transport>(
    transport: &T,
    config: &ClientConfig,
    session: &mut StreamSession,
    submission: &Submission,
) -> Result<SessionOutcome> {
    session.begin()?;

    let response = transport.submit(submission).await?;
    obs::emit_response_received(response.status);
    if !response.is_success() {
        return Err(StreamError::HttpStatus {
            status: response.status,
        });
    }
    session.transition(SessionPhase::Streaming)?;

    let mut body = response.body;
    let mut decoder = ChunkDecoder::new();
    let mut extractor = RecordExtractor::new(config.max_fragment_bytes);
    let mut seq = 0u64;

    while let Some(chunk) = read_chunk(body.as_mut(), config.idle_timeout()).await? {
        seq += 1;
        obs::emit_chunk_received(seq, chunk.len());

        let text = decoder.decode(&chunk);
        let mut extractions = Vec::new();
        let pushed = extractor.push_into(&text, &mut extractions);
        // records completed ahead of a fatal error still render
        for extraction in extractions {
            apply(session, extraction);
        }
        pushed?;
    }

    if let Err(err) = decoder.finish() {
        obs::emit_decoder_flush_error(&err);
    }
    extractor.finish()?;

    finalize(session)
}

/// Wait for the next chunk, bounded by the idle timeout when one is set.
async fn read_chunk(
    body: &mut dyn ChunkSource,
    idle_timeout: Option<Duration>,
) -> Result<Option<Bytes>> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, body.next_chunk())
            .await
            .map_err(|_| StreamError::IdleTimeout {
                secs: limit.as_secs(),
            })?,
        None => body.next_chunk().await,
    }
}

/// Apply one message's records, in array order.
fn apply(session: &mut StreamSession, extraction: Extraction) {
    for (index, rejection) in &extraction.rejected {
        obs::emit_record_rejected(*index, rejection);
    }

    for record in extraction.accepted {
        let unit_id = record.unit_id;
        let outcome = session.slots_mut().render(unit_id, record);
        if outcome == RenderOutcome::Replaced {
            obs::emit_duplicate_unit(unit_id);
        }
        if outcome.is_applied() {
            session.progress_mut().record_success();
            obs::emit_record_rendered(
                unit_id,
                session.progress().rendered(),
                session.expected().get(),
            );
        }
    }
}

/// End of stream: decide between full and partial completion.
fn finalize(session: &mut StreamSession) -> Result<SessionOutcome> {
    let rendered = session.progress().rendered();
    let expected = session.expected().get();

    if session.progress().is_complete() {
        session.transition(SessionPhase::Completed)?;
        session.set_status("All iterations processed successfully.");
        Ok(SessionOutcome::Completed)
    } else {
        session.transition(SessionPhase::PartiallyCompleted)?;
        session.set_status(&format!(
            "Only {rendered} of {expected} iterations completed. Check results."
        ));
        Ok(SessionOutcome::PartiallyCompleted { rendered, expected })
    }
}

fn fail(session: &mut StreamSession, err: StreamError) -> SessionOutcome {
    obs::emit_session_failed(&err);
    if let Err(transition) = session.transition(SessionPhase::Failed) {
        obs::emit_session_failed(&transition);
    }
    session.set_status(&err.status_message());
    SessionOutcome::Failed {
        kind: err.failure_kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::fakes::{BodyEvent, FailingTransport, RecordingObserver, ScriptedTransport};
    use tracing_test::traced_test;

    fn submission(iterations: u64) -> Submission {
        Submission::new("input.png", vec![0x89u8, b'P', b'N', b'G'], iterations).unwrap()
    }

    fn record_json(unit_id: u64) -> String {
        format!(
            r#"{{"results":[{{"iteration":{unit_id},"image_url":"/img/{unit_id}.png","description":"d{unit_id}"}}]}}"#
        )
    }

    fn controller<T: Transport>(transport: T) -> (StreamController<T>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let config = ClientConfig::new("http://test.invalid").with_idle_timeout_secs(0);
        (
            StreamController::new(transport, config, observer.clone()),
            observer,
        )
    }

    #[traced_test]
    #[tokio::test]
    async fn test_duplicate_record_counts_toward_progress() {
        let one = record_json(1);
        let (mut controller, observer) =
            controller(ScriptedTransport::from_texts(&[&one, &one]));

        let report = controller.submit(&submission(2)).await;

        // every applied render counts, duplicates included
        assert_eq!(report.rendered, 2);
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(observer.rendered_units(), vec![1, 1]);
        assert_eq!(observer.progress_values(), vec![0.0, 50.0, 100.0]);
        assert!(controller.session().unwrap().slots().get(2).unwrap().is_waiting());
        assert!(logs_contain("stream.duplicate_unit"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_over_delivery_is_logged_not_capped() {
        let one = record_json(1);
        let (mut controller, observer) =
            controller(ScriptedTransport::from_texts(&[&one, &one]));

        let report = controller.submit(&submission(1)).await;

        assert_eq!(report.rendered, 2);
        assert_eq!(report.percentage, 200.0);
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(observer.progress_values(), vec![0.0, 100.0, 200.0]);
        assert!(logs_contain("stream.over_delivery"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_dangling_byte_at_end_is_logged_not_fatal() {
        let transport = ScriptedTransport::new(vec![
            BodyEvent::text(&record_json(1)),
            BodyEvent::bytes(&[0xE2]),
        ]);
        let (mut controller, _observer) = controller(transport);

        let report = controller.submit(&submission(1)).await;

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert!(logs_contain("stream.decoder_flush_error"));
    }

    #[tokio::test]
    async fn test_record_before_garbage_in_same_chunk_renders() {
        let chunk = format!("{}\n{{oops", record_json(1));
        let (mut controller, observer) = controller(ScriptedTransport::from_texts(&[chunk]));

        let report = controller.submit(&submission(2)).await;

        assert_eq!(
            report.outcome,
            SessionOutcome::Failed {
                kind: FailureKind::StreamProcessing
            }
        );
        assert_eq!(observer.rendered_units(), vec![1]);
        assert!(controller.session().unwrap().slots().get(1).unwrap().is_rendered());
    }

    #[tokio::test]
    async fn test_unknown_unit_keeps_streaming() {
        let (mut controller, observer) = controller(ScriptedTransport::from_texts(&[
            &record_json(9),
            &record_json(1),
        ]));

        let report = controller.submit(&submission(1)).await;

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert!(observer
            .statuses()
            .contains(&"Could not display results for iteration 9.".to_string()));
        assert_eq!(
            observer.last_status().as_deref(),
            Some("All iterations processed successfully.")
        );
    }

    #[tokio::test]
    async fn test_transport_read_failure_is_generic_error() {
        let transport = ScriptedTransport::new(vec![
            BodyEvent::text(&record_json(1)),
            BodyEvent::Fail("connection reset".to_string()),
        ]);
        let (mut controller, _observer) = controller(transport);

        let report = controller.submit(&submission(2)).await;

        assert_eq!(
            report.outcome,
            SessionOutcome::Failed {
                kind: FailureKind::Transport
            }
        );
        assert_eq!(report.status, "An error occurred. Please try again.");
        let session = controller.session().unwrap();
        assert!(session.slots().get(1).unwrap().is_rendered());
        assert_eq!(session.phase(), SessionPhase::Failed);
    }

    #[tokio::test]
    async fn test_submit_failure_never_streams() {
        let (mut controller, observer) = controller(FailingTransport);
        let report = controller.submit(&submission(3)).await;

        assert_eq!(
            report.outcome,
            SessionOutcome::Failed {
                kind: FailureKind::Transport
            }
        );
        assert!(observer.rendered_units().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_fails_session() {
        let transport = ScriptedTransport::new(vec![
            BodyEvent::text(&record_json(1)),
            BodyEvent::Stall,
        ]);
        let observer = Arc::new(RecordingObserver::new());
        let config = ClientConfig::new("http://test.invalid").with_idle_timeout_secs(5);
        let mut controller = StreamController::new(transport, config, observer);

        let report = controller.submit(&submission(2)).await;

        assert_eq!(
            report.outcome,
            SessionOutcome::Failed {
                kind: FailureKind::Transport
            }
        );
        assert_eq!(report.rendered, 1);
    }

    #[tokio::test]
    async fn test_unterminated_message_at_end_fails() {
        let (mut controller, _observer) =
            controller(ScriptedTransport::from_texts(&[r#"{"results":[{"iteration":1"#]));

        let report = controller.submit(&submission(1)).await;

        assert_eq!(
            report.outcome,
            SessionOutcome::Failed {
                kind: FailureKind::StreamProcessing
            }
        );
        assert_eq!(
            report.status,
            "An error occurred during stream processing. Please check the results."
        );
    }

    #[tokio::test]
    async fn test_new_submission_replaces_session() {
        let (mut controller, _observer) =
            controller(ScriptedTransport::from_texts(&[&record_json(1)]));

        let first = controller.submit(&submission(1)).await;
        let second = controller.submit(&submission(3)).await;

        assert_ne!(first.session_id, second.session_id);
        let session = controller.session().unwrap();
        assert_eq!(session.id(), second.session_id);
        assert_eq!(session.slots().len(), 3);
        assert_eq!(controller.transport().submissions(), 2);
    }
}
