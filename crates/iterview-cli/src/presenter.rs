//! Terminal rendering of a live session.

use std::io::Write;
use std::sync::Mutex;

use iterview_core::{format_progress, ResultRecord, SessionObserver};

/// Prints status, progress and slot updates as lines on a writer.
///
/// Progress lines are only printed when the rounded percentage changes.
pub struct TerminalPresenter<W: Write + Send> {
    out: Mutex<W>,
    last_progress: Mutex<Option<String>>,
}

impl TerminalPresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            last_progress: Mutex::new(None),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // a closed stdout must not abort the session
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }
}

impl<W: Write + Send> SessionObserver for TerminalPresenter<W> {
    fn status(&self, message: &str) {
        self.line(&format!("status: {message}"));
    }

    fn progress(&self, percentage: f64) {
        let text = format_progress(percentage);
        {
            let mut last = self
                .last_progress
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if last.as_deref() == Some(text.as_str()) {
                return;
            }
            *last = Some(text.clone());
        }
        self.line(&text);
    }

    fn slots_initialized(&self, count: u64) {
        for unit_id in 1..=count {
            self.line(&format!("[{unit_id}] Waiting for results..."));
        }
    }

    fn slot_rendered(&self, unit_id: u64, record: &ResultRecord) {
        self.line(&format!(
            "[{unit_id}] {} ({})",
            printable(&record.description),
            printable(&record.payload_url)
        ));
    }

    fn slot_errored(&self, unit_id: u64, message: &str) {
        self.line(&format!("[{unit_id}] Error: {}", printable(message)));
    }
}

/// Server-supplied text with control characters removed, so escape
/// sequences cannot reach the terminal.
fn printable(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(presenter: TerminalPresenter<Vec<u8>>) -> String {
        String::from_utf8(presenter.into_inner()).unwrap()
    }

    #[test]
    fn test_slots_and_records() {
        let presenter = TerminalPresenter::new(Vec::new());
        presenter.slots_initialized(2);
        presenter.slot_rendered(
            2,
            &ResultRecord {
                unit_id: 2,
                payload_url: "/static/2.png".to_string(),
                description: "a lighthouse".to_string(),
                revised_prompt: None,
                timestamp: None,
            },
        );
        presenter.slot_errored(1, "no image");

        let text = output(presenter);
        assert_eq!(
            text,
            "[1] Waiting for results...\n\
             [2] Waiting for results...\n\
             [2] a lighthouse (/static/2.png)\n\
             [1] Error: no image\n"
        );
    }

    #[test]
    fn test_repeated_progress_is_collapsed() {
        let presenter = TerminalPresenter::new(Vec::new());
        presenter.progress(0.0);
        presenter.progress(33.3);
        presenter.progress(33.4);
        presenter.progress(66.7);

        let text = output(presenter);
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "Processing: 0% complete",
                "Processing: 33% complete",
                "Processing: 67% complete",
            ]
        );
    }

    #[test]
    fn test_control_characters_stripped() {
        let presenter = TerminalPresenter::new(Vec::new());
        presenter.slot_rendered(
            1,
            &ResultRecord {
                unit_id: 1,
                payload_url: "/a.png\x07".to_string(),
                description: "\x1b[2Jred\x1b[0m\r\nfake line".to_string(),
                revised_prompt: None,
                timestamp: None,
            },
        );
        presenter.slot_errored(2, "bad\x1b]0;title\x07");

        let text = output(presenter);
        assert!(!text.contains('\x1b'));
        assert!(!text.contains('\x07'));
        assert_eq!(
            text,
            "[1] [2Jred[0mfake line (/a.png)\n[2] Error: bad]0;title\n"
        );
    }

    #[test]
    fn test_status_prefix() {
        let presenter = TerminalPresenter::new(Vec::new());
        presenter.status("Uploading image and processing...");
        assert_eq!(
            output(presenter),
            "status: Uploading image and processing...\n"
        );
    }
}
