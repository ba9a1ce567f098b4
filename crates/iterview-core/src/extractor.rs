//! Record extraction from decoded stream text.
//!
//! Messages have the shape `{ "results": [ {...}, ... ] }`. Text is buffered
//! until it forms complete JSON values, so a message split across chunks is
//! extracted once its last piece arrives, and several messages in one chunk
//! are all extracted in order. A genuine syntax error is fatal for the stream:
//! once the framing is broken nothing after it can be trusted.
//!
//! The buffer is scanned once, byte by byte, tracking nesting depth and string
//! state across pushes. `serde_json` only runs on a value once its closing
//! brace arrives, plus a syntax check of the open value each time it doubles
//! in size so garbage is caught before the value closes.

use serde_json::{Deserializer, Value};

use crate::error::{Result, StreamError};
use crate::record::{validate, RecordRejection, ResultRecord};

/// Records pulled out of one complete message.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extraction {
    /// Valid records, in array order.
    pub accepted: Vec<ResultRecord>,
    /// Dropped records with their array index.
    pub rejected: Vec<(usize, RecordRejection)>,
}

/// Scanner position inside `RecordExtractor::buffer`.
#[derive(Debug, Default, Clone, Copy)]
struct Scan {
    /// Next byte to look at.
    pos: usize,
    /// Start of the open top-level value.
    start: Option<usize>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Size of the open value at its last syntax check.
    checked_len: usize,
}

/// Buffering extractor for one stream.
#[derive(Debug)]
pub struct RecordExtractor {
    buffer: String,
    scan: Scan,
    max_fragment_bytes: usize,
}

impl RecordExtractor {
    pub fn new(max_fragment_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            scan: Scan::default(),
            max_fragment_bytes,
        }
    }

    /// Feed decoded text and return every message it completes.
    ///
    /// On error, messages completed earlier in the same text are lost; use
    /// [`RecordExtractor::push_into`] to keep them.
    pub fn push(&mut self, text: &str) -> Result<Vec<Extraction>> {
        let mut out = Vec::new();
        self.push_into(text, &mut out)?;
        Ok(out)
    }

    /// Feed decoded text, appending every message it completes to `out`.
    ///
    /// Messages that complete before a fatal error are still appended.
    pub fn push_into(&mut self, text: &str, out: &mut Vec<Extraction>) -> Result<()> {
        self.buffer.push_str(text);
        self.advance(out)?;
        self.compact();
        self.check_open_value()
    }

    /// Bytes held for an incomplete message.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// End of stream: anything still buffered is an unterminated message.
    pub fn finish(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.buffer);
        self.scan = Scan::default();
        if pending.trim().is_empty() {
            Ok(())
        } else {
            Err(StreamError::UnterminatedFragment {
                pending_bytes: pending.len(),
            })
        }
    }

    /// Scan unseen bytes, extracting each top-level value as it closes.
    fn advance(&mut self, out: &mut Vec<Extraction>) -> Result<()> {
        let bytes = self.buffer.as_bytes();
        let scan = &mut self.scan;

        while scan.pos < bytes.len() {
            let byte = bytes[scan.pos];
            let Some(start) = scan.start else {
                match byte {
                    b' ' | b'\t' | b'\n' | b'\r' => scan.pos += 1,
                    b'{' | b'[' => {
                        scan.start = Some(scan.pos);
                        scan.depth = 1;
                        scan.pos += 1;
                    }
                    // a bare scalar is never a message; let the parser say why
                    _ => {
                        let mut values =
                            Deserializer::from_str(&self.buffer[scan.pos..]).into_iter::<Value>();
                        match values.next() {
                            Some(Ok(value)) => {
                                scan.pos += values.byte_offset();
                                out.push(extract_message(&value)?);
                            }
                            Some(Err(err)) if err.is_eof() => return Ok(()),
                            Some(Err(err)) => return Err(malformed(&err)),
                            None => return Ok(()),
                        }
                    }
                }
                continue;
            };

            scan.pos += 1;
            if scan.in_string {
                if scan.escaped {
                    scan.escaped = false;
                } else if byte == b'\\' {
                    scan.escaped = true;
                } else if byte == b'"' {
                    scan.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => scan.in_string = true,
                b'{' | b'[' => scan.depth += 1,
                b'}' | b']' => {
                    scan.depth -= 1;
                    if scan.depth == 0 {
                        let value: Value = serde_json::from_str(&self.buffer[start..scan.pos])
                            .map_err(|err| malformed(&err))?;
                        scan.start = None;
                        scan.checked_len = 0;
                        out.push(extract_message(&value)?);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Drop consumed text so the buffer only holds the open value.
    fn compact(&mut self) {
        let consumed = self.scan.start.unwrap_or(self.scan.pos);
        if consumed == 0 {
            return;
        }
        self.buffer.drain(..consumed);
        self.scan.pos -= consumed;
        if let Some(start) = self.scan.start.as_mut() {
            *start -= consumed;
        }
    }

    /// Enforce the size limit and catch syntax errors in the open value.
    fn check_open_value(&mut self) -> Result<()> {
        let open = self.buffer.len();
        if open > self.max_fragment_bytes {
            return Err(StreamError::FragmentTooLarge {
                size: open,
                limit: self.max_fragment_bytes,
            });
        }
        if self.scan.start.is_none() || open < (self.scan.checked_len * 2).max(1) {
            return Ok(());
        }

        self.scan.checked_len = open;
        match Deserializer::from_str(&self.buffer)
            .into_iter::<Value>()
            .next()
        {
            Some(Err(err)) if !err.is_eof() => Err(malformed(&err)),
            _ => Ok(()),
        }
    }
}

fn malformed(err: &serde_json::Error) -> StreamError {
    StreamError::MalformedFragment {
        line: err.line(),
        column: err.column(),
        message: err.to_string(),
    }
}

/// Split one parsed message into accepted and rejected records.
pub fn extract_message(message: &Value) -> Result<Extraction> {
    let object = message.as_object().ok_or_else(|| {
        StreamError::UnexpectedShape(format!("expected an object, got {}", kind_of(message)))
    })?;

    let results = match object.get("results") {
        None | Some(Value::Null) => return Ok(Extraction::default()),
        Some(Value::Array(results)) => results,
        Some(other) => {
            return Err(StreamError::UnexpectedShape(format!(
                "`results` must be an array, got {}",
                kind_of(other)
            )))
        }
    };

    let mut extraction = Extraction::default();
    for (index, value) in results.iter().enumerate() {
        match validate(value) {
            Ok(record) => extraction.accepted.push(record),
            Err(rejection) => extraction.rejected.push((index, rejection)),
        }
    }
    Ok(extraction)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const LIMIT: usize = 1 << 20;

    fn ids(extractions: &[Extraction]) -> Vec<u64> {
        extractions
            .iter()
            .flat_map(|e| e.accepted.iter().map(|r| r.unit_id))
            .collect()
    }

    #[test]
    fn test_whitespace_yields_nothing() {
        let mut extractor = RecordExtractor::new(LIMIT);
        assert!(extractor.push("  \n\t").unwrap().is_empty());
        assert_eq!(extractor.pending_len(), 0);
        assert!(extractor.finish().is_ok());
    }

    #[test]
    fn test_single_message() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let out = extractor
            .push(r#"{"results":[{"iteration":1,"image_url":"/a.png","description":"x"}]}"#)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn test_absent_results_is_empty() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let out = extractor.push(r#"{"job_id":"abc"}"#).unwrap();
        assert_eq!(out, vec![Extraction::default()]);
    }

    #[test]
    fn test_invalid_records_dropped_in_place() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let out = extractor
            .push(
                r#"{"results":[
                    {"iteration":3,"image_url":"/c.png","description":"c"},
                    {"iteration":1,"description":"no url"},
                    {"iteration":2,"image_url":"/b.png","description":"b"}
                ]}"#,
            )
            .unwrap();

        assert_eq!(ids(&out), vec![3, 2]);
        assert_eq!(
            out[0].rejected,
            vec![(1, RecordRejection::MissingField("image_url"))]
        );
    }

    #[test]
    fn test_message_split_across_pushes() {
        let mut extractor = RecordExtractor::new(LIMIT);
        assert!(extractor.push(r#"{"results":[{"iteration":1,"ima"#).unwrap().is_empty());
        assert!(extractor.pending_len() > 0);

        let out = extractor
            .push(r#"ge_url":"/a.png","description":"x"}]}"#)
            .unwrap();
        assert_eq!(ids(&out), vec![1]);
        assert_eq!(extractor.pending_len(), 0);
    }

    #[test]
    fn test_concatenated_messages() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let out = extractor
            .push(concat!(
                r#"{"results":[{"iteration":1,"image_url":"/a.png","description":"x"}]}"#,
                "\n",
                r#"{"results":[{"iteration":2,"image_url":"/b.png","description":"y"}]}"#,
            ))
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(ids(&out), vec![1, 2]);
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let err = extractor.push("this is not json").unwrap_err();
        assert!(matches!(err, StreamError::MalformedFragment { .. }));
    }

    #[test]
    fn test_non_object_message_is_fatal() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let err = extractor.push("[1, 2]").unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedShape(_)));

        let err = extract_message(&serde_json::json!({"results": 5})).unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedShape(_)));
    }

    #[test]
    fn test_unterminated_message_at_finish() {
        let mut extractor = RecordExtractor::new(LIMIT);
        extractor.push(r#"{"results":["#).unwrap();
        let err = extractor.finish().unwrap_err();
        assert!(matches!(err, StreamError::UnterminatedFragment { pending_bytes: 12 }));
    }

    #[test]
    fn test_messages_before_error_are_kept() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let mut out = Vec::new();
        let err = extractor
            .push_into(
                concat!(
                    r#"{"results":[{"iteration":1,"image_url":"/a.png","description":"x"}]}"#,
                    "\n{oops"
                ),
                &mut out,
            )
            .unwrap_err();

        assert!(matches!(err, StreamError::MalformedFragment { .. }));
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let mut extractor = RecordExtractor::new(LIMIT);
        let out = extractor
            .push(r#"{"results":[{"iteration":1,"image_url":"/a.png","description":"} \" ]{"}]}"#)
            .unwrap();
        assert_eq!(out[0].accepted[0].description, r#"} " ]{"#);
        assert_eq!(extractor.pending_len(), 0);
    }

    #[test]
    fn test_garbage_caught_before_value_closes() {
        let mut extractor = RecordExtractor::new(LIMIT);
        extractor.push(r#"{"results":["#).unwrap();
        // the open value has doubled since its last check
        let err = extractor.push(" nope, nope, nope").unwrap_err();
        assert!(matches!(err, StreamError::MalformedFragment { .. }));
    }

    #[test]
    fn test_large_message_in_small_chunks_scales_linearly() {
        fn feed(description_len: usize) -> Duration {
            let message = format!(
                r#"{{"results":[{{"iteration":1,"image_url":"/a.png","description":"{}"}}]}}"#,
                "x".repeat(description_len)
            );
            let mut extractor = RecordExtractor::new(usize::MAX);
            let mut out = Vec::new();
            let started = Instant::now();
            for chunk in message.as_bytes().chunks(1024) {
                let text = std::str::from_utf8(chunk).unwrap();
                extractor.push_into(text, &mut out).unwrap();
            }
            let elapsed = started.elapsed();
            assert_eq!(ids(&out), vec![1]);
            elapsed
        }

        let small = feed(512 * 1024);
        let large = feed(2 * 1024 * 1024);
        // 4x the input; rescanning the whole buffer per chunk would be ~16x
        let bound = small.max(Duration::from_millis(20)) * 10;
        assert!(large < bound, "small={small:?} large={large:?}");
    }

    #[test]
    fn test_fragment_limit() {
        let mut extractor = RecordExtractor::new(16);
        let err = extractor
            .push(r#"{"results":[{"iteration":1,"image_url":"#)
            .unwrap_err();
        assert!(matches!(err, StreamError::FragmentTooLarge { limit: 16, .. }));
    }
}
