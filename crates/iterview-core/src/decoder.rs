//! Incremental UTF-8 decoding of body chunks.
//!
//! A chunk may end in the middle of a multi-byte character. The decoder keeps
//! those trailing bytes and prepends them to the next chunk, so the text it
//! returns never contains a split character. Invalid sequences in the middle of
//! the data decode to U+FFFD instead of failing.

use crate::error::{Result, StreamError};

const REPLACEMENT: char = '\u{FFFD}';

/// Stateful chunk decoder for one stream.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, carrying an incomplete trailing character over to
    /// the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut text = String::with_capacity(input.len());
        let mut rest = input.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match err.error_len() {
                        Some(len) => {
                            text.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        text
    }

    /// Number of bytes waiting for the rest of their character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush at end of stream. Fails if the stream stopped inside a character;
    /// the pending bytes are discarded either way.
    pub fn finish(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            Ok(())
        } else {
            Err(StreamError::IncompleteSequence {
                pending: pending.len(),
            })
        }
    }
}
