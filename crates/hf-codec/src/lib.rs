//! Text <-> bytes translation at the transport boundary.
//!
//! Keystroke text is encoded to UTF-8 before it goes over the bridge, and
//! output chunks come back as raw bytes. Backend chunking can split a
//! multi-byte character across two chunks, so the output path must use
//! [`StreamDecoder`], which carries the incomplete tail between calls.
//! The stateless [`decode`] is for whole, self-contained byte sequences.

use thiserror::Error;
use tracing::warn;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

// ---------------------------------------------------------------------------
// Stateless codec
// ---------------------------------------------------------------------------

/// Encode text into the byte sequence sent over the bridge.
pub fn encode(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Strictly decode a complete byte sequence.
///
/// Round-trips with [`encode`]: `decode(&encode(x))? == x` for all `x`.
pub fn decode(bytes: &[u8]) -> Result<String, CodecError> {
    Ok(std::str::from_utf8(bytes)?.to_string())
}

// ---------------------------------------------------------------------------
// StreamDecoder
// ---------------------------------------------------------------------------

/// Incremental UTF-8 decoder for chunked output streams.
///
/// Retains the trailing bytes of an incomplete multi-byte sequence (at most
/// 3) until the next chunk completes it. Bytes that can never form a valid
/// sequence are replaced with U+FFFD and counted.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    carry: Vec<u8>,
    replaced: u64,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning all text that is complete so far.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);

        let mut out = String::new();
        let mut idx = 0usize;
        while idx < self.carry.len() {
            match std::str::from_utf8(&self.carry[idx..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    idx = self.carry.len();
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if valid_up_to > 0 {
                        if let Ok(valid) = std::str::from_utf8(&self.carry[idx..idx + valid_up_to])
                        {
                            out.push_str(valid);
                        }
                        idx += valid_up_to;
                    }
                    match err.error_len() {
                        // Incomplete trailing sequence: keep it for the next chunk.
                        None => break,
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.replaced += 1;
                            idx = (idx + len).min(self.carry.len());
                        }
                    }
                }
            }
        }
        self.carry.drain(..idx);
        out
    }

    /// Drain any dangling incomplete sequence as a replacement character.
    ///
    /// Call when the stream ends; a non-empty carry at that point can never
    /// be completed.
    pub fn flush(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        warn!(pending = self.carry.len(), "flushing incomplete utf-8 tail");
        self.carry.clear();
        self.replaced += 1;
        char::REPLACEMENT_CHARACTER.to_string()
    }

    /// Bytes currently held back waiting for the rest of a sequence.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Total number of replacement characters emitted.
    pub fn replaced(&self) -> u64 {
        self.replaced
    }
}
