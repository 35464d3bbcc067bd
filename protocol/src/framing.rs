//! Newline framing for the text protocol
//!
//! Outgoing messages are framed by appending `\n`. Incoming bytes are split on
//! `\n` by [`LineFramer`], which carries a partial trailing line over to the
//! next read so that a command split across TCP segments is reassembled, and
//! several commands arriving in one read are handled one by one.

use thiserror::Error;

/// Frame terminator for every message on the wire
pub const FRAME_DELIMITER: u8 = b'\n';

/// Default cap on a pending, not yet terminated line
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// A peer sent more than the allowed number of bytes without a newline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame of {len} bytes exceeds limit of {limit} bytes")]
pub struct FrameTooLong {
    pub len: usize,
    pub limit: usize,
}

/// Appends the frame terminator to a message
pub fn encode_frame(message: &str) -> String {
    let mut frame = String::with_capacity(message.len() + 1);
    frame.push_str(message);
    frame.push(FRAME_DELIMITER as char);
    frame
}

/// Turns raw bytes into a message
///
/// Invalid UTF-8 is replaced rather than rejected, and trailing whitespace
/// (including `\r`) is removed. Returns `None` if nothing is left.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reassembles newline-terminated messages from a byte stream
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_frame_len: usize,
}

impl LineFramer {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_frame_len,
        }
    }

    /// Feeds freshly read bytes and returns every message completed by them
    ///
    /// Blank lines produce no message. Completed messages are always
    /// returned, even when the unterminated remainder has outgrown the limit;
    /// call [`LineFramer::check_limit`] after handling them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(bytes);

        let mut messages = Vec::new();
        let mut line_start = 0;
        for (offset, byte) in self.pending[scan_from..].iter().enumerate() {
            if *byte == FRAME_DELIMITER {
                let line_end = scan_from + offset;
                if let Some(message) = decode_text(&self.pending[line_start..line_end]) {
                    messages.push(message);
                }
                line_start = line_end + 1;
            }
        }
        self.pending.drain(..line_start);

        messages
    }

    /// Fails if the unterminated remainder is longer than the configured limit
    pub fn check_limit(&self) -> Result<(), FrameTooLong> {
        if self.pending.len() > self.max_frame_len {
            return Err(FrameTooLong {
                len: self.pending.len(),
                limit: self.max_frame_len,
            });
        }
        Ok(())
    }

    /// Flushes whatever partial line is left, e.g. when the peer closes
    /// without a final newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_text(&rest)
    }

    /// Number of buffered bytes not yet terminated by a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}
