//! Line splitting for streamed command output

use bytes::{Buf, BytesMut};

/// Accumulates output chunks and yields complete lines.
///
/// Chunks may split lines anywhere; a line is emitted once its `\n`
/// arrives. Line terminators (`\n` or `\r\n`) are stripped.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of output
    pub(crate) fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next complete line, if any
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let line = self.buf.split_to(newline);
        self.buf.advance(1);
        Some(decode(&line))
    }

    /// Take whatever is left after the final newline
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        Some(decode(&rest))
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
