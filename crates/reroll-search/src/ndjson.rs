//! Newline-delimited JSON framing for progress events.

use reroll_core::{ProgressEvent, Result};

/// Serialize one event as a single JSON line terminated by `\n`.
pub fn encode_line(event: &ProgressEvent) -> Result<String> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// Incremental decoder for an NDJSON byte stream.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; incomplete data is
/// buffered until its newline arrives.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ProgressEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Whether a partial line is waiting for more input.
    pub fn has_pending(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// Flush a final line that had no trailing newline.
    pub fn finish(self) -> Result<Option<ProgressEvent>> {
        parse_line(&self.buffer)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<ProgressEvent>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(line)?))
}
