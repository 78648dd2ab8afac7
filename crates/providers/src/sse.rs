//! Line framing for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary network-sized pieces. The decoder buffers them,
//! splits on `\n`, and yields the payload of every `data: ` line. Blank lines,
//! comments (`:`) and other SSE fields (`event:`, `id:`) carry nothing for the
//! completions protocol and are dropped.

/// One meaningful frame from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A `data: ` payload (JSON for completions).
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental SSE line decoder.
///
/// Buffers raw bytes rather than text so a multi-byte UTF-8 character split
/// across two network reads is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseFrame> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);

    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        Some(SseFrame::Done)
    } else {
        Some(SseFrame::Data(data.to_string()))
    }
}
