//! Incremental reading of `text/event-stream` bodies.
//!
//! Transports hand over bytes at arbitrary boundaries, so a `data:` line may
//! arrive in several pieces. `SseLineBuffer` holds the unfinished tail and
//! only releases whole lines.

use crate::events::StreamFrame;

#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect every line they complete, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Payload of a `data:` field, or `None` for comments, blank separators and
/// other fields.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Frame decoding on top of the line buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: SseLineBuffer,
}

/// What one complete line turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Frame(StreamFrame),
    Malformed(String),
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        self.lines
            .push(bytes)
            .into_iter()
            .filter_map(|line| {
                let data = data_payload(&line)?.trim();
                if data.is_empty() {
                    return None;
                }
                Some(match StreamFrame::from_data(data) {
                    Some(frame) => Decoded::Frame(frame),
                    None => Decoded::Malformed(data.to_string()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_partial_lines_until_newline() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"do").is_empty());
        assert_eq!(buffer.pending(), 10);
        assert_eq!(buffer.push(b"ne\":true}\n\n"), vec![r#"data: {"done":true}"#.to_string(), String::new()]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn accepts_crlf() {
        let mut buffer = SseLineBuffer::new();
        assert_eq!(buffer.push(b"data: x\r\n"), vec!["data: x".to_string()]);
    }

    #[test]
    fn data_payload_ignores_comments_and_other_fields() {
        assert_eq!(data_payload("data: {}"), Some("{}"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: message"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn every_split_offset_yields_the_same_frames() {
        let body = "data: {\"chunk\":\"héllo \",\"done\":false}\n\ndata: {\"chunk\":\"wörld\",\"done\":false}\n\ndata: {\"done\":true}\n\n";
        let expected = vec![
            Decoded::Frame(StreamFrame::Chunk("héllo ".into())),
            Decoded::Frame(StreamFrame::Chunk("wörld".into())),
            Decoded::Frame(StreamFrame::Done),
        ];

        let bytes = body.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.push(&bytes[..split]);
            frames.extend(decoder.push(&bytes[split..]));
            assert_eq!(frames, expected, "split at byte {}", split);
        }
    }

    #[test]
    fn malformed_lines_are_reported_not_fatal() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: {oops\n\ndata: {\"done\":true}\n\n");
        assert_eq!(
            frames,
            vec![Decoded::Malformed("{oops".into()), Decoded::Frame(StreamFrame::Done)]
        );
    }
}
