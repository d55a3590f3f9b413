use serde::{Deserialize, Serialize};

/// One event of a streamed reply, as carried in an SSE `data:` line.
///
/// On the wire every frame is a flat object with a `done` flag:
/// `{"chunk": "...", "done": false}`, `{"done": true}` or
/// `{"error": "...", "done": true}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(into = "WireFrame", try_from = "WireFrame")]
pub enum StreamFrame {
    Chunk(String),
    Done,
    Error(String),
}

impl StreamFrame {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamFrame::Chunk(_))
    }

    pub fn to_json(&self) -> String {
        // A map of strings and a bool cannot fail to serialize.
        serde_json::to_string(&WireFrame::from(self.clone())).unwrap_or_default()
    }

    /// Parse the payload of a `data:` line. Returns `None` for anything that
    /// is not a recognizable frame, including chunk frames with no text.
    pub fn from_data(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

#[derive(Serialize, Deserialize)]
struct WireFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default)]
    done: bool,
}

impl From<StreamFrame> for WireFrame {
    fn from(frame: StreamFrame) -> Self {
        match frame {
            StreamFrame::Chunk(chunk) => WireFrame { chunk: Some(chunk), error: None, done: false },
            StreamFrame::Done => WireFrame { chunk: None, error: None, done: true },
            StreamFrame::Error(error) => WireFrame { chunk: None, error: Some(error), done: true },
        }
    }
}

impl TryFrom<WireFrame> for StreamFrame {
    type Error = &'static str;

    fn try_from(wire: WireFrame) -> Result<Self, &'static str> {
        if let Some(error) = wire.error {
            return Ok(StreamFrame::Error(error));
        }
        if wire.done {
            return Ok(StreamFrame::Done);
        }
        match wire.chunk {
            Some(chunk) if !chunk.is_empty() => Ok(StreamFrame::Chunk(chunk)),
            _ => Err("frame carries no chunk, error or completion flag"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_match_wire_shapes() {
        assert_eq!(StreamFrame::Chunk("Hi".into()).to_json(), r#"{"chunk":"Hi","done":false}"#);
        assert_eq!(StreamFrame::Done.to_json(), r#"{"done":true}"#);
        assert_eq!(StreamFrame::Error("quota".into()).to_json(), r#"{"error":"quota","done":true}"#);
    }

    #[test]
    fn error_wins_over_done_and_chunk() {
        let frame = StreamFrame::from_data(r#"{"chunk":"x","error":"boom","done":true}"#);
        assert_eq!(frame, Some(StreamFrame::Error("boom".into())));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_eq!(StreamFrame::from_data("{not json"), None);
        assert_eq!(StreamFrame::from_data(r#"{"done":false}"#), None);
        assert_eq!(StreamFrame::from_data(r#"{"chunk":"","done":false}"#), None);
    }

    #[test]
    fn wire_conversion_rejects_empty_frames() {
        let done = WireFrame { chunk: Some("late".into()), error: None, done: true };
        assert_eq!(StreamFrame::try_from(done), Ok(StreamFrame::Done));

        let empty = WireFrame { chunk: None, error: None, done: false };
        assert!(StreamFrame::try_from(empty).is_err());
    }

    #[test]
    fn terminal_frames() {
        assert!(StreamFrame::Done.is_terminal());
        assert!(StreamFrame::Error("e".into()).is_terminal());
        assert!(!StreamFrame::Chunk("c".into()).is_terminal());
    }
}
