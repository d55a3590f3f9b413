//! Reads a streamed reply frame by frame into [`ChatState`].

use parley_shared::sse::{Decoded, FrameDecoder};
use parley_shared::{Message, StreamFrame};

use crate::state::ChatState;

/// How a streamed reply ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed(Message),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct StreamConsumer {
    decoder: FrameDecoder,
    outcome: Option<StreamOutcome>,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw body bytes. Returns the outcome once a terminal frame has
    /// been seen; anything after that is ignored.
    pub fn feed(
        &mut self,
        state: &mut ChatState,
        bytes: &[u8],
        on_chunk: &mut dyn FnMut(&str),
    ) -> Option<StreamOutcome> {
        if self.outcome.is_some() {
            return self.outcome.clone();
        }

        for decoded in self.decoder.push(bytes) {
            let frame = match decoded {
                Decoded::Frame(frame) => frame,
                Decoded::Malformed(data) => {
                    tracing::warn!("Skipping malformed stream frame: {}", data);
                    continue;
                }
            };

            match frame {
                StreamFrame::Chunk(chunk) => {
                    state.push_chunk(&chunk);
                    on_chunk(&chunk);
                }
                StreamFrame::Done => {
                    self.outcome = Some(StreamOutcome::Completed(state.commit()));
                    break;
                }
                StreamFrame::Error(message) => {
                    state.abort();
                    self.outcome = Some(StreamOutcome::Failed(message));
                    break;
                }
            }
        }

        self.outcome.clone()
    }

    /// Call when the body ends. A stream that closed without a terminal frame
    /// counts as a failure and commits nothing.
    pub fn finish(self, state: &mut ChatState) -> StreamOutcome {
        match self.outcome {
            Some(outcome) => outcome,
            None => {
                state.abort();
                StreamOutcome::Failed("Stream ended before the reply finished".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_shared::{Chat, ChatStatus, Role};

    const BODY: &str = "data: {\"chunk\":\"Sure, \",\"done\":false}\n\n\
                        : keep-alive\n\n\
                        data: {\"chunk\":\"X is … ✓\",\"done\":false}\n\n\
                        data: {\"done\":true}\n\n";

    fn open_state() -> ChatState {
        let now = Utc::now();
        let mut state = ChatState::new();
        state.open(Chat {
            id: 1,
            user_id: 1,
            title: "New Chat".into(),
            messages: vec![Message::user("Hello"), Message::assistant("Hi there")],
            status: ChatStatus::Active,
            created_at: now,
            last_message_at: now,
        });
        state.begin_turn("Explain X");
        state
    }

    fn run(parts: &[&[u8]]) -> (ChatState, StreamOutcome, Vec<String>) {
        let mut state = open_state();
        let mut consumer = StreamConsumer::new();
        let mut seen = Vec::new();
        for part in parts {
            if consumer
                .feed(&mut state, part, &mut |c: &str| seen.push(c.to_string()))
                .is_some()
            {
                break;
            }
        }
        let outcome = consumer.finish(&mut state);
        (state, outcome, seen)
    }

    fn run_lines(parts: &[&str]) -> (ChatState, StreamOutcome, Vec<String>) {
        let parts: Vec<&[u8]> = parts.iter().map(|p| p.as_bytes()).collect();
        run(&parts)
    }

    fn text(outcome: &StreamOutcome) -> Result<&str, &str> {
        match outcome {
            StreamOutcome::Completed(m) => Ok(&m.content),
            StreamOutcome::Failed(e) => Err(e),
        }
    }

    #[test]
    fn live_buffer_tracks_chunks_until_done() {
        let mut state = open_state();
        let mut consumer = StreamConsumer::new();
        let mut noop = |_: &str| {};

        assert_eq!(consumer.feed(&mut state, b"data: {\"chunk\":\"Sure, \",\"done\":false}\n\n", &mut noop), None);
        assert_eq!(state.live, "Sure, ");
        assert_eq!(state.current.as_ref().unwrap().messages.len(), 3);

        consumer.feed(&mut state, b"data: {\"chunk\":\"X is ...\",\"done\":false}\n\n", &mut noop);
        assert_eq!(state.live, "Sure, X is ...");

        let outcome = consumer.feed(&mut state, b"data: {\"done\":true}\n\n", &mut noop);
        assert!(matches!(outcome, Some(StreamOutcome::Completed(ref m)) if m.content == "Sure, X is ..."));
        assert!(state.live.is_empty());
        assert!(!state.streaming);

        let messages = &state.current.as_ref().unwrap().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[3].role, Role::Assistant);
        assert_eq!(messages[3].content, "Sure, X is ...");
    }

    #[test]
    fn split_at_every_offset_gives_same_result() {
        let bytes = BODY.as_bytes();
        let (_, whole, whole_chunks) = run(&[bytes]);

        for at in 1..bytes.len() {
            let (state, outcome, chunks) = run(&[&bytes[..at], &bytes[at..]]);
            assert_eq!(text(&outcome), text(&whole), "split at {}", at);
            assert_eq!(chunks, whole_chunks, "split at {}", at);
            assert_eq!(state.current.as_ref().unwrap().messages.len(), 4);
        }

        assert_eq!(text(&whole), Ok("Sure, X is … ✓"));
    }

    #[test]
    fn error_frame_commits_nothing() {
        let (state, outcome, chunks) = run_lines(&[
            "data: {\"chunk\":\"half\",\"done\":false}\n\n",
            "data: {\"error\":\"quota exceeded\",\"done\":true}\n\n",
        ]);

        assert_eq!(outcome, StreamOutcome::Failed("quota exceeded".into()));
        assert_eq!(chunks, ["half"]);
        assert!(state.live.is_empty());
        let messages = &state.current.as_ref().unwrap().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::User);
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let (_, outcome, chunks) = run_lines(&[
            "data: not json\n\n",
            "data: {\"chunk\":\"ok\",\"done\":false}\n\n",
            "data: {\"done\":false}\n\n",
            "data: {\"done\":true}\n\n",
        ]);

        assert_eq!(chunks, ["ok"]);
        assert!(matches!(outcome, StreamOutcome::Completed(ref m) if m.content == "ok"));
    }

    #[test]
    fn body_without_terminal_frame_fails() {
        let (state, outcome, _) = run_lines(&["data: {\"chunk\":\"dangling\",\"done\":false}\n\n"]);

        assert!(matches!(outcome, StreamOutcome::Failed(_)));
        assert!(state.live.is_empty());
        assert_eq!(state.current.as_ref().unwrap().messages.len(), 3);
    }

    #[test]
    fn frames_after_done_are_ignored() {
        let (state, outcome, chunks) = run_lines(&[
            "data: {\"chunk\":\"a\",\"done\":false}\n\ndata: {\"done\":true}\n\ndata: {\"chunk\":\"b\",\"done\":false}\n\n",
        ]);

        assert_eq!(chunks, ["a"]);
        assert!(matches!(outcome, StreamOutcome::Completed(ref m) if m.content == "a"));
        assert!(state.live.is_empty());
    }
}
