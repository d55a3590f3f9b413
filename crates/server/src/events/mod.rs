use tokio::sync::mpsc;
pub use parley_shared::StreamFrame;

/// Message used when a session is dropped without a terminal frame.
pub const ABORTED: &str = "Failed to generate response";

/// Open a per-request frame channel. The receiver feeds the SSE body.
pub fn channel() -> (StreamSession, mpsc::UnboundedReceiver<StreamFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StreamSession { tx, finished: false }, rx)
}

/// Sending half of one streamed reply.
///
/// A session ends with exactly one terminal frame: `complete` and `fail`
/// consume it, and dropping it unfinished sends an error frame.
#[derive(Debug)]
pub struct StreamSession {
    tx: mpsc::UnboundedSender<StreamFrame>,
    finished: bool,
}

impl StreamSession {
    /// Forward a fragment. Returns `false` once the client has gone away.
    pub fn chunk(&self, content: String) -> bool {
        self.tx.send(StreamFrame::Chunk(content)).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn complete(mut self) {
        self.finish(StreamFrame::Done);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.finish(StreamFrame::Error(message.into()));
    }

    fn finish(&mut self, frame: StreamFrame) {
        self.finished = true;
        let _ = self.tx.send(frame); // Ignore if the client is gone
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(StreamFrame::Error(ABORTED.to_string()));
        }
    }
}
