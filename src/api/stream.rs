use anyhow::Result;
use futures::{stream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use super::client::ByteStream;
use crate::error::ChatError;

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Splits raw transport bytes into blank-line delimited records.
///
/// Bytes are buffered undecoded so a multi-byte character cut by a chunk
/// boundary is reassembled before the record is turned into text.
#[derive(Default)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
    /// Bytes before this offset hold no delimiter start.
    scanned: usize,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every record it completed, without delimiters.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut records = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;

        while let Some((end, delimiter_len)) = find_record_end(&self.buffer, from) {
            records.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + delimiter_len;
            from = start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        // A delimiter is at most four bytes, so only its first three can
        // already be buffered.
        self.scanned = self.buffer.len().saturating_sub(3);

        records
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Take whatever incomplete record is still buffered.
    pub fn flush(&mut self) -> String {
        self.scanned = 0;
        let pending = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Find the first delimiter starting at or after `from`, as
/// (record end, delimiter length).
fn find_record_end(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len() && &buf[i..i + 4] == b"\r\n\r\n" {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

struct RecordState {
    bytes: ByteStream,
    idle_timeout: Option<Duration>,
    splitter: FrameSplitter,
    ready: VecDeque<String>,
    done: bool,
}

/// Lazily turn a byte stream into a stream of complete records.
///
/// A transport error is yielded once and ends the sequence, and so does a
/// wait for the next chunk that outlasts `idle_timeout`. A partial record
/// left over when the transport completes is dropped.
pub fn record_stream(bytes: ByteStream, idle_timeout: Option<Duration>) -> RecordStream {
    let state = RecordState {
        bytes,
        idle_timeout,
        splitter: FrameSplitter::new(),
        ready: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                return Some((Ok(record), state));
            }
            if state.done {
                return None;
            }

            let next = match state.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, state.bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        state.done = true;
                        let error = ChatError::Transport(format!("no data received for {limit:?}"));
                        return Some((Err(error.into()), state));
                    }
                },
                None => state.bytes.next().await,
            };

            match next {
                Some(Ok(chunk)) => state.ready.extend(state.splitter.process(&chunk)),
                Some(Err(error)) => {
                    state.done = true;
                    return Some((Err(error), state));
                }
                None => {
                    state.done = true;
                    if state.splitter.has_pending() {
                        let leftover = state.splitter.flush();
                        tracing::debug!(
                            bytes = leftover.len(),
                            "discarding incomplete record at end of stream"
                        );
                    }
                }
            }
        }
    }))
}
