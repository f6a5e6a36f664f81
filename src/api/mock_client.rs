use crate::api::client::{ChatResponse, MockStreamProducer};
use crate::types::ChatRequest;
use anyhow::Result;
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

/// One scripted server reply.
#[derive(Clone)]
pub enum MockReply {
    /// Records of an event stream, each framed with a blank line.
    Records(Vec<String>),
    /// Raw chunks, delivered exactly as given.
    Chunks(Vec<Vec<u8>>),
    /// A complete JSON body.
    Complete(String),
    /// The request fails before any response arrives.
    Fail(crate::error::ChatError),
}

#[derive(Clone, Default)]
pub struct MockChatClient {
    replies: Arc<Mutex<Vec<MockReply>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockChatClient {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            requests: Arc::default(),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl MockStreamProducer for MockChatClient {
    fn create_mock_response(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let mut replies_guard = self.replies.lock().unwrap();
        if replies_guard.is_empty() {
            return Err(anyhow::anyhow!("MockChatClient: No more replies configured"));
        }

        let chunks: Vec<Vec<u8>> = match replies_guard.remove(0) {
            MockReply::Complete(body) => return Ok(ChatResponse::Complete(Bytes::from(body))),
            MockReply::Fail(error) => return Err(error.into()),
            MockReply::Chunks(chunks) => chunks,
            MockReply::Records(records) => records
                .into_iter()
                .map(|record| {
                    if record.ends_with("\n\n") {
                        record.into_bytes()
                    } else {
                        format!("{record}\n\n").into_bytes()
                    }
                })
                .collect(),
        };

        let byte_chunks: Vec<Result<Bytes>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        Ok(ChatResponse::Stream(Box::pin(stream::iter(byte_chunks))))
    }
}
