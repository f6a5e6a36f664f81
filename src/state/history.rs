use crate::types::ApiMessage;

/// Ordered record of the conversation sent with every request.
///
/// Entries are only ever appended; nothing rewrites or removes a message
/// once it is recorded.
#[derive(Debug, Default, Clone)]
pub struct ConversationHistory {
    messages: Vec<ApiMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ApiMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ApiMessage::assistant(content));
    }

    pub fn messages(&self) -> &[ApiMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ApiMessage> {
        self.messages.last()
    }
}
