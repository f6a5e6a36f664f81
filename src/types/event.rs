use serde_json::Value;

/// One decoded record of the chat event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Assistant text to append to the open message.
    ContentDelta { text: String },
    /// The model started a tool call; carries no payload.
    ToolCallStarted,
    /// The server ran a tool and reports its arguments and result.
    ToolExecutionComplete {
        tool_name: String,
        arguments: Value,
        result: Value,
    },
    ToolExecutionError { message: String },
    ServerError { message: String },
    StreamEnd,
    /// A `data:` record whose payload was not valid JSON.
    Malformed { raw_text: String },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolCallStarted => "tool_call_started",
            Self::ToolExecutionComplete { .. } => "tool_execution_complete",
            Self::ToolExecutionError { .. } => "tool_execution_error",
            Self::ServerError { .. } => "server_error",
            Self::StreamEnd => "stream_end",
            Self::Malformed { .. } => "malformed",
        }
    }
}
