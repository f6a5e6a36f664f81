use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::driver::{drive_stream, finalize_complete_response, StreamOutcome, TEST_MODE_NOTICE};
use super::history::ConversationHistory;
use super::machine::{StreamMachine, StreamOptions};
use crate::api::client::{ChatClient, ChatResponse};
use crate::api::stream::record_stream;
use crate::config::{parse_mcp_config, Config};
use crate::error::ChatError;
use crate::presentation::{ElementKind, PresentationSink, Severity};
use crate::render::{MarkdownRenderer, TextMarkdown};
use crate::types::ChatRequest;

pub const THINKING_TEXT: &str = "Thinking...";
pub const SERVER_UNREACHABLE_NOTICE: &str =
    "⚠️ Cannot reach the server. Check your network connection or the server status.";

/// How one `send` ended, for callers that log or test it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Streamed(StreamOutcome),
    Completed,
    /// Nothing was sent.
    Rejected,
    Failed,
}

/// One chat conversation against one server.
pub struct ChatSession {
    client: ChatClient,
    config: Config,
    renderer: Box<dyn MarkdownRenderer>,
    history: ConversationHistory,
}

impl ChatSession {
    pub fn new(config: Config) -> Result<Self> {
        let client = ChatClient::new(&config)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: ChatClient, config: Config) -> Self {
        Self {
            client,
            config,
            renderer: Box::new(TextMarkdown),
            history: ConversationHistory::new(),
        }
    }

    /// Replace the terminal text renderer, for sinks that display markup.
    pub fn with_renderer(mut self, renderer: Box<dyn MarkdownRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Show a notice outside the conversation.
    pub fn notice(&self, sink: &mut dyn PresentationSink, severity: Severity, text: &str) {
        let handle = sink.create_element(ElementKind::System(severity));
        sink.set_content(handle, &self.renderer.render(text));
        sink.scroll_to_latest();
    }

    /// Ask the server whether it is up; failures become a warning notice.
    pub async fn health_check(&self, sink: &mut dyn PresentationSink) -> bool {
        match self.client.health_check().await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "health check failed");
                self.notice(sink, Severity::Error, SERVER_UNREACHABLE_NOTICE);
                false
            }
        }
    }

    /// Send one user message and present the reply.
    ///
    /// Failures never escape: every one of them ends up as a notice.
    pub async fn send(
        &mut self,
        text: &str,
        sink: &mut dyn PresentationSink,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let user = sink.create_element(ElementKind::User);
        sink.set_content(user, &self.renderer.render_plain(text));
        sink.scroll_to_latest();
        self.history.push_user(text);

        let mcp_config = match parse_mcp_config(&self.config.mcp_config) {
            Ok(mcp_config) => mcp_config,
            Err(error) => {
                tracing::warn!(%error, "request not sent");
                self.notice(sink, Severity::Error, &format!("⚠️ {error}"));
                return TurnOutcome::Rejected;
            }
        };

        let request = ChatRequest {
            messages: self.history.messages().to_vec(),
            model: self.config.model.clone(),
            stream: self.config.stream,
            mcp_config,
        };

        let thinking = sink.create_element(ElementKind::System(Severity::Info));
        sink.set_content(thinking, &self.renderer.render(THINKING_TEXT));
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.client.open(&request) => Some(opened),
        };
        sink.remove_element(thinking);

        let response = match opened {
            None => {
                tracing::info!("request cancelled before the server answered");
                return TurnOutcome::Streamed(StreamOutcome::Cancelled);
            }
            Some(Ok(response)) => response,
            Some(Err(error)) => {
                self.report_send_error(sink, &error);
                return TurnOutcome::Failed;
            }
        };

        match response {
            ChatResponse::Stream(bytes) => {
                let options = StreamOptions {
                    inline_tool_placeholder: self.config.inline_tool_placeholder,
                };
                let idle_timeout = self.config.idle_timeout;
                let mut machine =
                    StreamMachine::new(&mut self.history, &mut *sink, self.renderer.as_ref(), options);
                let records = record_stream(bytes, idle_timeout);
                let outcome = drive_stream(records, &mut machine, cancel).await;
                tracing::info!(?outcome, "stream finished");
                TurnOutcome::Streamed(outcome)
            }
            ChatResponse::Complete(body) => {
                match finalize_complete_response(
                    &body,
                    &mut self.history,
                    sink,
                    self.renderer.as_ref(),
                ) {
                    Ok(()) => TurnOutcome::Completed,
                    Err(error) => {
                        self.report_send_error(sink, &error.into());
                        TurnOutcome::Failed
                    }
                }
            }
        }
    }

    fn report_send_error(&self, sink: &mut dyn PresentationSink, error: &anyhow::Error) {
        tracing::error!(error = %format!("{error:#}"), "sending message failed");
        if error
            .downcast_ref::<ChatError>()
            .is_some_and(ChatError::indicates_test_mode)
        {
            self.notice(sink, Severity::Error, TEST_MODE_NOTICE);
        }
        self.notice(
            sink,
            Severity::Error,
            &format!("Error sending message: {error:#}"),
        );
    }
}
