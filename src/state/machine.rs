//! Turns decoded stream events into presentation operations and history.
//!
//! One machine lives for exactly one response. It owns the partial message
//! and the tool indicator for that response and borrows the session's
//! history and sink, so a second stream cannot write into the same history
//! while this one is alive.

use super::history::ConversationHistory;
use super::tool_block::{
    signals_missing_arguments, tool_result_markdown, MISSING_ARGUMENTS_HINT, TOOL_INDICATOR_TEXT,
    TOOL_PLACEHOLDER_LINE,
};
use crate::presentation::{ElementHandle, ElementKind, PresentationSink, Severity};
use crate::render::MarkdownRenderer;
use crate::types::StreamEvent;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
    ToolPending,
    ToolPendingWhileStreaming,
    Terminated,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOptions {
    /// Show the pending tool call as a trailing line of the open message.
    pub inline_tool_placeholder: bool,
}

/// The assistant message currently receiving text.
#[derive(Debug, Default)]
struct PartialMessage {
    text: String,
    element: Option<ElementHandle>,
    awaiting_tool: bool,
}

impl PartialMessage {
    fn display_text(&self) -> String {
        match (self.awaiting_tool, self.text.is_empty()) {
            (false, _) => self.text.clone(),
            (true, true) => TOOL_PLACEHOLDER_LINE.to_string(),
            (true, false) => format!("{}\n\n{TOOL_PLACEHOLDER_LINE}", self.text),
        }
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub struct StreamMachine<'a> {
    history: &'a mut ConversationHistory,
    sink: &'a mut dyn PresentationSink,
    renderer: &'a dyn MarkdownRenderer,
    options: StreamOptions,
    partial: Option<PartialMessage>,
    indicator: Option<ElementHandle>,
    terminated: bool,
}

impl<'a> StreamMachine<'a> {
    pub fn new(
        history: &'a mut ConversationHistory,
        sink: &'a mut dyn PresentationSink,
        renderer: &'a dyn MarkdownRenderer,
        options: StreamOptions,
    ) -> Self {
        Self {
            history,
            sink,
            renderer,
            options,
            partial: None,
            indicator: None,
            terminated: false,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        match (self.terminated, self.indicator.is_some(), self.partial.is_some()) {
            (true, _, _) => StreamPhase::Terminated,
            (false, true, true) => StreamPhase::ToolPendingWhileStreaming,
            (false, true, false) => StreamPhase::ToolPending,
            (false, false, true) => StreamPhase::Streaming,
            (false, false, false) => StreamPhase::Idle,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn handle(&mut self, event: StreamEvent) {
        if self.terminated {
            tracing::trace!(kind = event.kind(), "ignoring event after stream end");
            return;
        }

        match event {
            StreamEvent::ContentDelta { text } => self.on_content_delta(&text),
            StreamEvent::ToolCallStarted => self.on_tool_call_started(),
            StreamEvent::ToolExecutionComplete {
                tool_name,
                arguments,
                result,
            } => self.on_tool_complete(&tool_name, &arguments, &result),
            StreamEvent::ToolExecutionError { message } => self.on_tool_error(&message),
            StreamEvent::ServerError { message } => {
                tracing::warn!(%message, "server reported an error mid-stream");
                self.notice(Severity::Error, &format!("⚠️ Server error: {message}"));
            }
            StreamEvent::Malformed { raw_text } => {
                tracing::trace!(bytes = raw_text.len(), "skipping malformed record");
            }
            StreamEvent::StreamEnd => self.on_stream_end(),
        }
    }

    /// End the stream because the transport failed, keeping whatever text
    /// already arrived and reporting the failure once.
    pub fn abort_with_error(&mut self, message: &str) {
        if self.terminated {
            return;
        }
        self.on_stream_end();
        self.notice(
            Severity::Error,
            &format!("Error reading response: {message}"),
        );
    }

    fn on_content_delta(&mut self, text: &str) {
        let partial = self.partial.get_or_insert_with(PartialMessage::default);
        partial.text.push_str(text);
        // The placeholder stays pending but is only drawn by the tool call.
        self.render_partial(false);
        self.sink.scroll_to_latest();
    }

    fn on_tool_call_started(&mut self) {
        if self.indicator.is_none() {
            let handle = self.sink.create_element(ElementKind::ToolStatus);
            self.sink
                .set_content(handle, &self.renderer.render(TOOL_INDICATOR_TEXT));
            self.indicator = Some(handle);
        }

        if self.options.inline_tool_placeholder {
            let partial = self.partial.get_or_insert_with(PartialMessage::default);
            if !partial.awaiting_tool {
                partial.awaiting_tool = true;
                self.render_partial(true);
            }
        }

        self.sink.scroll_to_latest();
    }

    fn on_tool_complete(&mut self, tool_name: &str, arguments: &Value, result: &Value) {
        self.clear_indicator();
        // Text from before the tool call stays visible but is not recorded.
        if let Some(pre_tool) = self.settle_partial() {
            tracing::debug!(chars = pre_tool.text.len(), "pre-tool text left out of history");
        }

        let handle = self.sink.create_element(ElementKind::ToolResult);
        let markdown = tool_result_markdown(tool_name, arguments, result);
        self.sink.set_content(handle, &self.renderer.render(&markdown));
        self.sink.scroll_to_latest();

        // Continuation text gets a fresh message; its element appears with
        // the first delta.
        self.partial = Some(PartialMessage::default());
    }

    fn on_tool_error(&mut self, message: &str) {
        self.clear_indicator();
        self.partial = self.settle_partial();

        tracing::warn!(%message, "tool execution failed");
        self.notice(
            Severity::Error,
            &format!("⚠️ Tool execution failed: {message}"),
        );
        if signals_missing_arguments(message) {
            self.notice(Severity::Hint, MISSING_ARGUMENTS_HINT);
        }
    }

    fn on_stream_end(&mut self) {
        self.clear_indicator();
        if let Some(partial) = self.settle_partial() {
            tracing::debug!(chars = partial.text.len(), "assistant message finalized");
            self.history.push_assistant(partial.text);
        }
        self.terminated = true;
    }

    /// Take the live partial message out, clearing its placeholder. Blank
    /// messages are removed from the surface and dropped.
    fn settle_partial(&mut self) -> Option<PartialMessage> {
        let mut partial = self.partial.take()?;
        let had_placeholder = std::mem::replace(&mut partial.awaiting_tool, false);

        if partial.is_blank() {
            if let Some(handle) = partial.element {
                self.sink.remove_element(handle);
            }
            return None;
        }

        if had_placeholder {
            if let Some(handle) = partial.element {
                self.sink
                    .set_content(handle, &self.renderer.render(&partial.text));
            }
        }
        Some(partial)
    }

    fn render_partial(&mut self, with_placeholder: bool) {
        let Some(partial) = self.partial.as_mut() else {
            return;
        };
        let handle = match partial.element {
            Some(handle) => handle,
            None => {
                let handle = self.sink.create_element(ElementKind::Assistant);
                partial.element = Some(handle);
                handle
            }
        };
        let markup = if with_placeholder {
            self.renderer.render(&partial.display_text())
        } else {
            self.renderer.render(&partial.text)
        };
        self.sink.set_content(handle, &markup);
    }

    fn clear_indicator(&mut self) {
        if let Some(handle) = self.indicator.take() {
            self.sink.remove_element(handle);
        }
    }

    fn notice(&mut self, severity: Severity, text: &str) {
        let handle = self.sink.create_element(ElementKind::System(severity));
        self.sink.set_content(handle, &self.renderer.render(text));
        self.sink.scroll_to_latest();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::{PresentationOp, RecordingSink};
    use crate::render::TextMarkdown;
    use crate::types::ApiMessage;
    use serde_json::json;

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::ContentDelta {
            text: text.to_string(),
        }
    }

    fn run(events: Vec<StreamEvent>, options: StreamOptions) -> (ConversationHistory, RecordingSink) {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        {
            let mut machine = StreamMachine::new(&mut history, &mut sink, &TextMarkdown, options);
            for event in events {
                machine.handle(event);
            }
        }
        (history, sink)
    }

    #[test]
    fn test_deltas_finalize_in_order() {
        let (history, sink) = run(
            vec![delta("Hel"), delta("lo"), delta(" there"), StreamEvent::StreamEnd],
            StreamOptions::default(),
        );
        assert_eq!(history.messages(), &[ApiMessage::assistant("Hello there")]);
        assert_eq!(
            sink.live_elements(),
            vec![(ElementKind::Assistant, "Hello there")]
        );
        assert_eq!(sink.created_count(ElementKind::Assistant), 1);
    }

    #[test]
    fn test_each_delta_rerenders_whole_message() {
        let (_, sink) = run(
            vec![delta("**bo"), delta("ld**")],
            StreamOptions::default(),
        );
        let contents: Vec<&str> = sink
            .ops()
            .iter()
            .filter_map(|op| match op {
                PresentationOp::SetContent { markup, .. } => Some(markup.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["**bo", "bold"]);
    }

    #[test]
    fn test_repeated_tool_call_creates_one_indicator() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        let mut machine = StreamMachine::new(
            &mut history,
            &mut sink,
            &TextMarkdown,
            StreamOptions::default(),
        );
        machine.handle(StreamEvent::ToolCallStarted);
        assert_eq!(machine.phase(), StreamPhase::ToolPending);
        machine.handle(StreamEvent::ToolCallStarted);
        machine.handle(StreamEvent::ToolCallStarted);
        drop(machine);

        assert_eq!(sink.created_count(ElementKind::ToolStatus), 1);
    }

    #[test]
    fn test_phase_transitions() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        let mut machine = StreamMachine::new(
            &mut history,
            &mut sink,
            &TextMarkdown,
            StreamOptions::default(),
        );
        assert_eq!(machine.phase(), StreamPhase::Idle);
        machine.handle(delta("Checking"));
        assert_eq!(machine.phase(), StreamPhase::Streaming);
        machine.handle(StreamEvent::ToolCallStarted);
        assert_eq!(machine.phase(), StreamPhase::ToolPendingWhileStreaming);
        machine.handle(StreamEvent::ToolExecutionComplete {
            tool_name: "weather".to_string(),
            arguments: json!({}),
            result: json!("ok"),
        });
        assert_eq!(machine.phase(), StreamPhase::Streaming);
        machine.handle(StreamEvent::StreamEnd);
        assert_eq!(machine.phase(), StreamPhase::Terminated);
        assert!(machine.is_terminated());
    }

    #[test]
    fn test_events_after_end_are_ignored() {
        let (history, sink) = run(
            vec![
                delta("done"),
                StreamEvent::StreamEnd,
                delta("late"),
                StreamEvent::ServerError {
                    message: "late".to_string(),
                },
            ],
            StreamOptions::default(),
        );
        assert_eq!(history.messages(), &[ApiMessage::assistant("done")]);
        assert_eq!(sink.live_elements().len(), 1);
    }

    #[test]
    fn test_end_right_after_tool_completion_leaves_nothing_empty() {
        let (history, sink) = run(
            vec![
                StreamEvent::ToolCallStarted,
                StreamEvent::ToolExecutionComplete {
                    tool_name: "weather".to_string(),
                    arguments: json!({"city": "X"}),
                    result: json!({"temp": 20}),
                },
                StreamEvent::StreamEnd,
            ],
            StreamOptions::default(),
        );
        assert!(history.is_empty());
        assert_eq!(sink.created_count(ElementKind::Assistant), 0);
        assert!(sink
            .live_elements()
            .iter()
            .all(|(_, content)| !content.trim().is_empty()));
    }

    #[test]
    fn test_malformed_record_between_deltas_is_harmless() {
        let (history, _) = run(
            vec![
                delta("a"),
                StreamEvent::Malformed {
                    raw_text: "{oops".to_string(),
                },
                delta("b"),
                StreamEvent::StreamEnd,
            ],
            StreamOptions::default(),
        );
        assert_eq!(history.messages(), &[ApiMessage::assistant("ab")]);
    }

    #[test]
    fn test_server_error_keeps_stream_open() {
        let (history, sink) = run(
            vec![
                delta("partial"),
                StreamEvent::ServerError {
                    message: "rate limited".to_string(),
                },
                delta(" answer"),
                StreamEvent::StreamEnd,
            ],
            StreamOptions::default(),
        );
        assert_eq!(history.messages(), &[ApiMessage::assistant("partial answer")]);
        assert!(sink.live_elements().contains(&(
            ElementKind::System(Severity::Error),
            "⚠️ Server error: rate limited"
        )));
    }

    #[test]
    fn test_inline_placeholder_is_stripped_on_completion() {
        let options = StreamOptions {
            inline_tool_placeholder: true,
        };
        let (history, sink) = run(
            vec![
                delta("Let me check."),
                StreamEvent::ToolCallStarted,
                StreamEvent::ToolExecutionComplete {
                    tool_name: "weather".to_string(),
                    arguments: json!({}),
                    result: json!("sunny"),
                },
                delta("It is sunny."),
                StreamEvent::StreamEnd,
            ],
            options,
        );

        let rendered: Vec<&str> = sink
            .ops()
            .iter()
            .filter_map(|op| match op {
                PresentationOp::SetContent { markup, .. } => Some(markup.as_str()),
                _ => None,
            })
            .collect();
        assert!(rendered.contains(&"Let me check.\n\nUsing tool..."));

        let assistants: Vec<&str> = sink
            .live_elements()
            .into_iter()
            .filter(|(kind, _)| *kind == ElementKind::Assistant)
            .map(|(_, content)| content)
            .collect();
        assert_eq!(assistants, vec!["Let me check.", "It is sunny."]);
        assert_eq!(history.messages(), &[ApiMessage::assistant("It is sunny.")]);
    }

    #[test]
    fn test_delta_during_pending_tool_renders_without_placeholder() {
        let options = StreamOptions {
            inline_tool_placeholder: true,
        };
        let (history, sink) = run(
            vec![
                StreamEvent::ToolCallStarted,
                delta("Checking"),
                StreamEvent::StreamEnd,
            ],
            options,
        );

        let rendered: Vec<&str> = sink
            .ops()
            .iter()
            .filter_map(|op| match op {
                PresentationOp::SetContent { markup, .. } => Some(markup.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(rendered[..3], ["⏳ Calling external tool...", "Using tool...", "Checking"]);
        assert!(rendered[2..].iter().all(|markup| !markup.contains("Using tool")));
        assert_eq!(history.messages(), &[ApiMessage::assistant("Checking")]);
    }

    #[test]
    fn test_placeholder_only_message_is_discarded() {
        let options = StreamOptions {
            inline_tool_placeholder: true,
        };
        let (history, sink) = run(
            vec![StreamEvent::ToolCallStarted, StreamEvent::StreamEnd],
            options,
        );
        assert!(history.is_empty());
        assert!(sink.live_elements().is_empty());
        assert_eq!(sink.created_count(ElementKind::Assistant), 1);
    }

    #[test]
    fn test_text_echoing_placeholder_survives() {
        let options = StreamOptions {
            inline_tool_placeholder: true,
        };
        let (history, _) = run(
            vec![
                delta("I wrote *Using tool...* on purpose"),
                StreamEvent::ToolCallStarted,
                StreamEvent::StreamEnd,
            ],
            options,
        );
        assert_eq!(
            history.messages(),
            &[ApiMessage::assistant("I wrote *Using tool...* on purpose")]
        );
    }

    #[test]
    fn test_tool_error_with_missing_arguments_adds_hint() {
        let (history, sink) = run(
            vec![
                StreamEvent::ToolCallStarted,
                StreamEvent::ToolExecutionError {
                    message: "所需参数缺失: city".to_string(),
                },
                StreamEvent::StreamEnd,
            ],
            StreamOptions::default(),
        );
        assert!(history.is_empty());
        assert_eq!(
            sink.live_elements(),
            vec![
                (
                    ElementKind::System(Severity::Error),
                    "⚠️ Tool execution failed: 所需参数缺失: city"
                ),
                (ElementKind::System(Severity::Hint), MISSING_ARGUMENTS_HINT),
            ]
        );
    }

    #[test]
    fn test_tool_error_keeps_existing_text_open() {
        let (history, _) = run(
            vec![
                delta("Looking"),
                StreamEvent::ToolCallStarted,
                StreamEvent::ToolExecutionError {
                    message: "timeout".to_string(),
                },
                delta(" up"),
                StreamEvent::StreamEnd,
            ],
            StreamOptions::default(),
        );
        assert_eq!(history.messages(), &[ApiMessage::assistant("Looking up")]);
    }

    #[test]
    fn test_abort_finalizes_and_reports_once() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        {
            let mut machine = StreamMachine::new(
                &mut history,
                &mut sink,
                &TextMarkdown,
                StreamOptions::default(),
            );
            machine.handle(delta("half an ans"));
            machine.abort_with_error("connection reset");
            machine.abort_with_error("connection reset");
        }
        assert_eq!(history.messages(), &[ApiMessage::assistant("half an ans")]);
        assert_eq!(
            sink.created_count(ElementKind::System(Severity::Error)),
            1
        );
    }
}
