use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::history::ConversationHistory;
use super::machine::StreamMachine;
use crate::api::decode::decode_record;
use crate::api::stream::RecordStream;
use crate::error::ChatError;
use crate::presentation::{ElementKind, PresentationSink, Severity};
use crate::render::MarkdownRenderer;
use crate::types::{CompletionResponse, StreamEvent};

pub const TEST_MODE_NOTICE: &str =
    "⚠️ Running in test mode without an API key. Some features may be unavailable.";

/// How a streamed response ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    TransportFailed(String),
}

/// Pump records into the machine until the stream ends, fails or is
/// cancelled. Every path leaves the machine terminated.
///
/// A stalled transport surfaces as a record error from
/// [`record_stream`](crate::api::stream::record_stream).
pub async fn drive_stream(
    mut records: RecordStream,
    machine: &mut StreamMachine<'_>,
    cancel: &CancellationToken,
) -> StreamOutcome {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("stream cancelled by user");
                machine.handle(StreamEvent::StreamEnd);
                return StreamOutcome::Cancelled;
            }
            next = records.next() => next,
        };

        match next {
            Some(Ok(record)) => {
                if let Some(event) = decode_record(&record) {
                    tracing::trace!(kind = event.kind(), "stream event");
                    machine.handle(event);
                }
                if machine.is_terminated() {
                    return StreamOutcome::Completed;
                }
            }
            None => {
                tracing::debug!("transport closed without an end marker");
                machine.handle(StreamEvent::StreamEnd);
                return StreamOutcome::Completed;
            }
            Some(Err(error)) => {
                let message = format!("{error:#}");
                tracing::error!(error = %message, "reading response failed");
                machine.abort_with_error(&message);
                return StreamOutcome::TransportFailed(message);
            }
        }
    }
}

/// Present a complete (non-streamed) response body.
pub fn finalize_complete_response(
    body: &[u8],
    history: &mut ConversationHistory,
    sink: &mut dyn PresentationSink,
    renderer: &dyn MarkdownRenderer,
) -> Result<(), ChatError> {
    let response: CompletionResponse =
        serde_json::from_slice(body).map_err(|error| ChatError::Decode(error.to_string()))?;

    if response.id.as_deref() == Some("test-response") {
        tracing::warn!("server answered with a test response");
        let handle = sink.create_element(ElementKind::System(Severity::Error));
        sink.set_content(handle, &renderer.render(TEST_MODE_NOTICE));
    }

    match response.first_content() {
        Some(content) => {
            let handle = sink.create_element(ElementKind::Assistant);
            sink.set_content(handle, &renderer.render(content));
            history.push_assistant(content);
        }
        None => tracing::debug!("complete response carried no message content"),
    }
    sink.scroll_to_latest();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::RecordingSink;
    use crate::render::TextMarkdown;
    use crate::state::machine::StreamOptions;
    use crate::types::ApiMessage;
    use crate::api::stream::record_stream;
    use anyhow::anyhow;
    use bytes::Bytes;
    use futures::stream;
    use std::time::Duration;

    fn records(items: Vec<anyhow::Result<String>>) -> RecordStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_drive_stream_completes_on_done_marker() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        let mut machine = StreamMachine::new(
            &mut history,
            &mut sink,
            &TextMarkdown,
            StreamOptions::default(),
        );
        let outcome = drive_stream(
            records(vec![
                Ok(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#.to_string()),
                Ok("data: [DONE]".to_string()),
                Ok(r#"data: {"choices":[{"delta":{"content":"ignored"}}]}"#.to_string()),
            ]),
            &mut machine,
            &CancellationToken::new(),
        )
        .await;
        drop(machine);

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(history.messages(), &[ApiMessage::assistant("Hi")]);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_text_and_reports_once() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        let mut machine = StreamMachine::new(
            &mut history,
            &mut sink,
            &TextMarkdown,
            StreamOptions::default(),
        );
        let outcome = drive_stream(
            records(vec![
                Ok(r#"data: {"choices":[{"delta":{"content":"Half"}}]}"#.to_string()),
                Err(anyhow!("connection reset")),
            ]),
            &mut machine,
            &CancellationToken::new(),
        )
        .await;
        drop(machine);

        assert_eq!(
            outcome,
            StreamOutcome::TransportFailed("connection reset".to_string())
        );
        assert_eq!(history.messages(), &[ApiMessage::assistant("Half")]);
        assert_eq!(
            sink.live_elements().last(),
            Some(&(
                ElementKind::System(Severity::Error),
                "Error reading response: connection reset"
            ))
        );
    }

    #[tokio::test]
    async fn test_cancelled_stream_ends_quietly() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        let mut machine = StreamMachine::new(
            &mut history,
            &mut sink,
            &TextMarkdown,
            StreamOptions::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = drive_stream(
            Box::pin(stream::pending::<anyhow::Result<String>>()),
            &mut machine,
            &cancel,
        )
        .await;
        drop(machine);

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(history.is_empty());
        assert!(sink.live_elements().is_empty());
    }

    #[tokio::test]
    async fn test_idle_timeout_is_a_transport_failure() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        let mut machine = StreamMachine::new(
            &mut history,
            &mut sink,
            &TextMarkdown,
            StreamOptions::default(),
        );
        let outcome = drive_stream(
            record_stream(
                Box::pin(stream::pending::<anyhow::Result<Bytes>>()),
                Some(Duration::from_millis(20)),
            ),
            &mut machine,
            &CancellationToken::new(),
        )
        .await;
        drop(machine);

        assert_eq!(
            outcome,
            StreamOutcome::TransportFailed("no data received for 20ms".to_string())
        );
        assert_eq!(sink.created_count(ElementKind::System(Severity::Error)), 1);
    }

    #[test]
    fn test_complete_response_is_rendered_and_recorded() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        let body = br#"{"id":"test-response","choices":[{"message":{"content":"Hello"}}]}"#;

        finalize_complete_response(body, &mut history, &mut sink, &TextMarkdown).unwrap();

        assert_eq!(history.messages(), &[ApiMessage::assistant("Hello")]);
        assert_eq!(
            sink.live_elements(),
            vec![
                (ElementKind::System(Severity::Error), TEST_MODE_NOTICE),
                (ElementKind::Assistant, "Hello"),
            ]
        );
    }

    #[test]
    fn test_complete_response_without_content_adds_nothing() {
        let mut history = ConversationHistory::new();
        let mut sink = RecordingSink::new();
        finalize_complete_response(br#"{"choices":[]}"#, &mut history, &mut sink, &TextMarkdown)
            .unwrap();
        assert!(history.is_empty());
        assert!(sink.live_elements().is_empty());

        assert!(matches!(
            finalize_complete_response(b"<html>", &mut history, &mut sink, &TextMarkdown),
            Err(ChatError::Decode(_))
        ));
    }
}
