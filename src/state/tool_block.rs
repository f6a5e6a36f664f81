use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use serde_json::Value;
use std::sync::OnceLock;

pub const TOOL_INDICATOR_TEXT: &str = "⏳ Calling external tool...";
pub const TOOL_PLACEHOLDER_LINE: &str = "*Using tool...*";
pub const MISSING_ARGUMENTS_HINT: &str =
    "💡 Hint: include more detail in your question, such as a location or a date.";

const MISSING_ARGUMENT_PATTERNS: [&str; 4] = [
    "missing required argument",
    "required arguments missing",
    "missing required parameter",
    "所需参数缺失",
];

/// Pretty-print a tool value. Strings are shown as-is, everything else as
/// indented JSON.
pub fn pretty_tool_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Markdown for a finished tool call: a one-line summary, then the details.
pub fn tool_result_markdown(tool_name: &str, arguments: &Value, result: &Value) -> String {
    let arguments = pretty_tool_value(arguments);
    let result = pretty_tool_value(result);
    let (arguments_fence, result_fence) = (fence_for(&arguments), fence_for(&result));

    format!(
        "✅ Tool **{tool_name}** finished\n\n\
         **Arguments:**\n\n{arguments_fence}json\n{arguments}\n{arguments_fence}\n\n\
         **Result:**\n\n{result_fence}\n{result}\n{result_fence}"
    )
}

/// A code fence longer than any backtick run inside `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for ch in content.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

fn missing_argument_matcher() -> Option<&'static AhoCorasick> {
    static MATCHER: OnceLock<Option<AhoCorasick>> = OnceLock::new();
    MATCHER
        .get_or_init(|| {
            AhoCorasickBuilder::new()
                .ascii_case_insensitive(true)
                .build(MISSING_ARGUMENT_PATTERNS)
                .map_err(|error| tracing::warn!(%error, "missing-argument matcher unavailable"))
                .ok()
        })
        .as_ref()
}

/// Whether a tool error says the model left out required arguments.
pub fn signals_missing_arguments(message: &str) -> bool {
    match missing_argument_matcher() {
        Some(matcher) => matcher.is_match(message),
        None => {
            let lowered = message.to_lowercase();
            MISSING_ARGUMENT_PATTERNS
                .iter()
                .any(|pattern| lowered.contains(pattern))
        }
    }
}
