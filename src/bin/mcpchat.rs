use anyhow::{Context, Result};
use mcpchat::api::logging::init_logging;
use mcpchat::config::Config;
use mcpchat::presentation::Severity;
use mcpchat::state::ChatSession;
use mcpchat::ui::TerminalSink;
use std::io::{IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const WELCOME_TEXT: &str = "👋 Welcome to the LLM + MCP chat demo! I can look up the weather or \
answer other questions. Type your question below.";
const PROMPT: &str = "> ";

fn is_exit_command(line: &str) -> bool {
    matches!(line, "/exit" | "/quit")
}

fn show_prompt(interactive: bool) -> Result<()> {
    if interactive {
        let mut stdout = std::io::stdout();
        write!(stdout, "{PROMPT}")?;
        stdout.flush()?;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load()?;
    config.validate()?;
    tracing::info!(url = %config.base_url, model = %config.model, stream = config.stream, "starting");

    let mut sink = TerminalSink::stdout(config.expand_tool_details);
    let mut session = ChatSession::new(config)?;

    session.notice(&mut sink, Severity::Info, WELCOME_TEXT);
    session.health_check(&mut sink).await;
    sink.commit().context("failed to write to the terminal")?;

    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        show_prompt(interactive)?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if is_exit_command(message) {
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });

        let outcome = session.send(message, &mut sink, &cancel).await;
        watcher.abort();
        tracing::debug!(?outcome, "turn finished");
        sink.commit().context("failed to write to the terminal")?;
    }

    tracing::info!(messages = session.history().len(), "exiting");
    Ok(())
}
