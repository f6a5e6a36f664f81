use serde_json::Value;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::util::parse_bool_flag;

const DEFAULT_LOG_PATH: &str = "/tmp/mcpchat.log";
const DEFAULT_LOG_FILTER: &str = "mcpchat=info";
const DEBUG_PAYLOAD_ENV: &str = "MCPCHAT_DEBUG_PAYLOAD";
const LOG_PATH_ENV: &str = "MCPCHAT_LOG_PATH";
const LOG_FILTER_ENV: &str = "MCPCHAT_LOG";

/// Install the global tracing subscriber.
///
/// Logs go to a file whenever stderr is a terminal so they never interleave
/// with the live transcript; piped runs log to stderr.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(path) = resolve_log_path() {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let _ = builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(error) => eprintln!("mcpchat: cannot open log file {path}: {error}"),
        }
    }

    let _ = builder.with_writer(std::io::stderr).try_init();
}

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(url = request_url, "chat request payload:\n{formatted_payload}");
}

pub fn emit_malformed_record(data: &str, parse_error: &serde_json::Error) {
    tracing::warn!(error = %parse_error, data, "malformed stream record");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_LOG_PATH.to_string())
            } else {
                None
            }
        })
}
