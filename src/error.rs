/// Failures the chat session needs to tell apart.
///
/// Everything else travels as `anyhow::Error`; these are matched on with
/// `downcast_ref` where the caller reacts differently per kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Tool configuration rejected before any request was sent.
    #[error("invalid MCP configuration: {0}")]
    Config(String),
    /// The server answered with a non-success status.
    #[error("API error: {status} - {detail}")]
    Http { status: u16, detail: String },
    /// Connecting to or reading from the server failed.
    #[error("{0}")]
    Transport(String),
    /// A complete response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ChatError {
    /// Whether the server reported that it runs without an API key.
    pub fn indicates_test_mode(&self) -> bool {
        match self {
            Self::Http { detail, .. } => {
                detail.contains("ARK_API_KEY") || detail.contains("API密钥")
            }
            _ => false,
        }
    }
}
