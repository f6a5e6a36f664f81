pub mod text_metrics;
pub mod transcript;

pub use transcript::{TerminalOptions, TerminalSink};
