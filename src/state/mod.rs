mod driver;
mod history;
mod machine;
mod session;
pub mod tool_block;

pub use driver::{drive_stream, finalize_complete_response, StreamOutcome, TEST_MODE_NOTICE};
pub use history::ConversationHistory;
pub use machine::{StreamMachine, StreamOptions, StreamPhase};
pub use session::{ChatSession, TurnOutcome, SERVER_UNREACHABLE_NOTICE, THINKING_TEXT};
