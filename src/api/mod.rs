pub mod client;
pub mod decode;
pub mod logging;
#[cfg(test)]
pub mod mock_client;
pub mod stream;

pub use client::{ByteStream, ChatClient, ChatResponse};
pub use decode::decode_record;
pub use stream::{record_stream, FrameSplitter, RecordStream};
