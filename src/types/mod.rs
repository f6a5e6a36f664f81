mod api;
mod event;

pub use api::{
    ApiMessage, ChatRequest, CompletionChoice, CompletionMessage, CompletionResponse, Role,
    WireChoice, WireDelta, WirePayload,
};
pub use event::StreamEvent;
