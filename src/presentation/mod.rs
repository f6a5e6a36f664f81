//! Presentation capability consumed by the stream machine.
//!
//! The machine never draws anything itself. It asks a [`PresentationSink`]
//! for elements and hands them rendered markup; the sink decides what an
//! element looks like on its surface.

mod recording;

pub use recording::{PresentationOp, RecordingSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Hint,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    User,
    Assistant,
    /// Notices outside the conversation.
    System(Severity),
    /// Loading indicator for an in-flight tool call.
    ToolStatus,
    /// Collapsible summary of a finished tool call.
    ToolResult,
}

pub trait PresentationSink {
    fn create_element(&mut self, kind: ElementKind) -> ElementHandle;
    fn set_content(&mut self, handle: ElementHandle, markup: &str);
    fn remove_element(&mut self, handle: ElementHandle);
    fn scroll_to_latest(&mut self);
}

impl<S: PresentationSink + ?Sized> PresentationSink for &mut S {
    fn create_element(&mut self, kind: ElementKind) -> ElementHandle {
        (**self).create_element(kind)
    }

    fn set_content(&mut self, handle: ElementHandle, markup: &str) {
        (**self).set_content(handle, markup)
    }

    fn remove_element(&mut self, handle: ElementHandle) {
        (**self).remove_element(handle)
    }

    fn scroll_to_latest(&mut self) {
        (**self).scroll_to_latest()
    }
}
