use std::collections::BTreeMap;

use super::{ElementHandle, ElementKind, PresentationSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationOp {
    Create {
        handle: ElementHandle,
        kind: ElementKind,
    },
    SetContent {
        handle: ElementHandle,
        markup: String,
    },
    Remove {
        handle: ElementHandle,
    },
    ScrollToLatest,
}

/// Sink that records every operation and tracks which elements survive.
#[derive(Debug, Default)]
pub struct RecordingSink {
    ops: Vec<PresentationOp>,
    live: BTreeMap<ElementHandle, (ElementKind, String)>,
    next_id: u64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[PresentationOp] {
        &self.ops
    }

    /// Operations other than scrolling, in order.
    pub fn visible_ops(&self) -> Vec<&PresentationOp> {
        self.ops
            .iter()
            .filter(|op| !matches!(op, PresentationOp::ScrollToLatest))
            .collect()
    }

    /// Elements still present, in creation order, with their last content.
    pub fn live_elements(&self) -> Vec<(ElementKind, &str)> {
        self.live
            .values()
            .map(|(kind, content)| (*kind, content.as_str()))
            .collect()
    }

    pub fn created_count(&self, kind: ElementKind) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, PresentationOp::Create { kind: k, .. } if *k == kind))
            .count()
    }
}

impl PresentationSink for RecordingSink {
    fn create_element(&mut self, kind: ElementKind) -> ElementHandle {
        let handle = ElementHandle(self.next_id);
        self.next_id += 1;
        self.live.insert(handle, (kind, String::new()));
        self.ops.push(PresentationOp::Create { handle, kind });
        handle
    }

    fn set_content(&mut self, handle: ElementHandle, markup: &str) {
        if let Some((_, content)) = self.live.get_mut(&handle) {
            *content = markup.to_string();
        }
        self.ops.push(PresentationOp::SetContent {
            handle,
            markup: markup.to_string(),
        });
    }

    fn remove_element(&mut self, handle: ElementHandle) {
        self.live.remove(&handle);
        self.ops.push(PresentationOp::Remove { handle });
    }

    fn scroll_to_latest(&mut self) {
        self.ops.push(PresentationOp::ScrollToLatest);
    }
}
