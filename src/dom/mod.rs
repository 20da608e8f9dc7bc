//! The document surface the lifecycle engine talks to.
//!
//! Nothing in the engine reaches for a live browser document. Every element
//! lookup, attribute write and listener registration goes through [`Dom`], so
//! the whole engine runs against [`MemoryDocument`] in tests and in the
//! headless harness.

mod document;
mod events;
mod frames;

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

pub use document::{DomPatch, MemoryDocument};
pub use events::{DispatchOutcome, DomEvent, EventKind, Listener};
pub use frames::{FrameCallback, FrameClock, FrameHandle, FrameScheduler};

/// Opaque handle to a node owned by a [`Dom`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// One visibility report for an observed element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub intersection_ratio: f64,
    pub is_intersecting: bool,
}

pub type VisibilityCallback = Rc<dyn Fn(&[IntersectionEntry])>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("cannot insert {child} into itself or one of its descendants")]
    HierarchyRequest { child: NodeId },
    #[error("{0} is not attached to a parent")]
    Detached(NodeId),
    #[error("unknown listener {0:?}")]
    UnknownListener(ListenerId),
    #[error("{0} is not an element")]
    NotAnElement(NodeId),
    #[error("invalid selector {0:?}")]
    Selector(String),
}

/// Element creation, query, attribute and listener primitives.
///
/// Methods take `&self`: implementations use interior mutability so that
/// listeners invoked during dispatch can mutate the document they were
/// dispatched from.
pub trait Dom {
    fn root(&self) -> NodeId;
    fn create_element(&self, tag: &str) -> NodeId;
    fn tag_name(&self, node: NodeId) -> Option<String>;
    fn get_element_by_id(&self, id: &str) -> Option<NodeId>;
    fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError>;
    fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool;
    fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError>;
    fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError>;
    fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError>;
    fn remove_all_children(&self, node: NodeId) -> Result<(), DomError>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;
    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError>;
    fn text_content(&self, node: NodeId) -> String;
    fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError>;
    fn value(&self, node: NodeId) -> String;
    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError>;
    fn is_checked(&self, node: NodeId) -> bool;
    fn set_checked(&self, node: NodeId, checked: bool) -> Result<(), DomError>;

    fn add_event_listener(
        &self,
        node: NodeId,
        kind: EventKind,
        listener: Listener,
    ) -> Result<ListenerId, DomError>;
    fn remove_event_listener(&self, node: NodeId, listener: ListenerId) -> Result<(), DomError>;

    fn observe_visibility(
        &self,
        node: NodeId,
        threshold: f64,
        callback: VisibilityCallback,
    ) -> Result<ObserverId, DomError>;
    fn disconnect_observer(&self, observer: ObserverId);

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn add_class(&self, node: NodeId, class: &str) -> Result<(), DomError> {
        if self.has_class(node, class) {
            return Ok(());
        }
        let mut classes = self.attribute(node, "class").unwrap_or_default();
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self.set_attribute(node, "class", &classes)
    }

    fn remove_class(&self, node: NodeId, class: &str) -> Result<(), DomError> {
        let Some(classes) = self.attribute(node, "class") else {
            return Ok(());
        };
        let remaining: Vec<&str> = classes.split_whitespace().filter(|c| *c != class).collect();
        self.set_attribute(node, "class", &remaining.join(" "))
    }

    fn set_class_name(&self, node: NodeId, class: &str) -> Result<(), DomError> {
        self.set_attribute(node, "class", class)
    }

    fn data_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.attribute(node, &format!("data-{name}"))
    }

    fn set_data_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.set_attribute(node, &format!("data-{name}"), value)
    }

    fn is_disabled(&self, node: NodeId) -> bool {
        self.attribute(node, "disabled").is_some()
    }

    fn enable(&self, node: NodeId) -> Result<(), DomError> {
        self.remove_attribute(node, "disabled")
    }

    fn disable(&self, node: NodeId) -> Result<(), DomError> {
        self.set_attribute(node, "disabled", "")
    }

    fn is_hidden(&self, node: NodeId) -> bool {
        self.attribute(node, "hidden").is_some()
    }

    fn hide(&self, node: NodeId) -> Result<(), DomError> {
        self.set_attribute(node, "hidden", "")
    }

    fn reveal(&self, node: NodeId) -> Result<(), DomError> {
        self.remove_attribute(node, "hidden")
    }

    /// Inserts `child` directly after `node` under `node`'s parent.
    fn insert_after(&self, node: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent = self.parent(node).ok_or(DomError::Detached(node))?;
        self.insert_before(parent, child, self.next_sibling(node))
    }
}
