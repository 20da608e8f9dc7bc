use std::cell::Cell;
use std::rc::Rc;

use keyboard_types::Key;
use serde::{Deserialize, Serialize};

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Click,
    KeyPress,
    Input,
    Change,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::KeyPress => "keypress",
            EventKind::Input => "input",
            EventKind::Change => "change",
        }
    }
}

/// An event travelling from its target up through its ancestors.
#[derive(Debug)]
pub struct DomEvent {
    pub kind: EventKind,
    pub target: NodeId,
    pub key: Option<Key>,
    default_prevented: Cell<bool>,
}

impl DomEvent {
    pub fn new(kind: EventKind, target: NodeId) -> Self {
        Self {
            kind,
            target,
            key: None,
            default_prevented: Cell::new(false),
        }
    }

    pub fn key_press(target: NodeId, key: Key) -> Self {
        Self {
            key: Some(key),
            ..Self::new(EventKind::KeyPress, target)
        }
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn is_enter(&self) -> bool {
        matches!(self.key, Some(Key::Enter))
    }
}

pub type Listener = Rc<dyn Fn(&DomEvent)>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub listeners_invoked: usize,
}
