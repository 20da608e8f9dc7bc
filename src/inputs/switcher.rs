use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error};

use super::{AuxWidget, DendriteForm, KeyValueEditor, MirrorInput, PAGE_FIELDS, STORY_FIELDS};
use crate::dom::{Dom, DomError, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputMethod {
    Text,
    Number,
    KeyValue,
    Textarea,
    DendriteStory,
    DendritePage,
    /// Any value without a dedicated widget.
    Default,
}

impl InputMethod {
    pub fn from_value(value: &str) -> Self {
        match value {
            "text" => InputMethod::Text,
            "number" => InputMethod::Number,
            "kv" | "key-value" => InputMethod::KeyValue,
            "textarea" => InputMethod::Textarea,
            "dendrite-story" => InputMethod::DendriteStory,
            "dendrite-page" => InputMethod::DendritePage,
            _ => InputMethod::Default,
        }
    }
}

impl fmt::Display for InputMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputMethod::Text => "text",
            InputMethod::Number => "number",
            InputMethod::KeyValue => "kv",
            InputMethod::Textarea => "textarea",
            InputMethod::DendriteStory => "dendrite-story",
            InputMethod::DendritePage => "dendrite-page",
            InputMethod::Default => "default",
        };
        f.write_str(name)
    }
}

/// Builds the widget for one input method: `(dom, container, text_input)`.
pub type SetupFn =
    Rc<dyn Fn(&Rc<dyn Dom>, NodeId, NodeId) -> Result<Option<Rc<dyn AuxWidget>>, DomError>>;

#[derive(Clone)]
pub struct InputMethodTable {
    handlers: HashMap<InputMethod, SetupFn>,
}

impl Default for InputMethodTable {
    fn default() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
        };
        table.register(InputMethod::Text, |_, _, _| Ok(None));
        table.register(InputMethod::Default, |_, _, _| Ok(None));
        table.register(InputMethod::Number, |dom, container, text_input| {
            let widget: Rc<dyn AuxWidget> = MirrorInput::number(dom, container, text_input)?;
            Ok(Some(widget))
        });
        table.register(InputMethod::Textarea, |dom, container, text_input| {
            let widget: Rc<dyn AuxWidget> = MirrorInput::textarea(dom, container, text_input)?;
            Ok(Some(widget))
        });
        table.register(InputMethod::KeyValue, |dom, container, text_input| {
            let widget: Rc<dyn AuxWidget> = KeyValueEditor::mount(dom, container, text_input)?;
            Ok(Some(widget))
        });
        table.register(InputMethod::DendriteStory, |dom, container, text_input| {
            let widget: Rc<dyn AuxWidget> =
                DendriteForm::mount(dom, container, text_input, &STORY_FIELDS)?;
            Ok(Some(widget))
        });
        table.register(InputMethod::DendritePage, |dom, container, text_input| {
            let widget: Rc<dyn AuxWidget> =
                DendriteForm::mount(dom, container, text_input, &PAGE_FIELDS)?;
            Ok(Some(widget))
        });
        table
    }
}

impl InputMethodTable {
    pub fn register<F>(&mut self, method: InputMethod, setup: F)
    where
        F: Fn(&Rc<dyn Dom>, NodeId, NodeId) -> Result<Option<Rc<dyn AuxWidget>>, DomError>
            + 'static,
    {
        self.handlers.insert(method, Rc::new(setup));
    }

    pub fn get(&self, method: InputMethod) -> Option<SetupFn> {
        self.handlers.get(&method).cloned()
    }
}

/// Owns at most one auxiliary widget for a toy's text field and swaps it
/// when the input-method dropdown changes.
pub struct InputSwitcher {
    dom: Rc<dyn Dom>,
    container: NodeId,
    text_input: NodeId,
    table: Rc<InputMethodTable>,
    current: RefCell<Option<Rc<dyn AuxWidget>>>,
    method: Cell<InputMethod>,
}

impl InputSwitcher {
    pub fn new(
        dom: Rc<dyn Dom>,
        container: NodeId,
        text_input: NodeId,
        table: Rc<InputMethodTable>,
    ) -> Self {
        Self {
            dom,
            container,
            text_input,
            table,
            current: RefCell::new(None),
            method: Cell::new(InputMethod::Text),
        }
    }

    pub fn method(&self) -> InputMethod {
        self.method.get()
    }

    pub fn current_widget(&self) -> Option<Rc<dyn AuxWidget>> {
        self.current.borrow().clone()
    }

    /// Applies the dropdown value. Failures are logged, never returned.
    pub fn select(&self, value: &str) {
        let method = InputMethod::from_value(value);
        debug!(target: "switcher", method = %method, "switching input method");

        if let Err(err) = self.teardown() {
            error!(target: "switcher", error = %err, "failed to tear down previous input widget");
        }

        if let Some(setup) = self.table.get(method) {
            match setup(&self.dom, self.container, self.text_input) {
                Ok(widget) => *self.current.borrow_mut() = widget,
                Err(err) => {
                    error!(target: "switcher", method = %method, error = %err, "failed to build input widget")
                }
            }
        }

        let visibility = if method == InputMethod::Text {
            self.dom
                .reveal(self.text_input)
                .and_then(|_| self.dom.enable(self.text_input))
        } else {
            self.dom
                .hide(self.text_input)
                .and_then(|_| self.dom.disable(self.text_input))
        };
        if let Err(err) = visibility {
            error!(target: "switcher", error = %err, "failed to update text input visibility");
        }
        self.method.set(method);
    }

    /// Disposes the current widget and removes it from the tree.
    pub fn teardown(&self) -> Result<(), DomError> {
        let Some(widget) = self.current.borrow_mut().take() else {
            return Ok(());
        };
        let disposed = widget.dispose();
        let node = widget.node();
        let removed = match self.dom.parent(node) {
            Some(parent) => self.dom.remove_child(parent, node),
            None => Ok(()),
        };
        disposed.and(removed)
    }
}
