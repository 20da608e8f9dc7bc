use std::rc::Rc;

use tracing::error;

use super::AuxWidget;
use crate::dom::{Dom, DomError, EventKind, NodeId};
use crate::lifecycle::Disposers;

/// A single control whose value is copied into the hidden text field on
/// every `input` event.
pub struct MirrorInput {
    node: NodeId,
    disposers: Disposers,
}

impl MirrorInput {
    /// `input[type=number]` seeded from the text field.
    pub fn number(
        dom: &Rc<dyn Dom>,
        parent: NodeId,
        text_input: NodeId,
    ) -> Result<Rc<Self>, DomError> {
        let input = dom.create_element("input");
        dom.set_attribute(input, "type", "number")?;
        Self::mount(dom, parent, text_input, input)
    }

    /// `textarea.toy-textarea` seeded from the text field.
    pub fn textarea(
        dom: &Rc<dyn Dom>,
        parent: NodeId,
        text_input: NodeId,
    ) -> Result<Rc<Self>, DomError> {
        let textarea = dom.create_element("textarea");
        dom.set_class_name(textarea, "toy-textarea")?;
        Self::mount(dom, parent, text_input, textarea)
    }

    fn mount(
        dom: &Rc<dyn Dom>,
        parent: NodeId,
        text_input: NodeId,
        node: NodeId,
    ) -> Result<Rc<Self>, DomError> {
        dom.set_value(node, &dom.value(text_input))?;
        dom.insert_before(parent, node, dom.next_sibling(text_input))?;

        let disposers = Disposers::new();
        let weak = Rc::downgrade(dom);
        disposers.listen(dom, node, EventKind::Input, move |_| {
            let Some(dom) = weak.upgrade() else {
                return;
            };
            if let Err(err) = dom.set_value(text_input, &dom.value(node)) {
                error!(target: "switcher", error = %err, "failed to mirror input value");
            }
        })?;
        Ok(Rc::new(Self { node, disposers }))
    }
}

impl AuxWidget for MirrorInput {
    fn node(&self) -> NodeId {
        self.node
    }

    fn dispose(&self) -> Result<(), DomError> {
        self.disposers.dispose_all()
    }
}
