use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::error;

use super::AuxWidget;
use crate::dom::{Dom, DomError, EventKind, NodeId};
use crate::lifecycle::Disposers;

const OPTION_FIELDS: [(&str, &str); 5] = [
    ("content", "Content"),
    ("firstOption", "First option"),
    ("secondOption", "Second option"),
    ("thirdOption", "Third option"),
    ("fourthOption", "Fourth option"),
];

pub const STORY_FIELDS: [(&str, &str); 6] = [
    ("title", "Title"),
    OPTION_FIELDS[0],
    OPTION_FIELDS[1],
    OPTION_FIELDS[2],
    OPTION_FIELDS[3],
    OPTION_FIELDS[4],
];

pub const PAGE_FIELDS: [(&str, &str); 6] = [
    ("optionId", "Option ID"),
    OPTION_FIELDS[0],
    OPTION_FIELDS[1],
    OPTION_FIELDS[2],
    OPTION_FIELDS[3],
    OPTION_FIELDS[4],
];

/// Labelled fields for a branching-story entry, kept in sync with the
/// hidden text field as a JSON object.
pub struct DendriteForm {
    form: NodeId,
    disposers: Disposers,
}

impl DendriteForm {
    pub fn mount(
        dom: &Rc<dyn Dom>,
        parent: NodeId,
        text_input: NodeId,
        fields: &[(&str, &str)],
    ) -> Result<Rc<Self>, DomError> {
        let existing = dom.value(text_input);
        let source = if existing.is_empty() { "{}" } else { existing.as_str() };
        let data = match serde_json::from_str::<Value>(source) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let data = Rc::new(RefCell::new(data));

        let form = dom.create_element("div");
        dom.set_class_name(form, "dendrite-form")?;
        dom.insert_before(parent, form, dom.next_sibling(text_input))?;

        let disposers = Disposers::new();
        for (key, label_text) in fields {
            let wrapper = dom.create_element("div");
            let label = dom.create_element("label");
            dom.set_text_content(label, label_text)?;

            let input = if *key == "content" {
                dom.create_element("textarea")
            } else {
                let input = dom.create_element("input");
                dom.set_attribute(input, "type", "text")?;
                input
            };
            dom.set_attribute(input, "placeholder", label_text)?;
            if let Some(value) = data.borrow().get(*key) {
                let text = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                dom.set_value(input, &text)?;
            }

            dom.append_child(wrapper, label)?;
            dom.append_child(wrapper, input)?;
            dom.append_child(form, wrapper)?;

            let key = key.to_string();
            let data = Rc::clone(&data);
            let weak = Rc::downgrade(dom);
            disposers.listen(dom, input, EventKind::Input, move |_| {
                let Some(dom) = weak.upgrade() else {
                    return;
                };
                data.borrow_mut()
                    .insert(key.clone(), Value::String(dom.value(input)));
                if let Err(err) = sync(dom.as_ref(), text_input, &data.borrow()) {
                    error!(target: "switcher", error = %err, "failed to sync story form");
                }
            })?;
        }

        sync(dom.as_ref(), text_input, &data.borrow())?;
        Ok(Rc::new(Self { form, disposers }))
    }
}

fn sync(dom: &dyn Dom, text_input: NodeId, data: &Map<String, Value>) -> Result<(), DomError> {
    dom.set_value(text_input, &Value::Object(data.clone()).to_string())
}

impl AuxWidget for DendriteForm {
    fn node(&self) -> NodeId {
        self.form
    }

    fn dispose(&self) -> Result<(), DomError> {
        self.disposers.dispose_all()
    }
}
