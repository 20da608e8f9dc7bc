use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::{Map, Number, Value};
use tracing::{debug, error};

use super::AuxWidget;
use crate::dom::{Dom, DomError, DomEvent, EventKind, NodeId};
use crate::lifecycle::Disposers;

const PREV_KEY: &str = "prev-key";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ValueType {
    #[default]
    String,
    Number,
    Boolean,
    Json,
}

impl ValueType {
    pub const ALL: [ValueType; 4] = [
        ValueType::String,
        ValueType::Number,
        ValueType::Boolean,
        ValueType::Json,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Json => "json",
        }
    }

    pub fn from_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Converts the raw text of a value field into its JSON form.
    pub fn coerce(self, raw: &str) -> Value {
        match self {
            ValueType::String => Value::String(raw.to_string()),
            ValueType::Number => coerce_number(raw),
            ValueType::Boolean => Value::Bool(raw.trim().eq_ignore_ascii_case("true")),
            ValueType::Json => serde_json::from_str(raw).unwrap_or(Value::Null),
        }
    }

    fn infer(value: &Value) -> Self {
        match value {
            Value::Number(_) => ValueType::Number,
            Value::Bool(_) => ValueType::Boolean,
            Value::Array(_) | Value::Object(_) => ValueType::Json,
            Value::String(_) | Value::Null => ValueType::String,
        }
    }
}

fn coerce_number(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Key to raw value text, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMap {
    entries: Vec<(String, String)>,
}

impl RowMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn has_empty_key(&self) -> bool {
        self.contains_key("")
    }

    /// Overwrites the value under `key`, appending a new row if absent.
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let position = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Moves the row under `from` to `to`, keeping its position.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if self.contains_key(to) {
            return false;
        }
        match self.entries.iter_mut().find(|(existing, _)| existing == from) {
            Some((key, _)) => {
                *key = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Reads the hidden field's JSON into rows and inferred types.
///
/// Accepts an object, or the legacy array of `{key, value}` entries.
/// Anything else, malformed JSON included, yields no rows.
pub fn parse_existing_rows(text: &str) -> (RowMap, HashMap<String, ValueType>) {
    let mut rows = RowMap::new();
    let mut types = HashMap::new();
    let mut push = |key: &str, value: Option<&Value>| {
        let (text, kind) = match value {
            None | Some(Value::Null) => (String::new(), ValueType::String),
            Some(Value::String(text)) => (text.clone(), ValueType::String),
            Some(other) => (other.to_string(), ValueType::infer(other)),
        };
        rows.insert(key, &text);
        if kind != ValueType::String {
            types.insert(key.to_string(), kind);
        }
    };

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            for (key, value) in &map {
                push(key.as_str(), Some(value));
            }
        }
        Ok(Value::Array(entries)) => {
            for entry in &entries {
                let Some(key) = entry.get("key").and_then(Value::as_str) else {
                    continue;
                };
                if key.is_empty() {
                    continue;
                }
                push(key, entry.get("value"));
            }
        }
        Ok(_) | Err(_) => {}
    }
    (rows, types)
}

/// Serializes rows to the JSON object stored in the hidden field. Rows whose
/// key and value are both empty are left out.
pub fn serialize_rows(rows: &RowMap, types: &HashMap<String, ValueType>) -> String {
    let mut object = Map::new();
    for (key, value) in rows.iter() {
        if key.is_empty() && value.is_empty() {
            continue;
        }
        let kind = types.get(key).copied().unwrap_or_default();
        object.insert(key.to_string(), kind.coerce(value));
    }
    Value::Object(object).to_string()
}

/// Editable key/value rows bound to a hidden text field.
pub struct KeyValueEditor {
    dom: Rc<dyn Dom>,
    text_input: NodeId,
    container: NodeId,
    rows: RefCell<RowMap>,
    types: RefCell<HashMap<String, ValueType>>,
    disposers: Disposers,
    this: Weak<KeyValueEditor>,
}

impl KeyValueEditor {
    /// Builds the editor right after `text_input` inside `parent`, seeded
    /// from the text field's value.
    pub fn mount(
        dom: &Rc<dyn Dom>,
        parent: NodeId,
        text_input: NodeId,
    ) -> Result<Rc<Self>, DomError> {
        let (rows, types) = parse_existing_rows(&dom.value(text_input));
        let container = dom.create_element("div");
        dom.set_class_name(container, "kv-container")?;
        dom.insert_before(parent, container, dom.next_sibling(text_input))?;

        let editor = Rc::new_cyclic(|this| KeyValueEditor {
            dom: Rc::clone(dom),
            text_input,
            container,
            rows: RefCell::new(rows),
            types: RefCell::new(types),
            disposers: Disposers::new(),
            this: this.clone(),
        });
        editor.render()?;
        Ok(editor)
    }

    pub fn rows(&self) -> RowMap {
        self.rows.borrow().clone()
    }

    pub fn value_type(&self, key: &str) -> ValueType {
        self.types.borrow().get(key).copied().unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize {
        self.disposers.len()
    }

    /// Rebuilds every row. Existing listeners are released first.
    pub fn render(&self) -> Result<(), DomError> {
        self.disposers.dispose_all()?;
        self.dom.remove_all_children(self.container)?;

        let rows = self.rows.borrow().clone();
        for (key, value) in rows.iter() {
            self.render_row(key, value)?;
        }

        let add = self.dom.create_element("button");
        self.dom.set_attribute(add, "type", "button")?;
        self.dom.set_class_name(add, "add-pair")?;
        self.dom.set_text_content(add, "+")?;
        self.dom.append_child(self.container, add)?;
        let this = self.this.clone();
        self.disposers.listen(&self.dom, add, EventKind::Click, move |_| {
            if let Some(editor) = this.upgrade() {
                editor.report(editor.add_row());
            }
        })?;

        self.sync()
    }

    fn render_row(&self, key: &str, value: &str) -> Result<(), DomError> {
        let dom = &self.dom;
        let row = dom.create_element("div");
        dom.set_class_name(row, "kv-row")?;

        let key_input = dom.create_element("input");
        dom.set_attribute(key_input, "type", "text")?;
        dom.set_attribute(key_input, "placeholder", "Key")?;
        dom.set_value(key_input, key)?;
        dom.set_data_attribute(key_input, PREV_KEY, key)?;

        let value_input = dom.create_element("input");
        dom.set_attribute(value_input, "type", "text")?;
        dom.set_attribute(value_input, "placeholder", "Value")?;
        dom.set_value(value_input, value)?;

        let type_select = dom.create_element("select");
        dom.set_class_name(type_select, "kv-type")?;
        for kind in ValueType::ALL {
            let option = dom.create_element("option");
            dom.set_attribute(option, "value", kind.as_str())?;
            dom.set_text_content(option, kind.as_str())?;
            dom.append_child(type_select, option)?;
        }
        dom.set_value(type_select, self.value_type(key).as_str())?;

        let remove = dom.create_element("button");
        dom.set_attribute(remove, "type", "button")?;
        dom.set_class_name(remove, "remove-pair")?;
        dom.set_text_content(remove, "×")?;

        for child in [key_input, value_input, type_select, remove] {
            dom.append_child(row, child)?;
        }
        dom.append_child(self.container, row)?;

        let this = self.this.clone();
        self.disposers.listen(dom, key_input, EventKind::Input, move |_| {
            if let Some(editor) = this.upgrade() {
                editor.report(editor.rename(key_input));
            }
        })?;
        let this = self.this.clone();
        self.disposers.listen(dom, value_input, EventKind::Input, move |_| {
            if let Some(editor) = this.upgrade() {
                editor.report(editor.edit_value(key_input, value_input));
            }
        })?;
        let this = self.this.clone();
        self.disposers.listen(dom, type_select, EventKind::Change, move |_| {
            if let Some(editor) = this.upgrade() {
                editor.report(editor.change_type(key_input, type_select));
            }
        })?;
        let this = self.this.clone();
        self.disposers.listen(dom, remove, EventKind::Click, move |event: &DomEvent| {
            event.prevent_default();
            if let Some(editor) = this.upgrade() {
                editor.report(editor.remove_row(key_input));
            }
        })?;
        Ok(())
    }

    fn tracked_key(&self, key_input: NodeId) -> String {
        self.dom
            .data_attribute(key_input, PREV_KEY)
            .unwrap_or_default()
    }

    fn rename(&self, key_input: NodeId) -> Result<(), DomError> {
        let new_key = self.dom.value(key_input);
        let old_key = self.tracked_key(key_input);
        if new_key == old_key {
            return self.sync();
        }
        if new_key.is_empty() || self.rows.borrow().contains_key(&new_key) {
            return Ok(());
        }

        self.rows.borrow_mut().rename(&old_key, &new_key);
        {
            let mut types = self.types.borrow_mut();
            if let Some(kind) = types.remove(&old_key) {
                types.insert(new_key.clone(), kind);
            }
        }
        self.dom.set_data_attribute(key_input, PREV_KEY, &new_key)?;
        debug!(target: "kv", from = %old_key, to = %new_key, "renamed row");
        self.sync()
    }

    fn edit_value(&self, key_input: NodeId, value_input: NodeId) -> Result<(), DomError> {
        let key = self.tracked_key(key_input);
        let value = self.dom.value(value_input);
        self.rows.borrow_mut().insert(&key, &value);
        self.sync()
    }

    fn change_type(&self, key_input: NodeId, type_select: NodeId) -> Result<(), DomError> {
        let key = self.tracked_key(key_input);
        let kind = ValueType::from_value(&self.dom.value(type_select)).unwrap_or_default();
        self.types.borrow_mut().insert(key, kind);
        self.sync()
    }

    /// Appends an empty row unless one already exists, then re-renders.
    pub fn add_row(&self) -> Result<(), DomError> {
        {
            let mut rows = self.rows.borrow_mut();
            if !rows.has_empty_key() {
                rows.insert("", "");
            }
        }
        self.render()
    }

    fn remove_row(&self, key_input: NodeId) -> Result<(), DomError> {
        let key = self.tracked_key(key_input);
        self.rows.borrow_mut().remove(&key);
        self.types.borrow_mut().remove(&key);
        self.render()
    }

    fn sync(&self) -> Result<(), DomError> {
        let serialized = serialize_rows(&self.rows.borrow(), &self.types.borrow());
        self.dom.set_value(self.text_input, &serialized)
    }

    fn report(&self, result: Result<(), DomError>) {
        if let Err(err) = result {
            error!(target: "kv", error = %err, "key/value editor update failed");
        }
    }
}

impl AuxWidget for KeyValueEditor {
    fn node(&self) -> NodeId {
        self.container
    }

    fn dispose(&self) -> Result<(), DomError> {
        self.disposers.dispose_all()
    }
}
