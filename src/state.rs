//! Process-wide output state shared by every toy on the page.
//!
//! Readers get an owned clone and writers hand over an owned value, so no
//! toy can hold a reference into the store across a suspension point.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state must be an object with at least a 'temporary' property")]
    MissingTemporary,
}

#[derive(Clone)]
pub struct StateStore {
    inner: Rc<RefCell<Value>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_value(json!({ "blog": null, "temporary": {}, "output": {} }))
    }

    pub fn with_value(value: Value) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
        }
    }

    pub fn read(&self) -> Value {
        self.inner.borrow().clone()
    }

    pub fn write(&self, value: Value) {
        *self.inner.borrow_mut() = value;
    }

    /// Replaces the whole state, as a toy's `setData` would.
    ///
    /// `blog` and `output` survive when the new value leaves them out.
    pub fn set_data(&self, value: Value) -> Result<(), StateError> {
        let Value::Object(mut incoming) = value else {
            return Err(StateError::MissingTemporary);
        };
        if !incoming.contains_key("temporary") {
            return Err(StateError::MissingTemporary);
        }

        let current = self.read();
        for preserved in ["blog", "output"] {
            if !incoming.contains_key(preserved) {
                if let Some(existing) = current.get(preserved) {
                    incoming.insert(preserved.to_string(), existing.clone());
                }
            }
        }
        self.write(Value::Object(incoming));
        debug!(target: "state", "global state replaced");
        Ok(())
    }

    /// Deep-merges `value["temporary"]` into the stored temporary section.
    pub fn set_local_temporary_data(&self, value: Value) -> Result<(), StateError> {
        let Some(temporary) = value.get("temporary").cloned() else {
            return Err(StateError::MissingTemporary);
        };
        let mut state = into_object(self.read());
        let slot = state
            .entry("temporary")
            .or_insert_with(|| Value::Object(Map::new()));
        deep_merge(slot, temporary);
        self.write(Value::Object(state));
        Ok(())
    }

    pub fn record_output(&self, article: &str, result: Value) {
        let mut state = into_object(self.read());
        let output = state
            .entry("output")
            .or_insert_with(|| Value::Object(Map::new()));
        if !output.is_object() {
            *output = Value::Object(Map::new());
        }
        if let Value::Object(entries) = output {
            entries.insert(article.to_string(), result);
        }
        self.write(Value::Object(state));
    }

    pub fn output(&self, article: &str) -> Option<Value> {
        self.inner
            .borrow()
            .get("output")
            .and_then(|output| output.get(article))
            .cloned()
    }
}

/// Non-object state is discarded.
fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}
