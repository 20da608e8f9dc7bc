use std::rc::Rc;

use serde_json::{json, Value};
use toybox::dom::{Dom, MemoryDocument, NodeId};
use toybox::inputs::{AuxWidget, KeyValueEditor, ValueType};

struct Fixture {
    memory: Rc<MemoryDocument>,
    text_input: NodeId,
    editor: Rc<KeyValueEditor>,
}

impl Fixture {
    fn new(initial: &str) -> Self {
        let memory = Rc::new(MemoryDocument::new());
        let dom: Rc<dyn Dom> = memory.clone();
        let form = dom.create_element("form");
        dom.append_child(dom.root(), form).unwrap();
        let text_input = dom.create_element("input");
        dom.set_attribute(text_input, "type", "text").unwrap();
        dom.append_child(form, text_input).unwrap();
        dom.set_value(text_input, initial).unwrap();

        let editor = KeyValueEditor::mount(&dom, form, text_input).unwrap();
        Self {
            memory,
            text_input,
            editor,
        }
    }

    fn all(&self, selector: &str) -> Vec<NodeId> {
        self.memory
            .query_selector_all(self.editor.node(), selector)
            .unwrap()
    }

    fn key_inputs(&self) -> Vec<NodeId> {
        self.all(r#"input[placeholder="Key"]"#)
    }

    fn stored(&self) -> Value {
        serde_json::from_str(&self.memory.value(self.text_input)).unwrap()
    }

    fn add(&self) {
        let add = self.all("button.add-pair")[0];
        self.memory.click(add);
    }
}

#[test]
fn renaming_onto_an_existing_key_is_ignored() {
    let fixture = Fixture::new(r#"{"a":"1","b":"2"}"#);
    let keys = fixture.key_inputs();
    assert_eq!(keys.len(), 2);

    fixture.memory.type_value(keys[1], "a").unwrap();

    let rows: Vec<String> = fixture.editor.rows().keys().map(str::to_string).collect();
    assert_eq!(rows, vec!["a", "b"]);
    assert_eq!(fixture.stored(), json!({ "a": "1", "b": "2" }));
    assert_eq!(fixture.memory.data_attribute(keys[1], "prev-key").as_deref(), Some("b"));
}

#[test]
fn rename_carries_value_and_type() {
    let fixture = Fixture::new(r#"{"count":3}"#);
    let key = fixture.key_inputs()[0];
    fixture.memory.type_value(key, "total").unwrap();

    assert_eq!(fixture.stored(), json!({ "total": 3 }));
    assert_eq!(fixture.editor.value_type("total"), ValueType::Number);
}

#[test]
fn adding_twice_leaves_one_empty_row() {
    let fixture = Fixture::new(r#"{"a":"1"}"#);
    fixture.add();
    fixture.add();

    assert_eq!(fixture.key_inputs().len(), 2);
    assert!(fixture.editor.rows().has_empty_key());
    assert_eq!(fixture.stored(), json!({ "a": "1" }));
}

#[test]
fn removing_a_row_rerenders_and_releases_its_listeners() {
    let fixture = Fixture::new(r#"{"a":"1","b":"2"}"#);
    // four per row plus the add button
    assert_eq!(fixture.editor.listener_count(), 9);

    let remove = fixture.all("button.remove-pair")[0];
    let outcome = fixture.memory.click(remove);
    assert!(outcome.default_prevented);

    assert_eq!(fixture.stored(), json!({ "b": "2" }));
    assert_eq!(fixture.editor.listener_count(), 5);
    assert_eq!(fixture.memory.listener_count(), 5);
}

#[test]
fn type_change_coerces_the_stored_value() {
    let fixture = Fixture::new(r#"{"n":"42","flag":"TRUE"}"#);
    let selects = fixture.all("select.kv-type");

    fixture.memory.select_value(selects[0], "number").unwrap();
    fixture.memory.select_value(selects[1], "boolean").unwrap();
    assert_eq!(fixture.stored(), json!({ "n": 42, "flag": true }));

    let values = fixture.all(r#"input[placeholder="Value"]"#);
    fixture.memory.type_value(values[0], "nope").unwrap();
    assert_eq!(fixture.stored(), json!({ "n": null, "flag": true }));
}

#[test]
fn initial_rows_follow_the_stored_key_order() {
    let fixture = Fixture::new(r#"{"zeta":"1","alpha":"2","mid":"3"}"#);
    let keys: Vec<String> = fixture
        .key_inputs()
        .into_iter()
        .map(|key| fixture.memory.value(key))
        .collect();
    assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    assert_eq!(
        fixture.memory.value(fixture.text_input),
        r#"{"zeta":"1","alpha":"2","mid":"3"}"#
    );
}

#[test]
fn legacy_array_is_rewritten_as_an_object() {
    let fixture = Fixture::new(r#"[{"key":"x","value":"1"},{"value":"orphan"}]"#);
    assert_eq!(fixture.key_inputs().len(), 1);
    assert_eq!(fixture.stored(), json!({ "x": "1" }));
}

#[test]
fn dispose_detaches_every_listener() {
    let fixture = Fixture::new(r#"{"a":"1"}"#);
    fixture.editor.dispose().unwrap();
    assert_eq!(fixture.memory.listener_count(), 0);

    let key = fixture.key_inputs()[0];
    fixture.memory.type_value(key, "renamed").unwrap();
    assert_eq!(fixture.stored(), json!({ "a": "1" }));
}
