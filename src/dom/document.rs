use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use html5ever::{LocalName, Namespace, QualName};
use kuchiki::traits::*;
use kuchiki::{Node, NodeRef};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    DispatchOutcome, Dom, DomError, DomEvent, EventKind, IntersectionEntry, Listener, ListenerId,
    NodeId, ObserverId, VisibilityCallback,
};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// One recorded tree or listener edit, in the order it was applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomPatch {
    TextContent {
        node: usize,
        value: String,
    },
    Attribute {
        node: usize,
        name: String,
        value: String,
    },
    RemoveAttribute {
        node: usize,
        name: String,
    },
    CreateElement {
        node: usize,
        tag_name: String,
    },
    AppendChild {
        parent: usize,
        child: usize,
    },
    InsertBefore {
        parent: usize,
        child: usize,
        reference: Option<usize>,
    },
    RemoveChild {
        parent: usize,
        child: usize,
    },
    Value {
        node: usize,
        value: String,
    },
    AddListener {
        node: usize,
        event: EventKind,
        listener: u64,
    },
    RemoveListener {
        node: usize,
        listener: u64,
    },
}

impl DomPatch {
    pub fn kind(&self) -> &'static str {
        match self {
            DomPatch::TextContent { .. } => "text_content",
            DomPatch::Attribute { .. } => "attribute",
            DomPatch::RemoveAttribute { .. } => "remove_attribute",
            DomPatch::CreateElement { .. } => "create_element",
            DomPatch::AppendChild { .. } => "append_child",
            DomPatch::InsertBefore { .. } => "insert_before",
            DomPatch::RemoveChild { .. } => "remove_child",
            DomPatch::Value { .. } => "value",
            DomPatch::AddListener { .. } => "add_listener",
            DomPatch::RemoveListener { .. } => "remove_listener",
        }
    }
}


/// Per-node state the kuchiki tree does not carry: form values, the checked
/// flag and attached listeners.
struct NodeSlot {
    node: NodeRef,
    value: String,
    checked: bool,
    listeners: Vec<(ListenerId, EventKind, Listener)>,
}

impl NodeSlot {
    fn new(node: NodeRef) -> Self {
        Self {
            node,
            value: String::new(),
            checked: false,
            listeners: Vec::new(),
        }
    }
}

struct Observer {
    target: NodeId,
    threshold: f64,
    callback: VisibilityCallback,
}

struct DocumentState {
    slots: Vec<NodeSlot>,
    // Slots keep every node alive, so addresses stay valid for the
    // document's lifetime.
    ids: HashMap<*const Node, NodeId>,
    observers: BTreeMap<ObserverId, Observer>,
    mutations: Vec<DomPatch>,
    next_listener_id: u64,
    next_observer_id: u64,
}

fn address(node: &NodeRef) -> *const Node {
    &**node
}

impl DocumentState {
    fn adopt(&mut self, node: NodeRef) -> NodeId {
        let id = NodeId::new(self.slots.len());
        self.ids.insert(address(&node), id);
        self.slots.push(NodeSlot::new(node));
        id
    }

    fn slot(&self, node: NodeId) -> Result<&NodeSlot, DomError> {
        self.slots.get(node.index()).ok_or(DomError::UnknownNode(node))
    }

    fn slot_mut(&mut self, node: NodeId) -> Result<&mut NodeSlot, DomError> {
        self.slots
            .get_mut(node.index())
            .ok_or(DomError::UnknownNode(node))
    }

    fn node(&self, node: NodeId) -> Result<NodeRef, DomError> {
        Ok(self.slot(node)?.node.clone())
    }

    fn element(&self, node: NodeId) -> Result<NodeRef, DomError> {
        let handle = self.node(node)?;
        if handle.as_element().is_none() {
            return Err(DomError::NotAnElement(node));
        }
        Ok(handle)
    }

    /// Text nodes are never handed out, so they have no id.
    fn id_of(&self, node: &NodeRef) -> Option<NodeId> {
        self.ids.get(&address(node)).copied()
    }

    fn select(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let scope = self.node(scope)?;
        let matches = scope
            .select(selector)
            .map_err(|()| DomError::Selector(selector.to_string()))?;
        // kuchiki walks inclusive descendants; the scope itself never matches.
        Ok(matches
            .filter(|element| *element.as_node() != scope)
            .filter_map(|element| self.id_of(element.as_node()))
            .collect())
    }
}

/// Document backed by a kuchiki tree, used by the tests and the headless
/// harness.
///
/// Every edit is appended to a [`DomPatch`] log that callers can drain to
/// assert on ordering, and visibility is driven explicitly through
/// [`MemoryDocument::emit_intersections`].
pub struct MemoryDocument {
    state: RefCell<DocumentState>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut state = DocumentState {
            slots: Vec::new(),
            ids: HashMap::new(),
            observers: BTreeMap::new(),
            mutations: Vec::new(),
            next_listener_id: 1,
            next_observer_id: 1,
        };
        state.adopt(NodeRef::new_document());
        Self {
            state: RefCell::new(state),
        }
    }

    pub fn drain_mutations(&self) -> Vec<DomPatch> {
        std::mem::take(&mut self.state.borrow_mut().mutations)
    }

    /// Serializes the subtree under `node` as HTML.
    pub fn outer_html(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .slots
            .get(node.index())
            .map(|slot| slot.node.to_string())
            .unwrap_or_default()
    }

    /// Total number of listeners currently attached anywhere in the tree.
    pub fn listener_count(&self) -> usize {
        self.state
            .borrow()
            .slots
            .iter()
            .map(|slot| slot.listeners.len())
            .sum()
    }

    pub fn listeners_on(&self, node: NodeId) -> usize {
        self.state
            .borrow()
            .slots
            .get(node.index())
            .map(|slot| slot.listeners.len())
            .unwrap_or(0)
    }

    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// Dispatches `event` to its target and then to each ancestor.
    ///
    /// Listeners are collected before any of them runs so they are free to
    /// edit the document, including removing themselves.
    pub fn dispatch(&self, event: &DomEvent) -> DispatchOutcome {
        let mut path = Vec::new();
        {
            let state = self.state.borrow();
            let mut current = Some(event.target);
            while let Some(node) = current {
                let Some(slot) = state.slots.get(node.index()) else {
                    break;
                };
                path.extend(
                    slot.listeners
                        .iter()
                        .filter(|(_, kind, _)| *kind == event.kind)
                        .map(|(id, _, listener)| (node, *id, listener.clone())),
                );
                current = slot.node.parent().and_then(|parent| state.id_of(&parent));
            }
        }

        let mut invoked = 0;
        for (node, id, listener) in path {
            // A listener earlier in the path may have removed this one.
            let still_attached = self
                .state
                .borrow()
                .slots
                .get(node.index())
                .is_some_and(|slot| slot.listeners.iter().any(|(other, _, _)| *other == id));
            if !still_attached {
                continue;
            }
            listener(event);
            invoked += 1;
        }

        trace!(
            target: "dom",
            event = event.kind.as_str(),
            node = %event.target,
            invoked,
            "dispatched event"
        );

        DispatchOutcome {
            default_prevented: event.default_prevented(),
            listeners_invoked: invoked,
        }
    }

    pub fn click(&self, node: NodeId) -> DispatchOutcome {
        self.dispatch(&DomEvent::new(EventKind::Click, node))
    }

    pub fn press_key(&self, node: NodeId, key: keyboard_types::Key) -> DispatchOutcome {
        self.dispatch(&DomEvent::key_press(node, key))
    }

    /// Sets the node's value and fires `input`, as typing would.
    pub fn type_value(&self, node: NodeId, value: &str) -> Result<DispatchOutcome, DomError> {
        self.set_value(node, value)?;
        Ok(self.dispatch(&DomEvent::new(EventKind::Input, node)))
    }

    /// Sets the node's value and fires `change`, as picking an option would.
    pub fn select_value(&self, node: NodeId, value: &str) -> Result<DispatchOutcome, DomError> {
        self.set_value(node, value)?;
        Ok(self.dispatch(&DomEvent::new(EventKind::Change, node)))
    }

    pub fn toggle_checked(&self, node: NodeId, checked: bool) -> Result<DispatchOutcome, DomError> {
        self.set_checked(node, checked)?;
        Ok(self.dispatch(&DomEvent::new(EventKind::Change, node)))
    }

    /// Reports `ratio` for every observer watching `node`.
    pub fn emit_intersections(&self, node: NodeId, ratios: &[f64]) {
        let observers: Vec<(f64, VisibilityCallback)> = self
            .state
            .borrow()
            .observers
            .values()
            .filter(|observer| observer.target == node)
            .map(|observer| (observer.threshold, observer.callback.clone()))
            .collect();

        for (threshold, callback) in observers {
            let entries: Vec<IntersectionEntry> = ratios
                .iter()
                .map(|ratio| IntersectionEntry {
                    target: node,
                    intersection_ratio: *ratio,
                    is_intersecting: *ratio > 0.0 && *ratio >= threshold,
                })
                .collect();
            callback(&entries);
        }
    }

    pub fn set_visible(&self, node: NodeId) {
        self.emit_intersections(node, &[1.0]);
    }

    pub fn set_hidden(&self, node: NodeId) {
        self.emit_intersections(node, &[0.0]);
    }

    fn record(state: &mut DocumentState, patch: DomPatch) {
        state.mutations.push(patch);
    }
}

impl Dom for MemoryDocument {
    fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    fn create_element(&self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let name = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(tag.as_str()),
        );
        let mut state = self.state.borrow_mut();
        let node = state.adopt(NodeRef::new_element(name, std::iter::empty()));
        Self::record(
            &mut state,
            DomPatch::CreateElement {
                node: node.index(),
                tag_name: tag,
            },
        );
        node
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        let state = self.state.borrow();
        let handle = &state.slots.get(node.index())?.node;
        if handle.as_document().is_some() {
            return Some("#document".to_string());
        }
        handle
            .as_element()
            .map(|element| element.name.local.to_string())
    }

    fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        let state = self.state.borrow();
        let root = state.node(self.root()).ok()?;
        let found = root.descendants().elements().find(|element| {
            let attributes = element.attributes.borrow();
            attributes.get("id") == Some(id)
        })?;
        state.id_of(found.as_node())
    }

    fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        Ok(self.state.borrow().select(scope, selector)?.into_iter().next())
    }

    fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        self.state.borrow().select(scope, selector)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        let parent = state.slots.get(node.index())?.node.parent()?;
        state.id_of(&parent)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        let mut sibling = state.slots.get(node.index())?.node.next_sibling();
        while let Some(candidate) = sibling {
            if let Some(id) = state.id_of(&candidate) {
                return Some(id);
            }
            sibling = candidate.next_sibling();
        }
        None
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let state = self.state.borrow();
        let Some(slot) = state.slots.get(node.index()) else {
            return Vec::new();
        };
        slot.node
            .children()
            .filter_map(|child| state.id_of(&child))
            .collect()
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let state = self.state.borrow();
        let (Ok(ancestor), Ok(node)) = (state.node(ancestor), state.node(node)) else {
            return false;
        };
        node.inclusive_ancestors().any(|candidate| candidate == ancestor)
    }

    fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        let parent_node = state.node(parent)?;
        let child_node = state.node(child)?;
        if parent_node
            .inclusive_ancestors()
            .any(|ancestor| ancestor == child_node)
        {
            return Err(DomError::HierarchyRequest { child });
        }

        let patch = match reference {
            Some(reference) => {
                let reference_node = state.node(reference)?;
                if reference_node.parent().as_ref() != Some(&parent_node) {
                    return Err(DomError::NotAChild {
                        parent,
                        child: reference,
                    });
                }
                if reference != child {
                    reference_node.insert_before(child_node);
                }
                DomPatch::InsertBefore {
                    parent: parent.index(),
                    child: child.index(),
                    reference: Some(reference.index()),
                }
            }
            None => {
                parent_node.append(child_node);
                DomPatch::AppendChild {
                    parent: parent.index(),
                    child: child.index(),
                }
            }
        };
        Self::record(&mut state, patch);
        Ok(())
    }

    fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        let parent_node = state.node(parent)?;
        let child_node = state.node(child)?;
        if child_node.parent().as_ref() != Some(&parent_node) {
            return Err(DomError::NotAChild { parent, child });
        }
        child_node.detach();
        Self::record(
            &mut state,
            DomPatch::RemoveChild {
                parent: parent.index(),
                child: child.index(),
            },
        );
        Ok(())
    }

    fn remove_all_children(&self, node: NodeId) -> Result<(), DomError> {
        let children: Vec<NodeRef> = self.state.borrow().node(node)?.children().collect();
        for child in children {
            let id = self.state.borrow().id_of(&child);
            match id {
                Some(id) => self.remove_child(node, id)?,
                None => child.detach(),
            }
        }
        Ok(())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let state = self.state.borrow();
        let element = state.slots.get(node.index())?.node.as_element()?;
        let attributes = element.attributes.borrow();
        attributes.get(name).map(str::to_string)
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        let handle = state.element(node)?;
        if let Some(element) = handle.as_element() {
            element
                .attributes
                .borrow_mut()
                .insert(name, value.to_string());
        }
        Self::record(
            &mut state,
            DomPatch::Attribute {
                node: node.index(),
                name: name.to_string(),
                value: value.to_string(),
            },
        );
        Ok(())
    }

    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        let handle = state.element(node)?;
        let removed = handle
            .as_element()
            .and_then(|element| element.attributes.borrow_mut().remove(name));
        if removed.is_some() {
            Self::record(
                &mut state,
                DomPatch::RemoveAttribute {
                    node: node.index(),
                    name: name.to_string(),
                },
            );
        }
        Ok(())
    }

    fn text_content(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .slots
            .get(node.index())
            .map(|slot| slot.node.text_contents())
            .unwrap_or_default()
    }

    fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.remove_all_children(node)?;
        let mut state = self.state.borrow_mut();
        let handle = state.node(node)?;
        if !text.is_empty() {
            handle.append(NodeRef::new_text(text));
        }
        Self::record(
            &mut state,
            DomPatch::TextContent {
                node: node.index(),
                value: text.to_string(),
            },
        );
        Ok(())
    }

    fn value(&self, node: NodeId) -> String {
        let state = self.state.borrow();
        let Some(slot) = state.slots.get(node.index()) else {
            return String::new();
        };
        let is_select = slot
            .node
            .as_element()
            .is_some_and(|element| &*element.name.local == "select");
        if !is_select || !slot.value.is_empty() {
            return slot.value.clone();
        }
        // A select without an explicit value reports its first option.
        let Ok(option) = slot.node.select_first("option") else {
            return String::new();
        };
        let explicit = option.attributes.borrow().get("value").map(str::to_string);
        explicit.unwrap_or_else(|| option.as_node().text_contents())
    }

    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        state.slot_mut(node)?.value = value.to_string();
        Self::record(
            &mut state,
            DomPatch::Value {
                node: node.index(),
                value: value.to_string(),
            },
        );
        Ok(())
    }

    fn is_checked(&self, node: NodeId) -> bool {
        self.state
            .borrow()
            .slots
            .get(node.index())
            .is_some_and(|slot| slot.checked)
    }

    fn set_checked(&self, node: NodeId, checked: bool) -> Result<(), DomError> {
        self.state.borrow_mut().slot_mut(node)?.checked = checked;
        Ok(())
    }

    fn add_event_listener(
        &self,
        node: NodeId,
        kind: EventKind,
        listener: Listener,
    ) -> Result<ListenerId, DomError> {
        let mut state = self.state.borrow_mut();
        let id = ListenerId::new(state.next_listener_id);
        state.next_listener_id += 1;
        state.slot_mut(node)?.listeners.push((id, kind, listener));
        Self::record(
            &mut state,
            DomPatch::AddListener {
                node: node.index(),
                event: kind,
                listener: id.raw(),
            },
        );
        Ok(id)
    }

    fn remove_event_listener(&self, node: NodeId, listener: ListenerId) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        let listeners = &mut state.slot_mut(node)?.listeners;
        let before = listeners.len();
        listeners.retain(|(id, _, _)| *id != listener);
        if listeners.len() == before {
            return Err(DomError::UnknownListener(listener));
        }
        Self::record(
            &mut state,
            DomPatch::RemoveListener {
                node: node.index(),
                listener: listener.raw(),
            },
        );
        Ok(())
    }

    fn observe_visibility(
        &self,
        node: NodeId,
        threshold: f64,
        callback: VisibilityCallback,
    ) -> Result<ObserverId, DomError> {
        let mut state = self.state.borrow_mut();
        state.slot(node)?;
        let id = ObserverId::new(state.next_observer_id);
        state.next_observer_id += 1;
        state.observers.insert(
            id,
            Observer {
                target: node,
                threshold,
                callback,
            },
        );
        Ok(id)
    }

    fn disconnect_observer(&self, observer: ObserverId) {
        self.state.borrow_mut().observers.remove(&observer);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn element(dom: &MemoryDocument, parent: NodeId, tag: &str) -> NodeId {
        let node = dom.create_element(tag);
        dom.append_child(parent, node).unwrap();
        node
    }

    #[test]
    fn insert_before_and_after_keep_sibling_order() {
        let dom = MemoryDocument::new();
        let list = element(&dom, dom.root(), "div");
        let first = element(&dom, list, "span");
        let last = element(&dom, list, "span");

        let middle = dom.create_element("span");
        dom.insert_after(first, middle).unwrap();
        assert_eq!(dom.children(list), vec![first, middle, last]);

        let head = dom.create_element("span");
        dom.insert_before(list, head, Some(first)).unwrap();
        assert_eq!(dom.children(list), vec![head, first, middle, last]);
        assert_eq!(dom.next_sibling(middle), Some(last));
        assert_eq!(dom.next_sibling(last), None);
    }

    #[test]
    fn rejects_cycles_and_foreign_children() {
        let dom = MemoryDocument::new();
        let outer = element(&dom, dom.root(), "div");
        let inner = element(&dom, outer, "div");
        assert!(matches!(
            dom.append_child(inner, outer),
            Err(DomError::HierarchyRequest { .. })
        ));
        let stray = dom.create_element("p");
        assert!(matches!(
            dom.remove_child(outer, stray),
            Err(DomError::NotAChild { .. })
        ));
        assert!(matches!(dom.insert_after(stray, inner), Err(DomError::Detached(_))));
    }

    #[test]
    fn set_text_content_replaces_children() {
        let dom = MemoryDocument::new();
        let output = element(&dom, dom.root(), "div");
        let paragraph = element(&dom, output, "p");
        dom.set_text_content(paragraph, "old").unwrap();
        assert_eq!(dom.text_content(output), "old");

        dom.set_text_content(output, "new").unwrap();
        assert!(dom.children(output).is_empty());
        assert_eq!(dom.text_content(output), "new");
    }

    #[test]
    fn dispatch_bubbles_and_tolerates_self_removal() {
        let dom = Rc::new(MemoryDocument::new());
        let outer = element(&dom, dom.root(), "div");
        let button = element(&dom, outer, "button");
        let hits = Rc::new(Cell::new(0));

        let own_id = Rc::new(Cell::new(None));
        let listener: Listener = {
            let dom = Rc::clone(&dom);
            let hits = Rc::clone(&hits);
            let own_id = Rc::clone(&own_id);
            Rc::new(move |event: &DomEvent| {
                hits.set(hits.get() + 1);
                event.prevent_default();
                if let Some(id) = own_id.get() {
                    dom.remove_event_listener(button, id).unwrap();
                }
            })
        };
        own_id.set(Some(dom.add_event_listener(button, EventKind::Click, listener).unwrap()));
        {
            let hits = Rc::clone(&hits);
            dom.add_event_listener(
                outer,
                EventKind::Click,
                Rc::new(move |_: &DomEvent| hits.set(hits.get() + 10)),
            )
            .unwrap();
        }

        let outcome = dom.click(button);
        assert!(outcome.default_prevented);
        assert_eq!(outcome.listeners_invoked, 2);
        assert_eq!(hits.get(), 11);

        let outcome = dom.click(button);
        assert_eq!(outcome.listeners_invoked, 1);
        assert_eq!(dom.listener_count(), 1);
    }

    #[test]
    fn select_value_defaults_to_first_option() {
        let dom = MemoryDocument::new();
        let select = element(&dom, dom.root(), "select");
        let first = element(&dom, select, "option");
        dom.set_attribute(first, "value", "text").unwrap();
        let second = element(&dom, select, "option");
        dom.set_attribute(second, "value", "pre").unwrap();

        assert_eq!(dom.value(select), "text");
        dom.set_value(select, "pre").unwrap();
        assert_eq!(dom.value(select), "pre");
    }

    #[test]
    fn intersections_respect_threshold() {
        let dom = MemoryDocument::new();
        let article = element(&dom, dom.root(), "article");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let observer = {
            let seen = Rc::clone(&seen);
            dom.observe_visibility(
                article,
                0.1,
                Rc::new(move |entries: &[IntersectionEntry]| {
                    seen.borrow_mut()
                        .extend(entries.iter().map(|entry| entry.is_intersecting));
                }),
            )
            .unwrap()
        };

        dom.emit_intersections(article, &[0.0, 0.05, 0.1, 0.5]);
        assert_eq!(*seen.borrow(), vec![false, false, true, true]);

        dom.disconnect_observer(observer);
        dom.set_visible(article);
        assert_eq!(seen.borrow().len(), 4);
        assert_eq!(dom.observer_count(), 0);
    }

    #[test]
    fn mutation_log_serializes_with_type_tags() {
        let dom = MemoryDocument::new();
        let node = element(&dom, dom.root(), "p");
        dom.set_attribute(node, "class", "warning").unwrap();
        let patches = dom.drain_mutations();
        let kinds: Vec<&str> = patches.iter().map(DomPatch::kind).collect();
        assert_eq!(kinds, vec!["create_element", "append_child", "attribute"]);

        let json = serde_json::to_value(&patches[2]).unwrap();
        assert_eq!(json["type"], "attribute");
        assert_eq!(json["value"], "warning");
        assert!(dom.drain_mutations().is_empty());
    }

    #[test]
    fn selectors_match_compounds_and_combinators() {
        let dom = MemoryDocument::new();
        let article = element(&dom, dom.root(), "article");
        dom.set_attribute(article, "id", "post").unwrap();
        let wrapper = element(&dom, article, "div");
        let input = element(&dom, wrapper, "input");
        dom.set_attribute(input, "type", "text").unwrap();
        dom.add_class(input, "primary").unwrap();

        let first = |selector: &str| dom.query_selector(dom.root(), selector).unwrap();
        assert_eq!(first(r#"input[type="text"]"#), Some(input));
        assert_eq!(first("input.primary[type]"), Some(input));
        assert_eq!(first("#post input"), Some(input));
        assert_eq!(first("article div > input"), Some(input));
        assert_eq!(first("article > input"), None);
        assert_eq!(first(r#"input[type="number"]"#), None);
        assert_eq!(dom.get_element_by_id("post"), Some(article));
    }

    #[test]
    fn query_scope_excludes_itself() {
        let dom = MemoryDocument::new();
        let outer = element(&dom, dom.root(), "div");
        let inner = element(&dom, outer, "div");
        assert_eq!(dom.query_selector_all(outer, "div").unwrap(), vec![inner]);
        assert!(dom.query_selector(inner, "div").unwrap().is_none());
    }

    #[test]
    fn malformed_selector_is_an_error() {
        let dom = MemoryDocument::new();
        assert!(matches!(
            dom.query_selector(dom.root(), "div.."),
            Err(DomError::Selector(_))
        ));
    }

    #[test]
    fn serializes_subtree_as_html() {
        let dom = MemoryDocument::new();
        let output = element(&dom, dom.root(), "div");
        dom.set_class_name(output, "output").unwrap();
        dom.set_text_content(output, "Ready").unwrap();
        assert_eq!(dom.outer_html(output), r#"<div class="output">Ready</div>"#);
    }
}
