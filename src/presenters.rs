use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use crate::dom::{Dom, DomError, NodeId};

/// Renders a result string into a new, detached element.
pub type Presenter = Rc<dyn Fn(&str, &dyn Dom) -> Result<NodeId, DomError>>;

pub const DEFAULT_PRESENTER: &str = "text";

/// String-keyed presenter table with an explicit `text` fallback.
#[derive(Clone)]
pub struct PresenterRegistry {
    presenters: HashMap<String, Presenter>,
}

impl Default for PresenterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            presenters: HashMap::new(),
        };
        registry.register(DEFAULT_PRESENTER, present_text);
        registry.register("pre", present_pre);
        registry
    }
}

impl PresenterRegistry {
    pub fn register<F>(&mut self, key: &str, presenter: F)
    where
        F: Fn(&str, &dyn Dom) -> Result<NodeId, DomError> + 'static,
    {
        self.presenters.insert(key.to_string(), Rc::new(presenter));
    }

    pub fn get(&self, key: &str) -> Option<Presenter> {
        self.presenters.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.presenters.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the presenter for `key`, or the text presenter when the key
    /// is unknown.
    pub fn resolve(&self, key: &str) -> Presenter {
        if let Some(presenter) = self.get(key) {
            return presenter;
        }
        warn!(target: "component", presenter = key, "unknown presenter, falling back to text");
        self.get(DEFAULT_PRESENTER)
            .unwrap_or_else(|| Rc::new(present_text) as Presenter)
    }

    /// Replaces everything under `parent` with `content` rendered by `key`.
    pub fn present(
        &self,
        dom: &dyn Dom,
        key: &str,
        content: &str,
        parent: NodeId,
    ) -> Result<NodeId, DomError> {
        let element = (self.resolve(key))(content, dom)?;
        dom.remove_all_children(parent)?;
        dom.append_child(parent, element)?;
        Ok(element)
    }
}

pub fn present_text(content: &str, dom: &dyn Dom) -> Result<NodeId, DomError> {
    let paragraph = dom.create_element("p");
    dom.set_text_content(paragraph, content)?;
    Ok(paragraph)
}

pub fn present_pre(content: &str, dom: &dyn Dom) -> Result<NodeId, DomError> {
    let pre = dom.create_element("pre");
    dom.set_text_content(pre, &pre_content(content))?;
    Ok(pre)
}

/// `[a, b]` becomes one item per line; anything else is kept verbatim.
fn pre_content(content: &str) -> String {
    let Some(inner) = content
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return content.to_string();
    };
    let inner = inner.trim();
    if inner.is_empty() {
        return String::new();
    }
    inner
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}
