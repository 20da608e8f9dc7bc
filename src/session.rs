//! Page-level runtime: the shared context every toy is built from, and the
//! entry point that arms one visibility loader per toy article.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::dom::{Dom, DomError, FrameClock, FrameScheduler, MemoryDocument};
use crate::inputs::InputMethodTable;
use crate::lifecycle::{Component, VisibilityLoader};
use crate::net::{Fetch, HttpFetcher};
use crate::presenters::PresenterRegistry;
use crate::state::StateStore;
use crate::toy::{ModuleLoader, ModuleRegistry};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("invalid component registry: {0}")]
    Registry(#[from] serde_json::Error),
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// One entry of the page's component registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    /// Id of the article element hosting the toy.
    pub id: String,
    pub module_path: String,
    pub function_name: String,
}

impl ComponentDescriptor {
    pub fn new(id: &str, module_path: &str, function_name: &str) -> Self {
        Self {
            id: id.to_string(),
            module_path: module_path.to_string(),
            function_name: function_name.to_string(),
        }
    }

    /// Parses the JSON array a page embeds for its toys.
    pub fn parse_registry(json: &str) -> Result<Vec<Self>, RuntimeError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Background work spawned on the current `LocalSet`: module loads and
/// toy fetches.
///
/// `spawn` must be called from inside a `LocalSet`.
#[derive(Clone, Default)]
pub struct TaskTracker {
    handles: Rc<RefCell<Vec<JoinHandle<()>>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let handle = tokio::task::spawn_local(future);
        let mut handles = self.handles.borrow_mut();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Tasks spawned and not yet awaited by `settle`.
    pub fn pending(&self) -> usize {
        self.handles
            .borrow()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Waits until every task, including tasks spawned by other tasks,
    /// has finished.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.handles.borrow_mut());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    error!(target: "loader", error = %err, "background task failed");
                }
            }
        }
    }
}

/// Everything a loader or component needs, shared by reference.
pub struct RuntimeContext {
    pub dom: Rc<dyn Dom>,
    pub loader: Rc<dyn ModuleLoader>,
    pub fetch: Rc<dyn Fetch>,
    pub frames: Rc<dyn FrameScheduler>,
    pub state: StateStore,
    pub presenters: Rc<PresenterRegistry>,
    pub input_methods: Rc<InputMethodTable>,
    pub tasks: TaskTracker,
    pub config: RuntimeConfig,
    components: RefCell<HashMap<String, Rc<Component>>>,
}

impl RuntimeContext {
    /// Records a live component, tearing down any previous one for the same
    /// article.
    pub fn register_component(&self, component: Rc<Component>) {
        let previous = self
            .components
            .borrow_mut()
            .insert(component.article_id().to_string(), component);
        if let Some(previous) = previous {
            if let Err(err) = previous.teardown() {
                error!(target: "component", article = %previous.article_id(), error = %err, "failed to tear down replaced toy");
            }
        }
    }

    pub fn component(&self, article_id: &str) -> Option<Rc<Component>> {
        self.components.borrow().get(article_id).cloned()
    }

    fn take_component(&self, article_id: &str) -> Option<Rc<Component>> {
        self.components.borrow_mut().remove(article_id)
    }
}

pub struct ToyRuntimeBuilder {
    dom: Rc<dyn Dom>,
    loader: Option<Rc<dyn ModuleLoader>>,
    fetch: Option<Rc<dyn Fetch>>,
    frames: Option<Rc<dyn FrameScheduler>>,
    state: Option<StateStore>,
    presenters: Option<PresenterRegistry>,
    input_methods: Option<InputMethodTable>,
    config: RuntimeConfig,
}

impl ToyRuntimeBuilder {
    pub fn with_loader(mut self, loader: Rc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_fetch(mut self, fetch: Rc<dyn Fetch>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    pub fn with_frames(mut self, frames: Rc<dyn FrameScheduler>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_presenters(mut self, presenters: PresenterRegistry) -> Self {
        self.presenters = Some(presenters);
        self
    }

    pub fn with_input_methods(mut self, input_methods: InputMethodTable) -> Self {
        self.input_methods = Some(input_methods);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Fills unset pieces with defaults. Without an explicit fetcher an
    /// HTTP client is built from the config.
    pub fn build(self) -> Result<ToyRuntime, RuntimeError> {
        let fetch: Rc<dyn Fetch> = match self.fetch {
            Some(fetch) => fetch,
            None => Rc::new(HttpFetcher::new(&self.config)?),
        };
        let ctx = RuntimeContext {
            dom: self.dom,
            loader: self
                .loader
                .unwrap_or_else(|| Rc::new(ModuleRegistry::new())),
            fetch,
            frames: self.frames.unwrap_or_else(|| Rc::new(FrameClock::new())),
            state: self.state.unwrap_or_default(),
            presenters: Rc::new(self.presenters.unwrap_or_default()),
            input_methods: Rc::new(self.input_methods.unwrap_or_default()),
            tasks: TaskTracker::new(),
            config: self.config,
            components: RefCell::new(HashMap::new()),
        };
        Ok(ToyRuntime {
            ctx: Rc::new(ctx),
            loaders: RefCell::new(HashMap::new()),
        })
    }
}

/// Owns the page's loaders and live components.
pub struct ToyRuntime {
    ctx: Rc<RuntimeContext>,
    loaders: RefCell<HashMap<String, Rc<VisibilityLoader>>>,
}

impl ToyRuntime {
    pub fn builder(dom: Rc<dyn Dom>) -> ToyRuntimeBuilder {
        ToyRuntimeBuilder {
            dom,
            loader: None,
            fetch: None,
            frames: None,
            state: None,
            presenters: None,
            input_methods: None,
            config: RuntimeConfig::default(),
        }
    }

    /// A runtime over a fresh in-memory document.
    pub fn in_memory() -> (Rc<MemoryDocument>, ToyRuntimeBuilder) {
        let document = Rc::new(MemoryDocument::new());
        let builder = Self::builder(document.clone());
        (document, builder)
    }

    pub fn context(&self) -> &Rc<RuntimeContext> {
        &self.ctx
    }

    pub fn dom(&self) -> &Rc<dyn Dom> {
        &self.ctx.dom
    }

    pub fn state(&self) -> &StateStore {
        &self.ctx.state
    }

    /// Arms one visibility loader per descriptor whose article exists.
    /// Returns how many were armed.
    pub fn initialize_visible_components(&self, descriptors: &[ComponentDescriptor]) -> usize {
        if descriptors.is_empty() {
            warn!(target: "loader", "no interactive components found to initialize");
            return 0;
        }
        info!(target: "loader", count = descriptors.len(), "initializing interactive components");

        let mut armed = 0;
        for descriptor in descriptors {
            let Some(article) = self.ctx.dom.get_element_by_id(&descriptor.id) else {
                warn!(target: "loader", article = %descriptor.id, "could not find article element for toy");
                continue;
            };
            match VisibilityLoader::attach(&self.ctx, article, descriptor.clone()) {
                Ok(loader) => {
                    let replaced = self
                        .loaders
                        .borrow_mut()
                        .insert(descriptor.id.clone(), loader);
                    if let Some(replaced) = replaced {
                        replaced.disconnect();
                    }
                    armed += 1;
                }
                Err(err) => {
                    error!(target: "loader", article = %descriptor.id, error = %err, "failed to observe article");
                }
            }
        }
        armed
    }

    pub fn loader(&self, article_id: &str) -> Option<Rc<VisibilityLoader>> {
        self.loaders.borrow().get(article_id).cloned()
    }

    pub fn component(&self, article_id: &str) -> Option<Rc<Component>> {
        self.ctx.component(article_id)
    }

    /// Waits for pending module loads and fetches.
    pub async fn settle(&self) {
        self.ctx.tasks.settle().await;
    }

    /// Stops the article's loader and tears down its component.
    pub fn teardown(&self, article_id: &str) -> Result<(), DomError> {
        if let Some(loader) = self.loaders.borrow_mut().remove(article_id) {
            loader.disconnect();
        }
        match self.ctx.take_component(article_id) {
            Some(component) => component.teardown(),
            None => Ok(()),
        }
    }

    pub fn teardown_all(&self) -> Result<(), DomError> {
        let mut ids: Vec<String> = self.loaders.borrow().keys().cloned().collect();
        ids.extend(self.ctx.components.borrow().keys().cloned());
        ids.sort();
        ids.dedup();

        let mut first_error = None;
        for id in ids {
            if let Err(err) = self.teardown(&id) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finished_tasks_are_not_retained() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let tasks = TaskTracker::new();
                for _ in 0..1000 {
                    tasks.spawn(async {});
                    tokio::task::yield_now().await;
                }
                assert_eq!(tasks.pending(), 0);
                assert!(tasks.handles.borrow().len() <= 1);
                tasks.settle().await;
                assert!(tasks.handles.borrow().is_empty());
            })
            .await;
    }

    #[test]
    fn registry_uses_camel_case_keys() {
        let descriptors = ComponentDescriptor::parse_registry(
            r#"[{"id":"TOY1","modulePath":"toys/echo.js","functionName":"echo"}]"#,
        )
        .unwrap();
        assert_eq!(descriptors, vec![ComponentDescriptor::new("TOY1", "toys/echo.js", "echo")]);
    }

    #[test]
    fn malformed_registry_is_an_error() {
        assert!(matches!(
            ComponentDescriptor::parse_registry(r#"{"id":"x"}"#),
            Err(RuntimeError::Registry(_))
        ));
    }

    #[tokio::test]
    async fn settle_waits_for_nested_tasks() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let tasks = TaskTracker::new();
                let hits = Rc::new(std::cell::Cell::new(0));
                let inner_tasks = tasks.clone();
                let inner_hits = Rc::clone(&hits);
                tasks.spawn(async move {
                    tokio::task::yield_now().await;
                    inner_hits.set(inner_hits.get() + 1);
                    let nested_hits = Rc::clone(&inner_hits);
                    inner_tasks.spawn(async move {
                        nested_hits.set(nested_hits.get() + 1);
                    });
                });
                tasks.settle().await;
                assert_eq!(hits.get(), 2);
                assert_eq!(tasks.pending(), 0);
            })
            .await;
    }
}
