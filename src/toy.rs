//! Toy modules, the processing functions they export, and the environment a
//! processing function is called with.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::net::Fetch;
use crate::state::{StateError, StateStore};

#[derive(Debug, Error)]
pub enum ToyError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToyError {
    pub fn msg(message: impl Into<String>) -> Self {
        ToyError::Message(message.into())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module '{0}' not found")]
    NotFound(String),
    #[error("module '{module}' has no export named '{export}'")]
    MissingExport { module: String, export: String },
    #[error("module '{module}' failed to load: {reason}")]
    Failed { module: String, reason: String },
}

/// A toy's core logic: input text in, result text out.
pub type ProcessingFn = Rc<dyn Fn(&str, &ToyEnv) -> Result<String, ToyError>>;

/// Named processing functions exported by one module.
#[derive(Clone, Default)]
pub struct ToyModule {
    exports: HashMap<String, ProcessingFn>,
}

impl fmt::Debug for ToyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.exports.keys().collect();
        names.sort();
        f.debug_struct("ToyModule").field("exports", &names).finish()
    }
}

impl ToyModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&str, &ToyEnv) -> Result<String, ToyError> + 'static,
    {
        self.exports.insert(name.to_string(), Rc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<ProcessingFn> {
        self.exports.get(name).cloned()
    }

    /// Looks up `name`, reporting which module lacked it.
    pub fn resolve(&self, module: &str, name: &str) -> Result<ProcessingFn, LoadError> {
        self.get(name).ok_or_else(|| LoadError::MissingExport {
            module: module.to_string(),
            export: name.to_string(),
        })
    }
}

pub trait ModuleLoader {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, Result<ToyModule, LoadError>>;
}

/// In-process module table keyed by module path.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RefCell<HashMap<String, ToyModule>>,
    loads: RefCell<HashMap<String, usize>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &str, module: ToyModule) {
        self.modules.borrow_mut().insert(path.to_string(), module);
    }

    /// How many times `path` has been requested, found or not.
    pub fn load_count(&self, path: &str) -> usize {
        self.loads.borrow().get(path).copied().unwrap_or(0)
    }
}

impl ModuleLoader for ModuleRegistry {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, Result<ToyModule, LoadError>> {
        *self.loads.borrow_mut().entry(path.to_string()).or_insert(0) += 1;
        let result = self
            .modules
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_string()));
        async move {
            // Resolve on a later poll, as a dynamic import would.
            tokio::task::yield_now().await;
            result
        }
        .boxed_local()
    }
}

/// Capabilities handed to a processing function for one call.
pub struct ToyEnv {
    article: String,
    state: StateStore,
    fetch: Rc<dyn Fetch>,
    log_lines: Cell<usize>,
}

impl ToyEnv {
    pub fn new(article: &str, state: StateStore, fetch: Rc<dyn Fetch>) -> Self {
        Self {
            article: article.to_string(),
            state,
            fetch,
            log_lines: Cell::new(0),
        }
    }

    pub fn article_id(&self) -> &str {
        &self.article
    }

    /// An owned copy of the page state.
    pub fn get_data(&self) -> Value {
        self.state.read()
    }

    pub fn set_data(&self, value: Value) -> Result<(), ToyError> {
        self.state.set_data(value).map_err(|err| {
            error!(target: "toy", article = %self.article, error = %err, "setData rejected");
            ToyError::from(err)
        })
    }

    pub fn set_local_temporary_data(&self, value: Value) -> Result<(), ToyError> {
        Ok(self.state.set_local_temporary_data(value)?)
    }

    pub fn get_uuid(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn log(&self, message: &str) {
        self.log_lines.set(self.log_lines.get() + 1);
        info!(target: "toy", article = %self.article, "{message}");
    }

    pub fn warn(&self, message: &str) {
        self.log_lines.set(self.log_lines.get() + 1);
        warn!(target: "toy", article = %self.article, "{message}");
    }

    pub fn fetcher(&self) -> Rc<dyn Fetch> {
        Rc::clone(&self.fetch)
    }

    pub fn log_lines(&self) -> usize {
        self.log_lines.get()
    }
}
