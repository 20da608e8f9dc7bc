use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::{debug, error, info};

use super::initialize_component;
use crate::dom::{DomError, IntersectionEntry, NodeId, ObserverId};
use crate::session::{ComponentDescriptor, RuntimeContext};
use crate::toy::{LoadError, ProcessingFn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    AwaitingVisibility,
    Loading,
    Loaded,
    Failed,
}

/// Defers loading a toy's module until its article scrolls into view.
/// Fires at most once.
pub struct VisibilityLoader {
    ctx: Weak<RuntimeContext>,
    article: NodeId,
    descriptor: ComponentDescriptor,
    state: Cell<LoaderState>,
    observer: Cell<Option<ObserverId>>,
}

impl VisibilityLoader {
    pub fn attach(
        ctx: &Rc<RuntimeContext>,
        article: NodeId,
        descriptor: ComponentDescriptor,
    ) -> Result<Rc<Self>, DomError> {
        let loader = Rc::new(Self {
            ctx: Rc::downgrade(ctx),
            article,
            descriptor,
            state: Cell::new(LoaderState::AwaitingVisibility),
            observer: Cell::new(None),
        });

        let handle = Rc::downgrade(&loader);
        let observer = ctx.dom.observe_visibility(
            article,
            ctx.config.visibility_threshold,
            Rc::new(move |entries: &[IntersectionEntry]| {
                if let Some(loader) = handle.upgrade() {
                    loader.on_intersection(entries);
                }
            }),
        )?;
        loader.observer.set(Some(observer));
        debug!(target: "loader", article = %loader.descriptor.id, "waiting for article to become visible");
        Ok(loader)
    }

    pub fn state(&self) -> LoaderState {
        self.state.get()
    }

    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.descriptor
    }

    pub fn is_observing(&self) -> bool {
        self.observer.get().is_some()
    }

    fn on_intersection(self: Rc<Self>, entries: &[IntersectionEntry]) {
        for entry in entries {
            debug!(
                target: "loader",
                article = %self.descriptor.id,
                ratio = entry.intersection_ratio,
                intersecting = entry.is_intersecting,
                "intersection reported"
            );
        }
        if self.state.get() != LoaderState::AwaitingVisibility {
            return;
        }
        if !entries.iter().any(|entry| entry.is_intersecting) {
            return;
        }

        info!(
            target: "loader",
            article = %self.descriptor.id,
            module = %self.descriptor.module_path,
            "article visible, loading toy module"
        );
        self.state.set(LoaderState::Loading);
        self.disconnect();

        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        let load = ctx.loader.load(&self.descriptor.module_path);
        let loader = Rc::clone(&self);
        ctx.tasks.spawn(async move {
            let module = load.await;
            loader.finish(module.and_then(|module| {
                module.resolve(&loader.descriptor.module_path, &loader.descriptor.function_name)
            }));
        });
    }

    fn finish(&self, resolved: Result<ProcessingFn, LoadError>) {
        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        let processing = match resolved {
            Ok(processing) => processing,
            Err(err) => {
                self.state.set(LoaderState::Failed);
                error!(target: "loader", article = %self.descriptor.id, error = %err, "failed to load toy module");
                return;
            }
        };

        self.state.set(LoaderState::Loaded);
        if let Some(component) =
            initialize_component(&ctx, self.article, &self.descriptor.id, processing)
        {
            ctx.register_component(component);
        }
    }

    /// Stops observing. Safe to call more than once.
    pub fn disconnect(&self) {
        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        if let Some(observer) = self.observer.take() {
            ctx.dom.disconnect_observer(observer);
        }
    }
}
