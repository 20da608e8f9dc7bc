//! From "article scrolled into view" to "toy answering input", and back to
//! nothing on teardown.

mod component;
mod disposer;
mod loader;
mod poller;

pub use component::{initialize_component, Component};
pub use disposer::{listen, Disposer, Disposers};
pub use loader::{LoaderState, VisibilityLoader};
pub use poller::AutoSubmitPoller;
