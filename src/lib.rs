// Library exports for the binary and integration tests

pub mod config;
pub mod dom;
pub mod headless;
pub mod inputs;
pub mod lifecycle;
pub mod net;
pub mod presenters;
pub mod session;
pub mod state;
pub mod toy;

// Re-export commonly used types for tests
pub use config::RuntimeConfig;
pub use dom::{Dom, MemoryDocument};
pub use session::{ComponentDescriptor, ToyRuntime};
pub use state::StateStore;
pub use toy::{ModuleRegistry, ToyEnv, ToyError, ToyModule};
