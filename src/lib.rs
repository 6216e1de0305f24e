// Library exports for the runtime and its tests

pub mod browser;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logic;
pub mod patch;
pub mod queue;
pub mod reconcile;
pub mod runtime;
pub mod testing;

// Re-export commonly used types
pub use browser::{Browser, HeadlessBrowser};
pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use logic::{Logic, QueueStrategy};
pub use patch::{DomPatcher, TreePatcher};
pub use queue::{MessageQueue, StrategyQueue, Update};
pub use runtime::Runtime;
