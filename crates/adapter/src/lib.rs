pub mod integration;
pub mod lifecycle;

pub use integration::IntegrationService;
pub use lifecycle::{EventBus, EventHandler, LifecycleAdapter, LifecycleHandler, LifecycleRegistry};
