pub mod circuit_breaker;
pub mod config;
pub mod invoke;
pub mod llm;
pub mod orchestrator;
pub mod registry;
pub mod search;
pub mod stages;
pub mod store;

pub use orchestrator::{Pipeline, RunHandle};
