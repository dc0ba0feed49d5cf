pub mod config;
pub mod error;
pub mod ids;
pub mod output;
pub mod trust;
pub mod types;

pub use error::{CourtroomError, Result};
pub use ids::*;
pub use output::ModelOutput;
