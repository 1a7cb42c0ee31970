pub mod config;
pub mod error;
pub mod types;

pub use config::{GenerationConfig, LlmConfig, LoggingConfig, ServerConfig, Settings};
pub use error::*;
pub use types::*;
