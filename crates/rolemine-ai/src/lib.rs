pub mod azure;
pub mod client;
pub mod prompt;
pub mod provider;
pub mod service;

pub use azure::{AzureOpenAiConfig, AzureOpenAiProvider};
pub use client::RoleSuggestionClient;
pub use prompt::PromptBuilder;
pub use provider::*;
pub use service::{BatchEntry, BatchOutcome, BatchReport, RoleGenerationService};
