use std::sync::Arc;

use rolemine_ai::{
    AzureOpenAiConfig, AzureOpenAiProvider, CompletionParams, LlmProvider, PromptBuilder,
    RoleGenerationService, RoleSuggestionClient,
};
use rolemine_core::Settings;
use rolemine_data::{DataCatalog, OptionStore, RoleStore};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<DataCatalog>,
    pub store: Arc<RoleStore>,
    pub options: Arc<OptionStore>,
    pub service: Arc<RoleGenerationService>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Production wiring: an Azure OpenAI provider built from settings.
    pub fn new(settings: Settings) -> rolemine_core::Result<Self> {
        let config = AzureOpenAiConfig::from_settings(&settings.llm)?;
        let provider = Arc::new(AzureOpenAiProvider::new(config)?);
        Ok(Self::with_provider(settings, provider))
    }

    /// Wiring with an injected provider; used by tests to run the full
    /// HTTP surface against a fake LLM.
    pub fn with_provider(settings: Settings, provider: Arc<dyn LlmProvider>) -> Self {
        let catalog = Arc::new(DataCatalog::new());
        let store = Arc::new(RoleStore::new());
        let options = Arc::new(OptionStore::new());
        let client = Arc::new(RoleSuggestionClient::new(
            provider,
            PromptBuilder::new(settings.generation.max_prompt_entitlements),
            CompletionParams {
                temperature: settings.llm.temperature,
                max_tokens: settings.llm.max_tokens,
                json_mode: true,
            },
        ));
        let service = Arc::new(RoleGenerationService::new(
            Arc::clone(&catalog),
            Arc::clone(&store),
            Arc::clone(&options),
            client,
        ));

        Self {
            catalog,
            store,
            options,
            service,
            settings: Arc::new(settings),
        }
    }
}
