use std::sync::Arc;

use pickwise_agent::collaborators::{LlmExplainer, LlmSlotExtractor, LlmTranslator};
use pickwise_agent::controller::{Collaborators, DialogueController};
use pickwise_agent::llm::{LlmClient, OpenAiCompatibleClient};
use pickwise_agent::search_agent::CommandSearchAgent;
use pickwise_core::audit::TracingAuditSink;
use pickwise_core::config::{AppConfig, LoadOptions};
use pickwise_core::errors::ApplicationError;
use tracing::info;

use crate::logging;

pub struct Application {
    pub config: AppConfig,
    pub controller: DialogueController,
}

/// Loads configuration, starts logging and wires the controller to the
/// configured collaborators.
pub fn bootstrap(options: LoadOptions) -> Result<Application, ApplicationError> {
    let config = AppConfig::load(options)?;
    logging::init(&config.logging);

    let controller = build_controller(&config)?;
    info!(
        event_name = "system.bootstrap.ready",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        search_command = %config.search.command,
        max_products = config.dialogue.max_products,
        "dialogue controller ready"
    );

    Ok(Application { config, controller })
}

pub fn build_controller(config: &AppConfig) -> Result<DialogueController, ApplicationError> {
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
    let collaborators = Collaborators {
        slot_extractor: Arc::new(LlmSlotExtractor::new(Arc::clone(&llm))),
        translator: Arc::new(LlmTranslator::new(Arc::clone(&llm))),
        search_agent: Arc::new(CommandSearchAgent::new(&config.search)),
        explainer: Arc::new(LlmExplainer::new(llm)),
    };

    Ok(DialogueController::new(collaborators, config.dialogue.clone())
        .with_audit_sink(Arc::new(TracingAuditSink)))
}
