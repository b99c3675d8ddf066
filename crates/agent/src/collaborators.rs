//! Narrow contracts with the external collaborators, plus LLM-backed
//! implementations of the three that are plain prompt/response calls.

use std::sync::Arc;

use async_trait::async_trait;
use pickwise_core::errors::CollaboratorError;
use pickwise_core::extraction::RawAgentResult;

use crate::llm::{CompletionOptions, LlmClient};

/// Turns an utterance into a JSON-object-shaped string of slot values. The
/// output may be malformed; the caller tolerates that.
#[async_trait]
pub trait SlotExtractor: Send + Sync {
    async fn extract_slots(&self, utterance: &str) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, CollaboratorError>;
}

/// One long-latency search attempt. Not retried by the dialogue layer.
#[async_trait]
pub trait SearchAgent: Send + Sync {
    async fn run_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<RawAgentResult, CollaboratorError>;

    /// Visits the detail page of one named product. Agents without a detail
    /// flow report themselves unavailable.
    async fn fetch_details(&self, product_name: &str) -> Result<RawAgentResult, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            collaborator: "search_agent".to_string(),
            message: format!("no detail lookup available for `{product_name}`"),
        })
    }
}

#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(
        &self,
        user_summary: &str,
        product_summary: &str,
    ) -> Result<String, CollaboratorError>;
}

const SLOT_OPTIONS: CompletionOptions = CompletionOptions::new(0.0, 256);
const TRANSLATION_OPTIONS: CompletionOptions = CompletionOptions::new(0.1, 64);
const EXPLANATION_OPTIONS: CompletionOptions = CompletionOptions::new(0.5, 256);

pub struct LlmSlotExtractor {
    llm: Arc<dyn LlmClient>,
}

impl LlmSlotExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SlotExtractor for LlmSlotExtractor {
    async fn extract_slots(&self, utterance: &str) -> Result<String, CollaboratorError> {
        self.llm.complete(&slot_prompt(utterance), SLOT_OPTIONS).await
    }
}

pub struct LlmTranslator {
    llm: Arc<dyn LlmClient>,
}

impl LlmTranslator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str) -> Result<String, CollaboratorError> {
        let prompt = format!(
            "Please translate the following product keywords to English, keep it concise: {text}"
        );
        let translated = self.llm.complete(&prompt, TRANSLATION_OPTIONS).await?;
        Ok(translated.trim().to_string())
    }
}

pub struct LlmExplainer {
    llm: Arc<dyn LlmClient>,
}

impl LlmExplainer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Explainer for LlmExplainer {
    async fn explain(
        &self,
        user_summary: &str,
        product_summary: &str,
    ) -> Result<String, CollaboratorError> {
        let prompt = format!(
            "You are a professional home furnishing consultant. User requirements: {user_summary}\n\
             Recommended product information: {product_summary}\n\
             Please use concise, professional language to explain why this product is recommended \
             to the user, with reasons that combine user requirements and product features."
        );
        let reason = self.llm.complete(&prompt, EXPLANATION_OPTIONS).await?;
        Ok(reason.trim().to_string())
    }
}

fn slot_prompt(utterance: &str) -> String {
    format!(
        r#"You are an intelligent shopping assistant. Extract product keywords from the user description and output them as one JSON object.
Allowed keys: category, usage, style, material, budget, brand_preference, installation_method, color_preference. Omit keys the user did not mention.

User description: "I want to buy a cabinet handle suitable for Nordic style, preferably stainless steel."
Output:
{{"category": "handle", "usage": "cabinet", "style": "Nordic", "material": "stainless steel"}}

User description: "I need a modern style door handle."
Output:
{{"category": "handle", "usage": "door", "style": "modern"}}

Now extract keywords from this user input:
"{utterance}"

Output only the JSON object:"#
    )
}
