use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pickwise_core::config::SearchConfig;
use pickwise_core::errors::CollaboratorError;
use pickwise_core::extraction::RawAgentResult;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::collaborators::SearchAgent;

const COLLABORATOR: &str = "search_agent";

/// Runs an external browser-automation program once per search or detail
/// lookup.
///
/// The task instruction goes to the program's stdin; whatever it prints on
/// stdout (JSON, prose, or a path to a `.md` transcript) is handed back
/// untouched for the extractor to make sense of.
#[derive(Clone, Debug)]
pub struct CommandSearchAgent {
    command: String,
    args: Vec<String>,
    catalog_url: String,
    timeout: Duration,
}

impl CommandSearchAgent {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            catalog_url: config.catalog_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn task_instruction(&self, query: &str, max_results: usize) -> String {
        let catalog_url = &self.catalog_url;
        format!(
            r#"Go to {catalog_url}

1. Search for "{query}" in the catalog (no login required for search).
2. On the search results page, look for AT LEAST {max_results} DIFFERENT products.
3. Prefer products with different names, models, or SKUs; when products look alike, choose ones with different numbers or variations.
4. For each product, extract ONLY:
   - Product name (exact title)
   - Short description (if available)
5. Return the result as a JSON array:
[
  {{"name": "Product Name", "description": "Short description or null"}}
]

Only use the search results page. Do not visit product detail pages and do not extract prices, images, dimensions or URLs."#
        )
    }

    fn failure(&self, message: String) -> CollaboratorError {
        CollaboratorError::Unavailable { collaborator: COLLABORATOR.to_string(), message }
    }

    /// Asks for the detail page of one product, reported as a single JSON
    /// object with nulls for missing attributes.
    pub fn detail_instruction(&self, product_name: &str) -> String {
        let catalog_url = &self.catalog_url;
        format!(
            r#"Go to {catalog_url}

1. Search for "{product_name}" in the catalog.
2. Find the product whose title matches "{product_name}" exactly and open its product detail page.
3. From the detail page, extract:
   - name, description, brand, sku, price
   - material, finish, style, colors
   - dimensions, weight, installation, warranty, origin
   - specifications (an object of any further technical attributes)
   - product_url (the address of the detail page)
4. Return the result as ONE JSON object using those keys, with null for anything the page does not show:
{{"name": "{product_name}", "description": "...", "price": null}}

If no product matches, return {{"error": "product not found"}} instead."#
        )
    }

    async fn run_task(&self, task: &str) -> Result<RawAgentResult, CollaboratorError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                self.failure(format!("failed to start `{}`: {error}", self.command))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(task.as_bytes()).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::BrokenPipe => {
                    debug!(
                        event_name = "search_agent.stdin_closed",
                        "search agent closed stdin before reading the task"
                    );
                }
                Err(error) => {
                    return Err(CollaboratorError::Transport {
                        collaborator: COLLABORATOR.to_string(),
                        message: format!("failed to write task to search agent: {error}"),
                    });
                }
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorError::Timeout {
                collaborator: COLLABORATOR.to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|error| CollaboratorError::Transport {
                collaborator: COLLABORATOR.to_string(),
                message: format!("search agent execution failed: {error}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::NonZeroExit {
                collaborator: COLLABORATOR.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        info!(
            event_name = "search_agent.finished",
            output_length = stdout.len(),
            "search agent finished"
        );
        Ok(RawAgentResult::Text(stdout))
    }
}

#[async_trait]
impl SearchAgent for CommandSearchAgent {
    async fn run_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<RawAgentResult, CollaboratorError> {
        info!(
            event_name = "search_agent.started",
            command = %self.command,
            query = %query,
            max_results,
            "starting search agent"
        );
        self.run_task(&self.task_instruction(query, max_results)).await
    }

    async fn fetch_details(&self, product_name: &str) -> Result<RawAgentResult, CollaboratorError> {
        info!(
            event_name = "search_agent.details_started",
            command = %self.command,
            product_name = %product_name,
            "starting detail lookup"
        );
        self.run_task(&self.detail_instruction(product_name)).await
    }
}
