use pickwise_agent::controller::DialogueController;
use pickwise_agent::details::DetailOutcome;
use pickwise_core::config::LoadOptions;
use pickwise_core::dialogue::SessionId;
use pickwise_core::domain::product::ProductRecord;
use pickwise_core::errors::{ApplicationError, DialogueError};
use serde::Serialize;
use serde_json::json;

use crate::bootstrap;
use crate::commands::{runtime, CommandResult};

const COMMAND: &str = "search";

#[derive(Debug, Serialize)]
pub struct ProductLine {
    pub name: String,
    pub description: Option<String>,
}

impl From<&ProductRecord> for ProductLine {
    fn from(product: &ProductRecord) -> Self {
        Self { name: product.display_name(), description: product.description() }
    }
}

/// `picks` are 1-based positions in the product list whose detail pages are
/// fetched after the search; they are ignored when nothing was found.
pub fn run(options: LoadOptions, query: &str, picks: &[usize]) -> CommandResult {
    let query = query.trim();
    if query.is_empty() {
        return CommandResult::from_error(
            COMMAND,
            &ApplicationError::Input("search query must not be empty".to_string()),
        );
    }

    let application = match bootstrap::bootstrap(options) {
        Ok(application) => application,
        Err(error) => return CommandResult::from_error(COMMAND, &error),
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let controller = &application.controller;
    let searched = runtime.block_on(async {
        let report = search_once(controller, query).await?;
        let picked = if picks.is_empty() || report.products.is_empty() {
            Vec::new()
        } else {
            let session_id = SessionId(report.session_id.clone());
            controller.product_details(&session_id, picks).await?
        };
        Ok::<_, DialogueError>((report, picked))
    });

    match searched {
        Ok((report, picked)) => {
            println!("{}", report.response);
            if !report.products.is_empty() {
                println!("\n{}", render_products(&report.products));
            }
            if !picked.is_empty() {
                println!("\n{}", render_picked(picks, &picked));
            }
            let message = format!("{} product(s) found", report.products.len());
            let mut details = json!({
                "session_id": report.session_id,
                "phase": report.phase,
                "search": report.search,
                "products": report.products,
            });
            if !picked.is_empty() {
                details["picked"] = json!(picked);
            }
            CommandResult::success_with_details(COMMAND, message, Some(details))
        }
        Err(error @ DialogueError::InvalidSelection { .. }) => {
            CommandResult::from_error(COMMAND, &ApplicationError::Input(error.to_string()))
        }
        Err(error) => CommandResult::from_error(COMMAND, &ApplicationError::from(error)),
    }
}

#[derive(Debug, Serialize)]
pub struct SearchReport {
    pub session_id: String,
    pub response: String,
    pub phase: String,
    pub search: Option<pickwise_agent::controller::SearchStatus>,
    pub products: Vec<ProductLine>,
}

/// One utterance through a fresh session, with the products it left behind.
pub async fn search_once(
    controller: &DialogueController,
    query: &str,
) -> Result<SearchReport, DialogueError> {
    let session_id = controller.create_session().await;
    let outcome = controller.process_turn(&session_id, query).await?;
    let session = controller.get_session(&session_id).await?;

    Ok(SearchReport {
        session_id: session_id.to_string(),
        response: outcome.response,
        phase: outcome.phase.as_str().to_string(),
        search: outcome.search,
        products: session.current_products.iter().map(ProductLine::from).collect(),
    })
}

pub fn render_products(products: &[ProductLine]) -> String {
    let mut lines = vec![format!("Found {} product(s):", products.len())];
    for (index, product) in products.iter().enumerate() {
        lines.push(format!("{}. {}", index + 1, product.name));
        if let Some(description) = &product.description {
            lines.push(format!("   {description}"));
        }
    }
    lines.join("\n")
}

/// One block per pick, headed by its position in the product list.
pub fn render_picked(picks: &[usize], outcomes: &[DetailOutcome]) -> String {
    picks
        .iter()
        .zip(outcomes)
        .map(|(position, outcome)| {
            format!("[Product {position}] {}\n{}", outcome.product_name(), outcome.render())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use pickwise_agent::details::DetailOutcome;

    use super::{render_picked, render_products, ProductLine};

    #[test]
    fn product_lines_show_descriptions_when_known() {
        let rendered = render_products(&[
            ProductLine { name: "Cup Pull".to_string(), description: Some("Antique brass".to_string()) },
            ProductLine { name: "Bar Pull".to_string(), description: None },
        ]);
        assert_eq!(rendered, "Found 2 product(s):\n1. Cup Pull\n   Antique brass\n2. Bar Pull");
    }

    #[test]
    fn picked_details_are_headed_by_position() {
        let rendered = render_picked(
            &[3, 1],
            &[
                DetailOutcome::NotFound {
                    product_name: "Edge Pull".to_string(),
                    reason: "product not found".to_string(),
                },
                DetailOutcome::AgentFailed {
                    product_name: "Cup Pull".to_string(),
                    error: "search_agent timed out after 300s".to_string(),
                },
            ],
        );
        assert_eq!(
            rendered,
            "[Product 3] Edge Pull\nNo details found: product not found\n\n[Product 1] Cup Pull\nDetail lookup failed: search_agent timed out after 300s"
        );
    }
}
