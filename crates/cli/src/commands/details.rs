use pickwise_agent::details::DetailOutcome;
use pickwise_core::config::LoadOptions;
use pickwise_core::errors::ApplicationError;
use serde_json::json;

use crate::bootstrap;
use crate::commands::{runtime, CommandResult, RUNTIME_FAILURE};

const COMMAND: &str = "details";

/// Looks up one product by its listed name. Not finding the product is a
/// successful run; an agent failure is not.
pub fn run(options: LoadOptions, product_name: &str) -> CommandResult {
    let product_name = product_name.trim();
    if product_name.is_empty() {
        return CommandResult::from_error(
            COMMAND,
            &ApplicationError::Input("product name must not be empty".to_string()),
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

    let outcome = runtime.block_on(application.controller.lookup_details(product_name));
    println!("{}", outcome.render());
    outcome_result(outcome)
}

fn outcome_result(outcome: DetailOutcome) -> CommandResult {
    match &outcome {
        DetailOutcome::Found(_) => CommandResult::success_with_details(
            COMMAND,
            format!("details retrieved for `{}`", outcome.product_name()),
            Some(json!(outcome)),
        ),
        DetailOutcome::NotFound { product_name, .. } => CommandResult::success_with_details(
            COMMAND,
            format!("no details found for `{product_name}`"),
            Some(json!(outcome)),
        ),
        DetailOutcome::AgentFailed { error, .. } => CommandResult::failure(
            COMMAND,
            "collaborator",
            format!("detail lookup failed: {error}"),
            RUNTIME_FAILURE,
        ),
    }
}
