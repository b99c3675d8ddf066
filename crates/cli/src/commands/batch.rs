use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use pickwise_agent::controller::{DialogueController, SearchStatus};
use pickwise_core::config::LoadOptions;
use pickwise_core::errors::ApplicationError;
use serde::Serialize;
use tracing::{info, warn};

use crate::bootstrap;
use crate::commands::{runtime, CommandResult, RUNTIME_FAILURE};

const COMMAND: &str = "batch";

#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub query: String,
    pub session_id: String,
    pub phase: String,
    pub search: Option<SearchStatus>,
    pub succeeded: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub entries: Vec<BatchEntry>,
}

pub fn run(options: LoadOptions, file: &Path, delay_secs: Option<u64>) -> CommandResult {
    let queries = match read_queries(file) {
        Ok(queries) => queries,
        Err(error) => {
            return CommandResult::from_error(COMMAND, &ApplicationError::Input(format!("{error:#}")))
        }
    };

    let application = match bootstrap::bootstrap(options) {
        Ok(application) => application,
        Err(error) => return CommandResult::from_error(COMMAND, &error),
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let delay =
        Duration::from_secs(delay_secs.unwrap_or(application.config.dialogue.batch_delay_secs));
    let mut stdout = std::io::stdout();
    match runtime.block_on(run_batch(&application.controller, &queries, delay, &mut stdout)) {
        Ok(summary) => {
            let message = format!("Success: {}/{}", summary.succeeded, summary.total);
            let details = serde_json::to_value(&summary).ok();
            CommandResult::success_with_details(COMMAND, message, details)
        }
        Err(error) => CommandResult::failure(COMMAND, "runtime", format!("{error:#}"), RUNTIME_FAILURE),
    }
}

/// Non-empty, trimmed lines of the file. A file with none is an input error.
pub fn read_queries(file: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("could not read batch file `{}`", file.display()))?;
    let queries: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if queries.is_empty() {
        anyhow::bail!("batch file `{}` contains no queries", file.display());
    }
    Ok(queries)
}

/// Each query gets its own session. A query counts as succeeded unless its
/// search agent run failed.
pub async fn run_batch<W: Write>(
    controller: &DialogueController,
    queries: &[String],
    delay: Duration,
    writer: &mut W,
) -> Result<BatchSummary> {
    let total = queries.len();
    let mut entries = Vec::with_capacity(total);

    for (index, query) in queries.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let session_id = controller.create_session().await;
        let outcome = controller.process_turn(&session_id, query).await?;
        let succeeded = outcome.search != Some(SearchStatus::AgentFailed);
        if !succeeded {
            warn!(event_name = "batch.query_failed", position = index + 1, query = %query, "search agent failed");
        }

        writeln!(writer, "[{}/{}] {}\n{}\n", index + 1, total, query, outcome.response)
            .context("failed to write batch output")?;

        entries.push(BatchEntry {
            query: query.clone(),
            session_id: session_id.to_string(),
            phase: outcome.phase.as_str().to_string(),
            search: outcome.search,
            succeeded,
        });
    }

    let succeeded = entries.iter().filter(|entry| entry.succeeded).count();
    info!(event_name = "batch.finished", total, succeeded, "batch run finished");
    Ok(BatchSummary { total, succeeded, entries })
}
