use std::io::Write;

use anyhow::{Context, Result};
use pickwise_agent::controller::DialogueController;
use pickwise_core::config::LoadOptions;
use pickwise_core::dialogue::DialoguePhase;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::bootstrap;
use crate::commands::{runtime, CommandResult, RUNTIME_FAILURE};

const COMMAND: &str = "chat";
const PROMPT: &str = "you> ";

pub fn run(options: LoadOptions) -> CommandResult {
    let application = match bootstrap::bootstrap(options) {
        Ok(application) => application,
        Err(error) => return CommandResult::from_error(COMMAND, &error),
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    match runtime.block_on(converse(&application.controller, stdin, &mut stdout)) {
        // The conversation itself went to stdout; nothing more to print.
        Ok(_) => CommandResult { exit_code: 0, output: String::new() },
        Err(error) => CommandResult::failure(COMMAND, "runtime", format!("{error:#}"), RUNTIME_FAILURE),
    }
}

/// Reads utterances line by line until end of input or until the dialogue
/// reaches its end phase. Returns the number of turns taken.
pub async fn converse<R, W>(controller: &DialogueController, reader: R, writer: &mut W) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let session_id = controller.create_session().await;
    let mut lines = reader.lines();
    let mut turns = 0;

    loop {
        write!(writer, "{PROMPT}").context("failed to write prompt")?;
        writer.flush().context("failed to flush prompt")?;

        let Some(line) = lines.next_line().await.context("failed to read from input")? else {
            writeln!(writer).context("failed to write to output")?;
            break;
        };
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }

        let outcome = controller.process_turn(&session_id, utterance).await?;
        turns = outcome.turn;
        writeln!(writer, "assistant> {}\n", outcome.response).context("failed to write reply")?;

        if outcome.phase == DialoguePhase::End {
            break;
        }
    }

    info!(event_name = "chat.finished", session_id = %session_id, turns, "chat session finished");
    Ok(turns)
}
