pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pickwise_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "pickwise",
    about = "Pickwise conversational product recommendation CLI",
    long_about = "Talk to the recommendation assistant, run one-shot or batch searches, look up product details, and inspect configuration readiness.",
    after_help = "Examples:\n  pickwise chat\n  pickwise search \"modern brass kitchen cabinet knob\" --pick 1,3\n  pickwise details \"Modern Steel Pull - 305\"\n  pickwise batch queries.txt --delay-secs 5\n  pickwise doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a pickwise.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the log level (trace|debug|info|warn|error)")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override the LLM provider (openai|azure_openai|ollama)")]
    llm_provider: Option<LlmProvider>,
    #[arg(long, global = true, help = "Override the LLM model or deployment name")]
    llm_model: Option<String>,
    #[arg(long, global = true, help = "Override the search agent program")]
    search_command: Option<String>,
    #[arg(long, global = true, help = "Override the number of products to recommend")]
    max_products: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive recommendation conversation on stdin/stdout")]
    Chat,
    #[command(about = "Run a single requirement through one fresh session")]
    Search {
        #[arg(help = "Free-text description of the product you need")]
        query: String,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Fetch detail pages for these listed product numbers (e.g. 1,3)"
        )]
        pick: Vec<usize>,
    },
    #[command(about = "Fetch the detail page of one product by its listed name")]
    Details {
        #[arg(help = "Product name as shown in a recommendation")]
        name: String,
    },
    #[command(about = "Run every non-empty line of a file through its own session")]
    Batch {
        #[arg(help = "Text file with one requirement per line")]
        file: PathBuf,
        #[arg(long, help = "Seconds to wait between queries (defaults to dialogue.batch_delay_secs)")]
        delay_secs: Option<u64>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM endpoint settings, and search agent availability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                llm_provider: self.llm_provider,
                llm_model: self.llm_model.clone(),
                search_command: self.search_command.clone(),
                max_products: self.max_products,
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Chat => commands::chat::run(options),
        Command::Search { query, pick } => commands::search::run(options, &query, &pick),
        Command::Details { name } => commands::details::run(options, &name),
        Command::Batch { file, delay_secs } => commands::batch::run(options, &file, delay_secs),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => commands::doctor::run(options, json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
