use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pickwise_core::config::{resolve_config_path, AppConfig, ConfigOverrides, LoadOptions};
use toml::Value;

/// Renders the effective configuration, one line per key, with the layer
/// each value came from. Secrets are never printed.
pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let flagged = flagged_keys(&options.overrides);
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for entry in entries(&config) {
        if flagged.contains(&entry.key) {
            lines.push(format!("- {} = {} (source: flag)", entry.key, entry.value));
            continue;
        }
        let source = field_source(
            entry.key,
            &entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }
    lines.join("\n")
}

struct Entry {
    key: &'static str,
    value: String,
    env_keys: Vec<&'static str>,
}

fn entry(key: &'static str, value: impl Into<String>, env_keys: &[&'static str]) -> Entry {
    Entry { key, value: value.into(), env_keys: env_keys.to_vec() }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let unset = || "<unset>".to_string();
    vec![
        entry("llm.provider", config.llm.provider.as_str(), &["PICKWISE_LLM_PROVIDER"]),
        entry("llm.model", config.llm.model.clone(), &["PICKWISE_LLM_MODEL"]),
        entry(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(unset),
            &["PICKWISE_LLM_BASE_URL"],
        ),
        entry(
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
            &["PICKWISE_LLM_API_KEY"],
        ),
        entry(
            "llm.api_version",
            config.llm.api_version.clone().unwrap_or_else(unset),
            &["PICKWISE_LLM_API_VERSION"],
        ),
        entry("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["PICKWISE_LLM_TIMEOUT_SECS"]),
        entry("llm.max_retries", config.llm.max_retries.to_string(), &["PICKWISE_LLM_MAX_RETRIES"]),
        entry("search.command", config.search.command.clone(), &["PICKWISE_SEARCH_COMMAND"]),
        entry("search.args", render_args(&config.search.args), &["PICKWISE_SEARCH_ARGS"]),
        entry("search.catalog_url", config.search.catalog_url.clone(), &["PICKWISE_SEARCH_CATALOG_URL"]),
        entry(
            "search.timeout_secs",
            config.search.timeout_secs.to_string(),
            &["PICKWISE_SEARCH_TIMEOUT_SECS"],
        ),
        entry(
            "dialogue.max_products",
            config.dialogue.max_products.to_string(),
            &["PICKWISE_DIALOGUE_MAX_PRODUCTS"],
        ),
        entry(
            "dialogue.clarification_floor",
            config.dialogue.clarification_floor.to_string(),
            &["PICKWISE_DIALOGUE_CLARIFICATION_FLOOR"],
        ),
        entry(
            "dialogue.sufficiency_threshold",
            config.dialogue.sufficiency_threshold.to_string(),
            &["PICKWISE_DIALOGUE_SUFFICIENCY_THRESHOLD"],
        ),
        entry(
            "dialogue.relaxed_dedup_below",
            config.dialogue.relaxed_dedup_below.to_string(),
            &["PICKWISE_DIALOGUE_RELAXED_DEDUP_BELOW"],
        ),
        entry(
            "dialogue.batch_delay_secs",
            config.dialogue.batch_delay_secs.to_string(),
            &["PICKWISE_DIALOGUE_BATCH_DELAY_SECS"],
        ),
        entry("dialogue.intents.greeting", render_args(&config.dialogue.intents.greeting), &[]),
        entry("dialogue.intents.end", render_args(&config.dialogue.intents.end), &[]),
        entry("dialogue.intents.restart", render_args(&config.dialogue.intents.restart), &[]),
        entry(
            "dialogue.intents.more_details",
            render_args(&config.dialogue.intents.more_details),
            &[],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["PICKWISE_LOGGING_LEVEL", "PICKWISE_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["PICKWISE_LOGGING_FORMAT", "PICKWISE_LOG_FORMAT"],
        ),
    ]
}

fn flagged_keys(overrides: &ConfigOverrides) -> Vec<&'static str> {
    [
        ("logging.level", overrides.log_level.is_some()),
        ("llm.provider", overrides.llm_provider.is_some()),
        ("llm.model", overrides.llm_model.is_some()),
        ("search.command", overrides.search_command.is_some()),
        ("dialogue.max_products", overrides.max_products.is_some()),
    ]
    .into_iter()
    .filter_map(|(key, set)| set.then_some(key))
    .collect()
}

fn render_args(args: &[String]) -> String {
    if args.is_empty() {
        "[]".to_string()
    } else {
        format!("[{}]", args.join(", "))
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}
