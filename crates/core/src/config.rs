use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clarification::ClarificationPolicy;
use crate::dedup::Deduplicator;
use crate::intent::IntentLexicon;
use crate::slots::{SlotSchema, SlotTracker};

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["pickwise.toml", "config/pickwise.toml"];
pub const DEFAULT_CATALOG_URL: &str = "https://www.richelieu.com/ca/en/";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub dialogue: DialogueConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    /// Model name, or the deployment name for Azure OpenAI.
    pub model: String,
    pub api_version: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Automation agent program; receives the task on stdin.
    pub command: String,
    pub args: Vec<String>,
    pub catalog_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DialogueConfig {
    pub max_products: usize,
    pub clarification_floor: f64,
    pub sufficiency_threshold: f64,
    pub relaxed_dedup_below: usize,
    pub batch_delay_secs: u64,
    /// Keyword sets for the `[dialogue.intents]` table.
    pub intents: IntentLexicon,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "ollama")]
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub search_command: Option<String>,
    pub max_products: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                api_version: None,
                timeout_secs: 30,
                max_retries: 2,
            },
            search: SearchConfig {
                command: String::new(),
                args: Vec::new(),
                catalog_url: DEFAULT_CATALOG_URL.to_string(),
                timeout_secs: 300,
            },
            dialogue: DialogueConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_products: crate::dialogue::context::DEFAULT_MAX_PRODUCTS,
            clarification_floor: crate::clarification::DEFAULT_CLARIFICATION_FLOOR,
            sufficiency_threshold: crate::slots::DEFAULT_SUFFICIENCY_THRESHOLD,
            relaxed_dedup_below: crate::dedup::DEFAULT_RELAXED_BELOW,
            batch_delay_secs: 3,
            intents: IntentLexicon::default(),
        }
    }
}

impl DialogueConfig {
    pub fn slot_tracker(&self) -> SlotTracker {
        SlotTracker::new(SlotSchema::default(), self.sufficiency_threshold)
    }

    pub fn clarification_policy(&self) -> ClarificationPolicy {
        ClarificationPolicy::new(self.clarification_floor, self.sufficiency_threshold)
    }

    pub fn deduplicator(&self) -> Deduplicator {
        Deduplicator::new(self.max_products, self.relaxed_dedup_below)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|azure_openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = Some(api_version);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(search) = patch.search {
            if let Some(command) = search.command {
                self.search.command = command;
            }
            if let Some(args) = search.args {
                self.search.args = args;
            }
            if let Some(catalog_url) = search.catalog_url {
                self.search.catalog_url = catalog_url;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(max_products) = dialogue.max_products {
                self.dialogue.max_products = max_products;
            }
            if let Some(floor) = dialogue.clarification_floor {
                self.dialogue.clarification_floor = floor;
            }
            if let Some(threshold) = dialogue.sufficiency_threshold {
                self.dialogue.sufficiency_threshold = threshold;
            }
            if let Some(relaxed_below) = dialogue.relaxed_dedup_below {
                self.dialogue.relaxed_dedup_below = relaxed_below;
            }
            if let Some(delay) = dialogue.batch_delay_secs {
                self.dialogue.batch_delay_secs = delay;
            }
            if let Some(intents) = dialogue.intents {
                let lexicon = &mut self.dialogue.intents;
                if let Some(greeting) = intents.greeting {
                    lexicon.greeting = greeting;
                }
                if let Some(end) = intents.end {
                    lexicon.end = end;
                }
                if let Some(restart) = intents.restart {
                    lexicon.restart = restart;
                }
                if let Some(more_details) = intents.more_details {
                    lexicon.more_details = more_details;
                }
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PICKWISE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PICKWISE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PICKWISE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PICKWISE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PICKWISE_LLM_API_VERSION") {
            self.llm.api_version = Some(value);
        }
        if let Some(value) = read_env("PICKWISE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("PICKWISE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PICKWISE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("PICKWISE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PICKWISE_SEARCH_COMMAND") {
            self.search.command = value;
        }
        if let Some(value) = read_env("PICKWISE_SEARCH_ARGS") {
            self.search.args = value.split_whitespace().map(str::to_string).collect();
        }
        if let Some(value) = read_env("PICKWISE_SEARCH_CATALOG_URL") {
            self.search.catalog_url = value;
        }
        if let Some(value) = read_env("PICKWISE_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_env("PICKWISE_SEARCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PICKWISE_DIALOGUE_MAX_PRODUCTS") {
            self.dialogue.max_products = parse_env("PICKWISE_DIALOGUE_MAX_PRODUCTS", &value)?;
        }
        if let Some(value) = read_env("PICKWISE_DIALOGUE_CLARIFICATION_FLOOR") {
            self.dialogue.clarification_floor =
                parse_env("PICKWISE_DIALOGUE_CLARIFICATION_FLOOR", &value)?;
        }
        if let Some(value) = read_env("PICKWISE_DIALOGUE_SUFFICIENCY_THRESHOLD") {
            self.dialogue.sufficiency_threshold =
                parse_env("PICKWISE_DIALOGUE_SUFFICIENCY_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("PICKWISE_DIALOGUE_RELAXED_DEDUP_BELOW") {
            self.dialogue.relaxed_dedup_below =
                parse_env("PICKWISE_DIALOGUE_RELAXED_DEDUP_BELOW", &value)?;
        }
        if let Some(value) = read_env("PICKWISE_DIALOGUE_BATCH_DELAY_SECS") {
            self.dialogue.batch_delay_secs =
                parse_env("PICKWISE_DIALOGUE_BATCH_DELAY_SECS", &value)?;
        }

        let log_level =
            read_env("PICKWISE_LOGGING_LEVEL").or_else(|| read_env("PICKWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PICKWISE_LOGGING_FORMAT").or_else(|| read_env("PICKWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(search_command) = overrides.search_command {
            self.search.command = search_command;
        }
        if let Some(max_products) = overrides.max_products {
            self.dialogue.max_products = max_products;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_search(&self.search)?;
        validate_dialogue(&self.dialogue)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// An explicit path wins when it exists; otherwise the first existing
/// default candidate is used.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model is required (use the deployment name for azure_openai)".to_string(),
        ));
    }

    let has_api_key =
        llm.api_key.as_ref().map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false);
    let has_base_url =
        llm.base_url.as_ref().map(|value| !value.trim().is_empty()).unwrap_or(false);

    match llm.provider {
        LlmProvider::OpenAi => {
            if !has_api_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::AzureOpenAi => {
            if !has_api_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the azure_openai provider".to_string(),
                ));
            }
            if !has_base_url {
                return Err(ConfigError::Validation(
                    "llm.base_url must be set to the Azure endpoint for azure_openai".to_string(),
                ));
            }
            let has_version =
                llm.api_version.as_ref().map(|value| !value.trim().is_empty()).unwrap_or(false);
            if !has_version {
                return Err(ConfigError::Validation(
                    "llm.api_version is required for azure_openai (e.g. 2024-02-15-preview)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            if !has_base_url {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = llm.base_url.as_deref().filter(|value| !value.trim().is_empty()) {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.command.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search.command is required. Set it to the automation agent program (or PICKWISE_SEARCH_COMMAND)"
                .to_string(),
        ));
    }
    if search.timeout_secs == 0 || search.timeout_secs > 3600 {
        return Err(ConfigError::Validation(
            "search.timeout_secs must be in range 1..=3600".to_string(),
        ));
    }
    if !is_http_url(&search.catalog_url) {
        return Err(ConfigError::Validation(
            "search.catalog_url must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.max_products == 0 {
        return Err(ConfigError::Validation(
            "dialogue.max_products must be greater than zero".to_string(),
        ));
    }

    let floor = dialogue.clarification_floor;
    let threshold = dialogue.sufficiency_threshold;
    let ordered = (0.0..=1.0).contains(&floor) && (0.0..=1.0).contains(&threshold) && floor <= threshold;
    if !ordered {
        return Err(ConfigError::Validation(format!(
            "dialogue.clarification_floor ({floor}) and dialogue.sufficiency_threshold ({threshold}) must satisfy 0 <= floor <= threshold <= 1"
        )));
    }

    let intents = &dialogue.intents;
    let sets = [
        ("greeting", &intents.greeting),
        ("end", &intents.end),
        ("restart", &intents.restart),
        ("more_details", &intents.more_details),
    ];
    for (name, entries) in sets {
        if entries.is_empty() {
            return Err(ConfigError::Validation(format!(
                "dialogue.intents.{name} must list at least one word"
            )));
        }
        if entries.iter().any(|entry| !entry.chars().any(char::is_alphanumeric)) {
            return Err(ConfigError::Validation(format!(
                "dialogue.intents.{name} entries must contain a letter or digit"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    search: Option<SearchPatch>,
    dialogue: Option<DialoguePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    command: Option<String>,
    args: Option<Vec<String>>,
    catalog_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    max_products: Option<usize>,
    clarification_floor: Option<f64>,
    sufficiency_threshold: Option<f64>,
    relaxed_dedup_below: Option<usize>,
    batch_delay_secs: Option<u64>,
    intents: Option<IntentsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentsPatch {
    greeting: Option<Vec<String>>,
    end: Option<Vec<String>>,
    restart: Option<Vec<String>>,
    more_details: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
