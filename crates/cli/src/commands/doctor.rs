use std::path::Path;

use pickwise_agent::llm::OpenAiCompatibleClient;
use pickwise_core::config::{AppConfig, LoadOptions, SearchConfig};
use serde::Serialize;

use crate::commands::{CommandResult, CONFIG_FAILURE, RUNTIME_FAILURE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = report.exit_code();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

impl DoctorReport {
    /// 0 when every check passed, the configuration code when the config
    /// did not load, the runtime code for any other failed check.
    pub fn exit_code(&self) -> u8 {
        if self.overall_status == CheckStatus::Pass {
            return 0;
        }
        let config_failed = self
            .checks
            .iter()
            .any(|check| check.name == "config_validation" && check.status == CheckStatus::Fail);
        if config_failed {
            CONFIG_FAILURE
        } else {
            RUNTIME_FAILURE
        }
    }
}

pub fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_endpoint(&config));
            checks.push(check_search_command(&config.search));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_endpoint", "search_command"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_endpoint(config: &AppConfig) -> DoctorCheck {
    match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck {
            name: "llm_endpoint",
            status: CheckStatus::Pass,
            details: format!(
                "{} client for model `{}` at {}",
                config.llm.provider.as_str(),
                config.llm.model,
                client.endpoint()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "llm_endpoint", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_search_command(search: &SearchConfig) -> DoctorCheck {
    let command = Path::new(&search.command);
    let resolved = if command.components().count() > 1 {
        command.is_file().then(|| command.to_path_buf())
    } else {
        which::which(&search.command).ok()
    };

    match resolved {
        Some(path) => DoctorCheck {
            name: "search_command",
            status: CheckStatus::Pass,
            details: format!("search agent resolves to `{}`", path.display()),
        },
        None => DoctorCheck {
            name: "search_command",
            status: CheckStatus::Fail,
            details: format!("search agent `{}` was not found", search.command),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
