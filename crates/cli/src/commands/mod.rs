pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod extract;

use std::sync::Arc;

use ledgerchat_agent::{ActionResponse, AgentRuntime, DispatchOutcome};
use ledgerchat_core::config::{AppConfig, LoadOptions};
use ledgerchat_ledger::InMemoryAccounting;
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME_INIT: u8 = 3;
pub const EXIT_MODEL_CLIENT: u8 = 4;
pub const EXIT_OPERATION_FAILED: u8 = 5;
pub const EXIT_DOCTOR_FAILED: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            outcome: None,
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            outcome: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Wraps an assistant response. Failed bookkeeping operations map to a
    /// non-zero exit code; everything else (including clarifying questions)
    /// is a successful command.
    pub fn from_response(command: &str, response: ActionResponse) -> Self {
        let (status, error_class, exit_code) = match response.outcome {
            DispatchOutcome::ExternalFailure(kind) => {
                ("error", Some(kind.user_facing().as_str().to_string()), EXIT_OPERATION_FAILED)
            }
            _ => ("ok", None, 0),
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: status.to_string(),
            error_class,
            message: response.message,
            outcome: Some(response.outcome.as_str().to_string()),
            data: response.data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn silent() -> Self {
        Self { exit_code: 0, output: String::new() }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Config, async runtime and agent runtime shared by the conversational
/// commands.
pub(crate) struct Session {
    pub runtime: tokio::runtime::Runtime,
    pub agent: AgentRuntime,
}

pub(crate) fn open_session(command: &str, options: &LoadOptions) -> Result<Session, CommandResult> {
    let config = AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME_INIT,
            )
        },
    )?;

    let agent = AgentRuntime::from_config(&config, Arc::new(InMemoryAccounting::new())).map_err(
        |error| {
            CommandResult::failure(
                command,
                "model_client",
                format!("failed to build model client: {error}"),
                EXIT_MODEL_CLIENT,
            )
        },
    )?;

    runtime.block_on(agent.probe_model());
    Ok(Session { runtime, agent })
}
