use std::env;
use std::fs;
use std::path::Path;

use ledgerchat_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct FieldSource<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
    options: &'a LoadOptions,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = FieldSource {
        doc: config_file_doc.as_ref(),
        path: config_file_path.as_deref(),
        options,
    };

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let fields: [(&str, String, &[&str]); 11] = [
        ("llm.enabled", config.llm.enabled.to_string(), &["LEDGERCHAT_LLM_ENABLED"]),
        ("llm.provider", format!("{:?}", config.llm.provider), &["LEDGERCHAT_LLM_PROVIDER"]),
        ("llm.model", config.llm.model.clone(), &["LEDGERCHAT_LLM_MODEL"]),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["LEDGERCHAT_LLM_BASE_URL"],
        ),
        ("llm.api_key", api_key.to_string(), &["LEDGERCHAT_LLM_API_KEY"]),
        (
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["LEDGERCHAT_LLM_TIMEOUT_SECS"],
        ),
        (
            "assistant.history_limit",
            config.assistant.history_limit.to_string(),
            &["LEDGERCHAT_ASSISTANT_HISTORY_LIMIT"],
        ),
        (
            "assistant.context_window",
            config.assistant.context_window.to_string(),
            &["LEDGERCHAT_ASSISTANT_CONTEXT_WINDOW"],
        ),
        (
            "assistant.fallback_confidence",
            config.assistant.fallback_confidence.to_string(),
            &["LEDGERCHAT_ASSISTANT_FALLBACK_CONFIDENCE"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["LEDGERCHAT_LOGGING_LEVEL", "LEDGERCHAT_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["LEDGERCHAT_LOGGING_FORMAT", "LEDGERCHAT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec![
        "effective config (source precedence: flag > env > file > default):".to_string(),
    ];
    lines.extend(
        fields
            .iter()
            .map(|(key, value, env_keys)| render_line(key, value, sources.of(key, env_keys))),
    );
    lines.join("\n")
}

impl FieldSource<'_> {
    fn of(&self, key_path: &str, env_keys: &[&str]) -> String {
        if self.overridden(key_path) {
            return "flag".to_string();
        }

        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }

    fn overridden(&self, key_path: &str) -> bool {
        let overrides = &self.options.overrides;
        match key_path {
            "logging.level" => overrides.log_level.is_some(),
            "llm.enabled" => overrides.llm_enabled.is_some(),
            "llm.provider" => overrides.llm_provider.is_some(),
            "llm.model" => overrides.llm_model.is_some(),
            "llm.base_url" => overrides.llm_base_url.is_some(),
            "llm.api_key" => overrides.llm_api_key.is_some(),
            _ => false,
        }
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
