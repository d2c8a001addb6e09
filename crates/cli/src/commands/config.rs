use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hrflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Key path in `hrflow.toml`, the env var that overrides it, and its effective value.
struct Setting {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key_path,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key_path, &setting.value, source));
    }

    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    vec![
        Setting {
            key_path: "database.url",
            env_keys: &["HRFLOW_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Setting {
            key_path: "database.max_connections",
            env_keys: &["HRFLOW_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Setting {
            key_path: "database.timeout_secs",
            env_keys: &["HRFLOW_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Setting {
            key_path: "tenancy.fallback_country_code",
            env_keys: &["HRFLOW_TENANCY_FALLBACK_COUNTRY_CODE"],
            value: config.tenancy.fallback_country_code.clone(),
        },
        Setting {
            key_path: "notifications.enabled",
            env_keys: &["HRFLOW_NOTIFICATIONS_ENABLED"],
            value: config.notifications.enabled.to_string(),
        },
        Setting {
            key_path: "logging.level",
            env_keys: &["HRFLOW_LOGGING_LEVEL", "HRFLOW_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Setting {
            key_path: "logging.format",
            env_keys: &["HRFLOW_LOGGING_FORMAT", "HRFLOW_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("hrflow.toml"), PathBuf::from("config/hrflow.toml")]
        .into_iter()
        .find(|path| path.exists())
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

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
