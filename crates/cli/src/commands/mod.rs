pub mod approvals;
pub mod config;
pub mod delegations;
pub mod directory;
pub mod doctor;
pub mod migrate;

use std::future::Future;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;

use hrflow_core::config::{AppConfig, LoadOptions};
use hrflow_core::domain::approval::RequestType;
use hrflow_core::domain::employee::CountryCode;
use hrflow_db::{connect_with_settings, migrations};
use hrflow_engine::{ApprovalEngine, EngineError};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_REFUSED: u8 = 6;
pub const EXIT_INPUT: u8 = 7;

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
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
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
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
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

/// Message plus JSON `data` for a successful engine command.
pub(crate) struct Reply {
    message: String,
    data: Value,
}

impl Reply {
    pub(crate) fn new(
        message: impl Into<String>,
        data: impl Serialize,
    ) -> Result<Self, CommandError> {
        let data = serde_json::to_value(data).map_err(CommandError::Output)?;
        Ok(Self { message: message.into(), data })
    }
}

pub(crate) enum CommandError {
    Input(anyhow::Error),
    Engine(EngineError),
    Output(serde_json::Error),
}

impl From<EngineError> for CommandError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(value: anyhow::Error) -> Self {
        Self::Input(value)
    }
}

/// Loads config, opens and migrates the database, then hands an engine to `operation`.
pub(crate) fn run_engine_command<F, Fut>(command: &str, operation: F) -> CommandResult
where
    F: FnOnce(ApprovalEngine) -> Fut,
    Fut: Future<Output = Result<Reply, CommandError>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| {
            CommandResult::failure(command, "db_connectivity", error.to_string(), EXIT_DATABASE)
        })?;
        migrations::run_pending(&pool).await.map_err(|error| {
            CommandResult::failure(command, "migration", error.to_string(), EXIT_MIGRATION)
        })?;

        let engine = ApprovalEngine::from_pool(pool.clone(), &config)
            .map_err(|error| engine_failure(command, error))?;
        let reply = operation(engine).await;
        pool.close().await;

        match reply {
            Ok(reply) => Ok::<CommandResult, CommandResult>(CommandResult::success_with_data(
                command,
                reply.message,
                Some(reply.data),
            )),
            Err(CommandError::Input(error)) => Err(CommandResult::failure(
                command,
                "invalid_input",
                format!("{error:#}"),
                EXIT_INPUT,
            )),
            Err(CommandError::Engine(error)) => Err(engine_failure(command, error)),
            Err(CommandError::Output(error)) => Err(CommandResult::failure(
                command,
                "serialization",
                format!("failed to serialize command data: {error}"),
                EXIT_RUNTIME,
            )),
        }
    });

    match result {
        Ok(result) | Err(result) => result,
    }
}

fn engine_failure(command: &str, error: EngineError) -> CommandResult {
    let exit_code = match error {
        EngineError::Repository(_) => EXIT_DATABASE,
        EngineError::Configuration(_) => EXIT_CONFIG,
        _ => EXIT_REFUSED,
    };
    CommandResult::failure(command, error.class(), error.to_string(), exit_code)
}

pub(crate) fn parse_country(value: &str) -> anyhow::Result<CountryCode> {
    CountryCode::parse(value).with_context(|| format!("invalid country code `{value}`"))
}

pub(crate) fn parse_optional_country(value: Option<&str>) -> anyhow::Result<Option<CountryCode>> {
    value.map(parse_country).transpose()
}

pub(crate) fn parse_request_type(value: &str) -> anyhow::Result<RequestType> {
    value.parse().with_context(|| format!("invalid request type `{value}`"))
}

/// RFC 3339 instant, or a bare `YYYY-MM-DD` taken as the start or end of that UTC day.
pub(crate) fn parse_instant(value: &str, end_of_day: bool) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("`{value}` is neither RFC 3339 nor YYYY-MM-DD"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59).context("end of day")?
    } else {
        NaiveTime::MIN
    };
    Ok(date.and_time(time).and_utc())
}
