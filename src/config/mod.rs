//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{collections::HashSet, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::{CacheConfig, FieldMeta, ModelMetadata};

const DEFAULT_CONFIG_BASENAME: &str = "config/normcache";
const LOCAL_CONFIG_BASENAME: &str = "normcache";
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the normcache inspection binary.
#[derive(Debug, Parser)]
#[command(
    name = "normcache-cli",
    version,
    about = "Inspect a backend through the normalized entity cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "NORMCACHE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the backend base URL.
    #[arg(long = "api-base-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub api_base_url: Option<String>,

    /// Bearer token sent to the backend (flag hidden to keep tokens out of shell history).
    #[arg(long = "api-token", hide = true, env = "NORMCACHE_API_TOKEN", value_name = "TOKEN")]
    pub api_token: Option<String>,

    /// Override the backend request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS")]
    pub api_timeout_seconds: Option<u64>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Resolve one model and print it once it settles.
    Get(GetArgs),
    /// Load a list and print its members.
    List(ListArgs),
    /// Print the configured model types.
    Types,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    /// Model type, as configured in `[[models]]`.
    #[arg(value_name = "TYPE")]
    pub model_type: String,

    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    #[arg(value_name = "TYPE")]
    pub model_type: String,

    /// List name; defaults to the configured default list.
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub api: ApiSettings,
    pub models: Vec<ModelSettings>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Always ends with `/` so resource paths join below it.
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub metadata: ModelMetadata,
    /// Collection path below the API base URL.
    pub resource: String,
    /// Whether the backend serves `GET {resource}/{id}`.
    pub single_fetch: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("NORMCACHE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: CacheConfig,
    api: RawApiSettings,
    models: Vec<RawModelSettings>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(token) = overrides.api_token.as_ref() {
            self.api.token = Some(token.clone());
        }
        if let Some(seconds) = overrides.api_timeout_seconds {
            self.api.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            api,
            models,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_config(cache)?;
        let api = build_api_settings(api)?;
        let models = build_model_settings(models)?;

        Ok(Self {
            logging,
            cache,
            api,
            models,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_config(cache: CacheConfig) -> Result<CacheConfig, LoadError> {
    if cache.default_list.trim().is_empty() {
        return Err(LoadError::invalid(
            "cache.default_list",
            "must not be empty",
        ));
    }
    Ok(cache)
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_url = api
        .base_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("api.base_url", "must be set"))?;
    let mut base_url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("api.base_url", format!("invalid url `{raw_url}`: {err}")))?;
    if base_url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "api.base_url",
            format!("`{raw_url}` cannot be used as a base url"),
        ));
    }
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }

    let timeout_seconds = api.timeout_seconds.unwrap_or(DEFAULT_API_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "api.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let token = api.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(ApiSettings {
        base_url,
        token,
        timeout: Duration::from_secs(timeout_seconds),
    })
}

fn build_model_settings(models: Vec<RawModelSettings>) -> Result<Vec<ModelSettings>, LoadError> {
    let mut seen = HashSet::new();
    models
        .into_iter()
        .map(|model| {
            let model_type = model.model_type.trim().to_string();
            if model_type.is_empty() {
                return Err(LoadError::invalid("models.model_type", "must not be empty"));
            }
            if !seen.insert(model_type.clone()) {
                return Err(LoadError::invalid(
                    "models.model_type",
                    format!("`{model_type}` is configured more than once"),
                ));
            }
            if let Some(field) = model.fields.iter().find(|field| field.kinds.is_empty()) {
                return Err(LoadError::invalid(
                    "models.fields",
                    format!("field `{}` of `{model_type}` declares no kinds", field.name),
                ));
            }

            let resource = model
                .resource
                .map(|value| value.trim_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| model_type.to_lowercase());

            Ok(ModelSettings {
                metadata: ModelMetadata {
                    model_type,
                    fields: model.fields,
                },
                resource,
                single_fetch: model.single_fetch.unwrap_or(true),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    token: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawModelSettings {
    model_type: String,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    single_fetch: Option<bool>,
    #[serde(default)]
    fields: Vec<FieldMeta>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
