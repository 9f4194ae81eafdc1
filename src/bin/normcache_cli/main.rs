//! normcache-cli: resolve models and lists from a configured backend through the cache.
#![deny(clippy::all, clippy::pedantic)]

mod print;

use std::process::ExitCode;
use std::sync::Arc;

use normcache::cache::{
    ApiError, CacheError, EntityStore, ListView, LoadState, Registry, UnknownTypeError,
    required_fields_present,
};
use normcache::config::{self, Command, GetArgs, ListArgs, LoadError, Settings};
use normcache::infra::{error::InfraError, http::RestModelApi, telemetry};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use print::print_json;

const SOURCE: &str = "bin::normcache_cli";

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    UnknownType(#[from] UnknownTypeError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, settings) = match config::load_with_cli() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("normcache-cli: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = telemetry::init(&settings.logging) {
        eprintln!("normcache-cli: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli.command, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target_module = SOURCE, error = %err, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: &Settings) -> Result<(), CliError> {
    let registry = build_registry(settings)?;
    match command {
        Command::Get(args) => get(&registry, &args).await,
        Command::List(args) => list(&registry, settings, args).await,
        Command::Types => print_json(&registry.model_types()),
    }
}

fn build_registry(settings: &Settings) -> Result<Arc<Registry>, CliError> {
    let registry = Registry::new();
    for model in &settings.models {
        let api = RestModelApi::from_settings(&settings.api, model, &settings.cache)?;
        let is_full = required_fields_present(&model.metadata);
        EntityStore::with_config(
            &registry,
            model.metadata.clone(),
            api,
            is_full,
            &settings.cache,
        );
    }
    info!(
        target_module = SOURCE,
        base_url = %settings.api.base_url,
        models = settings.models.len(),
        "Cache ready"
    );
    Ok(registry)
}

async fn get(registry: &Registry, args: &GetArgs) -> Result<(), CliError> {
    let store = registry
        .get_store(&args.model_type)
        .ok_or_else(|| UnknownTypeError::new(&args.model_type))?;
    let record = store.get_raw_model(&args.id, Some(true));
    match record.settled().await {
        LoadState::Error(err) => Err(err.into()),
        _ => print_json(&record.to_json()),
    }
}

async fn list(registry: &Registry, settings: &Settings, args: ListArgs) -> Result<(), CliError> {
    let store = registry
        .get_typed_store::<RestModelApi>(&args.model_type)
        .ok_or_else(|| UnknownTypeError::new(&args.model_type))?;
    let name = args
        .name
        .unwrap_or_else(|| settings.cache.default_list.clone());

    let list = store.get_list_with(&name, None, false);
    let state = store.load_list(&list).await;

    let models: Vec<_> = list.models().iter().map(|model| model.to_json()).collect();
    print_json(&json!({
        "name": list.name(),
        "state": state.as_str(),
        "total": list.total(),
        "models": models,
        "invalid_models": list.invalid_models(),
    }))?;

    match state {
        LoadState::Error(err) => Err(err.into()),
        _ => Ok(()),
    }
}
