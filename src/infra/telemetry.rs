use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names::{FETCH_JOINED, FETCH_STARTED, FETCH_SUPPRESSED, INVALID_MODELS};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Registers descriptions for the counters emitted by the cache.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            FETCH_STARTED,
            Unit::Count,
            "Total number of backend fetches started, by kind (entity|list)."
        );
        describe_counter!(
            FETCH_JOINED,
            Unit::Count,
            "Total number of load requests that joined an in-flight fetch."
        );
        describe_counter!(
            FETCH_SUPPRESSED,
            Unit::Count,
            "Total number of fetch results dropped because the repository was cleared."
        );
        describe_counter!(
            INVALID_MODELS,
            Unit::Count,
            "Total number of backend payloads rejected while filling lists."
        );
    });
}
