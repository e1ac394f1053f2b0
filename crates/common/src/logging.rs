//! Logging bootstrap.
//!
//! Provides the two tracing-subscriber `fmt` layers the platform boots
//! with (compact for local development, JSON for production), both as
//! bare layer constructors and as ready-to-call `init_*` functions that
//! pair them with a plain `EnvFilter`. `chatcore-logger`'s `LoggerFactory`
//! uses the bare constructors directly, attaching itself as the
//! per-layer filter instead of an `EnvFilter`, so this crate stays free
//! of the logger factory's own dependencies.

use tracing_subscriber::{
    layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

/// The compact, human-readable `fmt` layer, unfiltered. Exposed
/// separately from [`init_tracing`] so `chatcore-logger`'s `LoggerFactory`
/// can be attached as the layer's filter instead of an `EnvFilter`.
pub fn compact_fmt_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_file(true)
        .compact()
}

/// The JSON `fmt` layer, unfiltered, for the same reason.
pub fn json_fmt_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_current_span(true)
}

/// Initialize compact, human-readable tracing output.
///
/// `directives` is an `EnvFilter`-syntax string (e.g. `"info,presence=debug"`);
/// pass `None` to fall back to `RUST_LOG` or `"info"`. Used directly by
/// crates with no `LoggerFactory` wired up yet (tests, small tools); the
/// `chatd` composition root instead installs a `LoggerFactory` as the
/// per-layer filter via `chatcore_logger::install`.
pub fn init_tracing(directives: Option<&str>) {
    let env_filter = resolve_filter(directives);

    tracing_subscriber::registry()
        .with(compact_fmt_layer().with_filter(env_filter))
        .init();
}

/// Initialize JSON tracing output, for log aggregation in production.
pub fn init_tracing_json(directives: Option<&str>) {
    let env_filter = resolve_filter(directives);

    tracing_subscriber::registry()
        .with(json_fmt_layer().with_filter(env_filter))
        .init();
}

fn resolve_filter(directives: Option<&str>) -> EnvFilter {
    if let Some(d) = directives {
        return EnvFilter::try_new(d).unwrap_or_else(|_| EnvFilter::new("info"));
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info, warn};

    #[test]
    fn tracing_init_is_tolerant_of_reinit() {
        let _result = std::panic::catch_unwind(|| {
            init_tracing(Some("debug"));
        });

        info!("test log message");
        warn!(count = 42, "warning with structured data");
        error!(error = "test error", "error message");
    }
}
