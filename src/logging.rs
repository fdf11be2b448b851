use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::keys;

/// Install the global subscriber: an stderr layer plus a Sentry layer.
///
/// Stderr keeps stdout free for result documents. Output is compact text
/// unless `UNIVERSAL_SEARCH_LOG_FORMAT=json`. Sentry receives ERROR events as
/// issues and WARN as breadcrumbs. Level defaults to INFO; override via `RUST_LOG`.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,universal_search=debug"));

    let json = std::env::var(keys::LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let (text_layer, json_layer) = if json {
        let layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false);
        (None, Some(layer))
    } else {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .compact();
        (Some(layer), None)
    };

    // No-op when Sentry was initialized without a DSN.
    let sentry_layer = sentry_tracing::layer().event_filter(|meta| match *meta.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    // Embedding hosts may already have a subscriber installed.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(sentry_layer)
        .try_init();

    tracing::debug!(json, "Tracing initialized");
}

/// Sentry client options. `dsn` is `None` for local runs, which makes Sentry a no-op.
pub fn sentry_options(dsn: Option<&str>) -> sentry::ClientOptions {
    sentry::ClientOptions {
        dsn: dsn.and_then(|s| s.parse().ok()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        traces_sample_rate: 0.0,
        send_default_pii: false,
        before_send: Some(std::sync::Arc::new(|mut event| {
            // Query text can carry personal data
            if let Some(ref mut request) = event.request {
                request.data = None;
            }
            event.user = None;
            Some(event)
        })),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentry_disabled_without_dsn() {
        let options = sentry_options(None);
        assert!(options.dsn.is_none());
        assert!(!options.send_default_pii);
        assert_eq!(options.release.as_deref(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init();
        init();
        tracing::info!("still logging");
    }
}
