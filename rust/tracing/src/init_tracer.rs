use tracing_subscriber::fmt;
use tracing_subscriber::Registry;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

/// Crates whose `tracing` events should default to `trace` level even when
/// `RUST_LOG` only sets a blanket `error` for everything else. Listing them
/// explicitly means a new catalog crate's logs show up without the caller
/// needing to know our internal module names.
const DEFAULT_CRATE_NAMES: &[&str] = &[
    "catalog_config",
    "catalog_coordinator",
    "catalog_dao",
    "catalog_error",
    "catalog_gc",
    "catalog_sqlite",
    "catalog_storage",
    "catalog_types",
    "catalog_version",
];

pub fn init_global_filter_layer() -> Box<dyn Layer<Registry> + Send + Sync> {
    let default_filters = DEFAULT_CRATE_NAMES
        .iter()
        .map(|s| format!("{s}=trace"))
        .collect::<Vec<_>>()
        .join(",");
    let global_filter = format!("error,{default_filters}");
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(global_filter)).boxed()
}

pub fn init_stdout_layer() -> Box<dyn Layer<Registry> + Send + Sync> {
    fmt::layer().pretty().with_target(false).boxed()
}

pub fn init_tracing(layers: Vec<Box<dyn Layer<Registry> + Send + Sync>>) {
    let layers = layers
        .into_iter()
        .reduce(|a, b| Box::new(a.and_then(b)))
        .expect("at least one tracing layer must be provided");
    let subscriber = tracing_subscriber::registry().with(layers);
    tracing::subscriber::set_global_default(subscriber)
        .expect("should be able to set global tracing subscriber");
    tracing::info!("Global tracing subscriber set");
}

pub fn init_panic_tracing_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let payload = if let Some(s) = payload.downcast_ref::<&str>() {
            Some(&**s)
        } else {
            payload.downcast_ref::<String>().map(|s| s.as_str())
        };

        tracing::error!(
            panic.payload = payload,
            panic.location = panic_info.location().map(|l| l.to_string()),
            "A panic occurred"
        );

        prev_hook(panic_info);
    }));
}

/// Installs the default stdout-pretty tracing subscriber for a catalog binary.
pub fn init_stdout_tracing() {
    init_tracing(vec![init_global_filter_layer(), init_stdout_layer()]);
    init_panic_tracing_hook();
}
