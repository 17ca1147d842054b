use tracing_subscriber::EnvFilter;

use super::constants::LOG_FILTER_ENV;

/// Installs the process-wide fmt subscriber. The filter comes from
/// `TERMDECK_LOG`, then `RUST_LOG`, then `info`. Later calls are no-ops.
pub fn init_tracing() {
    let filter = std::env::var(LOG_FILTER_ENV)
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::info!(check = "ok", "telemetry.init.repeated");
    }
}
