//! Pod watcher daemon reporting reachability transitions to a registry.
//!
//! # Running
//!
//! ```bash
//! HOOK_API=http://registry:8081/hook cargo run --example hook-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `HOOK_API`: Registration endpoint (default: http://localhost:8081/hook)
//! - `WATCH_NAMESPACE`: Namespace to watch (default: all namespaces)
//! - `LABEL_SELECTOR`: Label selector for watched pods (default: none)
//! - `MAX_IN_FLIGHT`: Concurrent registration requests (default: 64)
//! - `HOOK_TIMEOUT_SECS`: Timeout for one registration request (default: 10)

use std::env;
use std::time::Duration;

use k8s_endpoint_hook::{
    DEFAULT_ENDPOINT, DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT, Hook, Reporter, ReporterConfig,
    WatchConfig, watch,
};
use tracing::{Level, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    // Read configuration from environment
    let endpoint = env::var("HOOK_API").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
    let max_in_flight: usize = env::var("MAX_IN_FLIGHT")
        .ok()
        .and_then(|n| n.parse().ok())
        .unwrap_or(DEFAULT_MAX_IN_FLIGHT);
    let timeout = env::var("HOOK_TIMEOUT_SECS")
        .ok()
        .and_then(|t| t.parse().ok())
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

    let mut config = WatchConfig::new();
    if let Ok(namespace) = env::var("WATCH_NAMESPACE") {
        info!("Namespace: {namespace}");
        config = config.namespace(namespace);
    }

    if let Ok(selector) = env::var("LABEL_SELECTOR") {
        info!("Label selector: {selector}");
        config = config.label_selector(selector);
    }

    let reporter = Reporter::new(
        ReporterConfig::new(endpoint)
            .max_in_flight(max_in_flight)
            .timeout(timeout),
    )?;

    info!("Hook API: {}", reporter.endpoint());
    info!("Max in flight: {max_in_flight}");
    info!("Request timeout: {timeout:?}");

    watch(config, Hook::new(reporter)).await?;

    info!("Pod watch ended");

    Ok(())
}
