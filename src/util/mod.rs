//! Small shared utilities

pub mod retry;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with a default level plus per-component overrides
/// from the `logger` config map (component names become module targets)
pub fn init_logging(default_level: &str, components: &HashMap<String, String>) {
    let mut directives = default_level.to_string();
    for (component, level) in components {
        directives.push_str(&format!(
            ",{}::{}={}",
            env!("CARGO_CRATE_NAME"),
            component_target(component),
            level
        ));
    }
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Map a config component name onto its module path segment
fn component_target(component: &str) -> &str {
    match component {
        "dataServer" => "server",
        "db" => "db",
        "chain" => "chain",
        "tracker" => "tracker",
        "mining" => "mining",
        "ops" => "ops",
        other => other,
    }
}

/// Current unix time in whole seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current unix time as the signed form used on the proxy wire
pub fn unix_now_i64() -> i64 {
    unix_now() as i64
}
