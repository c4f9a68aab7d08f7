//! `concierge route` — Print the routing decision for a message.
//!
//! Runs the router against fresh session flags, so commands, rules, and the
//! classifier (when enabled) all apply, but no session is touched.

use crate::wiring::build_router;
use concierge_config::AppConfig;
use concierge_core::session::SessionFlags;
use concierge_providers::build_from_config;

pub async fn run(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let providers = build_from_config(&config);
    let router = build_router(&config, &providers);

    let decision = router.decide(text, &SessionFlags::default()).await;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
