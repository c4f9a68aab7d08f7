//! `concierge agent` — Interactive or single-message chat mode.

use crate::wiring::build_runtime;
use concierge_channels::{ChannelRegistry, CliChannel};
use concierge_config::AppConfig;
use std::sync::Arc;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CONCIERGE_API_KEY=...");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let cli = Arc::new(CliChannel::new());
    let mut channels = ChannelRegistry::new();
    channels.register(cli.clone());
    let channels = Arc::new(channels);

    let runtime = build_runtime(&config, channels.clone())?;

    if let Some(msg) = message {
        // Replies are printed by the CLI channel as they are published
        if let Err(e) = runtime.process_message(cli.inbound(0, msg)).await {
            eprintln!("  [Error] {e}");
            return Err(e.into());
        }
        return Ok(());
    }

    println!();
    println!("  Concierge — interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Routes:    /chat /plan /analyze /ops /research /code /code1 /code2 /code3");
    println!("  Modes:     /local /cloud /work [N|off|status] /normal /new");
    println!();
    println!("  Type your message and press Enter. Type 'exit' or Ctrl+D to quit.");
    println!();

    let rx = channels.start_all().await.map_err(|e| format!("Channel error: {e}"))?;
    runtime.serve(rx).await;
    channels.stop_all().await;

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
