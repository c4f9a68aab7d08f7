//! `concierge onboard` — First-time setup.

use concierge_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let workspace_dir = AppConfig::workspace_dir();

    println!("Concierge — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if !workspace_dir.exists() {
        std::fs::create_dir_all(&workspace_dir)?;
        println!("  Created workspace directory: {}", workspace_dir.display());
    }

    let identity_path = workspace_dir.join("IDENTITY.md");
    if !identity_path.exists() {
        std::fs::write(
            &identity_path,
            concat!(
                "# Identity\n\n",
                "Name: Concierge\n\n",
                "You are a personal assistant reachable over chat. You talk with the user\n",
                "directly and hand specialised work (planning, analysis, operations,\n",
                "research, code) to the matching role.\n",
            ),
        )?;
        println!("  Created IDENTITY.md");
    }

    let soul_path = workspace_dir.join("SOUL.md");
    if !soul_path.exists() {
        std::fs::write(
            &soul_path,
            concat!(
                "# Personality & Tone\n\n",
                "- Be concise and direct\n",
                "- Say when you are unsure\n",
                "- Ask for clarification when the request is ambiguous\n",
            ),
        )?;
        println!("  Created SOUL.md");
    }

    let user_path = workspace_dir.join("USER.md");
    if !user_path.exists() {
        std::fs::write(
            &user_path,
            concat!(
                "# User Context\n\n",
                "<!-- Add what the assistant should know about you -->\n",
            ),
        )?;
        println!("  Created USER.md");
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("   2. Run: concierge agent\n");
    }

    println!("Setup complete.\n");
    Ok(())
}
