//! `crawlpilot onboard`: first-time setup.

use crawlpilot_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    println!("CrawlPilot: First-Time Setup");
    println!("============================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set GEMINI_API_KEY (or model.api_key in the config)");
    println!("   2. Set FIRECRAWL_API_KEY for the web tools");
    println!("   3. Run: crawlpilot agent\n");

    Ok(())
}
