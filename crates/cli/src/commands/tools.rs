//! `crawlpilot tools`: list the registered tools and their schemas.

use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let registry = crawlpilot_tools::default_registry(&config.tools)?;

    println!("{} tools available:\n", registry.len());
    for tool in registry.list() {
        println!("  {}", tool.name);
        println!("      {}", tool.description);
        println!(
            "      parameters: {}",
            serde_json::to_string(&tool.parameters)?
        );
    }

    if config.tools.firecrawl_api_key.is_none() {
        println!("\n  FIRECRAWL_API_KEY is not set; tool calls will fail until it is.");
    }

    Ok(())
}
