//! `crawlpilot agent`: interactive or single-message chat mode.

use crawlpilot_agent::{AgentLoop, FinalAnswer};
use crawlpilot_config::AppConfig;
use crawlpilot_core::ModelError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let agent = prepare(&config)?;
    let session = agent.store().create_session()?;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let answer = agent.run(&session, &msg).await?;
        eprint!("\r              \r");
        println!("{}", answer.reply);
        return Ok(());
    }

    println!();
    println!("  CrawlPilot Agent: Interactive Mode");
    println!();
    println!("  Model:     {}", agent.model_name());
    println!("  Tools:     {}", agent.dispatcher().registry().names().join(", "));
    println!("  Session:   {session}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        eprint!("  ...");
        match agent.run(&session, line).await {
            Ok(answer) => {
                eprint!("\r     \r");
                print_answer(&answer);
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

/// Build the agent, explaining how to configure a model key when one is
/// required and missing.
fn prepare(config: &AppConfig) -> Result<Arc<AgentLoop>, Box<dyn std::error::Error>> {
    crawlpilot_gateway::build_agent(config).map_err(|e| {
        if let Some(ModelError::NotConfigured(_)) = e.downcast_ref::<ModelError>() {
            print_key_help();
        }
        e
    })
}

fn print_key_help() {
    eprintln!();
    eprintln!("  ERROR: No model API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    GEMINI_API_KEY=...        (recommended)");
    eprintln!("    CRAWLPILOT_API_KEY=...    (generic)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    eprintln!("  Local providers (model.provider = \"ollama\" or \"vllm\") need no key.");
    eprintln!();
}

fn print_answer(answer: &FinalAnswer) {
    println!();
    for line in answer.reply.lines() {
        println!("  Agent > {line}");
    }
    if !answer.tools_used.is_empty() {
        println!("  (tools: {})", answer.tools_used.join(", "));
    }
    if answer.truncated {
        println!("  (stopped after {} iterations)", answer.iterations);
    }
    println!();
}
