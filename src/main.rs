//! Research Agent - CLI Entry Point
//!
//! Reads one query from stdin, runs the research loop, and prints the
//! final response.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use research_agent::agent::Agent;
use research_agent::config::Config;
use research_agent::llm::OpenAiClient;
use research_agent::tools::search::WebSearcher;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration: model={}", config.model);

    // One completion client and one tool instance, shared for the whole run
    let llm = Arc::new(OpenAiClient::new(&config));
    let tool = Arc::new(WebSearcher::new(&config, llm.clone()));
    let agent = Agent::new(llm, tool);

    print!("Enter your query: ");
    io::stdout().flush()?;
    let mut query = String::new();
    io::stdin().lock().read_line(&mut query)?;

    let outcome = agent.run(query.trim()).await?;
    info!(
        "Run finished after {} iteration(s), satisfied={}",
        outcome.iterations, outcome.satisfied
    );

    println!("Final Response: {}", outcome.response);

    Ok(())
}
