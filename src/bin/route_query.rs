//! Utility binary that runs only the router for a query
//! Prints the capabilities Gemini would select, without dispatching them
//!
//! Usage: route_query "market size and patents for moleculeX"

use pharma_insights_backend::config::Config;
use pharma_insights_backend::orchestrator::api_client::GeminiClient;
use pharma_insights_backend::orchestrator::router::Router;
use pharma_insights_backend::orchestrator::CapabilityId;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        anyhow::bail!("usage: route_query <query>");
    }

    let config = Config::from_env();
    let Some(api_key) = config.api_key else {
        anyhow::bail!("GEMINI_API_KEY (or GOOGLE_API_KEY) is not set");
    };

    println!("Model: {}", config.orchestrator.gemini_model);
    println!("Query: {}\n", query);

    let client = GeminiClient::new(api_key, &config.orchestrator)?;
    let router = Router::new(Arc::new(client));
    let decision = router.route(&query).await?;

    println!("Selected capabilities:");
    if decision.selected.is_empty() {
        println!("   (none)");
    }
    for name in &decision.selected {
        let marker = if name.parse::<CapabilityId>().is_ok() {
            "✓"
        } else {
            "✗ unknown"
        };
        println!("   {} {}", marker, name);
    }
    println!("\nReason: {}", decision.reason);

    Ok(())
}
