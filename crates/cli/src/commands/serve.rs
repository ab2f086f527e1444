//! `tierwise serve`: Start the HTTP API server.

use tierwise_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Tierwise Gateway");
    println!("   Listening:     {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Remote tiers:  {}",
        if config.router.enabled && config.has_remote_credentials() {
            "enabled"
        } else {
            "disabled (local only)"
        }
    );
    println!(
        "   Corpus:        {}",
        config.retrieval.corpus_path.as_deref().unwrap_or("none")
    );
    println!(
        "   Admin token:   {}",
        if config.gateway.admin_token.is_some() { "required" } else { "not set" }
    );

    tierwise_gateway::start(config).await?;

    Ok(())
}
