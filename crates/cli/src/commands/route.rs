//! `tierwise route`: Show the routing decision for a request.

use tierwise_config::AppConfig;
use tierwise_providers::RoutingRequest;

pub async fn run(
    skill: String,
    tokens: usize,
    user: Option<String>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = tierwise_providers::build_from_config(&config);

    let mut request = RoutingRequest::new(skill)
        .with_context_tokens(tokens)
        .streaming(stream);
    if let Some(user) = user {
        request = request.with_user(user);
    }

    let default_tier = router.default_tier(&request.skill);
    let selected = router.select_provider(&request);

    println!("  Skill:         {}", request.skill);
    println!("  Context:       ~{tokens} tokens");
    println!("  Default tier:  {default_tier}");
    println!("  Selected tier: {}", selected.tier);
    println!("  Model:         {}", selected.model);
    println!("  Capability:    {}", selected.provider.name());
    if !router.remote_available() {
        println!();
        println!("  ⚠️  Remote tiers unavailable (router disabled or no API key)");
    }

    Ok(())
}
