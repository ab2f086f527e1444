//! `tierwise doctor`: Diagnose configuration and backend health.

use tierwise_config::AppConfig;
use tierwise_core::provider::Provider;
use tierwise_providers::OpenAiCompatProvider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Tierwise Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file at {} — using defaults", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the configuration and re-run.");
            return Ok(());
        }
    };

    if !config.router.enabled {
        println!("  ⚠️  Router disabled — every request routes to local");
        issues += 1;
    }

    match tierwise_providers::build_remote_provider(&config) {
        Some(remote) => match remote.health_check().await {
            Ok(true) => println!("  ✅ Remote endpoint reachable ({})", config.endpoints.remote_url),
            Ok(false) | Err(_) => {
                println!("  ❌ Remote endpoint unhealthy ({})", config.endpoints.remote_url);
                issues += 1;
            }
        },
        None => {
            println!("  ⚠️  No API key — set TIERWISE_API_KEY or api_key in config.toml");
            issues += 1;
        }
    }

    let local = OpenAiCompatProvider::ollama(Some(&config.endpoints.local_url));
    match local.health_check().await {
        Ok(true) => println!("  ✅ Local endpoint reachable ({})", config.endpoints.local_url),
        Ok(false) | Err(_) => {
            println!("  ❌ Local endpoint unreachable ({}) — local fallback will fail", config.endpoints.local_url);
            issues += 1;
        }
    }

    match tierwise_engine::build_retriever(&config) {
        Ok(Some(_)) => println!("  ✅ Corpus indexed"),
        Ok(None) => println!("  ⚠️  No corpus configured — retrieval disabled"),
        Err(e) => {
            println!("  ❌ Corpus failed to load: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
