//! `spurchat doctor` — Diagnose system health.

use spurchat_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 SpurChat Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    // Check config
    let config_file = super::config_file(config_path);
    if config_file.exists() {
        println!("  ✅ Config file found: {}", config_file.display());
    } else {
        println!("  ⚠️  No config file — using defaults (run `spurchat onboard`)");
    }

    let config = match AppConfig::load_with_env(&config_file) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Ok(());
        }
    };

    // Check API key
    if config.has_api_key() {
        println!("  ✅ API key configured for '{}'", config.default_provider);
    } else {
        println!(
            "  ⚠️  No API key for '{}' — set OPENAI_API_KEY, PORTKEY_API_KEY or api_key in config.toml",
            config.default_provider
        );
        issues += 1;
    }

    // Check store
    match spurchat_gateway::open_store(&config.store).await {
        Ok(store) => println!("  ✅ Store '{}' opened ({})", store.name(), config.store.path),
        Err(e) => {
            println!("  ❌ Store unavailable: {e}");
            issues += 1;
        }
    }

    // Check provider reachability
    match spurchat_providers::build_from_config(&config).default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider '{}' responded but rejected the check", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{}' unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  ❌ No default provider configured");
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
