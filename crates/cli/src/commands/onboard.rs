//! `spurchat onboard` — First-time setup.

use spurchat_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_file(config_path);

    println!("🛒 SpurChat — First-Time Setup");
    println!("==============================\n");

    if let Some(config_dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
            println!("✅ Created config directory: {}", config_dir.display());
        } else {
            println!("  Config directory exists: {}", config_dir.display());
        }
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set OPENAI_API_KEY (or PORTKEY_API_KEY) or add api_key to the config");
    println!("   2. Run: spurchat serve");
    println!("   3. In another terminal: spurchat chat\n");

    Ok(())
}
