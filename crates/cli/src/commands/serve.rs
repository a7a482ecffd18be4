//! `spurchat serve` — Start the HTTP chat server.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🛒 SpurChat Server");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.default_provider, config.default_model);
    println!("   Store:     {} {}", config.store.backend, config.store.path);

    spurchat_gateway::start(config).await?;

    Ok(())
}
