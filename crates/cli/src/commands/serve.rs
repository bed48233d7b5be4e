//! `charmline serve`: Start the HTTP API server.

pub async fn run(port_override: Option<u16>, ephemeral: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(ephemeral)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Charmline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.backend);
    println!("   Backend:   {}", config.default_backend);

    charmline_gateway::start(config).await?;

    Ok(())
}
