//! `charmline status`: Show the resolved configuration.

use charmline_config::AppConfig;
use charmline_core::Backend;

pub async fn run(ephemeral: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(ephemeral)?;

    println!("Charmline Status");
    println!("================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Backend:      {}", config.default_backend);
    for backend in [Backend::OpenAi, Backend::Anthropic] {
        let provider = config.providers.for_backend(backend);
        println!(
            "  {:<13} {} ({})",
            format!("{backend}:"),
            provider.model,
            if config.has_api_key(backend) { "key set" } else { "no key" }
        );
    }
    println!("  Temperature:  {}", config.temperature);
    println!("  Timeout:      {}s", config.completion_timeout_secs);
    println!(
        "  Window:       {} tokens / {} turns",
        config.window.max_tokens, config.window.max_turns
    );
    match config.store.backend.as_str() {
        "sqlite" => println!("  Store:        sqlite ({})", config.store.database_path().display()),
        other => println!("  Store:        {other}"),
    }
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    match config.personas_file {
        Some(ref path) => println!("  Personas:     {}", path.display()),
        None => println!("  Personas:     (no seed file)"),
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file — run `charmline init` first");
    }

    Ok(())
}
