pub mod chat;
pub mod init;
pub mod personas;
pub mod serve;
pub mod status;

use charmline_config::AppConfig;

/// Load the user config, switching to the in-memory store when asked.
pub fn load_config(ephemeral: bool) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if ephemeral {
        config.store.backend = "memory".into();
    }
    Ok(config)
}
