//! `charmline personas`: List the persona catalog.

use charmline_core::PersonaCatalog;

pub async fn run(ephemeral: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(ephemeral)?;
    let services = charmline_gateway::build_services(&config).await?;
    let personas = services.storage.list().await?;

    if personas.is_empty() {
        println!("No personas in the catalog.");
        println!("Set personas_file in config.toml to seed one.");
        return Ok(());
    }

    println!("  {:<16} {:<20} {:>9}  Gallery", "ID", "Name", "Threshold");
    for persona in &personas {
        println!(
            "  {:<16} {:<20} {:>9}  {}",
            persona.id,
            persona.name,
            persona.threshold,
            persona.gallery.len()
        );
    }

    Ok(())
}
