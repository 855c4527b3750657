//! Show or write the configuration.

use glimpse_common::config::AppConfig;

pub fn run(config: &AppConfig, write: bool) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if write {
        config.save()?;
        println!("Configuration written.");
    }
    Ok(())
}
