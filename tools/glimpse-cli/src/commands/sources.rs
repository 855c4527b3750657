//! List capturable sources.

use glimpse_platform_core::DesktopHost;
use glimpse_platform_linux::{LinuxHost, LinuxHostConfig};

pub async fn run(thumbnails: bool, test_source: bool, json: bool) -> anyhow::Result<()> {
    let host = LinuxHost::new(LinuxHostConfig {
        output_dir: std::env::current_dir()?,
        thumbnails,
        test_source,
    });
    let sources = host.get_sources().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    if sources.is_empty() {
        println!("No capture sources found.");
        return Ok(());
    }

    println!("{:<24} NAME", "ID");
    for source in &sources {
        let thumb = if source.thumbnail.is_empty() {
            String::new()
        } else {
            format!("  [thumbnail {} bytes]", source.thumbnail.len())
        };
        println!("{:<24} {}{thumb}", source.id, source.name);
    }
    Ok(())
}
