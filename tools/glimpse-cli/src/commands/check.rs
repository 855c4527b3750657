//! Check system capabilities.

use glimpse_encoders::{ContainerFormat, GstEncoderFactory};
use glimpse_platform_core::DisplayServer;
use glimpse_platform_linux::permissions::{check_capabilities, print_capability_report};
use glimpse_platform_linux::{detect_display_server, detect_monitors};

pub async fn run() -> anyhow::Result<()> {
    println!("Glimpse System Check");
    println!("{}", "=".repeat(50));

    match detect_display_server() {
        DisplayServer::X11 => println!("[OK] Display server: X11"),
        DisplayServer::Wayland => println!("[WARN] Display server: Wayland (only X11 capture is supported)"),
        DisplayServer::Unknown => println!("[WARN] Display server: Unknown"),
    }

    match detect_monitors().await {
        Ok(monitors) => {
            println!("[OK] Monitors detected: {}", monitors.len());
            for m in &monitors {
                println!(
                    "     {} {}x{} at {},{} {}",
                    m.name,
                    m.width,
                    m.height,
                    m.x,
                    m.y,
                    if m.primary { "(primary)" } else { "" }
                );
            }
        }
        Err(e) => println!("[WARN] Monitors: {e}"),
    }

    let capabilities = check_capabilities();
    println!();
    print_capability_report(&capabilities);

    println!();
    println!("Video formats:");
    for format in ContainerFormat::ALL {
        match GstEncoderFactory::missing_elements(format) {
            Ok(missing) if missing.is_empty() => {
                println!("  [OK]   {:<12} {}", format.label(), format.mime_type())
            }
            Ok(missing) => println!(
                "  [MISS] {:<12} {} (needs {})",
                format.label(),
                format.mime_type(),
                missing.join(", ")
            ),
            Err(e) => println!("  [FAIL] {:<12} {e}", format.label()),
        }
    }
    println!("  [OK]   {:<12} image/gif", "GIF");

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok {
        println!("All required capabilities are available. Glimpse is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
