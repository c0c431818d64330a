//! Environment readiness check.

use crate::config::ProbeConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;

/// Check Chromium availability and print the effective configuration.
pub async fn run(config: &ProbeConfig) -> Result<()> {
    println!("streamprobe doctor");
    println!("==================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = config.chromium_path.clone().or_else(find_chromium);
    let ready = match &chromium {
        Some(path) if path.exists() => {
            println!("[OK] Chromium found: {}", path.display());
            true
        }
        Some(path) => {
            println!("[!!] Configured Chromium does not exist: {}", path.display());
            false
        }
        None => {
            println!(
                "[!!] Chromium NOT found. Install Chrome/Chromium or set STREAMPROBE_CHROMIUM_PATH."
            );
            false
        }
    };

    match std::env::temp_dir().metadata() {
        Ok(_) => println!(
            "[OK] Temp dir available for browser profiles: {}",
            std::env::temp_dir().display()
        ),
        Err(e) => println!("[!!] Temp dir unavailable: {e}"),
    }

    println!();
    println!("Bind:          {}", config.bind);
    println!("Timeout:       {}ms", config.navigation_timeout.as_millis());
    println!("Idle window:   {}ms", config.idle_window.as_millis());
    println!("Max sessions:  {}", config.max_sessions);
    println!();
    println!("Status: {}", if ready { "READY" } else { "NOT READY" });

    Ok(())
}
