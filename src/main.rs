mod app;
mod config;
mod controls;
mod hardware;
mod input;
mod system;
mod util;

#[cfg(feature = "hardware")]
use anyhow::{Context, Result};

#[cfg(feature = "hardware")]
fn main() -> Result<()> {
    init_tracing();

    let config = app::AppConfig::load();
    let mut app = app::App::new(config)?;
    app.set_shutdown_channel(shutdown_signals()?);
    app.run()
}

#[cfg(not(feature = "hardware"))]
fn main() {
    init_tracing();
    eprintln!(
        "windowmaster_ctrl was built without the `hardware` feature. Enable it to drive a WindowMaster surface."
    );
}

/// Fires once on the first SIGINT or SIGTERM.
#[cfg(feature = "hardware")]
fn shutdown_signals() -> Result<crossbeam_channel::Receiver<()>> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;

    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::info!(signal, "received termination signal");
                let _ = shutdown_tx.send(());
            }
        })
        .context("failed to spawn signal listener")?;

    Ok(shutdown_rx)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();
}
