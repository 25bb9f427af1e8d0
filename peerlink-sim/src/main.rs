// peerlink-sim: one server and N clients over the loopback bridge, pumped like a game loop.

mod config;
mod session;

use std::path::PathBuf;

use anyhow::bail;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut verbose = false;
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("peerlink-sim {} (core {})", VERSION, peerlink_core::VERSION);
                return Ok(());
            }
            "--verbose" | "-v" => verbose = true,
            "--config" | "-c" => match args.next() {
                Some(p) => config_path = Some(PathBuf::from(p)),
                None => bail!("--config needs a path"),
            },
            other => bail!("unknown argument: {other}"),
        }
    }

    setup_logging(verbose);
    let cfg = config::load(config_path.as_deref());
    tracing::debug!(?cfg, "effective config");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        tokio::select! {
            res = session::run(&cfg) => res?.log(),
            res = shutdown_signal() => {
                res?;
                tracing::info!("interrupted; stopping simulation");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
