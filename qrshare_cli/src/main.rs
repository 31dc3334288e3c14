use anyhow::{Context, Result};
use clap::Parser;
use qrshare_core::config::AppConfig;
use qrshare_core::{Session, SessionOptions};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

mod args;
mod display;

use args::Args;

/// Resolve once the operator presses Enter or Ctrl+C
async fn wait_for_stop() {
    // A blocking stdin read on the runtime would keep the process alive after
    // Ctrl+C, so it lives on a detached thread instead.
    let (enter_tx, enter_rx) = oneshot::channel::<()>();
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().read_line(&mut line) {
            if n > 0 {
                let _ = enter_tx.send(());
            }
        }
    });

    let enter = async {
        if enter_rx.await.is_err() {
            // stdin closed: only Ctrl+C can end the session
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = enter => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Cannot listen for Ctrl+C: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the QR code and URL
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load();
    let interface = config.resolve_interface(args.interface.clone());

    let options = SessionOptions {
        expire: args.expire(),
        paths: args.paths,
        force_zip: args.zip,
        interface,
        password: args.password,
    };

    let session = Session::prepare(options)
        .await
        .context("Cannot start transfer")?;

    display::present(&session);

    let (event_tx, event_rx) = mpsc::channel(100);
    let printer = tokio::spawn(display::print_events(event_rx));

    let report = session.serve(wait_for_stop(), event_tx).await?;
    printer.abort();

    println!("Transfer session ended.");
    println!("Total downloads: {}", report.downloads);
    Ok(())
}
