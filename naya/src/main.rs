use args::Args;
use clap::Parser;
use config::Config;
use server::{ServeConfig, Stores};
use tokio_util::sync::CancellationToken;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    server::logger::init(&args.log);

    // TLS listeners and Redis connections both go through rustls.
    if rustls::crypto::aws_lc_rs::default_provider().install_default().is_err() {
        log::debug!("A rustls crypto provider was already installed");
    }

    let config = Config::load(&args.config)?;
    let listen_address = args.listen_address(&config)?;

    // Plans, admin roles and bans come from the `[users]` table.
    let stores = Stores::from_config(&config.users);

    if config.users.is_empty() {
        log::warn!("No [users] configured, every caller is on the free plan and rotation is unavailable");
    }

    let shutdown_signal = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown_signal.clone()));

    server::serve(ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter: args.log,
        stores,
    })
    .await?;

    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received, draining connections");
    token.cancel();
}
