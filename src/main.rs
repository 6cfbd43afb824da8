use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rendezvous::config::Config;
use rendezvous::signaling::{router, AppState, Hub};

const SHUTDOWN_PERIOD: Duration = Duration::from_secs(15);
const SHUTDOWN_PERIOD_HARD: Duration = Duration::from_secs(3);
const READINESS_DRAIN_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        production = config.production,
        log_level = %config.log_level,
        "starting server"
    );

    let root = CancellationToken::new();
    let hub = Arc::new(Hub::new(root.child_token()));
    let draining = Arc::new(AtomicBool::new(false));
    let app = router(AppState {
        hub,
        draining: Arc::clone(&draining),
        label_policy: config.label_policy,
    });

    let listener = TcpListener::bind(&config.addr).await?;
    info!(addr = %config.addr, "listening");

    let server = {
        let root = root.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { root.cancelled().await })
                .await
        })
    };

    shutdown_signal().await;
    draining.store(true, Ordering::Relaxed);
    info!("shutting down...");

    // let the load balancer observe the 503 before connections drop
    tokio::time::sleep(READINESS_DRAIN_DELAY).await;
    info!("drain delay passed, shutting down connections gracefully");
    root.cancel();

    match tokio::time::timeout(SHUTDOWN_PERIOD, server).await {
        Ok(result) => result??,
        Err(_) => {
            error!("graceful shutdown did not complete in time");
            tokio::time::sleep(SHUTDOWN_PERIOD_HARD).await;
        }
    }

    info!("shutdown complete. goodbye");
    Ok(())
}

fn init_tracing(config: &Config) {
    if config.production {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(config.log_level)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .init();
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(%err, "install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
