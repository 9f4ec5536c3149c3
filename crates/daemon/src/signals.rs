//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and SIGTERM cancel the mirror loop. On Unix, SIGUSR1
//! toggles pause so a detached process can be paused without a terminal.

use std::sync::Arc;

use tracing::{info, warn};

use foldersync_core::control::SyncControl;
use foldersync_core::notify::Notify;

/// Register signal handlers that drive `control`.
pub fn install(control: SyncControl, notifier: Arc<dyn Notify>) {
    let shutdown = control.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        shutdown.cancel();
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to register SIGUSR1 handler");
                return;
            }
        };
        while usr1.recv().await.is_some() {
            info!("received SIGUSR1");
            crate::keys::toggle_pause(&control, notifier.as_ref());
        }
    });

    #[cfg(not(unix))]
    let _ = (control, notifier);
}

/// Resolve once SIGINT or SIGTERM is received.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}
