//! # Atlas Server
//!
//! Process wrapper around [`atlas_auth`]: loads [`ServerSettings`], performs
//! blocking startup discovery, serves the axum router behind the bearer
//! authentication layer, and shuts the authenticator down after the listener
//! drains.
//!
//! ```text
//! load settings ─▶ init logging ─▶ Authenticator::init ─▶ bind ─▶ serve
//!                                      │ (fatal on error)            │
//!                                      ▼                             ▼ signal
//!                                    exit 1              Authenticator::shutdown
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

pub use config::ServerSettings;
pub use error::{ServerError, ServerResult};

use std::future::Future;

use atlas_auth::Authenticator;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Start the authenticator and serve until `shutdown` resolves
///
/// # Errors
///
/// Returns [`ServerError::Auth`] if startup discovery or the initial key set
/// load fails, and [`ServerError::Io`] if the listener cannot be bound or
/// serving fails
pub async fn run<F>(settings: ServerSettings, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let authenticator = Authenticator::init(settings.auth.clone())
        .await
        .inspect_err(|e| error!(reason = e.reason_code(), error = %e, "Refusing to start"))?;

    let addr = settings.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, public_routes = ?settings.public_routes, "Listening");

    let app = routes::router(authenticator.clone(), &settings.public_routes);
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;

    authenticator.shutdown().await;
    served?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
