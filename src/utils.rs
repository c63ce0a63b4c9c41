use std::sync::{PoisonError, RwLock};

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::gateway::Navigator;

/// Why the watcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupted,
    Terminated,
    /// The session was evicted and the console was sent to the login page
    SessionExpired,
}

/// Navigator for a headless process: there is no login form to show, so
/// being sent to the login page cancels `session_lost`.
#[derive(Debug)]
pub struct ExitOnLoginNavigator {
    location: RwLock<String>,
    login_page: String,
    session_lost: CancellationToken,
}

impl ExitOnLoginNavigator {
    pub fn new(
        start: impl Into<String>,
        login_page: impl Into<String>,
        session_lost: CancellationToken,
    ) -> Self {
        Self {
            location: RwLock::new(start.into()),
            login_page: login_page.into(),
            session_lost,
        }
    }
}

impl Navigator for ExitOnLoginNavigator {
    fn current_path(&self) -> String {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, path: &str) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = path.to_string();
        if path == self.login_page {
            warn!("Session is no longer valid, stopping");
            self.session_lost.cancel();
        }
    }
}

/// Wait for Ctrl+C, SIGTERM or loss of the session.
///
/// A signal handler that cannot be installed is logged and ignored; the other
/// sources still end the wait.
pub async fn shutdown_signal(session_lost: CancellationToken) -> ShutdownReason {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = session_lost.cancelled() => ShutdownReason::SessionExpired,
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
            ShutdownReason::Interrupted
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
            ShutdownReason::Terminated
        }
    }
}
