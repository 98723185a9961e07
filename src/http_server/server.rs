//! # HTTP Server
//!
//! Startup, the serving loop, and the shutdown sequence.
//!
//! Startup creates the storage root, replays the durable audit log into
//! memory and records `Server started`. The loop serves until the shutdown
//! future resolves, then records `Server is shutting down` and syncs the
//! durable log before returning.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::config::HttpServerConfig;
use super::routes::file_routes;
use super::state::AppState;
use crate::alert::{create_mail_sender, MailSender};
use crate::config::ServiceConfig;
use crate::observability::{AuditLog, Logger};

/// The file service, ready to serve.
pub struct HttpServer {
    config: HttpServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Bring up every component for `config` with the configured mail channel.
    pub fn bootstrap(config: &ServiceConfig) -> io::Result<Self> {
        Self::bootstrap_with_sender(config, create_mail_sender(config.alert.clone()))
    }

    /// Bring up every component with an explicit mail channel.
    pub fn bootstrap_with_sender(
        config: &ServiceConfig,
        sender: Arc<dyn MailSender>,
    ) -> io::Result<Self> {
        let audit = Arc::new(AuditLog::open(&config.log_file)?);
        let state = Arc::new(AppState::new(config, audit, sender)?);
        Ok(Self {
            config: config.http.clone(),
            state,
        })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Build the guarded router with body limit and CORS applied.
    pub fn router(&self) -> Router {
        let cors = if self.config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = self
                .config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        file_routes(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.max_upload_bytes))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM.
    pub async fn start(self) -> io::Result<()> {
        let addr: SocketAddr = self.socket_addr().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid socket address {}: {}", self.socket_addr(), e),
            )
        })?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves, then run the
    /// shutdown sequence.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        let audit = self.state.audit.clone();
        let router = self.router();

        Logger::info(
            "SERVER_LISTENING",
            &[
                ("addr", &local.to_string()),
                ("root", &self.state.store.root().display().to_string()),
            ],
        );
        audit.info("Server started");

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        audit.info("Server is shutting down");
        if let Err(e) = audit.sync() {
            Logger::error("AUDIT_SYNC_FAILED", &[("error", &e.to_string())]);
        }
        Logger::info("SERVER_STOPPED", &[]);

        served
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            Logger::error("SIGNAL_HANDLER_FAILED", &[("error", &e.to_string())]);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                Logger::error("SIGNAL_HANDLER_FAILED", &[("error", &e.to_string())]);
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

    Logger::info("SHUTDOWN_SIGNAL", &[]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::RecordingMailSender;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ServiceConfig {
        ServiceConfig {
            api_key: "APIKEY123".to_string(),
            storage_root: dir.path().join("uploads"),
            log_file: dir.path().join("ServerLogs").join("server_logs.txt"),
            ..Default::default()
        }
    }

    #[test]
    fn test_bootstrap_creates_storage_root() {
        let dir = TempDir::new().unwrap();
        let server =
            HttpServer::bootstrap_with_sender(&config(&dir), Arc::new(RecordingMailSender::new()))
                .unwrap();
        assert!(dir.path().join("uploads").is_dir());
        assert_eq!(server.socket_addr(), "0.0.0.0:5000");
        let _router = server.router();
    }

    #[tokio::test]
    async fn test_serve_records_lifecycle() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let server =
            HttpServer::bootstrap_with_sender(&config, Arc::new(RecordingMailSender::new()))
                .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server.serve(listener, async {}).await.unwrap();

        // A fresh start replays both lifecycle events from disk.
        let restarted =
            HttpServer::bootstrap_with_sender(&config, Arc::new(RecordingMailSender::new()))
                .unwrap();
        let messages: Vec<_> = restarted
            .state()
            .audit
            .snapshot()
            .iter()
            .map(|e| e.message().to_string())
            .collect();
        assert_eq!(messages, vec!["Server started", "Server is shutting down"]);
    }
}
