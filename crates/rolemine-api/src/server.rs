use crate::{create_router, AppState};
use rolemine_core::{Result, RoleMineError, Settings};
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;

pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    pub fn new(settings: Settings) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
            .parse()
            .map_err(|e| {
                RoleMineError::Validation(format!("invalid server address: {}", e))
            })?;
        let state = AppState::new(settings)?;
        Ok(Self { state, addr })
    }

    pub async fn run(self) -> Result<()> {
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Server listening on http://{}", self.addr);
        info!("  POST /clusters/upload - Upload cluster, user or entitlement data");
        info!("  GET  /clusters - List loaded clusters");
        info!("  POST /roles/generate - Generate one role suggestion");
        info!("  POST /roles/generate/batch - Generate suggestions in bulk");
        info!("  POST /roles/generate-multiple - Generate three styled role options");
        info!("  POST /roles/select - Pick one of the generated options");
        info!("  PUT  /roles/review/{{cluster_id}} - Approve or reject a suggestion");
        info!("  GET  /roles/export?format=json|csv - Export reviewed roles");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(RoleMineError::Io)?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
