// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
pub use api::ARCHIVE_CONTENT_DISPOSITION;
pub use api::NOT_FOUND_MESSAGE;
use salvo::conn::Acceptor;
use salvo::prelude::*;
use salvo::Listener;

use crate::archive::ArchiveLauncher;
use crate::archive::ZipLauncher;
use crate::config::AppConfig;

/// How long in-flight downloads may keep the server alive after a stop signal
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

mod api;
pub mod archive;
pub mod cli;
pub mod config;
pub mod logging;
pub mod relay;

#[derive(Clone)]
pub struct ArchiveServer<TLauncher = ZipLauncher> {
    pub config: Arc<AppConfig>,
    pub launcher: TLauncher,
    pub shutdown_timeout: Duration,
}

impl ArchiveServer<ZipLauncher> {
    pub fn new(config: AppConfig) -> Self {
        Self::with_launcher(config, ZipLauncher::default())
    }
}

impl<TLauncher> ArchiveServer<TLauncher>
where
    TLauncher: ArchiveLauncher + Clone,
{
    pub fn with_launcher(config: AppConfig, launcher: TLauncher) -> Self {
        Self { config: Arc::new(config), launcher, shutdown_timeout: SHUTDOWN_TIMEOUT }
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn route(self) -> Router {
        // Streams a zip of `{photos_dir}/{archive_hash}`
        let archive_router = Router::with_path("archive/{archive_hash}")
            .get(api::ArchiveHandler::new(self.config.clone(), self.launcher.clone()));

        Router::new() //
            .hoop(Logger::new())
            .get(api::IndexHandler::new(self.config.index_page.clone()))
            .push(archive_router)
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen.clone();
        let acceptor = TcpListener::new(addr.clone())
            .try_bind()
            .await
            .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;

        tracing::info!("Start HTTP server on {addr}");
        self.serve(acceptor, shutdown_signal()).await;
        Ok(())
    }

    /// Serves connections from `acceptor` until `shutdown` resolves.
    ///
    /// Downloads still running `shutdown_timeout` after that are dropped.
    pub async fn serve<A>(self, acceptor: A, shutdown: impl Future<Output = ()> + Send + 'static)
    where
        A: Acceptor + Send,
    {
        let server = Server::new(acceptor);
        let handle = server.handle();
        let shutdown_timeout = self.shutdown_timeout;
        tokio::spawn(async move {
            shutdown.await;
            tracing::info!("Shutting down HTTP server");
            handle.stop_graceful(Some(shutdown_timeout));
        });

        server.serve(self.route()).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Received SIGINT signal"),
        _ = terminate => tracing::warn!("Received SIGTERM signal"),
    }
}
