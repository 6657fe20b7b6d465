// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use archive_server::cli::Args;
use archive_server::config::AppConfig;
use archive_server::logging::init_tracing;
use archive_server::ArchiveServer;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // ignore errors
    let config = AppConfig::from_args(Args::parse());
    init_tracing(config.logging_enabled);

    tracing::info!("Starting photo archive server with config: {config}");
    if let Err(err) = ArchiveServer::new(config).run().await {
        tracing::error!(error = %err, "Server failed");
        anyhow::bail!(err);
    }
    Ok(())
}
