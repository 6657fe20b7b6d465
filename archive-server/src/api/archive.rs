// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use std::sync::Arc;

use salvo::http::header::CONTENT_DISPOSITION;
use salvo::http::HeaderValue;
use salvo::prelude::*;
use tokio_util::sync::CancellationToken;

use super::render_error;
use crate::archive::resolve_archive_dir;
use crate::archive::ArchiveError;
use crate::archive::ArchiveLauncher;
use crate::config::AppConfig;
use crate::relay::body_channel;
use crate::relay::relay;
use crate::relay::RelayError;
use crate::relay::RelaySettings;

// The filename quote is left unterminated, this is the wire format clients get
pub const ARCHIVE_CONTENT_DISPOSITION: &str = "attachment; filename=\"archive.zip";
pub const NOT_FOUND_MESSAGE: &str = "Архив не существует или был удален";

/// `GET /archive/<archive_hash>/`: streams the zipped archive directory.
pub struct ArchiveHandler<L> {
    config: Arc<AppConfig>,
    launcher: L,
}

impl<L> ArchiveHandler<L> {
    pub fn new(config: Arc<AppConfig>, launcher: L) -> Self {
        Self { config, launcher }
    }
}

#[async_trait]
impl<L: ArchiveLauncher> Handler for ArchiveHandler<L> {
    async fn handle(
        &self,
        req: &mut Request,
        _depot: &mut Depot,
        res: &mut Response,
        _ctrl: &mut FlowCtrl,
    ) {
        let Some(archive_hash) = req.param::<String>("archive_hash") else {
            return render_error(res, StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE);
        };

        let dir = match resolve_archive_dir(&self.config.photos_dir, &archive_hash).await {
            Ok(dir) => dir,
            Err(e) => return render_archive_error(res, &e),
        };

        let source = match self.launcher.launch(&dir) {
            Ok(source) => source,
            Err(e) => return render_archive_error(res, &e),
        };

        res.headers_mut()
            .insert(CONTENT_DISPOSITION, HeaderValue::from_static(ARCHIVE_CONTENT_DISPOSITION));

        let cancel = CancellationToken::new();
        let (body_tx, body) = body_channel(cancel.clone());
        let settings = RelaySettings::from(self.config.as_ref());
        tokio::spawn(async move {
            match relay(source, body_tx, settings, cancel).await {
                Ok(outcome) => tracing::debug!(
                    "Archive {archive_hash} sent: {} chunks, {} bytes",
                    outcome.chunks,
                    outcome.bytes
                ),
                Err(RelayError::Cancelled) => {
                    tracing::debug!("Download was interrupted: {archive_hash}")
                }
                Err(e) => tracing::error!("Archive {archive_hash} failed: {e}"),
            }
        });

        res.status_code(StatusCode::OK);
        res.stream(body);
    }
}

fn render_archive_error(res: &mut Response, err: &ArchiveError) {
    match err {
        ArchiveError::NotFound(_) => {
            tracing::debug!("{err}");
            render_error(res, StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE);
        }
        ArchiveError::Launch { .. } => {
            tracing::error!("{err}");
            render_error(res, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }
}
