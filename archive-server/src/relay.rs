// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use std::io;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;

use crate::archive::ChunkSource;
use crate::config::AppConfig;

/// Max bytes read from the archiver per iteration
pub const CHUNK_SIZE: usize = 500 * 1024;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("download was interrupted")]
    Cancelled,

    #[error("archive stream failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, Copy, Debug)]
pub struct RelaySettings {
    pub delay: Duration,
    pub logging_enabled: bool,
}

impl From<&AppConfig> for RelaySettings {
    fn from(config: &AppConfig) -> Self {
        Self { delay: config.delay, logging_enabled: config.logging_enabled }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    pub chunks: usize,
    pub bytes: u64,
}

/// Response body fed by [`relay`].
///
/// Dropping the body (the HTTP layer does so when the client goes away)
/// cancels the token it was created with.
pub struct RelayBody {
    chunks: mpsc::Receiver<io::Result<Bytes>>,
    _disconnect: DropGuard,
}

impl Stream for RelayBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.poll_recv(cx)
    }
}

pub fn body_channel(cancel: CancellationToken) -> (mpsc::Sender<io::Result<Bytes>>, RelayBody) {
    let (tx, rx) = mpsc::channel(1);
    (tx, RelayBody { chunks: rx, _disconnect: cancel.drop_guard() })
}

/// Moves chunks from `source` into the response body until the source is
/// exhausted, `cancel` fires or an I/O error occurs.
///
/// Every chunk is held back for `settings.delay` before it is forwarded. The
/// source is terminated exactly once on every exit path.
pub async fn relay<S: ChunkSource>(
    mut source: S,
    body: mpsc::Sender<io::Result<Bytes>>,
    settings: RelaySettings,
    cancel: CancellationToken,
) -> Result<RelayOutcome, RelayError> {
    let result = stream_chunks(&mut source, &body, settings, &cancel).await;

    if let Err(RelayError::Io(err)) = &result {
        // Abort the transfer instead of finishing a truncated body cleanly
        let abort = Err(io::Error::new(err.kind(), err.to_string()));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = body.send(abort) => {}
        }
    }
    drop(body);

    if let Err(e) = source.terminate().await {
        tracing::error!("Failed to terminate archive source: {e}");
    }
    result
}

async fn stream_chunks<S: ChunkSource>(
    source: &mut S,
    body: &mpsc::Sender<io::Result<Bytes>>,
    settings: RelaySettings,
    cancel: &CancellationToken,
) -> Result<RelayOutcome, RelayError> {
    let mut outcome = RelayOutcome::default();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            chunk = source.next_chunk(CHUNK_SIZE) => chunk?,
        };
        let Some(chunk) = chunk.filter(|chunk| !chunk.is_empty()) else {
            return Ok(outcome);
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            _ = tokio::time::sleep(settings.delay) => {}
        }

        if settings.logging_enabled {
            tracing::info!("Sending archive chunk ...");
        }
        let len = chunk.len() as u64;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            sent = body.send(Ok(chunk)) => sent.map_err(|_| RelayError::Cancelled)?,
        }
        outcome.chunks += 1;
        outcome.bytes += len;
    }
}
