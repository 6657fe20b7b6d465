// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::process::ChildStderr;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tokio::task::JoinHandle;

// Tail of the archiver's stderr kept for the log, the rest is discarded
const STDERR_LIMIT: u64 = 8 * 1024;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive directory {0} does not exist")]
    NotFound(PathBuf),

    #[error("failed to start archiver in {dir}: {source}")]
    Launch {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolves `archive_hash` against the photos directory.
///
/// The identifier is appended verbatim: `{photos_dir}/{archive_hash}`. The
/// only check made is that the resulting path exists.
pub async fn resolve_archive_dir(
    photos_dir: &Path,
    archive_hash: &str,
) -> Result<PathBuf, ArchiveError> {
    let mut candidate = photos_dir.as_os_str().to_owned();
    candidate.push("/");
    candidate.push(archive_hash);
    let candidate = PathBuf::from(candidate);

    match tokio::fs::try_exists(&candidate).await {
        Ok(true) => Ok(candidate),
        Ok(false) => Err(ArchiveError::NotFound(candidate)),
        Err(e) => {
            tracing::debug!("Can't check {}: {e}", candidate.display());
            Err(ArchiveError::NotFound(candidate))
        }
    }
}

/// A live source of archive bytes owned by one request.
#[async_trait]
pub trait ChunkSource: Send {
    /// Reads at most `max_len` bytes. `None` means the source is exhausted.
    async fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Bytes>>;

    /// Stops the source and releases everything it holds.
    async fn terminate(&mut self) -> io::Result<()>;
}

/// Starts a [`ChunkSource`] for a validated archive directory.
pub trait ArchiveLauncher: Send + Sync + 'static {
    type Source: ChunkSource + 'static;

    fn launch(&self, dir: &Path) -> Result<Self::Source, ArchiveError>;
}

/// Launches `zip -r - .` inside the archive directory.
#[derive(Clone, Debug)]
pub struct ZipLauncher {
    program: OsString,
    args: Vec<OsString>,
}

impl ZipLauncher {
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }
}

impl Default for ZipLauncher {
    fn default() -> Self {
        Self::new("zip", ["-r", "-", "."])
    }
}

impl ArchiveLauncher for ZipLauncher {
    type Source = ZipProcess;

    fn launch(&self, dir: &Path) -> Result<ZipProcess, ArchiveError> {
        let launch_error = |source| ArchiveError::Launch { dir: dir.to_path_buf(), source };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_error)?;

        let stdout =
            child.stdout.take().ok_or_else(|| launch_error(io::Error::other("stdout is not piped")))?;
        let stderr = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));

        tracing::debug!("Archiver started in {} (pid {:?})", dir.display(), child.id());
        Ok(ZipProcess { child, stdout, stderr })
    }
}

// The pipe is drained to the end so a chatty archiver never blocks on it
async fn drain_stderr(mut stderr: ChildStderr) -> String {
    let mut head = Vec::new();
    if let Err(e) = (&mut stderr).take(STDERR_LIMIT).read_to_end(&mut head).await {
        tracing::debug!("Archiver stderr read failed: {e}");
        return String::from_utf8_lossy(&head).into_owned();
    }
    let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&head).into_owned()
}

/// What was left of the archiver after it has been reaped.
#[derive(Debug)]
pub struct ProcessReport {
    pub status: ExitStatus,
    /// The process was still running and got killed
    pub killed: bool,
    pub stderr: String,
}

pub struct ZipProcess {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
}

impl ZipProcess {
    /// OS process id, `None` once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kills the archiver if it is still running and waits for it to exit.
    ///
    /// Calling this again after the process is gone returns the cached
    /// status.
    pub async fn shutdown(&mut self) -> io::Result<ProcessReport> {
        let killed = match self.child.try_wait()? {
            Some(_) => false,
            None => {
                self.child.start_kill()?;
                true
            }
        };
        let status = self.child.wait().await?;

        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                tracing::debug!("Archiver stderr task failed: {e}");
                String::new()
            }),
            None => String::new(),
        };

        Ok(ProcessReport { status, killed, stderr })
    }
}

#[async_trait]
impl ChunkSource for ZipProcess {
    async fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0; max_len];
        let read = self.stdout.read(&mut buf).await?;
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(Bytes::from(buf)))
    }

    async fn terminate(&mut self) -> io::Result<()> {
        let report = self.shutdown().await?;
        // A failing archiver only ever shows up here, the client just gets a short body
        if !report.killed && !report.status.success() {
            tracing::warn!(
                "Archiver exited with {}: {}",
                report.status,
                report.stderr.trim_end()
            );
        } else {
            tracing::debug!("Archiver reaped: {} (killed: {})", report.status, report.killed);
        }
        Ok(())
    }
}
