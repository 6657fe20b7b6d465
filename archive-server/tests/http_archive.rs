// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//
//! HTTP level tests: routing, status codes and streamed archive bodies.

use std::io;
use std::io::Cursor;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use archive_server::archive::ArchiveError;
use archive_server::archive::ArchiveLauncher;
use archive_server::archive::ChunkSource;
use archive_server::archive::ZipLauncher;
use archive_server::archive::ZipProcess;
use archive_server::config::AppConfig;
use archive_server::ArchiveServer;
use archive_server::ARCHIVE_CONTENT_DISPOSITION;
use archive_server::NOT_FOUND_MESSAGE;
use async_trait::async_trait;
use bytes::Bytes;
use salvo::http::header::CONTENT_DISPOSITION;
use salvo::http::header::CONTENT_TYPE;
use salvo::prelude::*;
use salvo::test::ResponseExt;
use salvo::test::TestClient;
use salvo::Listener;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

const PHOTO: &[u8] = b"0123456789";

fn zip_available() -> bool {
    std::process::Command::new("zip")
        .arg("-v")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// `archive1/photo.jpg` (10 bytes) and an empty `archive2/`
fn photos_fixture() -> TempDir {
    let photos = tempfile::tempdir().unwrap();
    std::fs::create_dir(photos.path().join("archive1")).unwrap();
    std::fs::write(photos.path().join("archive1/photo.jpg"), PHOTO).unwrap();
    std::fs::create_dir(photos.path().join("archive2")).unwrap();
    photos
}

fn test_config(photos_dir: &Path, delay_secs: u64) -> AppConfig {
    AppConfig {
        delay: Duration::from_secs(delay_secs),
        photos_dir: photos_dir.to_path_buf(),
        logging_enabled: true,
        listen: "127.0.0.1:0".to_string(),
        index_page: photos_dir.join("index.html"),
    }
}

/// Counts launches and terminations of the wrapped launcher
#[derive(Clone)]
struct ProbeLauncher {
    inner: ZipLauncher,
    launched: Arc<AtomicUsize>,
    terminated: Arc<AtomicUsize>,
}

impl ProbeLauncher {
    fn new(inner: ZipLauncher) -> Self {
        Self {
            inner,
            launched: Arc::new(AtomicUsize::new(0)),
            terminated: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

struct ProbeSource {
    inner: ZipProcess,
    terminated: Arc<AtomicUsize>,
}

impl ArchiveLauncher for ProbeLauncher {
    type Source = ProbeSource;

    fn launch(&self, dir: &Path) -> Result<ProbeSource, ArchiveError> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeSource { inner: self.inner.launch(dir)?, terminated: self.terminated.clone() })
    }
}

#[async_trait]
impl ChunkSource for ProbeSource {
    async fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Bytes>> {
        self.inner.next_chunk(max_len).await
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.inner.terminate().await?;
        self.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn service(config: AppConfig, launcher: ProbeLauncher) -> Service {
    Service::new(ArchiveServer::with_launcher(config, launcher).route())
}

fn archive_url(archive_hash: &str) -> String {
    format!("http://127.0.0.1:8080/archive/{archive_hash}/")
}

fn extract(body: Bytes, name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    let mut content = Vec::new();
    archive.by_name(name).unwrap().read_to_end(&mut content).unwrap();
    content
}

#[tokio::test]
async fn test_archive_is_streamed() {
    if !zip_available() {
        eprintln!("zip is not installed, skipping");
        return;
    }
    let photos = photos_fixture();
    let launcher = ProbeLauncher::new(ZipLauncher::default());
    let service = service(test_config(photos.path(), 0), launcher.clone());

    let mut res = TestClient::get(archive_url("archive1")).send(&service).await;

    assert_eq!(res.status_code.unwrap(), StatusCode::OK);
    assert_eq!(
        res.headers().get(CONTENT_DISPOSITION).unwrap().to_str().unwrap(),
        ARCHIVE_CONTENT_DISPOSITION
    );
    let body = res.take_bytes(None).await.unwrap();
    assert_eq!(extract(body, "photo.jpg"), PHOTO);
    assert_eq!(launcher.launched(), 1);
}

#[tokio::test]
async fn test_missing_archive_spawns_nothing() {
    let photos = photos_fixture();
    let launcher = ProbeLauncher::new(ZipLauncher::default());
    let service = service(test_config(photos.path(), 0), launcher.clone());

    let mut res = TestClient::get(archive_url("missing")).send(&service).await;

    assert_eq!(res.status_code.unwrap(), StatusCode::NOT_FOUND);
    assert!(res.headers().get(CONTENT_DISPOSITION).is_none());
    assert_eq!(res.take_string().await.unwrap(), NOT_FOUND_MESSAGE);
    assert_eq!(launcher.launched(), 0);
}

#[tokio::test]
async fn test_empty_archive_directory() {
    if !zip_available() {
        eprintln!("zip is not installed, skipping");
        return;
    }
    let photos = photos_fixture();
    let launcher = ProbeLauncher::new(ZipLauncher::default());
    let service = service(test_config(photos.path(), 0), launcher.clone());

    let mut res = TestClient::get(archive_url("archive2")).send(&service).await;

    assert_eq!(res.status_code.unwrap(), StatusCode::OK);
    // zip has nothing to add and exits with "Nothing to do!", the body stays empty
    assert!(res.take_bytes(None).await.unwrap().is_empty());
    assert_eq!(launcher.launched(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    if !zip_available() {
        eprintln!("zip is not installed, skipping");
        return;
    }
    let photos = photos_fixture();
    std::fs::write(photos.path().join("archive2/other.jpg"), b"other photo").unwrap();
    let launcher = ProbeLauncher::new(ZipLauncher::default());
    let service = service(test_config(photos.path(), 0), launcher.clone());

    let (mut first, mut second) = tokio::join!(
        TestClient::get(archive_url("archive1")).send(&service),
        TestClient::get(archive_url("archive2")).send(&service),
    );
    let (first, second) = tokio::join!(first.take_bytes(None), second.take_bytes(None));

    assert_eq!(extract(first.unwrap(), "photo.jpg"), PHOTO);
    assert_eq!(extract(second.unwrap(), "other.jpg"), b"other photo");
    assert_eq!(launcher.launched(), 2);
}

#[tokio::test]
async fn test_client_disconnect_terminates_archiver() {
    let photos = photos_fixture();
    // Emits one chunk, then would keep running long after the client is gone
    let launcher = ProbeLauncher::new(ZipLauncher::new("sh", ["-c", "printf chunk; exec sleep 30"]));
    let service = service(test_config(photos.path(), 3600), launcher.clone());

    let res = TestClient::get(archive_url("archive1")).send(&service).await;
    assert_eq!(res.status_code.unwrap(), StatusCode::OK);
    drop(res);

    tokio::time::timeout(Duration::from_secs(5), async {
        while launcher.terminated() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("archiver was not terminated after the client went away");
    assert_eq!(launcher.launched(), 1);
    assert_eq!(launcher.terminated(), 1);
}

#[tokio::test]
async fn test_launch_failure_is_internal_error() {
    let photos = photos_fixture();
    let launcher = ProbeLauncher::new(ZipLauncher::new("no-such-archiver", ["-r", "-", "."]));
    let service = service(test_config(photos.path(), 0), launcher.clone());

    let res = TestClient::get(archive_url("archive1")).send(&service).await;

    assert_eq!(res.status_code.unwrap(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.headers().get(CONTENT_DISPOSITION).is_none());
    assert_eq!(launcher.launched(), 1);
}

#[tokio::test]
async fn test_index_page() {
    let photos = photos_fixture();
    let config = test_config(photos.path(), 0);
    std::fs::write(&config.index_page, "<h1>Photos</h1>").unwrap();
    let service = service(config, ProbeLauncher::new(ZipLauncher::default()));

    let mut res = TestClient::get("http://127.0.0.1:8080/").send(&service).await;

    assert_eq!(res.status_code.unwrap(), StatusCode::OK);
    let content_type = res.headers().get(CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    assert_eq!(res.take_string().await.unwrap(), "<h1>Photos</h1>");
}

#[tokio::test]
async fn test_missing_index_page() {
    let photos = photos_fixture();
    let mut config = test_config(photos.path(), 0);
    config.index_page = PathBuf::from("/nonexistent/index.html");
    let service = service(config, ProbeLauncher::new(ZipLauncher::default()));

    let res = TestClient::get("http://127.0.0.1:8080/").send(&service).await;

    assert_eq!(res.status_code.unwrap(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_stalled_download() {
    let photos = photos_fixture();
    let launcher = ProbeLauncher::new(ZipLauncher::new("sh", ["-c", "printf chunk; exec sleep 30"]));
    let server = ArchiveServer::with_launcher(test_config(photos.path(), 3600), launcher.clone())
        .with_shutdown_timeout(Duration::from_millis(200));

    let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let acceptor = TcpListener::new(addr).try_bind().await.unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve(acceptor, async move {
        let _ = stop_rx.await;
    }));

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /archive/archive1/ HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while launcher.launched() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("archive request never reached the handler");

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("server kept waiting for the stalled download")
        .unwrap();
    drop(client);
}
