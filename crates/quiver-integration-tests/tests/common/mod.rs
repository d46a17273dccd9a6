//! Shared test harness for integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quiver_audit::{AuditLog, AuditRecord};
use quiver_broker::{ToolBroker, ToolBrokerBuilder};
use quiver_core::RequestId;
use quiver_crypto::KeyPair;
use quiver_policy::ExternalBoundary;
use quiver_sandbox::SandboxConfig;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Directories a scenario works in.
///
/// `packages` holds capability packages; `work` is the root of the external
/// boundary. Both are removed when the harness is dropped.
#[allow(dead_code)]
pub struct Dirs {
    /// Package root.
    pub packages: TempDir,
    /// Boundary root.
    pub work: TempDir,
}

#[allow(dead_code)]
impl Dirs {
    pub fn new() -> Self {
        quiver_test::init_test_logging();
        Self {
            packages: TempDir::new().expect("failed to create tempdir"),
            work: TempDir::new().expect("failed to create tempdir"),
        }
    }

    pub fn packages(&self) -> &Path {
        self.packages.path()
    }

    pub fn work(&self) -> &Path {
        self.work.path()
    }

    /// Write a file under the boundary root.
    pub fn put(&self, relative: &str, content: &str) {
        let path = self.work().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write file");
    }
}

/// Sandbox settings with short timeouts so failing scenarios end quickly.
#[allow(dead_code)]
pub fn sandbox() -> SandboxConfig {
    SandboxConfig::default()
        .with_default_timeout(Duration::from_secs(20))
        .with_cleanup_grace(Duration::from_millis(500))
}

/// A broker builder over an in-memory audit log and an unrestricted
/// boundary at `work`.
#[allow(dead_code)]
pub fn broker_builder(work: &Path) -> ToolBrokerBuilder {
    ToolBroker::builder(Arc::new(AuditLog::in_memory(KeyPair::generate())))
        .sandbox(sandbox())
        .boundary(ExternalBoundary::unrestricted(work))
}

/// Every record of `request_id`, oldest first.
#[allow(dead_code)]
pub fn records(broker: &ToolBroker, request_id: &RequestId) -> Vec<AuditRecord> {
    broker
        .audit()
        .sink()
        .records_for(request_id)
        .expect("audit sink readable")
}

/// Poll `condition` every 10 ms for up to five seconds.
#[allow(dead_code)]
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A one-shot HTTP server on localhost. It answers the first request with
/// that request's head as the body and hands the head back to the test.
#[allow(dead_code)]
pub async fn reflecting_server() -> (u16, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut head = Vec::new();
        let mut buf = [0_u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            head.extend_from_slice(buf.get(..n).unwrap_or_default());
        }
        let head = String::from_utf8_lossy(&head).into_owned();
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{head}",
            head.len()
        );
        stream.write_all(response.as_bytes()).await.expect("write");
        stream.shutdown().await.ok();
        head
    });
    (port, task)
}
