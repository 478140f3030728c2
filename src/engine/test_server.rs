//! Minimal HTTP/1.1 server for fetch tests.
//!
//! Routes by path prefix:
//! - `/missing...` answers 404
//! - `/slow...` waits 100ms before answering 200
//! - `/index.php...` answers a post listing, see [`API_PAGE`]
//! - `/hang...` never answers
//! - anything else answers 200 with [`body_for`] the path

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct TestServer {
    base: String,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

/// Listing served for `pid=0`; any other page has no posts.
pub const API_PAGE: &str = r#"{
    "@attributes": {"limit": 2, "offset": 0, "count": 3},
    "post": [
        {"id": 11, "md5": "0123456789abcdef0123456789abcdef", "file_url": "https://img.example/images/aa/bb/one.jpg",
         "tags": "long_hair smile >_<", "image": "one.jpg", "score": 4},
        {"id": 12, "md5": "fedcba9876543210fedcba9876543210", "file_url": "https://img.example/images/cc/dd/two.png",
         "tags": "blue_sky (artist)", "image": "two.png"}
    ]
}"#;

/// Deterministic body served for `path`.
pub fn body_for(path: &str) -> Vec<u8> {
    format!("payload for {path};").repeat(64).into_bytes()
}

/// A client that never goes through a proxy.
pub fn test_client() -> Client {
    Client::builder()
        .no_proxy()
        .build()
        .expect("test client")
}

/// URL on a port nothing listens on.
pub async fn closed_port_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}{path}")
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let _ = serve(stream, counter).await;
                });
            }
        });

        Self { base, hits, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Requests answered or in progress so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, hits: Arc<AtomicUsize>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    hits.fetch_add(1, Ordering::SeqCst);

    if path.starts_with("/hang") {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return Ok(());
    }
    if path.starts_with("/slow") {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let (status, body) = if path.starts_with("/missing") {
        ("404 Not Found", b"not found".to_vec())
    } else if path.starts_with("/index.php") {
        if path.contains("pid=0") || !path.contains("pid=") {
            ("200 OK", API_PAGE.as_bytes().to_vec())
        } else {
            ("200 OK", br#"{"@attributes": {"limit": 2, "offset": 4, "count": 3}}"#.to_vec())
        }
    } else {
        ("200 OK", body_for(&path))
    };

    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}
