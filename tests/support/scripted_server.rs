//! Raw TCP HTTP server for failures wiremock cannot produce.
//!
//! The first `truncate_first` responses announce the full body length but
//! close the connection after `cut_after` bytes, which the client sees as a
//! connection dropped mid-body. Later responses are complete, answering a
//! `Range: bytes=N-` request with `206` when `honour_range` is set, limited to
//! the first `range_requests` requests when that is given.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct ServerScript {
    pub body: Vec<u8>,
    pub truncate_first: usize,
    pub cut_after: usize,
    pub honour_range: bool,
    /// Only the first this-many requests honour `Range`.
    pub range_requests: Option<usize>,
    /// Pause after sending this many body bytes of a complete response.
    pub stall: Option<(usize, Duration)>,
}

pub struct ScriptedServer {
    addr: SocketAddr,
    ranges: Arc<Mutex<Vec<Option<String>>>>,
    task: JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn start(script: ServerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ranges);

        let task = tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                let truncate = served < script.truncate_first;
                let honour_range =
                    script.honour_range && script.range_requests.is_none_or(|n| served < n);
                served += 1;
                let range = serve(stream, &script, truncate, honour_range).await;
                seen.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(range);
            }
        });

        Self { addr, ranges, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// `Range` header of every request served, in order.
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.ranges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn requests(&self) -> usize {
        self.ranges().len()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    script: &ServerScript,
    truncate: bool,
    honour_range: bool,
) -> Option<String> {
    let head = read_request_head(&mut stream).await;
    let range = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });
    let start = range
        .as_deref()
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.strip_suffix('-'))
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|_| honour_range)
        .map_or(0, |n| n.min(script.body.len()));

    let body = &script.body[start..];
    let status = if start > 0 {
        format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{}/{}\r\n",
            script.body.len() - 1,
            script.body.len()
        )
    } else {
        "HTTP/1.1 200 OK\r\n".to_string()
    };
    let head = format!(
        "{status}Content-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        body.len()
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return range;
    }

    if truncate {
        let cut = script.cut_after.min(body.len().saturating_sub(1));
        let _ = stream.write_all(&body[..cut]).await;
        let _ = stream.flush().await;
        return range;
    }

    match script.stall {
        Some((after, pause)) if after < body.len() => {
            let _ = stream.write_all(&body[..after]).await;
            let _ = stream.flush().await;
            tokio::time::sleep(pause).await;
            let _ = stream.write_all(&body[after..]).await;
        }
        _ => {
            let _ = stream.write_all(body).await;
        }
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
    range
}

async fn read_request_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
