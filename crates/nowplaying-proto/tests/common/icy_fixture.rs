#![allow(dead_code)]

//! Tiny hand-rolled HTTP/1.1 server standing in for an Icecast station.
//!
//! It speaks raw TCP so tests can script misbehaving servers.  It also
//! counts how many connections the client opened and how many it has since
//! closed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum After {
    /// Close our side once the body is written.
    Close,
    /// Keep the socket open until the client goes away.
    Hold,
}

#[derive(Debug, Clone)]
pub enum Reply {
    /// `302 Found` with the given `Location`.  `{base}` expands to this
    /// fixture's `http://host:port`, for absolute redirects.
    Redirect { location: String },
    /// `200 OK` audio stream.
    Stream {
        metaint: Option<usize>,
        body: Vec<u8>,
        chunk: usize,
        pace: Duration,
        then: After,
    },
    /// `302 Found` without a `Location`, carrying an audio stream anyway.
    Moved { metaint: usize, body: Vec<u8> },
    /// `200 OK` that repeats `byte` until the client hangs up.
    Endless { metaint: usize, byte: u8 },
    /// Accept and read the request, never answer.
    Silent,
}

impl Reply {
    pub fn redirect(location: impl Into<String>) -> Self {
        Reply::Redirect {
            location: location.into(),
        }
    }

    /// Whole body in chunks of `chunk` bytes, then close.
    pub fn stream(metaint: usize, body: Vec<u8>, chunk: usize) -> Self {
        Reply::Stream {
            metaint: Some(metaint),
            body,
            chunk,
            pace: Duration::ZERO,
            then: After::Close,
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    accepted: AtomicUsize,
    closed: AtomicUsize,
    icy_requests: AtomicUsize,
    paths: Mutex<Vec<String>>,
}

pub struct IcyFixture {
    addr: SocketAddr,
    stats: Arc<Stats>,
    task: JoinHandle<()>,
}

impl IcyFixture {
    pub async fn start(routes: Vec<(&str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fixture listener");
        let addr = listener.local_addr().expect("fixture addr");
        let routes: Arc<HashMap<String, Reply>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, reply)| (path.to_string(), reply))
                .collect(),
        );
        let stats = Arc::new(Stats::default());

        let base = format!("http://{}", addr);
        let stats_for_task = stats.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _peer)) = listener.accept().await else {
                    break;
                };
                stats_for_task.accepted.fetch_add(1, Ordering::SeqCst);
                let routes = routes.clone();
                let stats = stats_for_task.clone();
                let base = base.clone();
                tokio::spawn(async move {
                    serve(socket, &routes, &stats, &base).await;
                    stats.closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self { addr, stats, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn accepted(&self) -> usize {
        self.stats.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    /// Requests that carried `Icy-MetaData: 1`.
    pub fn icy_requests(&self) -> usize {
        self.stats.icy_requests.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.stats.paths.lock().expect("paths lock").clone()
    }

    /// True once every accepted connection has been closed by the client.
    pub async fn wait_all_closed(&self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if self.accepted() > 0 && self.accepted() == self.closed() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for IcyFixture {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// `[metaint bytes of audio][length byte][meta padded to 16]`.
pub fn icy_body(metaint: usize, meta: &str) -> Vec<u8> {
    let blocks = meta.len().div_ceil(16);
    assert!(blocks <= 255, "metadata too long for one block");
    let mut body = vec![b'A'; metaint];
    body.push(blocks as u8);
    body.extend_from_slice(meta.as_bytes());
    body.resize(metaint + 1 + blocks * 16, 0);
    body
}

async fn serve(
    mut socket: TcpStream,
    routes: &HashMap<String, Reply>,
    stats: &Stats,
    base: &str,
) {
    let Some(head) = read_head(&mut socket).await else {
        return;
    };
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    if head
        .lines()
        .any(|l| l.trim().eq_ignore_ascii_case("icy-metadata: 1"))
    {
        stats.icy_requests.fetch_add(1, Ordering::SeqCst);
    }
    stats.paths.lock().expect("paths lock").push(path.clone());

    match routes.get(&path) {
        None => {
            let _ = socket
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await;
        }
        Some(Reply::Redirect { location }) => {
            let head = format!(
                "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\n\r\n",
                location.replace("{base}", base)
            );
            let _ = socket.write_all(head.as_bytes()).await;
        }
        Some(Reply::Stream {
            metaint,
            body,
            chunk,
            pace,
            then,
        }) => {
            if socket
                .write_all(stream_head("200 OK", *metaint).as_bytes())
                .await
                .is_err()
            {
                return;
            }
            for part in body.chunks((*chunk).max(1)) {
                if socket.write_all(part).await.is_err() || socket.flush().await.is_err() {
                    return;
                }
                if !pace.is_zero() {
                    tokio::time::sleep(*pace).await;
                }
            }
            if *then == After::Close {
                let _ = socket.shutdown().await;
            }
        }
        Some(Reply::Moved { metaint, body }) => {
            let head = stream_head("302 Found", Some(*metaint));
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        }
        Some(Reply::Endless { metaint, byte }) => {
            if socket
                .write_all(stream_head("200 OK", Some(*metaint)).as_bytes())
                .await
                .is_err()
            {
                return;
            }
            let block = vec![*byte; 4096];
            while socket.write_all(&block).await.is_ok() {}
            return;
        }
        Some(Reply::Silent) => {}
    }

    wait_for_client_close(&mut socket).await;
}

fn stream_head(status: &str, metaint: Option<usize>) -> String {
    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Type: audio/mpeg\r\nicy-name: Fixture FM\r\n",
        status
    );
    if let Some(m) = metaint {
        head.push_str(&format!("icy-metaint: {}\r\n", m));
    }
    head.push_str("Connection: close\r\n\r\n");
    head
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut tmp = [0u8; 1024];
    loop {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            return Some(String::from_utf8_lossy(&buf[..end]).into_owned());
        }
        if buf.len() > 16 * 1024 {
            return None;
        }
    }
}

async fn wait_for_client_close(socket: &mut TcpStream) {
    let mut tmp = [0u8; 256];
    loop {
        match socket.read(&mut tmp).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
