//! In-process HTTP fixture server for transport and transcription tests.
//!
//! Each accepted connection is answered with the next queued
//! [`FixtureResponse`]; once the queue is empty connections get a 404.
//! Every request is captured before its response is written. Session tests
//! that need no network use [`ScriptedTransport`] instead.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::ChatRequest;
use crate::core::chat_stream::{Fragment, FragmentSink, StreamHandle, Transport};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.clone())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct FixtureResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    hold_open: bool,
}

impl FixtureResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
            hold_open: false,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.as_bytes().to_vec(),
            hold_open: false,
        }
    }

    pub fn event_stream(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: body.as_bytes().to_vec(),
            hold_open: false,
        }
    }

    /// Event stream that writes `body` and then never finishes; the
    /// connection stays open until the client goes away.
    pub fn stalled_event_stream(body: &str) -> Self {
        Self {
            hold_open: true,
            ..Self::event_stream(body)
        }
    }
}

pub struct FixtureServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FixtureServer {
    pub async fn start(responses: Vec<FixtureResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fixture server");
        let addr = listener.local_addr().expect("fixture addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(Mutex::new(VecDeque::from(responses)));

        let captured = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let response = queue.lock().await.pop_front();
                let captured = Arc::clone(&captured);
                tokio::spawn(async move {
                    let _ = serve(socket, response, captured).await;
                });
            }
        });

        Self { addr, requests }
    }

    /// URL on a port nothing is listening on.
    pub async fn unused_url(path: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind placeholder listener");
        let addr = listener.local_addr().expect("placeholder addr");
        drop(listener);
        format!("http://{addr}{path}")
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn serve(
    socket: TcpStream,
    response: Option<FixtureResponse>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);
    let request = read_request(&mut reader).await?;
    captured.lock().await.push(request);

    let response =
        response.unwrap_or_else(|| FixtureResponse::json(404, r#"{"error":"no fixture"}"#));
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n",
        response.status,
        reason(response.status),
        response.content_type
    );
    if !response.hold_open {
        head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    }
    head.push_str("\r\n");

    let socket = reader.get_mut();
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(&response.body).await?;
    socket.flush().await?;

    if response.hold_open {
        let mut sink = [0u8; 256];
        while reader.read(&mut sink).await? > 0 {}
        return Ok(());
    }

    reader.get_mut().shutdown().await
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> std::io::Result<CapturedRequest> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };

    let mut body = Vec::new();
    if let Some(length) = header("content-length").and_then(|v| v.parse::<usize>().ok()) {
        body.resize(length, 0);
        reader.read_exact(&mut body).await?;
    } else if header("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).await?;
            let size_hex = size_line.split(';').next().unwrap_or_default().trim();
            let size = usize::from_str_radix(size_hex, 16).unwrap_or(0);
            if size == 0 {
                let mut trailer = String::new();
                while reader.read_line(&mut trailer).await? > 0 && !trailer.trim().is_empty() {
                    trailer.clear();
                }
                break;
            }
            let start = body.len();
            body.resize(start + size, 0);
            reader.read_exact(&mut body[start..]).await?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf).await?;
        }
    }

    Ok(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

/// [`Transport`] double that records requests and replays scripted fragments.
///
/// Each `open` consumes the next script (or none) and keeps the producer side
/// alive, so tests can push more fragments through [`ScriptedTransport::sink`].
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: std::sync::Mutex<VecDeque<Vec<Fragment>>>,
    requests: std::sync::Mutex<Vec<ChatRequest>>,
    sinks: std::sync::Mutex<Vec<FragmentSink>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Vec<Fragment>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: std::sync::Mutex::new(scripts.into()),
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn sink(&self, index: usize) -> FragmentSink {
        self.sinks.lock().unwrap()[index].clone()
    }

    /// Drop every producer so open streams end without a terminal fragment.
    pub fn hang_up(&self) {
        self.sinks.lock().unwrap().clear();
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, request: ChatRequest, cancel: CancellationToken) -> StreamHandle {
        self.requests.lock().unwrap().push(request);
        let (sink, handle) = StreamHandle::channel(cancel);
        if let Some(script) = self.scripts.lock().unwrap().pop_front() {
            for fragment in script {
                sink.send(fragment);
            }
        }
        self.sinks.lock().unwrap().push(sink);
        handle
    }
}
