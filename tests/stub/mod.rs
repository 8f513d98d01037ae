//! Purpose: Minimal loopback HTTP stub serving canned responses to tests.
//! Exports: `StubServer`, `CannedResponse`, `RecordedRequest`.
//! Role: Stands in for the remote API so tests stay hermetic.
//! Invariants: One accepted connection per canned response, served in order.
//! Invariants: Connections close after each response; no keep-alive.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub struct CannedResponse {
    status: u16,
    reason: &'static str,
    content_type: Option<&'static str>,
    location: Option<&'static str>,
    body: Vec<u8>,
}

impl CannedResponse {
    pub fn new(
        status: u16,
        reason: &'static str,
        content_type: Option<&'static str>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            status,
            reason,
            content_type,
            location: None,
            body,
        }
    }

    pub fn json(status: u16, reason: &'static str, envelope: &Value) -> Self {
        Self::new(
            status,
            reason,
            Some("application/json; charset=UTF-8"),
            envelope.to_string().into_bytes(),
        )
    }

    pub fn octet_stream(status: u16, reason: &'static str, body: &[u8]) -> Self {
        Self::new(
            status,
            reason,
            Some("application/octet-stream"),
            body.to_vec(),
        )
    }

    pub fn redirect(status: u16, reason: &'static str, location: &'static str) -> Self {
        Self {
            status,
            reason,
            content_type: None,
            location: Some(location),
            body: Vec::new(),
        }
    }
}

pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

pub struct StubServer {
    base_url: String,
    requests: Receiver<RecordedRequest>,
}

impl StubServer {
    pub fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        let addr = listener.local_addr().expect("stub addr");
        let (sender, requests) = mpsc::channel();
        thread::spawn(move || {
            for canned in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                let recorded = read_request(&mut stream);
                let _ = sender.send(recorded);
                write_response(&mut stream, &canned);
            }
        });
        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn recorded(&self) -> RecordedRequest {
        self.requests
            .recv_timeout(Duration::from_secs(5))
            .expect("a request should have been recorded")
    }
}

fn read_request(stream: &mut TcpStream) -> RecordedRequest {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    let head = String::from_utf8_lossy(&head).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        }
        headers.push((name, value));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        let _ = stream.read_exact(&mut body);
    }
    RecordedRequest {
        method,
        path,
        headers,
        body,
    }
}

fn write_response(stream: &mut TcpStream, canned: &CannedResponse) {
    let mut head = format!("HTTP/1.1 {} {}\r\n", canned.status, canned.reason);
    if let Some(content_type) = canned.content_type {
        head.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    if let Some(location) = canned.location {
        head.push_str(&format!("Location: {location}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        canned.body.len()
    ));
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&canned.body);
    let _ = stream.flush();
}
