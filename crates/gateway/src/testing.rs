//! In-process MCP server used by the gateway tests.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct State {
    tools: Vec<Value>,
    methods: Vec<String>,
    session_seen: bool,
    headers: HashMap<String, String>,
    deletes: usize,
    page_size: usize,
    broken: bool,
}

/// Speaks just enough streamable-HTTP MCP for the client tests. Answers
/// `GET` with 405 so the client runs without a standalone event stream.
pub struct MockMcpServer {
    addr: std::net::SocketAddr,
    state: Arc<Mutex<State>>,
}

pub fn tool_json(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": {"type": "object", "properties": {"symbol": {"type": "string"}}}
    })
}

impl MockMcpServer {
    pub const SESSION: &'static str = "sess-42";

    pub async fn start(tools: Vec<Value>) -> Self {
        Self::spawn(State {
            tools,
            page_size: usize::MAX,
            ..State::default()
        })
        .await
    }

    /// A server that answers every request with 503.
    pub async fn start_broken() -> Self {
        Self::spawn(State {
            broken: true,
            page_size: usize::MAX,
            ..State::default()
        })
        .await
    }

    async fn spawn(state: State) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(state));
        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(handle(socket, shared.clone()));
            }
        });
        Self { addr, state }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().unwrap().page_size = page_size;
        self
    }

    pub fn url(&self) -> String {
        format!("http://{}/mcp", self.addr)
    }

    pub fn methods(&self) -> Vec<String> {
        self.state.lock().unwrap().methods.clone()
    }

    pub fn saw_session_header(&self) -> bool {
        self.state.lock().unwrap().session_seen
    }

    pub fn deletes(&self) -> usize {
        self.state.lock().unwrap().deletes
    }

    /// Last value seen for a request header (lowercase name).
    pub fn header(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().headers.get(name).cloned()
    }

    /// Session teardown happens on the transport's worker; give it a moment.
    pub async fn wait_for_deletes(&self, expected: usize) {
        for _ in 0..100 {
            if self.deletes() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

struct Request {
    method: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

async fn read_request(socket: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let mut lines = head.lines();
        let method = lines.next()?.split_whitespace().next()?.to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= header_end + 4 + content_length {
            let body = data[header_end + 4..header_end + 4 + content_length].to_vec();
            return Some(Request { method, headers, body });
        }
    }
}

async fn respond(socket: &mut TcpStream, status: &str, extra_headers: &[(&str, &str)], content_type: &str, body: &str) {
    let mut head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (k, v) in extra_headers {
        head.push_str(&format!("{k}: {v}\r\n"));
    }
    head.push_str("\r\n");
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(body.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn handle(mut socket: TcpStream, state: Arc<Mutex<State>>) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };

    if state.lock().unwrap().broken {
        respond(&mut socket, "503 Service Unavailable", &[], "text/plain", "down").await;
        return;
    }

    state.lock().unwrap().headers.extend(request.headers.iter().cloned());

    if request.method == "GET" {
        respond(&mut socket, "405 Method Not Allowed", &[], "text/plain", "").await;
        return;
    }

    if request.method == "DELETE" {
        state.lock().unwrap().deletes += 1;
        respond(&mut socket, "200 OK", &[], "text/plain", "").await;
        return;
    }

    let has_session = request
        .headers
        .iter()
        .any(|(k, v)| k == "mcp-session-id" && v == MockMcpServer::SESSION);
    let msg: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
    let method = msg["method"].as_str().unwrap_or_default().to_string();
    let id = msg.get("id").cloned();

    let reply = {
        let mut st = state.lock().unwrap();
        st.methods.push(method.clone());
        if method != "initialize" && has_session {
            st.session_seen = true;
        }
        match method.as_str() {
            "initialize" => Some(serde_json::json!({
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "mock", "version": "0.0.1"}
                }
            })),
            "tools/list" => {
                let start: usize = msg["params"]["cursor"]
                    .as_str()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                let end = start.saturating_add(st.page_size).min(st.tools.len());
                let page: Vec<Value> = st.tools[start..end].to_vec();
                let mut result = serde_json::json!({ "tools": page });
                if end < st.tools.len() {
                    result["nextCursor"] = Value::String(end.to_string());
                }
                Some(serde_json::json!({ "result": result }))
            }
            "tools/call" => {
                let name = msg["params"]["name"].as_str().unwrap_or_default();
                if st.tools.iter().any(|t| t["name"] == name) {
                    let args = msg["params"]["arguments"].to_string();
                    Some(serde_json::json!({
                        "result": {
                            "content": [{"type": "text", "text": format!("{name}({args})")}],
                            "isError": false
                        }
                    }))
                } else {
                    Some(serde_json::json!({
                        "error": {"code": -32602, "message": format!("Unknown tool: {name}")}
                    }))
                }
            }
            _ => None,
        }
    };

    let Some(mut reply) = reply else {
        respond(&mut socket, "202 Accepted", &[], "application/json", "").await;
        return;
    };
    reply["jsonrpc"] = Value::String("2.0".into());
    if let Some(id) = id {
        reply["id"] = id;
    }

    if method == "initialize" {
        respond(
            &mut socket,
            "200 OK",
            &[("Mcp-Session-Id", MockMcpServer::SESSION)],
            "application/json",
            &reply.to_string(),
        )
        .await;
    } else if method == "tools/call" {
        // Exercise the event-stream response path.
        let body = format!("event: message\ndata: {reply}\n\n");
        respond(&mut socket, "200 OK", &[], "text/event-stream", &body).await;
    } else {
        respond(&mut socket, "200 OK", &[], "application/json", &reply.to_string()).await;
    }
}
