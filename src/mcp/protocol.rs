//! MCP JSON-RPC protocol implementation
//!
//! Line-delimited JSON-RPC 2.0 over stdio. Requests are handled by a
//! bounded pool of worker threads, so responses may be emitted out of
//! request order; correlation is by id and every response is written as one
//! atomic line. Stdout carries protocol messages only.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::error::Result;

/// MCP JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// MCP JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message,
                data: None,
            }),
        }
    }
}

/// Standard MCP methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";
}

/// Per-request context threaded through the dispatcher into storage calls
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id attached to every log line for this request
    pub correlation_id: String,
    /// Set when the client sent notifications/cancelled for this id
    pub cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for handling MCP requests
///
/// Returning `None` suppresses the response (notifications).
pub trait McpHandler: Send + Sync + 'static {
    fn handle_request(&self, request: McpRequest, ctx: &RequestContext) -> Option<McpResponse>;
}

/// Shared server state visible to the signal watcher
pub struct ServerState {
    in_flight: AtomicUsize,
    shutting_down: AtomicBool,
    idle: Condvar,
    idle_lock: Mutex<()>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            idle: Condvar::new(),
            idle_lock: Mutex::new(()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Request shutdown; the read loop stops accepting new work
    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Block until in-flight work drains or the grace period elapses
    pub fn await_drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut guard = self.idle_lock.lock();
        while self.in_flight() > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.idle.wait_for(&mut guard, deadline - now);
        }
        true
    }

    fn enter(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let _guard = self.idle_lock.lock();
        self.idle.notify_all();
    }
}

/// MCP server handling stdio communication
pub struct McpServer<H: McpHandler> {
    handler: Arc<H>,
    config: ServerConfig,
    state: Arc<ServerState>,
    /// Pending cancellation flags keyed by serialized request id
    cancellations: Arc<DashMap<String, Arc<AtomicBool>>>,
}

impl<H: McpHandler> McpServer<H> {
    /// Create a new MCP server
    pub fn new(handler: H, config: ServerConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
            state: Arc::new(ServerState::new()),
            cancellations: Arc::new(DashMap::new()),
        }
    }

    /// Shared state handle for the signal watcher
    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// Run the server over stdin/stdout until EOF or shutdown
    pub fn run(&self) -> Result<()> {
        let stdin = std::io::stdin();
        let reader = BufReader::new(stdin.lock());
        let writer = Arc::new(Mutex::new(Box::new(std::io::stdout()) as Box<dyn Write + Send>));
        self.run_on(reader, writer)
    }

    /// Run against explicit reader/writer (used by tests)
    pub fn run_on<R: BufRead>(
        &self,
        mut reader: R,
        writer: Arc<Mutex<Box<dyn Write + Send>>>,
    ) -> Result<()> {
        let mut line = String::new();

        loop {
            if self.state.is_shutting_down() {
                break;
            }

            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    self.dispatch_line(trimmed, &writer);
                }
                Err(e) => {
                    tracing::error!(error = %e, "error reading stdin");
                    break;
                }
            }
        }

        self.state.request_shutdown();
        if !self.state.await_drain(self.config.shutdown_grace) {
            tracing::warn!(
                in_flight = self.state.in_flight(),
                "shutdown grace elapsed with requests still in flight"
            );
        }
        Ok(())
    }

    fn dispatch_line(&self, raw: &str, writer: &Arc<Mutex<Box<dyn Write + Send>>>) {
        let request: McpRequest = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(e) => {
                let response = McpResponse::error(None, -32700, format!("Parse error: {}", e));
                Self::write_response(writer, &response);
                return;
            }
        };

        // Cancellation notifications are handled inline so an in-flight
        // worker can observe the flag at its next storage boundary.
        if request.method == methods::CANCELLED {
            if let Some(id) = request.params.get("requestId").or_else(|| request.params.get("id")) {
                if let Some(flag) = self.cancellations.get(&id.to_string()) {
                    flag.store(true, Ordering::Relaxed);
                    tracing::debug!(request_id = %id, "cancellation received");
                }
            }
            return;
        }

        // Bounded concurrency: wait for a slot before spawning a worker.
        while self.state.in_flight() >= self.config.max_in_flight {
            std::thread::sleep(Duration::from_millis(1));
        }

        let ctx = RequestContext::new();
        if let Some(id) = &request.id {
            self.cancellations
                .insert(id.to_string(), ctx.cancelled.clone());
        }

        let handler = self.handler.clone();
        let writer = writer.clone();
        let state = self.state.clone();
        let cancellations = self.cancellations.clone();
        let request_id = request.id.clone();

        state.enter();
        std::thread::spawn(move || {
            let response = handler.handle_request(request, &ctx);
            if let Some(response) = response {
                Self::write_response(&writer, &response);
            }
            if let Some(id) = request_id {
                cancellations.remove(&id.to_string());
            }
            state.exit();
        });
    }

    /// Serialize and write one response as a single atomic line
    fn write_response(writer: &Arc<Mutex<Box<dyn Write + Send>>>, response: &McpResponse) {
        match serde_json::to_string(response) {
            Ok(json) => {
                let mut writer = writer.lock();
                if let Err(e) = writeln!(writer, "{}", json).and_then(|_| writer.flush()) {
                    tracing::error!(error = %e, "failed writing response");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed serializing response"),
        }
    }
}

/// MCP initialize result
///
/// The tool descriptors ride along so a client can skip tools/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    pub tools: Vec<super::tools::ToolDefinition>,
}

/// Server capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "durandal-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            tools: super::tools::get_tool_definitions(),
        }
    }
}

/// Tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolCallResult {
    /// Wrap a JSON payload, mirroring it as text
    pub fn json(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        let is_error = value
            .get("success")
            .and_then(|v| v.as_bool())
            .map(|ok| !ok)
            .filter(|e| *e);
        Self {
            content: vec![ToolContent::Text { text }],
            structured_content: Some(value),
            is_error,
        }
    }
}
