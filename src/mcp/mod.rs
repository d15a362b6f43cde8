//! MCP (Model Context Protocol) server implementation

pub mod protocol;
pub mod tools;

pub use protocol::{
    methods, InitializeResult, McpError, McpHandler, McpRequest, McpResponse, McpServer,
    RequestContext, ServerInfo, ServerState, ToolCallResult, ToolContent,
};
pub use tools::{get_tool_definitions, ToolDefinition};
