//! Outbound MCP clients, one per wire protocol

pub mod connection;
pub mod http_support;
pub mod in_process_client;
pub mod pending;
pub mod sse_client;
pub mod sse_parser;
pub mod stdio_client;
pub mod streamable_http_client;

pub use connection::{Connection, RequestOptions};
pub use in_process_client::InProcessClient;
pub use sse_client::SseClient;
pub use stdio_client::StdioClient;
pub use streamable_http_client::StreamableHttpClient;
