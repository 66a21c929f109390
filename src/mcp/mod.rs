//! Model Context Protocol plumbing: message types, errors, transports and clients

pub mod clients;
pub mod errors;
pub mod handler;
pub mod transport;
pub mod types;

pub use clients::{Connection, RequestOptions};
pub use errors::{McpError, McpErrorCode};
pub use handler::McpHandler;
pub use transport::{TargetTransport, TransportKind};
pub use types::{McpRequest, McpResponse};
