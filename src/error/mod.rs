//! Error handling module for the gateway
//!
//! Every surfaced error carries a machine-readable [`ErrorCode`], a message and an
//! optional context map.

mod error;

pub use error::{ErrorCode, ErrorContext, GatewayError, Result};
