//! The gateway: target registry, capability aggregation and the serving loop

pub mod capabilities;
pub mod naming;
pub mod serve;
pub mod server;
pub mod target;

pub use serve::{serve, serve_stdio};
pub use server::{CloseReport, GatewayServer};
pub use target::{ConnectOptions, Target, TargetAttributes, TargetInfo, TargetStatus, TargetUpdate};
