//! Transport configuration: strategy selection, session-property mapping
//! and the local SOCKS authentication bridge.

pub mod proxy;
pub mod session;
pub mod strategy;

pub use proxy::ProxyBridge;
pub use session::{ProxyConfig, ServerConfig, Session};
pub use strategy::TransportStrategy;
