//! Crate-wide error type.
//!
//! Mirrors the manual-enum-plus-`Display`-impl pattern the rest of this
//! codebase uses for its own small error types (see `probes::ProbeError`,
//! which derives via `thiserror` instead): hand-rolled here because this
//! is the error surface every public operation returns, and callers match
//! on its variants directly (see §7 of the engine's error taxonomy).

use std::fmt;

#[derive(Debug)]
pub enum NetsentryError {
    HomeDirNotFound,
    ConfigReadError(String),
    ConfigParseError(String),
    InventoryUnavailable(String),
    ProbeTimeout(String),
    ProbeProtocolError(String),
    PersistenceWriteFailure(String),
    NotificationDispatchFailure(String),
    InvariantViolation(String),
}

impl fmt::Display for NetsentryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetsentryError::HomeDirNotFound => write!(f, "could not determine home directory"),
            NetsentryError::ConfigReadError(msg) => write!(f, "config read error: {msg}"),
            NetsentryError::ConfigParseError(msg) => write!(f, "config parse error: {msg}"),
            NetsentryError::InventoryUnavailable(msg) => {
                write!(f, "inventory unavailable: {msg}")
            }
            NetsentryError::ProbeTimeout(msg) => write!(f, "probe timeout: {msg}"),
            NetsentryError::ProbeProtocolError(msg) => write!(f, "probe protocol error: {msg}"),
            NetsentryError::PersistenceWriteFailure(msg) => {
                write!(f, "persistence write failure: {msg}")
            }
            NetsentryError::NotificationDispatchFailure(msg) => {
                write!(f, "notification dispatch failure: {msg}")
            }
            NetsentryError::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for NetsentryError {}

impl From<std::io::Error> for NetsentryError {
    fn from(err: std::io::Error) -> Self {
        NetsentryError::ConfigReadError(err.to_string())
    }
}

impl From<serde_json::Error> for NetsentryError {
    fn from(err: serde_json::Error) -> Self {
        NetsentryError::ConfigParseError(err.to_string())
    }
}

impl From<toml::de::Error> for NetsentryError {
    fn from(err: toml::de::Error) -> Self {
        NetsentryError::ConfigParseError(err.to_string())
    }
}

/// Flexible boolean env var parsing: true/1/yes/on, case-insensitive.
pub fn parse_env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(false)
}
