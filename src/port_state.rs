//! Port handshake between the rewrites hook and the transform hook
//!
//! The cell starts `Pending` and is moved to `Resolved` exactly once, by the
//! rewrites hook after the coordinator has bound the socket. The transform
//! hook only ever reads it and fails fast while it is still pending.

use crate::error::{QueryCacheError, QueryCacheResult};
use std::fmt;
use std::num::NonZeroU16;
use std::sync::OnceLock;

/// Observable state of the port handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// The server has not reported a port yet
    Pending,
    /// The server is listening on this port
    Resolved(NonZeroU16),
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolved(port) => write!(f, "resolved({})", port),
        }
    }
}

/// Single-writer, write-once port cell
#[derive(Debug, Default)]
pub struct PortCell {
    port: OnceLock<NonZeroU16>,
}

impl PortCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bound port, moving the handshake to `Resolved`.
    ///
    /// Resolving again with the same port is a no-op.
    pub fn resolve(&self, port: u16) -> QueryCacheResult<u16> {
        let port = NonZeroU16::new(port).ok_or_else(|| {
            QueryCacheError::StartupFailure("server reported port 0".to_string())
        })?;

        let stored = *self.port.get_or_init(|| port);
        if stored != port {
            return Err(QueryCacheError::Internal(format!(
                "port already resolved to {}, refusing {}",
                stored, port
            )));
        }

        Ok(stored.get())
    }

    pub fn state(&self) -> PortState {
        match self.port.get() {
            Some(port) => PortState::Resolved(*port),
            None => PortState::Pending,
        }
    }

    pub fn get(&self) -> Option<u16> {
        self.port.get().map(|p| p.get())
    }

    /// Read the port, failing if the handshake has not completed
    pub fn require(&self) -> QueryCacheResult<u16> {
        self.get().ok_or(QueryCacheError::PortNotReady)
    }
}
