//! Configuration options for PC/SC transport

use std::time::Duration;

use pcsc::{Protocols as PcscProtocols, Scope as PcscScope};

/// Default bound on establishing a PC/SC context
pub const DEFAULT_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Scope of the PC/SC resource manager context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContextScope {
    /// Per-user context (default)
    #[default]
    User,
    /// System-wide context
    System,
}

impl From<ContextScope> for PcscScope {
    fn from(scope: ContextScope) -> Self {
        match scope {
            ContextScope::User => Self::User,
            ContextScope::System => Self::System,
        }
    }
}

/// Configuration options for PC/SC transport
#[derive(Debug, Clone)]
pub struct PcscConfig {
    /// Preferred protocols for card communication
    pub protocols: PcscProtocols,

    /// Resource manager scope
    pub scope: ContextScope,

    /// How long to wait for the resource manager before reporting it unavailable
    pub establish_timeout: Duration,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            protocols: PcscProtocols::T1,
            scope: ContextScope::User,
            establish_timeout: DEFAULT_ESTABLISH_TIMEOUT,
        }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred protocols
    pub const fn with_protocols(mut self, protocols: PcscProtocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the context scope
    pub const fn with_scope(mut self, scope: ContextScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the establish timeout
    pub const fn with_establish_timeout(mut self, timeout: Duration) -> Self {
        self.establish_timeout = timeout;
        self
    }
}
