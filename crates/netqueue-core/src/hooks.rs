//! Overridable node behaviour.
//!
//! [`StatusProvider`] supplies the STATUS a client announces after its parent
//! acknowledges the connection. [`Telemetry`] observes STATUS and PONG frames,
//! which the protocol otherwise leaves as no-ops.

use std::fmt;

use tracing::debug;

use crate::peers::PeerId;

/// Where an observed frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The client's parent link
    Parent,
    /// One of the server's peers
    Peer(PeerId),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => f.write_str("parent"),
            Self::Peer(id) => id.fmt(f),
        }
    }
}

/// Describes this node to its parent.
pub trait StatusProvider: Send {
    /// Status string, or `None` to send nothing.
    fn status(&self) -> Option<String>;
}

/// Never reports a status.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatus;

impl StatusProvider for NoStatus {
    fn status(&self) -> Option<String> {
        None
    }
}

/// Always reports the same status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticStatus(pub String);

impl StatusProvider for StaticStatus {
    fn status(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl<F> StatusProvider for F
where
    F: Fn() -> Option<String> + Send,
{
    fn status(&self) -> Option<String> {
        self()
    }
}

/// Observer for STATUS and PONG frames.
pub trait Telemetry: Send {
    /// A STATUS frame arrived.
    fn on_status(&mut self, origin: Origin, status: &str) {
        let _ = (origin, status);
    }

    /// A PONG frame arrived.
    fn on_pong(&mut self, origin: Origin) {
        let _ = origin;
    }
}

/// Logs observed frames at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn on_status(&mut self, origin: Origin, status: &str) {
        debug!(%origin, status, "status received");
    }

    fn on_pong(&mut self, origin: Origin) {
        debug!(%origin, "pong received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_provide_status() {
        let provider = || Some("3 workers".to_string());
        assert_eq!(StatusProvider::status(&provider), Some("3 workers".to_string()));
    }

    #[test]
    fn builtin_providers() {
        assert_eq!(NoStatus.status(), None);
        assert_eq!(StaticStatus("idle".into()).status(), Some("idle".into()));
    }

    #[test]
    fn origin_display() {
        assert_eq!(Origin::Parent.to_string(), "parent");
    }
}
