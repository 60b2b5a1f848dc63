//! Node configuration.
//!
//! Nodes only need a handful of values: where to listen or connect, how much
//! to read from a socket at once, and a cap on frame size. [`ConfigSource`]
//! abstracts where those values come from so embedders can supply their own.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use netqueue_proto::FrameHeader;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default port for a root server.
pub const DEFAULT_PORT: u16 = 9000;

/// Default bytes read per `read` call.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default cap on the bytes following a frame's length field (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Configuration shared by clients and servers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Host to bind (server) or connect to (client)
    pub hostname: String,
    /// Port to bind or connect to
    pub port: u16,
    /// Bytes requested per socket read
    pub max_frame_chunk_size: usize,
    /// Largest accepted frame, excluding the length field
    pub max_frame_size: usize,
    /// Seconds allowed for a client's TCP connect
    pub connect_timeout_secs: u64,
    /// Readiness events fetched per multiplexer wait
    pub event_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: DEFAULT_PORT,
            max_frame_chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout_secs: 10,
            event_capacity: 128,
        }
    }
}

impl NodeConfig {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Reject values the nodes cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_chunk_size == 0 {
            return Err(ConfigError::Invalid("max_frame_chunk_size must be positive".into()));
        }
        if self.max_frame_size < FrameHeader::TYPE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size must be at least {}",
                FrameHeader::TYPE_SIZE
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connect_timeout_secs must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        Ok(())
    }
}

/// Anything that can produce a [`NodeConfig`].
pub trait ConfigSource {
    /// Load and validate the configuration.
    fn load(&self) -> Result<NodeConfig, ConfigError>;
}

impl ConfigSource for NodeConfig {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        self.validate()?;
        Ok(self.clone())
    }
}

/// TOML file source. Missing keys fall back to the defaults.
#[derive(Debug, Clone)]
pub struct TomlFile {
    path: PathBuf,
}

impl TomlFile {
    /// Source reading `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl ConfigSource for TomlFile {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        let text = fs::read_to_string(&self.path)
            .map_err(|source| ConfigError::Read { path: self.path.clone(), source })?;
        let config: NodeConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}
