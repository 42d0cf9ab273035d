use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Smallest arena the engine runs with; smaller requests are raised to it.
pub const MIN_MEMORY: usize = 32 * 1024;

pub const DEFAULT_BACKLOG: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub address: IpAddr,
    /// `0` picks an ephemeral port.
    pub port: u16,
    pub backlog: u32,
    /// Bytes reserved for the arena.
    pub total_memory: usize,
    /// Idle wait for a new connection.
    pub accept_timeout_ms: u64,
    /// Readiness wait on an established connection.
    pub io_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 80,
            backlog: DEFAULT_BACKLOG,
            total_memory: MIN_MEMORY,
            accept_timeout_ms: 1000,
            io_timeout_ms: 3000,
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Reads the YAML file named by `EMBER_CONFIG` when set, then applies a
    /// `LISTEN=addr:port` override from the environment.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("EMBER_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            config.set_listen(&listen)?;
        }

        Ok(config)
    }

    /// Sets address and port from `addr:port`.
    pub fn set_listen(&mut self, listen: &str) -> Result<()> {
        let addr: SocketAddr = listen
            .parse()
            .map_err(|_| Error::Config(format!("invalid listen address '{listen}'")))?;
        self.address = addr.ip();
        self.port = addr.port();
        Ok(())
    }

    /// Raises out-of-range values to their minimums.
    pub fn normalized(mut self) -> Self {
        if self.backlog == 0 {
            self.backlog = DEFAULT_BACKLOG;
        }
        self.total_memory = self.total_memory.max(MIN_MEMORY);
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}
