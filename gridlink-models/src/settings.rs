use crate::constants;
use config::{Config, File};
use gridlink_error::GwResult;
use serde::Deserialize;
use std::{ops::Deref, sync::Arc};

/// Layered runtime settings: compile-time defaults, then an optional config
/// file, then `GRIDLINK__`-prefixed environment variables.
#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    pub fn new(config_path: &str) -> GwResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("GRIDLINK")
                    .separator("__")
                    .try_parsing(true),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }

    /// Defaults only, no file or environment. Used by tests and tools.
    pub fn defaults() -> Self {
        Self(Arc::new(Inner::default()))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Inner {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub store: Store,
}

/// 104 server section.
#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    #[serde(default = "Server::bind_ip_default")]
    pub bind_ip: String,
    #[serde(default = "Server::port_default")]
    pub port: u16,
    #[serde(default = "Server::common_address_default")]
    pub common_address: u16,
    #[serde(default = "Server::max_connections_default")]
    pub max_connections: usize,
    #[serde(default = "Server::listen_backlog_default")]
    pub listen_backlog: u32,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            bind_ip: Server::bind_ip_default(),
            port: Server::port_default(),
            common_address: Server::common_address_default(),
            max_connections: Server::max_connections_default(),
            listen_backlog: Server::listen_backlog_default(),
        }
    }
}

impl Server {
    fn bind_ip_default() -> String {
        constants::IEC104_BIND_IP.into()
    }

    fn port_default() -> u16 {
        constants::IEC104_PORT
    }

    fn common_address_default() -> u16 {
        constants::DEFAULT_COMMON_ADDRESS
    }

    fn max_connections_default() -> usize {
        constants::IEC104_MAX_CONNECTIONS
    }

    fn listen_backlog_default() -> u32 {
        constants::IEC104_LISTEN_BACKLOG
    }
}

/// Point store section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Store {
    /// Dispatcher tick in milliseconds.
    #[serde(default = "Store::batch_interval_ms_default")]
    pub batch_interval_ms: u64,
    /// Concurrent listener invocations across all points.
    #[serde(default = "Store::fanout_permits_default")]
    pub fanout_permits: usize,
}

impl Default for Store {
    fn default() -> Self {
        Store {
            batch_interval_ms: Store::batch_interval_ms_default(),
            fanout_permits: Store::fanout_permits_default(),
        }
    }
}

impl Store {
    fn batch_interval_ms_default() -> u64 {
        constants::STORE_BATCH_INTERVAL_MS
    }

    fn fanout_permits_default() -> usize {
        constants::STORE_FANOUT_PERMITS
    }
}
