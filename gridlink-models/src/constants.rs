//! Compile-time defaults for the gateway. [`crate::Settings`] starts from
//! these and lets a config file or environment override them.

/// Address the 104 server binds to.
pub const IEC104_BIND_IP: &str = "0.0.0.0";

/// Standard 104 TCP port.
pub const IEC104_PORT: u16 = 2404;

/// Station common address used when a mapping does not name one.
pub const DEFAULT_COMMON_ADDRESS: u16 = 1;

/// Cap on concurrent SCADA client connections.
pub const IEC104_MAX_CONNECTIONS: usize = 10;

/// TCP listen backlog for pending connections.
pub const IEC104_LISTEN_BACKLOG: u32 = 10;

/// Point store dispatcher tick. One delivery per changed IOA per tick.
pub const STORE_BATCH_INTERVAL_MS: u64 = 100;

/// Fan-out permits: at least MAX_CONNECTIONS plus headroom so a stalled
/// listener occupies one permit, not the dispatcher.
pub const STORE_FANOUT_PERMITS: usize = 24;

/// Listener count above which subscribe() flags a probable leak.
pub const LISTENER_SOFT_CEILING: usize = 10;

/// Minimum spacing between admission-rejection WARN lines.
pub const REJECTION_LOG_INTERVAL_MS: i64 = 30_000;

/// Bound on dispatcher join and fan-out drain at shutdown.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "gridlink.toml";
