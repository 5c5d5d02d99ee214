use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Which sorted index backend the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexKind {
    /// Lock-free concurrent skip list.
    #[default]
    SkipList,
    /// Copy-on-write sorted array; scans read a point-in-time snapshot.
    Snapshot,
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skiplist" => Ok(IndexKind::SkipList),
            "snapshot" => Ok(IndexKind::Snapshot),
            other => Err(format!("unknown index kind: {other}")),
        }
    }
}

/// Configuration for the rget server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (default: 127.0.0.1:11211)
    pub listen_addr: SocketAddr,

    /// Index backend (default: skiplist)
    pub index: IndexKind,

    /// Protocol limits
    pub limits: ProtocolLimits,

    /// How often to log server stats (default: 30s)
    pub stats_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolLimits {
    /// Longest accepted request or header line, CRLF excluded (default: 2048)
    pub max_line_len: usize,

    /// Longest accepted key (default: 250)
    pub max_key_len: usize,

    /// Largest accepted `set` payload (default: 1MB)
    pub max_value_size: usize,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_line_len: 2048,
            max_key_len: 250,
            max_value_size: 1024 * 1024, // 1MB
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 11211)),
            index: IndexKind::default(),
            limits: ProtocolLimits::default(),
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new config listening on the given address
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Select the index backend
    pub fn index(mut self, kind: IndexKind) -> Self {
        self.index = kind;
        self
    }

    /// Set maximum line length
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.limits.max_line_len = len;
        self
    }

    /// Set maximum key length
    pub fn max_key_len(mut self, len: usize) -> Self {
        self.limits.max_key_len = len;
        self
    }

    /// Set maximum value size
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.limits.max_value_size = size;
        self
    }

    /// Set stats logging interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}
