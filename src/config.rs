//! Configuration for choreo nodes

use std::path::PathBuf;
use std::time::Duration;

/// Where instance records are kept
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum StoreConfig {
    /// In memory; records are lost when the process exits
    #[default]
    Memory,
    /// One file per instance under `<dir>/objects/<kind>/<id>`
    Files(PathBuf),
    /// A RocksDB database at the given directory
    RocksDb(PathBuf),
}

/// Configuration for starting a choreo node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address to listen on for HTTP requests (e.g., "0.0.0.0:8000")
    pub listen_address: String,

    /// Address other hosts use to reach this node (e.g., "192.168.1.10:8000").
    /// It is the host part of every handle created here.
    /// If None, uses the listen_address
    pub advertise_address: Option<String>,

    /// Operation feed to load; the built-in feed is used when absent
    pub operations_file: Option<PathBuf>,

    /// Instance storage backend
    pub store: StoreConfig,

    /// Timeout of forwarded requests; None waits indefinitely
    pub forward_timeout: Option<Duration>,
}

impl NodeConfig {
    pub fn new(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
            advertise_address: None,
            operations_file: None,
            store: StoreConfig::Memory,
            forward_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Set the advertised address (different from listen address).
    pub fn with_advertise_address(mut self, address: impl Into<String>) -> Self {
        self.advertise_address = Some(address.into());
        self
    }

    pub fn with_operations_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.operations_file = Some(path.into());
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_forward_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.forward_timeout = timeout;
        self
    }

    /// The address this node is known by
    pub fn advertised(&self) -> &str {
        self.advertise_address
            .as_deref()
            .unwrap_or(&self.listen_address)
    }
}
