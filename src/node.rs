//! Node assembly: registry, store, resolver, engine and HTTP server
//!
//! A node wires the layers together:
//! - Operation registry (from a feed file or the service set's own feed)
//! - Object store selected by [`StoreConfig`]
//! - Resolver over the service set's capability table
//! - Execution engine forwarding through [`HttpDispatcher`]
//! - HTTP server on the listen address

use crate::config::{NodeConfig, StoreConfig};
use crate::engine::ExecutionEngine;
use crate::error::{ChoreoError, Result};
use crate::http::{HttpDispatcher, HttpServer};
use crate::marshal::TypeMarshaller;
use crate::registry::OperationRegistry;
use crate::resolver::Resolver;
use crate::service::{builtin, CapabilityTable};
use crate::store::{FileObjectStore, MemoryObjectStore, ObjectStore, RocksDbObjectStore};
use slog::{error, info, Logger};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The services a node offers
pub struct ServiceSet {
    /// Operation feed used when the configuration names no feed file
    pub feed: String,
    pub capabilities: CapabilityTable,
    pub marshaller: Arc<dyn TypeMarshaller>,
}

impl ServiceSet {
    /// The built-in `util.*` services
    pub fn builtin() -> Self {
        Self {
            feed: builtin::OPERATIONS.to_string(),
            capabilities: builtin::capabilities(),
            marshaller: Arc::new(builtin::types()),
        }
    }
}

/// A running host
pub struct ChoreoNode {
    engine: Arc<ExecutionEngine>,
    server_handle: Option<JoinHandle<()>>,
    local_address: SocketAddr,
    logger: Logger,
}

impl ChoreoNode {
    /// Build every layer and start serving
    pub async fn start(config: NodeConfig, services: ServiceSet, logger: Logger) -> Result<Self> {
        let advertised = config.advertised().to_string();
        info!(logger, "Starting choreo node";
            "listen" => &config.listen_address,
            "advertised" => &advertised
        );

        let registry = match &config.operations_file {
            Some(path) => OperationRegistry::from_file(path, &logger)?,
            None => OperationRegistry::from_feed(&services.feed, &logger),
        };
        let store = open_store(&config.store)?;

        let resolver = Resolver::new(
            Arc::new(registry),
            Arc::new(services.capabilities),
            services.marshaller,
            store,
            logger.clone(),
        );
        let dispatcher = HttpDispatcher::with_timeout(config.forward_timeout, logger.clone())?;
        let engine = Arc::new(ExecutionEngine::new(
            advertised,
            resolver,
            Arc::new(dispatcher),
            logger.clone(),
        ));

        let address: SocketAddr = config.listen_address.parse().map_err(|e| {
            ChoreoError::Config(format!("invalid listen address '{}': {}", config.listen_address, e))
        })?;
        let listener = TcpListener::bind(address).await.map_err(|e| {
            ChoreoError::Config(format!("cannot bind {}: {}", address, e))
        })?;
        let local_address = listener.local_addr()?;

        let server = HttpServer::new(local_address, engine.clone(), logger.clone());
        let server_logger = logger.clone();
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!(server_logger, "HTTP server stopped"; "error" => %e);
            }
        });

        info!(logger, "Choreo node started"; "address" => %local_address);

        Ok(Self {
            engine,
            server_handle: Some(server_handle),
            local_address,
            logger,
        })
    }

    /// Address other hosts use for this node
    pub fn advertised(&self) -> &str {
        self.engine.host()
    }

    /// Address the server is bound to
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    /// Stop serving
    pub async fn shutdown(mut self) {
        info!(self.logger, "Shutting down choreo node");
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

fn open_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(match config {
        StoreConfig::Memory => Arc::new(MemoryObjectStore::new()),
        StoreConfig::Files(dir) => Arc::new(FileObjectStore::open(dir)?),
        StoreConfig::RocksDb(dir) => Arc::new(RocksDbObjectStore::open_or_create(dir)?),
    })
}
