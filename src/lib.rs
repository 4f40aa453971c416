pub mod composition;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod marshal;
pub mod node;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod store;

pub use composition::{decode, decode_with_cursor, encode, Composition, Invocation, Operation};
pub use config::{NodeConfig, StoreConfig};
pub use engine::{CompositionForwarder, CompositionResult, EngineRequest, ExecutionEngine};
pub use error::{ChoreoError, Result, ServiceError};
pub use http::{HttpDispatcher, HttpServer};
pub use marshal::{TypeMarshaller, TypeRegistry};
pub use node::{ChoreoNode, ServiceSet};
pub use registry::OperationRegistry;
pub use resolver::{ExecutionState, Resolver, StateValue};
pub use service::{CapabilityTable, NativeValue, ParamType, ServiceHandle};
pub use store::{FileObjectStore, MemoryObjectStore, ObjectStore, RocksDbObjectStore};
