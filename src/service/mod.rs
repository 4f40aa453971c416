//! Stateful services: handles, capability tables and built-in kinds

pub mod builtin;
pub mod capability;
pub mod handle;

pub use capability::{CallError, Callable, Candidate, CapabilityTable, NativeValue, ParamType};
pub use handle::{HandleAddress, ServiceHandle};
