//! Capability table: the callables each service kind offers
//!
//! Every callable is registered up front with its parameter signature, so the
//! resolver can bind invocations without any runtime type introspection.
//! Instances are kept as serialized records; a method callable decodes the
//! record, runs against the typed state and encodes it again.

use crate::composition::CONSTRUCTOR;
use crate::error::ServiceError;
use crate::marshal::NativeObject;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared type of a callable parameter
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    Int,
    Float,
    Str,
    /// A non-primitive class converted through the marshaller
    Class(String),
}

impl ParamType {
    pub fn class(name: impl Into<String>) -> Self {
        ParamType::Class(name.into())
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, ParamType::Class(_))
    }

    pub fn name(&self) -> &str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "double",
            ParamType::Str => "String",
            ParamType::Class(name) => name,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value as seen by service code
#[derive(Debug)]
pub enum NativeValue {
    Unit,
    Int(i64),
    Float(f64),
    Str(String),
    Object(NativeObject),
}

impl NativeValue {
    pub fn as_int(&self) -> Result<i64, ServiceError> {
        match self {
            NativeValue::Int(v) => Ok(*v),
            other => Err(ServiceError::new(format!("expected int, got {:?}", other))),
        }
    }

    pub fn as_float(&self) -> Result<f64, ServiceError> {
        match self {
            NativeValue::Float(v) => Ok(*v),
            NativeValue::Int(v) => Ok(*v as f64),
            other => Err(ServiceError::new(format!("expected double, got {:?}", other))),
        }
    }

    pub fn as_str(&self) -> Result<&str, ServiceError> {
        match self {
            NativeValue::Str(v) => Ok(v),
            other => Err(ServiceError::new(format!("expected String, got {:?}", other))),
        }
    }

    /// Mutable access to a native object of type `T`
    pub fn object_mut<T: 'static>(&mut self) -> Result<&mut T, ServiceError> {
        match self {
            NativeValue::Object(object) => {
                let class = object.class().to_string();
                object
                    .downcast_mut::<T>()
                    .ok_or_else(|| ServiceError::new(format!("unexpected object of class {}", class)))
            }
            other => Err(ServiceError::new(format!("expected an object, got {:?}", other))),
        }
    }
}

/// Why an erased callable failed
#[derive(Debug)]
pub enum CallError {
    /// The stored record could not be decoded or encoded
    Record(String),
    /// The service itself reported a failure
    Service(ServiceError),
}

impl From<ServiceError> for CallError {
    fn from(e: ServiceError) -> Self {
        CallError::Service(e)
    }
}

type ConstructFn = dyn Fn(&mut [NativeValue]) -> Result<Vec<u8>, CallError> + Send + Sync;
type MethodFn = dyn Fn(&mut Vec<u8>, &mut [NativeValue]) -> Result<NativeValue, CallError> + Send + Sync;

/// A type-erased constructor or method
#[derive(Clone)]
pub enum Callable {
    /// Builds a new instance record from the arguments
    Constructor(Arc<ConstructFn>),
    /// Runs against an instance record, updating it in place
    Method(Arc<MethodFn>),
}

/// One registered signature of a member
#[derive(Clone)]
pub struct Candidate {
    params: Vec<ParamType>,
    callable: Callable,
}

impl Candidate {
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params.iter().map(ParamType::name).collect();
        write!(f, "Candidate({})", params.join(", "))
    }
}

/// Map from (kind, member) to the candidate signatures, in registration order
#[derive(Clone, Default)]
pub struct CapabilityTable {
    members: HashMap<(String, String), Vec<Candidate>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `kind`
    pub fn constructor<S, F>(&mut self, kind: &str, params: Vec<ParamType>, construct: F) -> &mut Self
    where
        S: Serialize,
        F: Fn(&mut [NativeValue]) -> Result<S, ServiceError> + Send + Sync + 'static,
    {
        let callable = Callable::Constructor(Arc::new(move |args: &mut [NativeValue]| {
            let instance = construct(args)?;
            serde_json::to_vec(&instance).map_err(|e| CallError::Record(e.to_string()))
        }));
        self.insert(kind, CONSTRUCTOR, params, callable)
    }

    /// Register a method of `kind`
    pub fn method<S, F>(&mut self, kind: &str, member: &str, params: Vec<ParamType>, method: F) -> &mut Self
    where
        S: Serialize + DeserializeOwned,
        F: Fn(&mut S, &mut [NativeValue]) -> Result<NativeValue, ServiceError> + Send + Sync + 'static,
    {
        let callable = Callable::Method(Arc::new(move |record: &mut Vec<u8>, args: &mut [NativeValue]| {
            let mut instance: S =
                serde_json::from_slice(record).map_err(|e| CallError::Record(e.to_string()))?;
            let result = method(&mut instance, args)?;
            *record = serde_json::to_vec(&instance).map_err(|e| CallError::Record(e.to_string()))?;
            Ok(result)
        }));
        self.insert(kind, member, params, callable)
    }

    fn insert(&mut self, kind: &str, member: &str, params: Vec<ParamType>, callable: Callable) -> &mut Self {
        self.members
            .entry((kind.to_string(), member.to_string()))
            .or_default()
            .push(Candidate { params, callable });
        self
    }

    /// Candidates for a member, in registration order
    pub fn candidates(&self, kind: &str, member: &str) -> &[Candidate] {
        self.members
            .get(&(kind.to_string(), member.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the kind has any registered member
    pub fn knows_kind(&self, kind: &str) -> bool {
        self.members.keys().any(|(k, _)| k == kind)
    }

    pub fn len(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
