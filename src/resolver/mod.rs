//! Invocation resolver
//!
//! Binds an abstract invocation to a concrete callable of the capability
//! table and executes it against the object store:
//!
//! 1. Determine the service kind (and instance, for methods) the invocation
//!    addresses.
//! 2. Reject the operation if the registry does not support it.
//! 3. Classify every argument token into a typed value.
//! 4. Pick the first candidate whose arity and parameter types fit.
//! 5. Call it and bind the declared outputs according to the result mapping.

pub mod state;

pub use state::{ExecutionState, StateValue};

use crate::composition::{ArgToken, Invocation, Target};
use crate::error::{ChoreoError, Result};
use crate::marshal::{type_of, TypeMarshaller};
use crate::registry::{OperationRegistry, Provenance};
use crate::service::{
    CallError, Callable, CapabilityTable, HandleAddress, NativeValue, ParamType, ServiceHandle,
};
use crate::store::{InstanceLocks, ObjectStore};
use serde_json::Value;
use slog::{debug, info, Logger};
use std::fmt;
use std::sync::Arc;

/// An argument after classification
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedArg {
    Int(i64),
    Float(f64),
    Str(String),
    /// JSON value whose type name comes from its `type` field
    Structured { type_name: String, value: Value },
    /// A local service handle; no callable accepts one as an argument
    Handle(ServiceHandle),
}

impl ResolvedArg {
    fn type_name(&self) -> &str {
        match self {
            ResolvedArg::Int(_) => "int",
            ResolvedArg::Float(_) => "double",
            ResolvedArg::Str(_) => "String",
            ResolvedArg::Structured { type_name, .. } => type_name,
            ResolvedArg::Handle(_) => "handle",
        }
    }
}

impl fmt::Display for ResolvedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Result of binding an invocation to a callable
#[derive(Clone, Debug, PartialEq)]
pub struct BoundCall {
    /// `<kind>::<member>`, the registry name of the operation
    pub operation: String,
    pub kind: String,
    pub member: String,
    /// Instance the method runs on; `None` for constructors
    pub instance: Option<ServiceHandle>,
    /// Position of the selected candidate in the capability table
    pub candidate: usize,
    pub arguments: Vec<ResolvedArg>,
}

/// Resolves and executes invocations on this host
pub struct Resolver {
    registry: Arc<OperationRegistry>,
    capabilities: Arc<CapabilityTable>,
    marshaller: Arc<dyn TypeMarshaller>,
    store: Arc<dyn ObjectStore>,
    locks: InstanceLocks,
    logger: Logger,
}

impl Resolver {
    pub fn new(
        registry: Arc<OperationRegistry>,
        capabilities: Arc<CapabilityTable>,
        marshaller: Arc<dyn TypeMarshaller>,
        store: Arc<dyn ObjectStore>,
        logger: Logger,
    ) -> Self {
        Self {
            registry,
            capabilities,
            marshaller,
            store,
            locks: InstanceLocks::new(),
            logger,
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn marshaller(&self) -> &dyn TypeMarshaller {
        self.marshaller.as_ref()
    }

    /// Bind an invocation to a callable without running it
    pub fn resolve(&self, invocation: &Invocation, state: &ExecutionState) -> Result<BoundCall> {
        let (kind, instance) = self.addressed_service(invocation.target(), state)?;
        let member = invocation.target().member().to_string();
        let operation = format!("{}::{}", kind, member);

        if !self.registry.is_supported(&operation) {
            return Err(ChoreoError::UnsupportedOperation(operation));
        }

        let arguments = invocation
            .arguments()
            .map(|(_, token)| self.classify(token, state))
            .collect::<Result<Vec<_>>>()?;

        let candidate = self
            .capabilities
            .candidates(&kind, &member)
            .iter()
            .position(|c| {
                c.arity() == arguments.len()
                    && c.params()
                        .iter()
                        .zip(&arguments)
                        .all(|(param, arg)| self.is_compatible(param, arg))
            })
            .ok_or_else(|| ChoreoError::NoMatchingOperation {
                operation: operation.clone(),
                arguments: arguments
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        Ok(BoundCall {
            operation,
            kind,
            member,
            instance,
            candidate,
            arguments,
        })
    }

    /// Resolve and run an invocation, storing its outputs in `state`
    ///
    /// The state is only modified when the call and every output conversion
    /// succeed.
    pub async fn execute(&self, invocation: &Invocation, state: &mut ExecutionState) -> Result<()> {
        let call = self.resolve(invocation, state)?;
        let candidate = &self.capabilities.candidates(&call.kind, &call.member)[call.candidate];

        let mut args = call
            .arguments
            .iter()
            .zip(candidate.params())
            .map(|(arg, param)| self.to_native(arg, param))
            .collect::<Result<Vec<_>>>()?;

        debug!(self.logger, "Invoking operation";
            "operation" => &call.operation,
            "arguments" => call.arguments.len()
        );

        let returned = match (candidate.callable(), &call.instance) {
            (Callable::Constructor(construct), None) => {
                let record = construct(&mut args).map_err(|e| call_error(&call, e))?;
                let handle = ServiceHandle::generate(&call.kind);
                self.store.put(handle.kind(), handle.id(), record).await?;
                info!(self.logger, "Created service instance";
                    "kind" => handle.kind(),
                    "id" => handle.id()
                );
                StateValue::Handle(handle)
            }
            (Callable::Method(method), Some(handle)) => {
                // Unknown ids never get a lock entry
                self.load(handle).await?;
                let _guard = self.locks.acquire(handle.kind(), handle.id()).await;
                let mut record = self.load(handle).await?;
                let result = method(&mut record, &mut args).map_err(|e| call_error(&call, e))?;
                self.store.put(handle.kind(), handle.id(), record).await?;
                StateValue::Json(self.to_wire(result)?)
            }
            _ => {
                return Err(ChoreoError::Service {
                    operation: call.operation.clone(),
                    message: "callable does not fit the addressed target".to_string(),
                })
            }
        };

        let produced = self.bind_outputs(invocation, &call, returned, args)?;
        for (variable, value) in produced {
            state.insert(variable, value);
        }
        Ok(())
    }

    async fn load(&self, handle: &ServiceHandle) -> Result<Vec<u8>> {
        self.store
            .get(handle.kind(), handle.id())
            .await?
            .ok_or_else(|| ChoreoError::StoreCorruption {
                kind: handle.kind().to_string(),
                id: handle.id().to_string(),
                reason: "no such instance".to_string(),
            })
    }

    fn addressed_service(
        &self,
        target: &Target,
        state: &ExecutionState,
    ) -> Result<(String, Option<ServiceHandle>)> {
        match target {
            Target::Construct { kind, .. } => Ok((kind.clone(), None)),
            Target::Instance { kind, id, .. } => {
                Ok((kind.clone(), Some(ServiceHandle::new(kind.as_str(), id.as_str()))))
            }
            Target::Bound { variable, .. } => match state.get(variable) {
                Some(StateValue::Handle(handle)) => Ok((handle.kind().to_string(), Some(handle.clone()))),
                Some(StateValue::Json(Value::String(text))) => HandleAddress::parse(text)
                    .map(|address| (address.handle.kind().to_string(), Some(address.handle)))
                    .ok_or_else(|| not_a_service(variable)),
                Some(_) => Err(not_a_service(variable)),
                None => Err(ChoreoError::MissingVariable(variable.clone())),
            },
        }
    }

    fn classify(&self, token: &ArgToken, state: &ExecutionState) -> Result<ResolvedArg> {
        match token {
            ArgToken::Number(raw) => Ok(parse_number(raw)),
            ArgToken::Text(text) => Ok(ResolvedArg::Str(text.clone())),
            ArgToken::Variable(name) => match state.get(name) {
                None => Err(ChoreoError::MissingVariable(name.clone())),
                Some(StateValue::Handle(handle)) => Ok(ResolvedArg::Handle(handle.clone())),
                Some(StateValue::Json(value)) => Ok(match value {
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => ResolvedArg::Int(i),
                        None => ResolvedArg::Float(n.as_f64().unwrap_or(f64::NAN)),
                    },
                    Value::String(s) => ResolvedArg::Str(s.clone()),
                    other => ResolvedArg::Structured {
                        type_name: type_of(other).unwrap_or_default().to_string(),
                        value: other.clone(),
                    },
                }),
            },
        }
    }

    fn is_compatible(&self, param: &ParamType, arg: &ResolvedArg) -> bool {
        match (param, arg) {
            (ParamType::Int, ResolvedArg::Int(_))
            | (ParamType::Float, ResolvedArg::Float(_))
            | (ParamType::Str, ResolvedArg::Str(_)) => true,
            (ParamType::Class(class), ResolvedArg::Structured { .. }) => {
                self.marshaller.has_mapping_for_class(class)
            }
            _ => false,
        }
    }

    fn to_native(&self, arg: &ResolvedArg, param: &ParamType) -> Result<NativeValue> {
        Ok(match (arg, param) {
            (ResolvedArg::Int(v), _) => NativeValue::Int(*v),
            (ResolvedArg::Float(v), _) => NativeValue::Float(*v),
            (ResolvedArg::Str(v), _) => NativeValue::Str(v.clone()),
            (ResolvedArg::Structured { value, .. }, ParamType::Class(class)) => {
                NativeValue::Object(self.marshaller.to_native(value, class)?)
            }
            (other, param) => {
                return Err(ChoreoError::Marshalling(format!(
                    "cannot pass {} as {}",
                    other, param
                )))
            }
        })
    }

    fn to_wire(&self, value: NativeValue) -> Result<Value> {
        Ok(match value {
            NativeValue::Unit => Value::Null,
            NativeValue::Int(v) => Value::from(v),
            NativeValue::Float(v) => serde_json::Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            NativeValue::Str(v) => Value::String(v),
            NativeValue::Object(object) => self.marshaller.to_structured(&object)?,
        })
    }

    /// Pair each bound output variable with its value per the result mapping
    ///
    /// A constructor without an explicit mapping binds its handle to the first
    /// output variable, whatever the formal output is called.
    fn bind_outputs(
        &self,
        invocation: &Invocation,
        call: &BoundCall,
        returned: StateValue,
        args: Vec<NativeValue>,
    ) -> Result<Vec<(String, StateValue)>> {
        if call.instance.is_none() && !self.registry.has_explicit_mapping(&call.operation) {
            return Ok(invocation
                .outputs()
                .next()
                .map(|(_, variable)| (variable.to_string(), returned))
                .into_iter()
                .collect());
        }

        let mapping = self.registry.provenance_of(&call.operation);
        let mut args: Vec<Option<NativeValue>> = args.into_iter().map(Some).collect();
        let mut produced = Vec::new();

        for (formal, variable) in invocation.outputs() {
            let value = match mapping.get(formal) {
                Some(Provenance::Return) => returned.clone(),
                Some(Provenance::Input(n)) => {
                    let arg = args.get_mut(n - 1).and_then(Option::take).ok_or_else(|| {
                        ChoreoError::Service {
                            operation: call.operation.clone(),
                            message: format!("output '{}' maps to missing input i{}", formal, n),
                        }
                    })?;
                    StateValue::Json(self.to_wire(arg)?)
                }
                None => {
                    debug!(self.logger, "Output not produced by operation";
                        "operation" => &call.operation,
                        "output" => formal
                    );
                    continue;
                }
            };
            produced.push((variable.to_string(), value));
        }
        Ok(produced)
    }
}

fn parse_number(raw: &str) -> ResolvedArg {
    match raw.parse::<i64>() {
        Ok(i) => ResolvedArg::Int(i),
        Err(_) => ResolvedArg::Float(raw.parse::<f64>().unwrap_or(f64::NAN)),
    }
}

fn not_a_service(variable: &str) -> ChoreoError {
    ChoreoError::InvalidInput {
        name: variable.to_string(),
        reason: "does not hold a service handle".to_string(),
    }
}

fn call_error(call: &BoundCall, error: CallError) -> ChoreoError {
    match error {
        CallError::Record(reason) => match &call.instance {
            Some(handle) => ChoreoError::StoreCorruption {
                kind: handle.kind().to_string(),
                id: handle.id().to_string(),
                reason,
            },
            None => ChoreoError::Service {
                operation: call.operation.clone(),
                message: reason,
            },
        },
        CallError::Service(e) => ChoreoError::Service {
            operation: call.operation.clone(),
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::builtin::{self, TextList, TEXT_LIST_CLASS};
    use crate::store::MemoryObjectStore;
    use serde_json::json;
    use slog::{o, Discard};

    fn resolver_with(store: Arc<MemoryObjectStore>) -> Resolver {
        let logger = Logger::root(Discard, o!());
        Resolver::new(
            Arc::new(OperationRegistry::from_feed(builtin::OPERATIONS, &logger)),
            Arc::new(builtin::capabilities()),
            Arc::new(builtin::types()),
            store,
            logger,
        )
    }

    fn resolver() -> Resolver {
        resolver_with(Arc::new(MemoryObjectStore::new()))
    }

    fn construct(kind: &str, var: &str) -> Invocation {
        Invocation::builder(format!("{}::__construct", kind))
            .output("out", var)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_construct_then_call_bound_variable() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = resolver_with(store.clone());
        let mut state = ExecutionState::new();

        resolver.execute(&construct("util.Scaler", "s"), &mut state).await.unwrap();
        let Some(StateValue::Handle(handle)) = state.get("s").cloned() else {
            panic!("expected a handle");
        };
        assert_eq!(handle.kind(), "util.Scaler");
        assert_eq!(store.len().await, 1);

        let transform = Invocation::builder("s::transform")
            .input("x", "5")
            .output("out", "y")
            .build()
            .unwrap();
        resolver.execute(&transform, &mut state).await.unwrap();
        assert_eq!(state.get("y"), Some(&StateValue::Json(json!(10))));

        let transform = Invocation::builder("s::transform")
            .input("x", "1.5")
            .output("out", "z")
            .build()
            .unwrap();
        resolver.execute(&transform, &mut state).await.unwrap();
        assert_eq!(state.get("z"), Some(&StateValue::Json(json!(3.0))));
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let resolver = resolver();
        let mut state = ExecutionState::new();
        state.insert("n", json!(4));
        resolver.execute(&construct("util.Counter", "c"), &mut state).await.unwrap();

        let add = Invocation::builder("c::add").input("i1", "n").output("out", "t").build().unwrap();
        let first = resolver.resolve(&add, &state).unwrap();
        let second = resolver.resolve(&add, &state).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.operation, "util.Counter::add");
        assert_eq!(first.arguments, vec![ResolvedArg::Int(4)]);
    }

    #[tokio::test]
    async fn test_constructor_overload_by_arity() {
        let resolver = resolver();
        let state = ExecutionState::new();
        let with_start = Invocation::builder("util.Counter::__construct")
            .input("start", "7")
            .output("out", "c")
            .build()
            .unwrap();
        assert_eq!(resolver.resolve(&with_start, &state).unwrap().candidate, 1);
        assert_eq!(resolver.resolve(&construct("util.Counter", "c"), &state).unwrap().candidate, 0);
    }

    #[tokio::test]
    async fn test_return_provenance_and_mutated_input() {
        let resolver = resolver();
        let types = builtin::types();
        let mut state = ExecutionState::new();
        state.insert(
            "list",
            types
                .structured(TEXT_LIST_CLASS, &TextList { items: vec!["a".into()] })
                .unwrap(),
        );
        resolver.execute(&construct("util.Buffer", "b"), &mut state).await.unwrap();

        let append = Invocation::builder("b::append")
            .input("i1", "list")
            .input("i2", "\"b\"")
            .output("out", "appended")
            .output("count", "n")
            .build()
            .unwrap();
        resolver.execute(&append, &mut state).await.unwrap();

        assert_eq!(state.get("n"), Some(&StateValue::Json(json!(1))));
        let Some(StateValue::Json(appended)) = state.get("appended") else {
            panic!("expected structured output");
        };
        assert_eq!(appended["type"], json!("onto:TextList"));
        assert_eq!(appended["data"]["items"], json!(["a", "b"]));
        // the input variable itself is untouched
        let Some(StateValue::Json(original)) = state.get("list") else {
            panic!("expected structured input");
        };
        assert_eq!(original["data"]["items"], json!(["a"]));
    }

    #[tokio::test]
    async fn test_second_argument_provenance() {
        let resolver = resolver();
        let types = builtin::types();
        let mut state = ExecutionState::new();
        state.insert(
            "list",
            types
                .structured(TEXT_LIST_CLASS, &TextList { items: vec!["b".into()] })
                .unwrap(),
        );
        resolver.execute(&construct("util.Buffer", "buf"), &mut state).await.unwrap();

        let prepend = Invocation::builder("buf::prepend")
            .input("i1", "\"a\"")
            .input("i2", "list")
            .output("out", "count")
            .output("out2", "tagged")
            .build()
            .unwrap();
        resolver.execute(&prepend, &mut state).await.unwrap();

        assert_eq!(state.get("count"), Some(&StateValue::Json(json!(1))));
        let Some(StateValue::Json(tagged)) = state.get("tagged") else {
            panic!("expected structured output");
        };
        assert_eq!(tagged["type"], json!("onto:TextList"));
        assert_eq!(tagged["data"]["items"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_constructor_binds_any_output_name() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = resolver_with(store.clone());
        let mut state = ExecutionState::new();

        let create = Invocation::builder("h1/util.Scaler::__construct")
            .output("instance", "s")
            .build()
            .unwrap();
        resolver.execute(&create, &mut state).await.unwrap();
        let Some(StateValue::Handle(handle)) = state.get("s").cloned() else {
            panic!("expected a handle");
        };
        assert_eq!(handle.kind(), "util.Scaler");
        assert_eq!(store.len().await, 1);

        let transform = Invocation::builder("s::transform")
            .input("x", "5")
            .output("out", "y")
            .build()
            .unwrap();
        resolver.execute(&transform, &mut state).await.unwrap();
        assert_eq!(state.get("y"), Some(&StateValue::Json(json!(10))));
    }

    #[tokio::test]
    async fn test_unknown_instances_take_no_lock_entry() {
        let resolver = resolver();
        let mut state = ExecutionState::new();
        for n in 0..50 {
            let add = Invocation::builder(format!("h1/util.Counter/bogus{}::add", n))
                .input("i1", "1")
                .build()
                .unwrap();
            assert!(matches!(
                resolver.execute(&add, &mut state).await,
                Err(ChoreoError::StoreCorruption { .. })
            ));
        }
        assert!(resolver.locks.is_empty());

        resolver.execute(&construct("util.Counter", "c"), &mut state).await.unwrap();
        let add = Invocation::builder("c::add").input("i1", "1").build().unwrap();
        resolver.execute(&add, &mut state).await.unwrap();
        assert!(resolver.locks.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_operation_leaves_state_unchanged() {
        let resolver = resolver();
        let mut state = ExecutionState::new();
        state.insert("x", json!(1));
        let before = state.clone();

        let unknown = Invocation::builder("util.Shredder::__construct")
            .output("out", "s")
            .build()
            .unwrap();
        let err = resolver.execute(&unknown, &mut state).await.unwrap_err();
        assert_eq!(err, ChoreoError::UnsupportedOperation("util.Shredder::__construct".into()));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_unsupported_is_checked_before_arguments() {
        let resolver = resolver();
        let mut state = ExecutionState::new();
        state.insert("c", ServiceHandle::new("util.Counter", "k1"));
        let reset = Invocation::builder("c::reset").input("i1", "missing").build().unwrap();
        assert!(matches!(
            resolver.resolve(&reset, &state),
            Err(ChoreoError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_no_matching_operation() {
        let resolver = resolver();
        let mut state = ExecutionState::new();
        resolver.execute(&construct("util.Counter", "c"), &mut state).await.unwrap();
        let before = state.clone();

        let add = Invocation::builder("c::add")
            .input("i1", "\"five\"")
            .output("out", "t")
            .build()
            .unwrap();
        let err = resolver.execute(&add, &mut state).await.unwrap_err();
        assert!(matches!(err, ChoreoError::NoMatchingOperation { ref arguments, .. } if arguments == "String"));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_missing_variable() {
        let resolver = resolver();
        let mut state = ExecutionState::new();
        resolver.execute(&construct("util.Counter", "c"), &mut state).await.unwrap();

        let add = Invocation::builder("c::add").input("i1", "nope").build().unwrap();
        assert_eq!(
            resolver.execute(&add, &mut state).await.unwrap_err(),
            ChoreoError::MissingVariable("nope".into())
        );

        let orphan = Invocation::builder("ghost::add").input("i1", "1").build().unwrap();
        assert_eq!(
            resolver.resolve(&orphan, &state).unwrap_err(),
            ChoreoError::MissingVariable("ghost".into())
        );
    }

    #[tokio::test]
    async fn test_instance_method_persists_state() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = resolver_with(store.clone());
        let mut state = ExecutionState::new();
        resolver.execute(&construct("util.Counter", "c"), &mut state).await.unwrap();
        let Some(StateValue::Handle(handle)) = state.get("c").cloned() else {
            panic!("expected a handle");
        };

        let add = Invocation::builder(handle.address("h1").operation_name("add"))
            .input("i1", "3")
            .output("out", "t")
            .build()
            .unwrap();
        resolver.execute(&add, &mut state).await.unwrap();
        resolver.execute(&add, &mut state).await.unwrap();
        assert_eq!(state.get("t"), Some(&StateValue::Json(json!(6))));

        let stored = store.get(handle.kind(), handle.id()).await.unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&stored).unwrap(), json!({"total": 6}));
    }

    #[tokio::test]
    async fn test_missing_instance_is_store_corruption() {
        let resolver = resolver();
        let mut state = ExecutionState::new();
        let add = Invocation::builder("h1/util.Counter/nope::add").input("i1", "1").build().unwrap();
        assert!(matches!(
            resolver.execute(&add, &mut state).await,
            Err(ChoreoError::StoreCorruption { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let resolver = Arc::new(resolver());
        let mut state = ExecutionState::new();
        resolver.execute(&construct("util.Counter", "c"), &mut state).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let resolver = resolver.clone();
            let mut state = state.clone();
            tasks.push(tokio::spawn(async move {
                let add = Invocation::builder("c::add").input("i1", "1").build().unwrap();
                resolver.execute(&add, &mut state).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let total = Invocation::builder("c::total").output("out", "t").build().unwrap();
        resolver.execute(&total, &mut state).await.unwrap();
        assert_eq!(state.get("t"), Some(&StateValue::Json(json!(20))));
    }
}
