//! Request-scoped execution state

use crate::service::ServiceHandle;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A value bound to a variable during one run
#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    /// Literal or structured value, already in wire form
    Json(Value),
    /// Handle to an instance created on this host
    Handle(ServiceHandle),
}

impl StateValue {
    /// Wire form: handles become their `host/kind/id` address
    pub fn to_wire(&self, host: &str) -> Value {
        match self {
            StateValue::Json(value) => value.clone(),
            StateValue::Handle(handle) => Value::String(handle.address(host).to_string()),
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        StateValue::Json(value)
    }
}

/// Variable name to value, scoped to one request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionState {
    values: HashMap<String, StateValue>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from wire inputs
    pub fn from_inputs(inputs: &Map<String, Value>) -> Self {
        Self {
            values: inputs
                .iter()
                .map(|(k, v)| (k.clone(), StateValue::Json(v.clone())))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The whole state in wire form, safe to send to another host
    pub fn to_wire(&self, host: &str) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_wire(host)))
            .collect()
    }
}

impl From<ServiceHandle> for StateValue {
    fn from(handle: ServiceHandle) -> Self {
        StateValue::Handle(handle)
    }
}
