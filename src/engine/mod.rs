//! Distributed execution engine
//!
//! Handles one request: runs the local window of the composition, forwards
//! the rest to the next host and answers with every variable produced along
//! the way. Failures never change the shape of the answer; they abort the
//! window, skip forwarding and are reported next to the partial result.

pub mod window;

pub use window::{route_of, scan, Route, Window};

use crate::composition::Composition;
use crate::error::{ChoreoError, Result};
use crate::marshal::type_of;
use crate::resolver::{ExecutionState, Resolver};
use async_trait::async_trait;
use serde_json::{Map, Value};
use slog::{debug, error, info, Logger};
use std::sync::Arc;

/// Flat map of produced variables, plus the first failure on the chain
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositionResult {
    pub values: Map<String, Value>,
    pub error: Option<String>,
}

impl CompositionResult {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends the remainder of a composition to the host that runs it next
#[async_trait]
pub trait CompositionForwarder: Send + Sync {
    /// Dispatch `composition` from `cursor` on to the host named in `operation`
    async fn forward(
        &self,
        operation: &str,
        composition: &Composition,
        cursor: usize,
        inputs: &Map<String, Value>,
    ) -> Result<CompositionResult>;
}

/// A parsed request: a composition, its cursor and the wire inputs
#[derive(Clone, Debug)]
pub struct EngineRequest {
    pub composition: Composition,
    pub cursor: usize,
    pub inputs: Map<String, Value>,
}

pub struct ExecutionEngine {
    /// Address this host is known by; the host part of every local handle
    host: String,
    resolver: Resolver,
    forwarder: Arc<dyn CompositionForwarder>,
    logger: Logger,
}

impl ExecutionEngine {
    pub fn new(
        host: impl Into<String>,
        resolver: Resolver,
        forwarder: Arc<dyn CompositionForwarder>,
        logger: Logger,
    ) -> Self {
        Self {
            host: host.into(),
            resolver,
            forwarder,
            logger,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Run the local window, forward the remainder and build the answer
    pub async fn handle(&self, request: EngineRequest) -> CompositionResult {
        let EngineRequest {
            composition,
            cursor,
            inputs,
        } = request;

        if let Err(e) = self.validate_inputs(&inputs) {
            error!(self.logger, "Rejected request inputs"; "error" => %e);
            return CompositionResult {
                values: Map::new(),
                error: Some(e.to_string()),
            };
        }

        let mut state = ExecutionState::from_inputs(&inputs);
        let window = scan(&composition, cursor, &self.host, &state);
        info!(self.logger, "Executing local window";
            "start" => window.start,
            "end" => window.end,
            "total" => composition.len()
        );

        let mut failure = None;
        for invocation in composition.iter().skip(window.start).take(window.len()) {
            debug!(self.logger, "Executing invocation"; "invocation" => %invocation);
            if let Err(e) = self.resolver.execute(invocation, &mut state).await {
                error!(self.logger, "Invocation failed";
                    "operation" => invocation.operation().name(),
                    "error" => %e
                );
                failure = Some(e.to_string());
                break;
            }
        }

        let mut remote = Map::new();
        if failure.is_none() {
            if let Some(route) = &window.next {
                match self.forward(route, &composition, window.end, &state).await {
                    Ok(result) => {
                        remote = result.values;
                        failure = result.error;
                    }
                    Err(e) => {
                        error!(self.logger, "Forwarding failed"; "error" => %e);
                        failure = Some(e.to_string());
                    }
                }
            }
        }

        let mut values: Map<String, Value> = state
            .iter()
            .filter(|(name, _)| !inputs.contains_key(*name))
            .map(|(name, value)| (name.to_string(), value.to_wire(&self.host)))
            .collect();
        values.extend(remote);

        CompositionResult {
            values,
            error: failure,
        }
    }

    async fn forward(
        &self,
        route: &Route,
        composition: &Composition,
        cursor: usize,
        state: &ExecutionState,
    ) -> Result<CompositionResult> {
        let operation = match route {
            Route::Remote(operation) => operation,
            Route::Unroutable(name) => return Err(ChoreoError::Unroutable(name.clone())),
        };
        info!(self.logger, "Forwarding composition";
            "target" => operation,
            "cursor" => cursor
        );
        let inputs = state.to_wire(&self.host);
        self.forwarder.forward(operation, composition, cursor, &inputs).await
    }

    /// Structured inputs must declare a type known to the marshaller
    fn validate_inputs(&self, inputs: &Map<String, Value>) -> Result<()> {
        for (name, value) in inputs {
            if !value.is_object() {
                continue;
            }
            let known = type_of(value).is_some_and(|t| self.resolver.marshaller().is_known_type(t));
            if !known {
                return Err(ChoreoError::InvalidInput {
                    name: name.clone(),
                    reason: match type_of(value) {
                        Some(t) => format!("ontological type '{}' is not known", t),
                        None => "structured value has no type attribute".to_string(),
                    },
                });
            }
        }
        Ok(())
    }
}
