//! HTTP client dispatching invocations and compositions to hosts

use crate::composition::{Composition, Invocation};
use crate::engine::{route_of, CompositionForwarder, CompositionResult, Route};
use crate::error::{ChoreoError, Result};
use crate::http::messages::{request_target, InvocationForm, ERROR_HEADER};
use crate::resolver::ExecutionState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use slog::{debug, warn, Logger};
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for sending invocations to peers
pub struct HttpDispatcher {
    client: reqwest::Client,
    logger: Logger,
}

impl HttpDispatcher {
    pub fn new(logger: Logger) -> Result<Self> {
        Self::with_timeout(Some(DEFAULT_TIMEOUT), logger)
    }

    /// Client whose requests give up after `timeout`; `None` waits forever
    pub fn with_timeout(timeout: Option<Duration>, logger: Logger) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChoreoError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, logger })
    }

    /// Send `target` to its host
    ///
    /// The composition travels along, with `cursor` pointing at the target,
    /// when the composition carries the target at that position.
    pub async fn invoke(
        &self,
        target: &Invocation,
        composition: &Composition,
        cursor: usize,
        inputs: &Map<String, Value>,
    ) -> Result<CompositionResult> {
        let route = route_of(target, &ExecutionState::from_inputs(inputs));
        let operation = match route {
            Route::Remote(operation) => operation,
            Route::Unroutable(name) => return Err(ChoreoError::Unroutable(name)),
        };
        let carried = composition.get(cursor) == Some(target);
        self.post(&operation, carried.then_some((composition, cursor)), inputs)
            .await
    }

    /// Call a single operation (`host/kind::__construct`,
    /// `host/kind/id::member`) with positional inputs `i1..iN`; the result
    /// is under `out`
    pub async fn call_operation(&self, operation: &str, inputs: Vec<Value>) -> Result<CompositionResult> {
        let inputs: Map<String, Value> = inputs
            .into_iter()
            .enumerate()
            .map(|(i, value)| (format!("i{}", i + 1), value))
            .collect();
        self.post(operation, None, &inputs).await
    }

    /// Run a whole composition from its first invocation
    ///
    /// Every variable an invocation reads must be an input or the output of
    /// an earlier invocation.
    pub async fn run_composition(
        &self,
        composition: &Composition,
        inputs: &Map<String, Value>,
    ) -> Result<CompositionResult> {
        check_variables(composition, inputs)?;
        match composition.get(0) {
            Some(first) => self.invoke(first, composition, 0, inputs).await,
            None => Ok(CompositionResult::default()),
        }
    }

    async fn post(
        &self,
        operation: &str,
        composition: Option<(&Composition, usize)>,
        inputs: &Map<String, Value>,
    ) -> Result<CompositionResult> {
        let (host, path) = request_target(operation)?;
        let url = format!("http://{}{}", host, path);

        let form = InvocationForm {
            inputs: inputs.clone(),
            composition: composition.map(|(c, _)| crate::composition::encode(c)),
            cursor: composition.map(|(_, cursor)| cursor.to_string()),
        };

        debug!(self.logger, "Sending HTTP POST request";
            "url" => &url,
            "inputs" => inputs.len(),
            "cursor" => form.cursor.as_deref().unwrap_or("-")
        );

        let response = self
            .client
            .post(&url)
            .form(&form.to_pairs())
            .send()
            .await
            .map_err(|e| {
                warn!(self.logger, "HTTP request failed"; "error" => %e, "url" => &url);
                ChoreoError::Transport(format!("HTTP request to {} failed: {}", url, e))
            })?;

        if !response.status().is_success() {
            warn!(self.logger, "HTTP request returned error status";
                "status" => response.status().as_u16(),
                "url" => &url
            );
            return Err(ChoreoError::Transport(format!(
                "HTTP request to {} returned status {}",
                url,
                response.status()
            )));
        }

        let error = response
            .headers()
            .get(ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| ChoreoError::Transport(format!("failed to read response from {}: {}", url, e)))?;

        let values = parse_result_body(&body)?;
        debug!(self.logger, "HTTP invocation answered"; "url" => &url, "values" => values.len());
        Ok(CompositionResult { values, error })
    }
}

#[async_trait]
impl CompositionForwarder for HttpDispatcher {
    async fn forward(
        &self,
        operation: &str,
        composition: &Composition,
        cursor: usize,
        inputs: &Map<String, Value>,
    ) -> Result<CompositionResult> {
        self.post(operation, Some((composition, cursor)), inputs).await
    }
}

/// The body must be a flat JSON object
pub fn parse_result_body(body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ChoreoError::MalformedResponse(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(ChoreoError::MalformedResponse(e.to_string())),
    }
}

/// Every variable read must be an input or produced earlier
fn check_variables(composition: &Composition, inputs: &Map<String, Value>) -> Result<()> {
    let mut known: HashSet<&str> = inputs.keys().map(String::as_str).collect();
    for invocation in composition {
        if let Some(missing) = invocation.variables_read().into_iter().find(|v| !known.contains(v)) {
            return Err(ChoreoError::MissingVariable(missing.to_string()));
        }
        known.extend(invocation.outputs().map(|(_, variable)| variable));
    }
    Ok(())
}
