//! Wire messages of the composition protocol
//!
//! Requests are form-encoded POSTs to `/<kind>/__construct` or
//! `/<kind>/<id>/<member>` with the fields:
//!
//! - `inputs[<name>]`: one per input, the JSON text of the value
//! - `coreography`: encoded composition (optional)
//! - `currentindex`: cursor into the composition (with `coreography`)
//!
//! Responses are flat JSON objects of produced variables. The first failure
//! on the chain travels in the `x-choreo-error` header.

use crate::composition::{self, ArgToken, Composition, Invocation, Target, CONSTRUCTOR, DEFAULT_OUTPUT};
use crate::engine::EngineRequest;
use crate::error::{ChoreoError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub const COMPOSITION_FIELD: &str = "coreography";
pub const CURSOR_FIELD: &str = "currentindex";
pub const ERROR_HEADER: &str = "x-choreo-error";

const INPUT_PREFIX: &str = "inputs[";
const INPUT_SUFFIX: &str = "]";

/// Decoded request form
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvocationForm {
    pub inputs: Map<String, Value>,
    pub composition: Option<String>,
    pub cursor: Option<String>,
}

impl InvocationForm {
    /// Collect form fields; unknown fields are ignored
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            if let Some(name) = key
                .strip_prefix(INPUT_PREFIX)
                .and_then(|rest| rest.strip_suffix(INPUT_SUFFIX))
            {
                form.inputs.insert(name.to_string(), parse_input_value(&value));
            } else if key == COMPOSITION_FIELD {
                form.composition = Some(value);
            } else if key == CURSOR_FIELD {
                form.cursor = Some(value);
            }
        }
        form
    }

    /// Form fields to send, inputs first
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .inputs
            .iter()
            .map(|(name, value)| {
                (
                    format!("{}{}{}", INPUT_PREFIX, name, INPUT_SUFFIX),
                    encode_input_value(value),
                )
            })
            .collect();
        if let Some(composition) = &self.composition {
            pairs.push((COMPOSITION_FIELD.to_string(), composition.clone()));
            pairs.push((
                CURSOR_FIELD.to_string(),
                self.cursor.clone().unwrap_or_else(|| "0".to_string()),
            ));
        }
        pairs
    }

    /// Turn the form into an engine request for the given request path
    ///
    /// Without a composition, a single invocation on this host is synthesized
    /// from the path.
    pub fn into_request(self, path: &str, host: &str) -> Result<EngineRequest> {
        let (composition, cursor) = match &self.composition {
            Some(text) => {
                let cursor = self.cursor.as_deref().unwrap_or("0");
                composition::decode_with_cursor(text, cursor)?
            }
            None => (
                Composition::new().with(synthesize_invocation(path, host, &self.inputs)?),
                0,
            ),
        };
        Ok(EngineRequest {
            composition,
            cursor,
            inputs: self.inputs,
        })
    }
}

/// Input text is a JSON number, string or object when it parses as one,
/// otherwise the plain string itself
///
/// Literals such as `true`, `null` or `[1]` carry no type name, so they stay
/// text.
pub fn parse_input_value(raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(value @ (Value::Number(_) | Value::String(_) | Value::Object(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

pub fn encode_input_value(value: &Value) -> String {
    value.to_string()
}

/// Operation name (`host/kind::__construct`, `host/kind/id::member`) to the
/// host and the request path serving it
pub fn request_target(operation: &str) -> Result<(String, String)> {
    match Target::parse(operation)? {
        Target::Construct {
            host: Some(host),
            kind,
        } => Ok((host, format!("/{}/{}", kind, CONSTRUCTOR))),
        Target::Instance {
            host,
            kind,
            id,
            member,
        } => Ok((host, format!("/{}/{}/{}", kind, id, member))),
        _ => Err(ChoreoError::Unroutable(operation.to_string())),
    }
}

/// Build the single invocation a request path asks for
///
/// Every input becomes a formal parameter bound to the variable of the same
/// name, in natural order (`i1, i2, ..., i10`), and the result goes to `out`.
pub fn synthesize_invocation(path: &str, host: &str, inputs: &Map<String, Value>) -> Result<Invocation> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let operation = match segments.as_slice() {
        [kind, member] if *member == CONSTRUCTOR && !kind.is_empty() => {
            format!("{}/{}::{}", host, kind, CONSTRUCTOR)
        }
        [kind, id, member] if ![kind, id, member].iter().any(|s| s.is_empty()) => {
            format!("{}/{}/{}::{}", host, kind, id, member)
        }
        _ => return Err(ChoreoError::InvalidPath(path.to_string())),
    };

    let mut names: Vec<&String> = inputs.keys().collect();
    names.sort_by(|a, b| natural_cmp(a, b));

    names
        .into_iter()
        .fold(Invocation::builder(operation), |builder, name| {
            builder.input_token(name.clone(), ArgToken::Variable(name.clone()))
        })
        .output(DEFAULT_OUTPUT, DEFAULT_OUTPUT)
        .build()
        .map_err(|_| ChoreoError::InvalidPath(path.to_string()))
}

/// Compare names by text prefix, then by trailing number
fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn split(s: &str) -> (&str, Option<u64>) {
        let digits = s.len() - s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (prefix, number) = s.split_at(s.len() - digits);
        (prefix, number.parse().ok())
    }
    split(a).cmp(&split(b)).then_with(|| a.cmp(b))
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub address: String,
}
