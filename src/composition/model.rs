//! Value types for operations, invocations and compositions

use crate::error::{ChoreoError, Result};
use std::collections::HashMap;
use std::fmt;

/// Member name that denotes construction of a new service instance
pub const CONSTRUCTOR: &str = "__construct";

/// Default output name used when an operation declares no result mapping
pub const DEFAULT_OUTPUT: &str = "out";

/// Characters that delimit names in the composition wire format
const RESERVED: &[char] = &['{', '}', '(', ')', '=', ',', ';', '"'];

pub(crate) fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !RESERVED.contains(&c)
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

/// What an operation name addresses
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// `host/kind::__construct` or `kind::__construct`
    Construct { host: Option<String>, kind: String },
    /// `host/kind/id::member`, a method on a stored instance
    Instance {
        host: String,
        kind: String,
        id: String,
        member: String,
    },
    /// `var::member`, a method on the service bound to a state variable
    Bound { variable: String, member: String },
}

impl Target {
    /// Parse an operation name into the target it addresses
    pub fn parse(name: &str) -> Result<Self> {
        let malformed = || ChoreoError::MalformedComposition(format!("invalid operation name '{}'", name));

        let (owner, member) = name.rsplit_once("::").ok_or_else(malformed)?;
        if owner.is_empty() || !is_valid_name(member) || member.contains('/') {
            return Err(malformed());
        }

        let segments: Vec<&str> = owner.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(malformed());
        }

        let target = match (segments.as_slice(), member == CONSTRUCTOR) {
            ([kind], true) => Target::Construct {
                host: None,
                kind: kind.to_string(),
            },
            ([variable], false) => Target::Bound {
                variable: variable.to_string(),
                member: member.to_string(),
            },
            ([host, kind], true) => Target::Construct {
                host: Some(host.to_string()),
                kind: kind.to_string(),
            },
            ([host, kind, id], false) => Target::Instance {
                host: host.to_string(),
                kind: kind.to_string(),
                id: id.to_string(),
                member: member.to_string(),
            },
            _ => return Err(malformed()),
        };
        Ok(target)
    }

    /// Host qualifier, if the name carries one
    pub fn host(&self) -> Option<&str> {
        match self {
            Target::Construct { host, .. } => host.as_deref(),
            Target::Instance { host, .. } => Some(host),
            Target::Bound { .. } => None,
        }
    }

    pub fn member(&self) -> &str {
        match self {
            Target::Construct { .. } => CONSTRUCTOR,
            Target::Instance { member, .. } | Target::Bound { member, .. } => member,
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, Target::Construct { .. })
    }
}

/// An operation: its (optionally host-qualified) name plus formal parameters
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    name: String,
    target: Target,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>, inputs: Vec<String>, outputs: Vec<String>) -> Result<Self> {
        let name = name.into();
        let target = Target::parse(&name)?;

        for param in inputs.iter().chain(outputs.iter()) {
            if !is_valid_name(param) {
                return Err(ChoreoError::MalformedComposition(format!(
                    "invalid parameter name '{}' in '{}'",
                    param, name
                )));
            }
        }
        if has_duplicates(&inputs) || has_duplicates(&outputs) {
            return Err(ChoreoError::MalformedComposition(format!(
                "duplicate parameter in '{}'",
                name
            )));
        }

        Ok(Self {
            name,
            target,
            inputs,
            outputs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Formal input parameter names, in call order
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Formal output parameter names
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }
}

fn has_duplicates(names: &[String]) -> bool {
    names
        .iter()
        .enumerate()
        .any(|(i, name)| names[..i].contains(name))
}

/// The token bound to a formal input
#[derive(Clone, Debug, PartialEq)]
pub enum ArgToken {
    /// Numeric literal, kept in its textual form
    Number(String),
    /// Quoted string literal (unquoted content)
    Text(String),
    /// Name of a variable in the execution state
    Variable(String),
}

impl ArgToken {
    /// Classify a raw token: quoted text, number or variable name
    pub fn parse(raw: &str) -> Self {
        if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            ArgToken::Text(raw[1..raw.len() - 1].to_string())
        } else if is_numeric_literal(raw) {
            ArgToken::Number(raw.to_string())
        } else {
            ArgToken::Variable(raw.to_string())
        }
    }

    pub fn variable(&self) -> Option<&str> {
        match self {
            ArgToken::Variable(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ArgToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgToken::Number(raw) | ArgToken::Variable(raw) => write!(f, "{}", raw),
            ArgToken::Text(text) => write!(f, "\"{}\"", text),
        }
    }
}

pub(crate) fn is_numeric_literal(raw: &str) -> bool {
    let starts_numeric = raw
        .trim_start_matches(&['-', '+'][..])
        .starts_with(|c: char| c.is_ascii_digit() || c == '.');
    starts_numeric
        && raw.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c))
        && raw.parse::<f64>().is_ok()
}

/// A concrete, bound use of an operation
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    operation: Operation,
    input_mapping: HashMap<String, ArgToken>,
    output_mapping: HashMap<String, String>,
}

impl Invocation {
    pub fn new(
        operation: Operation,
        input_mapping: HashMap<String, ArgToken>,
        output_mapping: HashMap<String, String>,
    ) -> Result<Self> {
        for formal in operation.inputs() {
            if !input_mapping.contains_key(formal) {
                return Err(ChoreoError::MalformedComposition(format!(
                    "input '{}' of '{}' is not bound",
                    formal,
                    operation.name()
                )));
            }
        }
        if input_mapping.len() != operation.inputs().len()
            || output_mapping.len() != operation.outputs().len()
            || operation.outputs().iter().any(|o| !output_mapping.contains_key(o))
        {
            return Err(ChoreoError::MalformedComposition(format!(
                "bindings of '{}' do not match its parameters",
                operation.name()
            )));
        }
        for token in input_mapping.values() {
            let valid = match token {
                ArgToken::Number(raw) => is_numeric_literal(raw),
                ArgToken::Variable(name) => is_valid_name(name),
                ArgToken::Text(_) => true,
            };
            if !valid {
                return Err(ChoreoError::MalformedComposition(format!(
                    "invalid argument token '{}' in '{}'",
                    token,
                    operation.name()
                )));
            }
        }
        if let Some(bad) = output_mapping.values().find(|v| !is_valid_name(v)) {
            return Err(ChoreoError::MalformedComposition(format!(
                "invalid output variable '{}' in '{}'",
                bad,
                operation.name()
            )));
        }

        Ok(Self {
            operation,
            input_mapping,
            output_mapping,
        })
    }

    /// Start building an invocation of the named operation
    pub fn builder(name: impl Into<String>) -> InvocationBuilder {
        InvocationBuilder {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn target(&self) -> &Target {
        self.operation.target()
    }

    /// Bound tokens in formal parameter order
    pub fn arguments(&self) -> impl Iterator<Item = (&str, &ArgToken)> {
        self.operation
            .inputs()
            .iter()
            .filter_map(|formal| self.input_mapping.get(formal).map(|t| (formal.as_str(), t)))
    }

    /// Output bindings (formal output, variable) in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.operation
            .outputs()
            .iter()
            .filter_map(|formal| self.output_mapping.get(formal).map(|v| (formal.as_str(), v.as_str())))
    }

    /// Variable bound to a formal output
    pub fn output_variable(&self, formal: &str) -> Option<&str> {
        self.output_mapping.get(formal).map(String::as_str)
    }

    /// Variable names this invocation reads, including a bound owner
    pub fn variables_read(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.arguments().filter_map(|(_, t)| t.variable()).collect();
        if let Target::Bound { variable, .. } = self.target() {
            vars.push(variable);
        }
        vars
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .arguments()
            .map(|(formal, token)| format!("{}={}", formal, token))
            .collect();
        let outs: Vec<String> = self
            .outputs()
            .map(|(formal, var)| format!("{}={}", formal, var))
            .collect();
        write!(f, "{{{}}} = {}({})", outs.join(","), self.operation.name(), args.join(","))
    }
}

/// Incremental construction of an [`Invocation`]
pub struct InvocationBuilder {
    name: String,
    inputs: Vec<(String, ArgToken)>,
    outputs: Vec<(String, String)>,
}

impl InvocationBuilder {
    /// Bind a formal input to a raw token (`5`, `"text"` or a variable name)
    pub fn input(self, formal: impl Into<String>, raw: &str) -> Self {
        self.input_token(formal, ArgToken::parse(raw))
    }

    pub fn input_token(mut self, formal: impl Into<String>, token: ArgToken) -> Self {
        self.inputs.push((formal.into(), token));
        self
    }

    /// Bind a formal output to a variable name
    pub fn output(mut self, formal: impl Into<String>, variable: impl Into<String>) -> Self {
        self.outputs.push((formal.into(), variable.into()));
        self
    }

    pub fn build(self) -> Result<Invocation> {
        let operation = Operation::new(
            self.name,
            self.inputs.iter().map(|(f, _)| f.clone()).collect(),
            self.outputs.iter().map(|(f, _)| f.clone()).collect(),
        )?;
        Invocation::new(
            operation,
            self.inputs.into_iter().collect(),
            self.outputs.into_iter().collect(),
        )
    }
}

/// An ordered pipeline of invocations
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composition {
    invocations: Vec<Invocation>,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, invocation: Invocation) {
        self.invocations.push(invocation);
    }

    pub fn with(mut self, invocation: Invocation) -> Self {
        self.push(invocation);
        self
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Invocation> {
        self.invocations.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Invocation> {
        self.invocations.iter()
    }
}

impl FromIterator<Invocation> for Composition {
    fn from_iter<T: IntoIterator<Item = Invocation>>(iter: T) -> Self {
        Self {
            invocations: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Composition {
    type Item = &'a Invocation;
    type IntoIter = std::slice::Iter<'a, Invocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.invocations.iter()
    }
}
