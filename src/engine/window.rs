//! Local window scan
//!
//! Starting at the cursor, the window extends over every invocation this host
//! can run itself:
//! - host-qualified invocations naming this host;
//! - unqualified invocations on a service created earlier in the window;
//! - unqualified invocations on a variable holding the address of a local
//!   instance.
//!
//! The first invocation that does not qualify is the forwarding target.

use crate::composition::{Composition, Invocation, Target};
use crate::resolver::{ExecutionState, StateValue};
use crate::service::HandleAddress;
use serde_json::Value;
use std::collections::HashSet;

/// Where the next hop of a composition goes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Host-qualified operation name to dispatch to
    Remote(String),
    /// The invocation names no host and no address is known for it
    Unroutable(String),
}

/// Outcome of a window scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window {
    /// First invocation of the window
    pub start: usize,
    /// One past the last local invocation; also the cursor of the next hop
    pub end: usize,
    /// Route for the invocation at `end`, if the composition continues
    pub next: Option<Route>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

pub fn scan(composition: &Composition, cursor: usize, host: &str, state: &ExecutionState) -> Window {
    let mut created: HashSet<&str> = HashSet::new();
    let mut end = cursor;

    for invocation in composition.iter().skip(cursor) {
        let local = match invocation.target() {
            Target::Construct { host: Some(h), .. } | Target::Instance { host: h, .. } => h == host,
            Target::Construct { host: None, .. } => false,
            Target::Bound { variable, .. } => {
                created.contains(variable.as_str())
                    || address_of(variable, state).is_some_and(|a| a.host == host)
            }
        };
        if !local {
            break;
        }
        if invocation.target().is_constructor() {
            created.extend(invocation.outputs().next().map(|(_, variable)| variable));
        }
        end += 1;
    }

    Window {
        start: cursor,
        end,
        next: composition.get(end).map(|invocation| route_of(invocation, state)),
    }
}

/// Where an invocation has to be sent when this host does not run it
pub fn route_of(invocation: &Invocation, state: &ExecutionState) -> Route {
    match invocation.target() {
        Target::Construct { host: Some(_), .. } | Target::Instance { .. } => {
            Route::Remote(invocation.operation().name().to_string())
        }
        Target::Bound { variable, member } => match address_of(variable, state) {
            Some(address) => Route::Remote(address.operation_name(member)),
            None => Route::Unroutable(invocation.operation().name().to_string()),
        },
        Target::Construct { host: None, .. } => {
            Route::Unroutable(invocation.operation().name().to_string())
        }
    }
}

fn address_of(variable: &str, state: &ExecutionState) -> Option<HandleAddress> {
    match state.get(variable)? {
        StateValue::Json(Value::String(text)) => HandleAddress::parse(text),
        _ => None,
    }
}
