//! Handles to stateful service instances

use std::fmt;

/// Reference to a service instance living on the host that created it
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    kind: String,
    id: String,
}

impl ServiceHandle {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a handle with a fresh, collision-free instance id
    pub fn generate(kind: impl Into<String>) -> Self {
        Self::new(kind, uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address of this handle when owned by `host`
    pub fn address(&self, host: &str) -> HandleAddress {
        HandleAddress {
            host: host.to_string(),
            handle: self.clone(),
        }
    }
}

/// `host/kind/id`, the wire form of a handle
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandleAddress {
    pub host: String,
    pub handle: ServiceHandle,
}

impl HandleAddress {
    /// Parse `host/kind/id`; anything else is not an address
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('/');
        let (host, kind, id) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || [host, kind, id].iter().any(|p| p.is_empty() || p.contains(char::is_whitespace)) {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            handle: ServiceHandle::new(kind, id),
        })
    }

    /// Operation name of a method on the addressed instance
    pub fn operation_name(&self, member: &str) -> String {
        format!("{}::{}", self, member)
    }
}

impl fmt::Display for HandleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.handle.kind, self.handle.id)
    }
}
