//! Address resolution results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of resolving a node's address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressResolution {
    /// The node is reachable at this address.
    Resolved(String),

    /// The node exists but has no address yet; retrying may succeed.
    NotReady,

    /// The node is unknown to the backend.
    Unresolvable,
}

impl AddressResolution {
    /// Creates a resolution from a possibly empty address.
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        if address.is_empty() {
            Self::NotReady
        } else {
            Self::Resolved(address)
        }
    }

    /// Returns the resolved address.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Resolved(address) => Some(address),
            _ => None,
        }
    }

    /// Returns true if a later attempt may resolve the node.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady)
    }

    /// Formats the resolution as a REST URL on `port`.
    pub fn into_rest_url(self, port: u16) -> RestUrl {
        match self {
            Self::Resolved(host) => RestUrl::new(host, port),
            _ => RestUrl::unresolved(port),
        }
    }
}

/// A node's REST endpoint.
///
/// Displays as `host:port`. An unresolved URL keeps its port and has an
/// empty host; check [`RestUrl::is_reachable`] before using it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestUrl {
    /// Host name or address (empty when unresolved).
    pub host: String,

    /// Port.
    pub port: u16,
}

impl RestUrl {
    /// Creates a URL.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates a URL with no host.
    pub fn unresolved(port: u16) -> Self {
        Self::new(String::new(), port)
    }

    /// Returns true if the host is known.
    pub fn is_reachable(&self) -> bool {
        !self.host.is_empty()
    }

    /// Returns the URL with an `http://` scheme.
    pub fn http(&self) -> String {
        format!("http://{self}")
    }
}

impl fmt::Display for RestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A running server that gateways can use as their upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Node name, reachable from other nodes through links or the network.
    pub name: String,

    /// Server port.
    pub port: u16,
}

impl ServerEndpoint {
    /// Creates an endpoint.
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.name, self.port)
    }
}
