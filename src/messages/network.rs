//! Network messages - communication between App and Network layers

use crate::network::compile::WireRequest;
use crate::network::normalize::NormalizedResponse;

/// Commands sent from App layer to Network layer
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkCommand {
    /// Execute a compiled session request
    Execute {
        id: u64,
        tab_key: String,
        request: WireRequest,
    },
    /// Cancel a pending request
    Cancel(u64),
    /// Shutdown the network actor
    Shutdown,
}

/// Responses sent from Network layer to App layer
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkResponse {
    /// Normalised answer, including status 0 for transport failures
    Completed {
        id: u64,
        tab_key: String,
        response: NormalizedResponse,
    },
    Cancelled {
        id: u64,
        tab_key: String,
    },
}

impl NetworkResponse {
    pub fn id(&self) -> u64 {
        match self {
            NetworkResponse::Completed { id, .. } | NetworkResponse::Cancelled { id, .. } => *id,
        }
    }

    pub fn tab_key(&self) -> &str {
        match self {
            NetworkResponse::Completed { tab_key, .. }
            | NetworkResponse::Cancelled { tab_key, .. } => tab_key,
        }
    }
}
