mod mapper;

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MembershipId;

pub use mapper::*;

/// Identifies a participant's instance of the peer media transport.
/// It is regenerated whenever the transport session is reinitialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(String);

impl TransportId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransportId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The current transport identity of a member.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerIdentity {
    pub membership_id: MembershipId,
    pub transport_id: TransportId,
    pub registered_at: DateTime<Utc>,
}
