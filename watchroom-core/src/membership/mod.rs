mod registry;

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use registry::*;

/// The stable identity of a participant within a room session.
/// Unrelated to the participant's transport identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipId(String);

impl MembershipId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MembershipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MembershipId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authoritative for playback, and the source of the media stream.
    Host,
    #[default]
    Viewer,
}

impl Role {
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Viewer => f.write_str("viewer"),
        }
    }
}

/// A member of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "participantId")]
    pub membership_id: MembershipId,
    pub display_name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(membership_id: MembershipId, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            membership_id,
            display_name: display_name.into(),
            role,
            joined_at: Utc::now(),
        }
    }

    pub fn is_host(&self) -> bool {
        self.role.is_host()
    }
}
