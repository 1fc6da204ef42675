use std::collections::HashMap;

use chrono::Utc;
use log::info;

use super::{PeerIdentity, TransportId};
use crate::MembershipId;

/// Maps membership identities to their current transport identity.
///
/// This is the single place identities are registered. The mapping is
/// last-write-wins per member and keeps no history.
#[derive(Debug, Default, Clone)]
pub struct IdentityMapper {
    identities: HashMap<MembershipId, PeerIdentity>,
}

/// What a call to [IdentityMapper::register] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The member had no identity before.
    New,
    /// The member was already registered with the same identity.
    Unchanged,
    /// The member's previous identity was overwritten.
    Replaced { previous: TransportId },
}

impl IdentityMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the transport identity of a member, overwriting any previous one.
    ///
    /// This may be called before the member is known to the roster,
    /// and any number of times for the same pair.
    pub fn register(
        &mut self,
        membership_id: MembershipId,
        transport_id: TransportId,
    ) -> Registration {
        let identity = PeerIdentity {
            membership_id: membership_id.clone(),
            transport_id: transport_id.clone(),
            registered_at: Utc::now(),
        };

        let previous = self
            .identities
            .get(&membership_id)
            .map(|i| i.transport_id.clone());

        match previous {
            Some(previous) if previous == transport_id => Registration::Unchanged,
            Some(previous) => {
                info!(
                    "{} re-registered as {} (was {})",
                    membership_id, transport_id, previous
                );

                self.identities.insert(membership_id, identity);
                Registration::Replaced { previous }
            }
            None => {
                self.identities.insert(membership_id, identity);
                Registration::New
            }
        }
    }

    /// Returns the current transport identity of a member.
    /// `None` means the identity has not arrived yet, not that the member is unreachable.
    pub fn resolve(&self, membership_id: &MembershipId) -> Option<&TransportId> {
        self.identities.get(membership_id).map(|i| &i.transport_id)
    }

    pub fn identity(&self, membership_id: &MembershipId) -> Option<&PeerIdentity> {
        self.identities.get(membership_id)
    }

    /// Returns the member currently registered with the given transport identity.
    pub fn membership_of(&self, transport_id: &TransportId) -> Option<&MembershipId> {
        self.identities
            .values()
            .find(|i| &i.transport_id == transport_id)
            .map(|i| &i.membership_id)
    }

    /// Drops the identity of a member that left.
    pub fn forget(&mut self, membership_id: &MembershipId) -> Option<PeerIdentity> {
        self.identities.remove(membership_id)
    }

    /// The members that have an identity registered.
    pub fn membership_ids(&self) -> Vec<MembershipId> {
        self.identities.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.identities.clear();
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
