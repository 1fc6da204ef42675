use log::info;

use super::{MembershipId, Participant, Role};

/// Tracks the participants of a room, in join order.
///
/// At most one participant holds the host role. The first host to join wins,
/// and later participants claiming the role are demoted to viewers.
#[derive(Debug, Default, Clone)]
pub struct MembershipRegistry {
    participants: Vec<Participant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterChangeKind {
    /// A new participant entered the room.
    Joined,
    /// A present participant joined again and its entry was replaced.
    Rejoined,
    /// A participant left the room.
    Left,
}

/// The result of applying a join or leave to the registry.
#[derive(Debug, Clone)]
pub struct RosterChange {
    pub kind: RosterChangeKind,
    /// The participant as it was stored (or removed).
    pub participant: Participant,
    /// True if the participant claimed the host role but was made a viewer.
    pub demoted: bool,
    /// The roster after the change.
    pub roster: Vec<Participant>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant, or replaces the entry if the id is already present.
    pub fn join(&mut self, mut participant: Participant) -> RosterChange {
        let existing = self
            .participants
            .iter()
            .position(|p| p.membership_id == participant.membership_id);

        let other_host = self
            .participants
            .iter()
            .find(|p| p.is_host() && p.membership_id != participant.membership_id);

        let demoted = participant.is_host() && other_host.is_some();

        if demoted {
            info!(
                "{} claimed the host role, but {} is already hosting",
                participant.display_name,
                other_host.map(|p| p.display_name.as_str()).unwrap_or_default()
            );
            participant.role = Role::Viewer;
        }

        let kind = match existing {
            Some(index) => {
                self.participants[index] = participant.clone();
                RosterChangeKind::Rejoined
            }
            None => {
                self.participants.push(participant.clone());
                RosterChangeKind::Joined
            }
        };

        RosterChange {
            kind,
            participant,
            demoted,
            roster: self.roster(),
        }
    }

    /// Removes a participant. Unknown ids are ignored.
    pub fn leave(&mut self, membership_id: &MembershipId) -> Option<RosterChange> {
        let index = self
            .participants
            .iter()
            .position(|p| &p.membership_id == membership_id)?;

        let participant = self.participants.remove(index);

        Some(RosterChange {
            kind: RosterChangeKind::Left,
            participant,
            demoted: false,
            roster: self.roster(),
        })
    }

    /// Replaces the registry contents with a roster snapshot, keeping the single host invariant.
    pub fn reconcile(&mut self, roster: &[Participant]) {
        self.participants.clear();

        for participant in roster {
            self.join(participant.clone());
        }
    }

    pub fn roster(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    pub fn get(&self, membership_id: &MembershipId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| &p.membership_id == membership_id)
    }

    pub fn contains(&self, membership_id: &MembershipId) -> bool {
        self.get(membership_id).is_some()
    }

    /// Returns the current host, if any.
    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host())
    }

    /// Returns every participant that is not the host.
    pub fn viewers(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| !p.is_host())
    }

    /// Returns the display name of a participant, or a placeholder if unknown.
    pub fn display_name(&self, membership_id: &MembershipId) -> String {
        self.get(membership_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn participant(id: &str, role: Role) -> Participant {
        Participant::new(id.into(), id.to_uppercase(), role)
    }

    #[test]
    fn test_join_and_leave() {
        let mut registry = MembershipRegistry::new();

        let change = registry.join(participant("a", Role::Host));
        assert_eq!(change.kind, RosterChangeKind::Joined);
        assert_eq!(change.roster.len(), 1);

        registry.join(participant("b", Role::Viewer));
        let change = registry.leave(&"a".into()).expect("a is present");

        assert_eq!(change.kind, RosterChangeKind::Left);
        assert_eq!(change.participant.membership_id, "a".into());
        assert_eq!(change.roster.len(), 1);
        assert!(registry.host().is_none(), "host left");
    }

    #[test]
    fn test_leave_unknown_is_noop() {
        let mut registry = MembershipRegistry::new();
        registry.join(participant("a", Role::Viewer));

        assert!(registry.leave(&"ghost".into()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_join_replaces_in_place() {
        let mut registry = MembershipRegistry::new();

        registry.join(participant("a", Role::Viewer));
        registry.join(participant("b", Role::Viewer));

        let mut renamed = participant("a", Role::Viewer);
        renamed.display_name = "Alice".to_string();

        let change = registry.join(renamed);

        assert_eq!(change.kind, RosterChangeKind::Rejoined);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.roster()[0].display_name, "Alice", "keeps position");
    }

    #[test]
    fn test_first_host_wins() {
        let mut registry = MembershipRegistry::new();

        registry.join(participant("a", Role::Host));
        let change = registry.join(participant("b", Role::Host));

        assert!(change.demoted, "second host claim is demoted");
        assert_eq!(change.participant.role, Role::Viewer);
        assert_eq!(registry.host().map(|h| h.membership_id.clone()), Some("a".into()));

        // The host reconnecting with the same identity keeps the role.
        let change = registry.join(participant("a", Role::Host));
        assert!(!change.demoted);
        assert_eq!(registry.host().map(|h| h.membership_id.clone()), Some("a".into()));

        // Once the host leaves, the slot is free again.
        registry.leave(&"a".into());
        let change = registry.join(participant("c", Role::Host));
        assert!(!change.demoted);
        assert_eq!(registry.host().map(|h| h.membership_id.clone()), Some("c".into()));
    }

    #[test]
    fn test_reconcile() {
        let mut registry = MembershipRegistry::new();
        registry.join(participant("stale", Role::Viewer));

        registry.reconcile(&[
            participant("a", Role::Host),
            participant("b", Role::Host),
            participant("c", Role::Viewer),
        ]);

        let ids: Vec<_> = registry
            .roster()
            .into_iter()
            .map(|p| p.membership_id.to_string())
            .collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(registry.viewers().count(), 2, "b was demoted");
    }

    #[test]
    fn test_roster_matches_net_count() {
        // A deterministic mixed sequence of joins and leaves.
        let ids = ["a", "b", "c", "d"];
        let mut registry = MembershipRegistry::new();
        let mut net: HashMap<&str, i32> = HashMap::new();

        for step in 0..64usize {
            let id = ids[(step * 7 + step / 3) % ids.len()];
            let is_join = (step * 5 + 1) % 3 != 0;

            if is_join {
                registry.join(participant(id, Role::Viewer));
                *net.entry(id).or_default() = 1;
            } else {
                registry.leave(&id.into());
                *net.entry(id).or_default() = 0;
            }

            let mut expected: Vec<_> = net
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            expected.sort();

            let mut actual: Vec<_> = registry
                .roster()
                .into_iter()
                .map(|p| p.membership_id.to_string())
                .collect();
            actual.sort();

            assert_eq!(actual, expected, "roster diverged at step {}", step);
        }
    }
}
