use std::time::Instant;

/// A small set of cancelable deadlines, keyed by `K`.
///
/// Every key has at most one deadline. Arming a key again replaces its deadline,
/// so a superseded deadline can never expire.
#[derive(Debug, Clone)]
pub struct Timers<K> {
    entries: Vec<(K, Instant)>,
}

impl<K> Timers<K>
where
    K: PartialEq + Clone,
{
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    /// Arms `key` to expire at `deadline`, replacing any previous deadline for it.
    pub fn arm(&mut self, key: K, deadline: Instant) {
        self.cancel(&key);
        self.entries.push((key, deadline));
    }

    /// Cancels `key`. Returns true if it was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);

        before != self.entries.len()
    }

    /// Cancels every key matching the predicate.
    pub fn cancel_where(&mut self, predicate: impl Fn(&K) -> bool) {
        self.entries.retain(|(k, _)| !predicate(k));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.entries
            .iter()
            .find_map(|(k, deadline)| (k == key).then_some(*deadline))
    }

    /// The earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(_, deadline)| *deadline).min()
    }

    /// Removes and returns the keys whose deadline is at or before `now`, earliest first.
    pub fn expire(&mut self, now: Instant) -> Vec<K> {
        let mut expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, deadline)| *deadline <= now)
            .cloned()
            .collect();

        self.entries.retain(|(_, deadline)| *deadline > now);
        expired.sort_by_key(|(_, deadline)| *deadline);

        expired.into_iter().map(|(key, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for Timers<K>
where
    K: PartialEq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the earliest of the given deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}
