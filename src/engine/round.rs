//! One coalescing round: deduplicate the keys of every swapped-out request,
//! then split the shared resolution back into per-caller results.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::Hash;

use crate::ResolutionError;

/// Outcome for a single requested key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEntry<V> {
    /// Resolved value, `None` when the resolver did not return the key.
    pub value: Option<V>,
    /// Whether the resolver returned the key at all.
    pub exists: bool,
    /// Whether the key was requested by more than one caller in the round.
    pub shared: bool,
}

impl<V> ResultEntry<V> {
    pub fn found(
        value: V,
        shared: bool,
    ) -> Self {
        Self {
            value: Some(value),
            exists: true,
            shared,
        }
    }

    pub fn missing(shared: bool) -> Self {
        Self {
            value: None,
            exists: false,
            shared,
        }
    }
}

/// What one caller receives from the worker that drained its round.
pub type RoundOutcome<K, V> = std::result::Result<HashMap<K, ResultEntry<V>>, ResolutionError>;

/// Deduplicated view over the requests of one round.
#[derive(Debug)]
pub(crate) struct DedupSet<K> {
    /// Unique keys in first-seen order across all requests.
    pub(crate) unique: Vec<K>,
    /// Keys that appeared in at least two different requests.
    pub(crate) shared: HashSet<K>,
    /// Total number of keys across all requests, repeats included.
    pub(crate) requested: usize,
}

impl<K> DedupSet<K>
where K: Eq + Hash + Clone
{
    /// Walks requests in submission order. A key repeated inside a single
    /// request is kept once and does not by itself make the key shared.
    pub(crate) fn collect<'a, I>(requests: I) -> Self
    where
        I: IntoIterator<Item = &'a [K]>,
        K: 'a,
    {
        let mut first_owner: HashMap<&'a K, usize> = HashMap::new();
        let mut unique = Vec::new();
        let mut shared = HashSet::new();
        let mut requested = 0;

        for (owner, keys) in requests.into_iter().enumerate() {
            requested += keys.len();
            for key in keys {
                match first_owner.entry(key) {
                    Entry::Occupied(e) => {
                        if *e.get() != owner {
                            shared.insert(key.clone());
                        }
                    }
                    Entry::Vacant(e) => {
                        e.insert(owner);
                        unique.push(key.clone());
                    }
                }
            }
        }

        Self {
            unique,
            shared,
            requested,
        }
    }

    /// Number of key lookups the dedup saved.
    pub(crate) fn saved(&self) -> usize {
        self.requested - self.unique.len()
    }
}

/// Builds one caller's result map out of the round's shared resolution.
pub(crate) fn build_outcome<K, V>(
    keys: &[K],
    resolved: &HashMap<K, V>,
    shared: &HashSet<K>,
) -> HashMap<K, ResultEntry<V>>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    keys.iter()
        .map(|key| {
            let is_shared = shared.contains(key);
            let entry = match resolved.get(key) {
                Some(value) => ResultEntry::found(value.clone(), is_shared),
                None => ResultEntry::missing(is_shared),
            };
            (key.clone(), entry)
        })
        .collect()
}
