//! Year × term view over the flat entry list of a plan.

use std::collections::BTreeMap;

use shared::{
    domain::{BucketKey, EntryId, Term},
    protocol::PlanEntry,
};

/// Entries bucketed by (year, term) and ordered by `position`.
///
/// Built from scratch on every call to [`GridIndex::build`]; it holds borrowed
/// entries only and never writes back to them.
#[derive(Debug, Clone)]
pub struct GridIndex<'a> {
    buckets: BTreeMap<BucketKey, Vec<&'a PlanEntry>>,
}

impl<'a> GridIndex<'a> {
    pub fn build(entries: &'a [PlanEntry]) -> Self {
        let mut buckets: BTreeMap<BucketKey, Vec<&'a PlanEntry>> =
            BucketKey::all().map(|key| (key, Vec::new())).collect();

        for entry in entries {
            // Entries outside the canonical grid are not rendered.
            if let Some(bucket) = buckets.get_mut(&entry.bucket()) {
                bucket.push(entry);
            }
        }

        // Stable sort keeps insertion order for equal positions.
        for bucket in buckets.values_mut() {
            bucket.sort_by_key(|entry| entry.position);
        }

        Self { buckets }
    }

    pub fn bucket(&self, key: BucketKey) -> &[&'a PlanEntry] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn bucket_len(&self, key: BucketKey) -> usize {
        self.bucket(key).len()
    }

    /// All canonical buckets in render order (year-major, then term order).
    pub fn buckets(&self) -> impl Iterator<Item = (BucketKey, &[&'a PlanEntry])> + '_ {
        self.buckets.iter().map(|(key, entries)| (*key, entries.as_slice()))
    }

    /// The five term columns of one year, in term order.
    pub fn year(&self, year_index: i32) -> Vec<(Term, &[&'a PlanEntry])> {
        Term::ALL
            .into_iter()
            .map(|term| (term, self.bucket(BucketKey::new(year_index, term))))
            .collect()
    }

    pub fn locate(&self, entry_id: EntryId) -> Option<BucketKey> {
        self.buckets
            .iter()
            .find(|(_, entries)| entries.iter().any(|entry| entry.id == entry_id))
            .map(|(key, _)| *key)
    }

    /// Number of entries that landed in some canonical bucket.
    pub fn placed_len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
#[path = "tests/grid_tests.rs"]
mod tests;
