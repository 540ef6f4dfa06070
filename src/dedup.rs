//! Collapse repeated candidates and assign dense sequential ids.

use std::collections::HashSet;
use std::hash::Hash;

use crate::records::{EpisodeRecord, QuoteRecord};

/// A record that can be deduplicated and indexed.
pub trait Indexed {
    /// Identity used to detect repeats.
    type Key: Eq + Hash;

    /// Prefix of assigned ids, such as `ep` or `wq`.
    const ID_PREFIX: &'static str;

    fn dedup_key(&self) -> Self::Key;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);
}

impl Indexed for EpisodeRecord {
    type Key = (Option<u32>, Option<u32>, String);

    const ID_PREFIX: &'static str = "ep";

    fn dedup_key(&self) -> Self::Key {
        (self.season, self.episode, self.title.clone())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Indexed for QuoteRecord {
    type Key = (String, String, Option<u32>);

    const ID_PREFIX: &'static str = "wq";

    fn dedup_key(&self) -> Self::Key {
        (self.text.clone(), self.episode_title.clone(), self.season)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Keeps the first record per key in input order and numbers the survivors
/// `PREFIX-1..=PREFIX-n`.
///
/// Running it over its own output returns the same records with the same ids.
pub fn dedup_and_index<R: Indexed>(records: Vec<R>) -> Vec<R> {
    let mut seen = HashSet::new();
    let mut kept: Vec<R> = records
        .into_iter()
        .filter(|record| seen.insert(record.dedup_key()))
        .collect();
    for (idx, record) in kept.iter_mut().enumerate() {
        record.set_id(format!("{}-{}", R::ID_PREFIX, idx + 1));
    }
    kept
}
