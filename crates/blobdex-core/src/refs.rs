//! Ref sets and the two ref mutations.
//!
//! A [`RefSet`] is the membership list of one indexed document: the
//! branches and tags that currently contain this exact blob at this exact
//! path. It behaves as a set (membership test, difference) while keeping
//! first-seen insertion order for display and serialization.
//!
//! - [`RefSet::merge`] only grows the set and is idempotent.
//! - [`RefSet::remove`] only shrinks it, and reports [`RemoveOutcome::Emptied`]
//!   instead of producing an empty set, because a document without refs must
//!   be deleted rather than kept.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Result of merging incoming refs into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Every incoming ref was already present. Nothing was mutated.
    Unchanged,
    /// At least one ref was appended.
    Added(usize),
}

/// Result of removing refs from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// None of the removed refs were present. Nothing was mutated.
    Unchanged,
    /// Some refs were removed and at least one remains.
    Updated(usize),
    /// Removal would leave no refs. The set is left untouched and the
    /// caller must delete the document.
    Emptied,
}

/// Insertion-ordered set of ref names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct RefSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl RefSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding exactly one ref, the starting point of every new document.
    pub fn single(reference: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.insert(reference.into());
        set
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.members.contains(reference)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }

    /// True when any of `refs` is a member.
    pub fn intersects<S: AsRef<str>>(&self, refs: &[S]) -> bool {
        refs.iter().any(|r| self.contains(r.as_ref()))
    }

    fn insert(&mut self, reference: String) -> bool {
        if self.members.contains(&reference) {
            return false;
        }
        self.members.insert(reference.clone());
        self.order.push(reference);
        true
    }

    /// Append every ref of `incoming` not already present, keeping existing
    /// refs first and new ones in their input order.
    pub fn merge<S: AsRef<str>>(&mut self, incoming: &[S]) -> MergeOutcome {
        let added = incoming
            .iter()
            .filter(|r| self.insert(r.as_ref().to_string()))
            .count();

        if added == 0 {
            MergeOutcome::Unchanged
        } else {
            MergeOutcome::Added(added)
        }
    }

    /// Drop every ref listed in `removing`.
    pub fn remove<S: AsRef<str>>(&mut self, removing: &[S]) -> RemoveOutcome {
        let removing: HashSet<&str> = removing.iter().map(AsRef::as_ref).collect();
        let remaining: Vec<String> = self
            .order
            .iter()
            .filter(|r| !removing.contains(r.as_str()))
            .cloned()
            .collect();

        if remaining.is_empty() {
            return RemoveOutcome::Emptied;
        }
        let removed = self.order.len() - remaining.len();
        if removed == 0 {
            return RemoveOutcome::Unchanged;
        }

        self.members = remaining.iter().cloned().collect();
        self.order = remaining;
        RemoveOutcome::Updated(removed)
    }
}

impl PartialEq for RefSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for RefSet {}

impl From<Vec<String>> for RefSet {
    fn from(refs: Vec<String>) -> Self {
        refs.into_iter().collect()
    }
}

impl From<RefSet> for Vec<String> {
    fn from(set: RefSet) -> Self {
        set.order
    }
}

impl FromIterator<String> for RefSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for r in iter {
            set.insert(r);
        }
        set
    }
}

impl<'a> FromIterator<&'a str> for RefSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(names: &[&str]) -> RefSet {
        names.iter().copied().collect()
    }

    fn names(set: &RefSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn test_single_starts_with_one_ref() {
        let set = RefSet::single("main");
        assert_eq!(names(&set), vec!["main"]);
    }

    #[test]
    fn test_merge_appends_new_refs_in_input_order() {
        let mut set = refs(&["main"]);
        let outcome = set.merge(&["release", "dev", "main"]);
        assert_eq!(outcome, MergeOutcome::Added(2));
        assert_eq!(names(&set), vec!["main", "release", "dev"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut once = refs(&["main"]);
        once.merge(&["dev", "v1.0"]);

        let mut twice = once.clone();
        assert_eq!(twice.merge(&["dev", "v1.0"]), MergeOutcome::Unchanged);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_collapses_duplicates_in_input() {
        let mut set = refs(&["main"]);
        assert_eq!(set.merge(&["dev", "dev"]), MergeOutcome::Added(1));
        assert_eq!(names(&set), vec!["main", "dev"]);
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let mut set = refs(&["main", "dev", "release"]);
        assert_eq!(set.remove(&["dev"]), RemoveOutcome::Updated(1));
        assert_eq!(names(&set), vec!["main", "release"]);
        assert!(!set.contains("dev"));
    }

    #[test]
    fn test_remove_all_signals_emptied_regardless_of_order() {
        let mut set = refs(&["a", "b", "c"]);
        assert_eq!(set.remove(&["c", "a", "b", "zzz"]), RemoveOutcome::Emptied);
        // Emptied leaves the set as it was.
        assert_eq!(names(&set), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_unknown_ref_is_unchanged() {
        let mut set = refs(&["main"]);
        assert_eq!(set.remove(&["dev"]), RemoveOutcome::Unchanged);
        assert_eq!(names(&set), vec!["main"]);
    }

    #[test]
    fn test_merge_then_remove_restores_original() {
        let original = refs(&["main", "dev"]);
        let mut set = original.clone();
        set.merge(&["v2", "hotfix"]);
        assert_eq!(set.remove(&["v2", "hotfix"]), RemoveOutcome::Updated(2));
        assert_eq!(set, original);
    }

    #[test]
    fn test_merge_then_remove_superset_deletes() {
        let mut set = refs(&["main"]);
        set.merge(&["main", "dev"]);
        assert_eq!(set.remove(&["main", "dev"]), RemoveOutcome::Emptied);
    }

    #[test]
    fn test_intersects() {
        let set = refs(&["main", "dev"]);
        assert!(set.intersects(&["x", "dev"]));
        assert!(!set.intersects(&["x"]));
        assert!(!set.intersects::<&str>(&[]));
    }

    #[test]
    fn test_serializes_as_list() {
        let set = refs(&["main", "dev"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["main","dev"]"#);

        let back: RefSet = serde_json::from_str(r#"["main","dev","main"]"#).unwrap();
        assert_eq!(names(&back), vec!["main", "dev"]);
    }
}
