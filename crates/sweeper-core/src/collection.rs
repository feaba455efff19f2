use std::collections::HashMap;

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// Ordered set of resource kind names.
///
/// All operations preserve the order of the receiver and never introduce
/// duplicates beyond what the inputs already contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection(Vec<String>);

impl Collection {
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.iter().any(|e| e == entry)
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.0.push(entry.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Elements of `self` that also appear in `other`, in `self`'s order.
    pub fn intersect(&self, other: &Collection) -> Collection {
        Collection(self.0.iter().filter(|e| other.contains(e)).cloned().collect())
    }

    /// Elements of `self` that do not appear in `other`.
    pub fn remove(&self, other: &Collection) -> Collection {
        Collection(self.0.iter().filter(|e| !other.contains(e)).cloned().collect())
    }

    /// `self` followed by the elements of `other` not already present, in
    /// `other`'s order.
    pub fn union(&self, other: &Collection) -> Collection {
        let mut merged = self.0.clone();
        for entry in &other.0 {
            if !merged.iter().any(|e| e == entry) {
                merged.push(entry.clone());
            }
        }
        Collection(merged)
    }

    /// Glob-expand each entry against `base`. Entries that match nothing
    /// (including entries that are not valid patterns) pass through
    /// unchanged.
    pub fn expand(&self, base: &Collection) -> Collection {
        let mut expanded = Vec::new();
        for entry in &self.0 {
            let matches: Vec<String> = match Pattern::new(entry) {
                Ok(pattern) => base.iter().filter(|name| pattern.matches(name)).map(String::from).collect(),
                Err(_) => Vec::new(),
            };
            if matches.is_empty() {
                expanded.push(entry.clone());
            } else {
                expanded.extend(matches);
            }
        }
        Collection(expanded)
    }
}

impl From<Vec<String>> for Collection {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}

impl From<Vec<&str>> for Collection {
    fn from(entries: Vec<&str>) -> Self {
        Self(entries.into_iter().map(String::from).collect())
    }
}

impl IntoIterator for Collection {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Compute the effective set of kinds for a sweep.
///
/// Applied in order: each alternatives list is unioned in (and each
/// alternative entry removes its origin kind, resolved through `alt_map`),
/// then each non-empty includes list intersects the set, then each excludes
/// list is subtracted.
pub fn resolve_resource_types(
    base: Collection,
    includes: &[Collection],
    excludes: &[Collection],
    alternatives: &[Collection],
    alt_map: &HashMap<String, String>,
) -> Collection {
    let mut resolved = base;

    for alternative in alternatives {
        resolved = resolved.union(alternative);
        for entry in alternative.iter() {
            if let Some(origin) = alt_map.get(entry) {
                resolved = resolved.remove(&Collection::from(vec![origin.clone()]));
            }
        }
    }

    for include in includes {
        if !include.is_empty() {
            resolved = resolved.intersect(include);
        }
    }

    for exclude in excludes {
        resolved = resolved.remove(exclude);
    }

    resolved
}

#[cfg(test)]
mod tests;
