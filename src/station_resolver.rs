// ============================================================================
// Station Resolver: free-form station names → feed stop identifiers
// ============================================================================

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};

lazy_static! {
    static ref STATION_SUFFIX: Regex = Regex::new(r"\s*station\b.*").unwrap();
    static ref DASH_SEPARATOR: Regex = Regex::new(r"\s*-\s*").unwrap();
    static ref SLASH_SEPARATOR: Regex = Regex::new(r"\s*/\s*").unwrap();
    static ref LINE_SUFFIX: Regex = Regex::new(r"\s*[a-z]/line\b").unwrap();
    static ref ABBREVIATIONS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"\bst\b").unwrap(), "street"),
        (Regex::new(r"\bhwy\b").unwrap(), "highway"),
        (Regex::new(r"\bblvd\b").unwrap(), "boulevard"),
        (Regex::new(r"\bave\b").unwrap(), "avenue"),
        (Regex::new(r"\bdr\b").unwrap(), "drive"),
    ];
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Canonical form used on both sides of every name comparison.
///
/// `"7th St/Metro Center Station - Metro A-Line"` and `"7th Street / Metro Center"`
/// both become `"7th street/metro center"`.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim().to_lowercase();
    let name = STATION_SUFFIX.replace_all(&name, "");
    let name = DASH_SEPARATOR.replace_all(&name, "/");
    let name = SLASH_SEPARATOR.replace_all(&name, "/");
    let mut name = LINE_SUFFIX.replace_all(&name, "").into_owned();
    for (pattern, expansion) in ABBREVIATIONS.iter() {
        name = pattern.replace_all(&name, *expansion).into_owned();
    }
    WHITESPACE.replace_all(&name, " ").trim().to_string()
}

fn words(name: &str) -> HashSet<&str> {
    name.split_whitespace().collect()
}

/// Normalized name → stop ids, iterable in the order names were first seen.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    entries: Vec<(String, BTreeSet<String>)>,
    positions: HashMap<String, usize>,
}

impl NameIndex {
    pub fn insert(&mut self, normalized: String, stop_id: &str) {
        let position = match self.positions.get(&normalized) {
            Some(&i) => i,
            None => {
                self.positions.insert(normalized.clone(), self.entries.len());
                self.entries.push((normalized, BTreeSet::new()));
                self.entries.len() - 1
            }
        };
        self.entries[position].1.insert(stop_id.to_string());
    }

    pub fn get(&self, normalized: &str) -> Option<&BTreeSet<String>> {
        self.positions.get(normalized).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> + '_ {
        self.entries.iter().map(|(name, ids)| (name.as_str(), ids))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves user-facing station names against one snapshot's name index.
pub struct StationResolver<'a> {
    names: &'a NameIndex,
    parent_children: &'a HashMap<String, Vec<String>>,
}

impl<'a> StationResolver<'a> {
    pub fn new(names: &'a NameIndex, parent_children: &'a HashMap<String, Vec<String>>) -> Self {
        StationResolver {
            names,
            parent_children,
        }
    }

    /// Stop ids denoted by `query`, children of matched parent stations included.
    ///
    /// Tries an exact normalized match, then the substring match with the
    /// largest word overlap, then any name sharing `min(2, words)` words.
    /// The substring step keeps the first best-scoring name, so short
    /// ambiguous queries can land on an unintended station.
    pub fn resolve(&self, query: &str) -> BTreeSet<String> {
        let normalized = normalize_name(query);
        if normalized.is_empty() {
            return BTreeSet::new();
        }

        if let Some(ids) = self.names.get(&normalized) {
            return self.with_children(ids);
        }

        let query_words = words(&normalized);

        let mut best: Option<&BTreeSet<String>> = None;
        let mut best_score = 0;
        for (name, ids) in self.names.iter() {
            if name.contains(normalized.as_str()) || normalized.contains(name) {
                let score = query_words.intersection(&words(name)).count();
                if score > best_score {
                    best_score = score;
                    best = Some(ids);
                }
            }
        }
        if let Some(ids) = best {
            return self.with_children(ids);
        }

        let required = query_words.len().min(2);
        for (name, ids) in self.names.iter() {
            if query_words.intersection(&words(name)).count() >= required {
                return self.with_children(ids);
            }
        }

        BTreeSet::new()
    }

    fn with_children(&self, ids: &BTreeSet<String>) -> BTreeSet<String> {
        let mut stop_ids = ids.clone();
        for id in ids {
            if let Some(children) = self.parent_children.get(id) {
                stop_ids.extend(children.iter().cloned());
            }
        }
        stop_ids
    }
}
