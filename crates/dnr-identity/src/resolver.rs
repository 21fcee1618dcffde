//! In-memory identity resolution.
//!
//! Contacts sharing a normalized email or phone are unioned; the connected
//! components are the master identities. The computation is a pure function
//! of the contact list and the previous map, so two runs over the same input
//! give the same master ids and the same primaries.

use crate::keys::{KeyNormalizer, MatchKey};
use petgraph::unionfind::UnionFind;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// One silver contact as seen by the resolver
#[derive(Debug, Clone, Default)]
pub struct ContactRecord {
    /// `<source name>:<source_record_id>`
    pub contact_id: String,
    pub source_id: i32,
    pub source_name: String,
    pub source_record_id: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    /// Non-empty profile fields
    pub completeness: usize,
    /// `updated_at`, else `created_at`, as `YYYY-MM-DD HH:MM:SS`
    pub updated_at: Option<String>,
}

impl ContactRecord {
    /// Usable match keys; empty when the contact cannot link to anyone
    pub fn match_keys(&self, normalizer: &KeyNormalizer) -> BTreeSet<MatchKey> {
        self.emails
            .iter()
            .filter_map(|e| normalizer.email(e))
            .chain(self.phones.iter().filter_map(|p| normalizer.phone(p)))
            .collect()
    }
}

/// One row of the identity map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRow {
    pub contact_id: String,
    pub source_id: i32,
    pub source_record_id: String,
    pub master_id: String,
    pub is_primary: bool,
}

/// Counts reported after a resolution run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityReport {
    pub contacts: usize,
    pub masters: usize,
    /// Masters spanning more than one source system
    pub multi_source_masters: usize,
    /// Contacts with no usable email and no usable phone
    pub unlinked: usize,
    /// Masters that kept a master id from the previous map
    pub carried_over: usize,
}

/// Resolution output
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    /// Rows ordered by contact id
    pub rows: Vec<IdentityRow>,
    pub report: IdentityReport,
}

impl IdentityMap {
    pub fn master_of(&self, contact_id: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.contact_id == contact_id)
            .map(|r| r.master_id.as_str())
    }

    pub fn primary_of(&self, master_id: &str) -> Option<&IdentityRow> {
        self.rows
            .iter()
            .find(|r| r.master_id == master_id && r.is_primary)
    }
}

/// Namespace for master ids minted from a contact id
const MASTER_NAMESPACE: Uuid = Uuid::from_u128(0x6d1b_93a4_5c2e_4f07_9a3e_0d2c_b8f1_7e44);

/// Resolve `contacts` into master identities.
///
/// `previous` maps contact id to the master id of the last run. Each new
/// component inherits the previous id most of its members held, and a
/// previous id goes to at most one component. Components with nothing to
/// inherit get an id derived from their smallest contact id.
pub fn resolve(
    contacts: &[ContactRecord],
    previous: &HashMap<String, String>,
    normalizer: &KeyNormalizer,
) -> IdentityMap {
    let mut contacts: Vec<&ContactRecord> = contacts.iter().collect();
    contacts.sort_by(|a, b| a.contact_id.cmp(&b.contact_id));
    let n = contacts.len();

    let mut union = UnionFind::<usize>::new(n);
    let mut owner: HashMap<MatchKey, usize> = HashMap::new();
    let mut unlinked = 0;
    for (idx, contact) in contacts.iter().enumerate() {
        let keys = contact.match_keys(normalizer);
        if keys.is_empty() {
            unlinked += 1;
        }
        for key in keys {
            match owner.get(&key) {
                Some(&first) => {
                    union.union(first, idx);
                }
                None => {
                    owner.insert(key, idx);
                }
            }
        }
    }

    // Components keyed by root; members stay in contact id order
    let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, root) in union.into_labeling().into_iter().enumerate() {
        by_root.entry(root).or_default().push(idx);
    }
    let mut components: Vec<Vec<usize>> = by_root.into_values().collect();
    components.sort_by_key(|members| members[0]);

    let (masters, carried_over) = assign_master_ids(&contacts, &components, previous);

    let mut rows = Vec::with_capacity(n);
    let mut multi_source_masters = 0;
    for (component, master_id) in components.iter().zip(&masters) {
        let sources: HashSet<i32> = component.iter().map(|&i| contacts[i].source_id).collect();
        if sources.len() > 1 {
            multi_source_masters += 1;
        }
        let primary = component
            .iter()
            .copied()
            .min_by(|&a, &b| primary_order(contacts[a], contacts[b]));
        for &idx in component {
            let contact = contacts[idx];
            rows.push(IdentityRow {
                contact_id: contact.contact_id.clone(),
                source_id: contact.source_id,
                source_record_id: contact.source_record_id.clone(),
                master_id: master_id.clone(),
                is_primary: Some(idx) == primary,
            });
        }
    }
    rows.sort_by(|a, b| a.contact_id.cmp(&b.contact_id));

    IdentityMap {
        rows,
        report: IdentityReport {
            contacts: n,
            masters: components.len(),
            multi_source_masters,
            unlinked,
            carried_over,
        },
    }
}

/// Master id per component, plus how many were carried over
fn assign_master_ids(
    contacts: &[&ContactRecord],
    components: &[Vec<usize>],
    previous: &HashMap<String, String>,
) -> (Vec<String>, usize) {
    // (previous id, component, members holding it)
    let mut claims: Vec<(&str, usize, usize)> = Vec::new();
    for (comp, members) in components.iter().enumerate() {
        let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
        for &idx in members {
            if let Some(prev) = previous.get(&contacts[idx].contact_id) {
                *tally.entry(prev.as_str()).or_default() += 1;
            }
        }
        claims.extend(tally.into_iter().map(|(id, count)| (id, comp, count)));
    }
    claims.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| components[b.1].len().cmp(&components[a.1].len()))
            .then_with(|| components[a.1][0].cmp(&components[b.1][0]))
            .then_with(|| a.0.cmp(b.0))
    });

    let mut assigned: Vec<Option<String>> = vec![None; components.len()];
    let mut used: HashSet<String> = HashSet::new();
    for (id, comp, _) in claims {
        if assigned[comp].is_none() && !used.contains(id) {
            assigned[comp] = Some(id.to_string());
            used.insert(id.to_string());
        }
    }
    let carried_over = assigned.iter().filter(|a| a.is_some()).count();

    let masters = assigned
        .into_iter()
        .enumerate()
        .map(|(comp, id)| {
            id.unwrap_or_else(|| {
                let seed = &contacts[components[comp][0]].contact_id;
                let mut salt = 0u32;
                loop {
                    let name = if salt == 0 {
                        seed.clone()
                    } else {
                        format!("{seed}#{salt}")
                    };
                    let candidate = Uuid::new_v5(&MASTER_NAMESPACE, name.as_bytes()).to_string();
                    if used.insert(candidate.clone()) {
                        break candidate;
                    }
                    salt += 1;
                }
            })
        })
        .collect();
    (masters, carried_over)
}

/// `Less` when `a` is the better primary: more complete profile, then more
/// recent update, then lower source-local id, then source name
pub fn primary_order(a: &ContactRecord, b: &ContactRecord) -> Ordering {
    b.completeness
        .cmp(&a.completeness)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| compare_local_ids(&a.source_record_id, &b.source_record_id))
        .then_with(|| a.source_name.cmp(&b.source_name))
        .then_with(|| a.contact_id.cmp(&b.contact_id))
}

/// Numeric when both ids are integers, lexicographic otherwise
fn compare_local_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i128>(), b.parse::<i128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
