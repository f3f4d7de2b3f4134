// src/roster.rs

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// One `[[roster]]` table from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("roster has no entries")]
    Empty,

    #[error("roster entry with blank name")]
    BlankName,

    #[error("duplicate roster name: {0}")]
    Duplicate(String),
}

/// The authoritative identity of one salesperson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalIdentity {
    name: String,
    normalized: String,
    keys: Vec<String>,
}

impl CanonicalIdentity {
    /// Display name as written in the roster.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uppercased, whitespace-collapsed display name.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyTarget {
    Unique(usize),
    /// Two or more identities registered the same key.
    Shared,
}

/// Outcome of a direct key lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLookup<'a> {
    Found(&'a CanonicalIdentity),
    Ambiguous,
    Missing,
}

/// Uppercase, trim, and collapse whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed set of people eligible for commission, plus their lookup keys.
///
/// Built once from configuration and never mutated afterwards; share it
/// behind an `Arc` when several workers need it.
#[derive(Debug)]
pub struct RosterRegistry {
    identities: Vec<CanonicalIdentity>,
    keys: HashMap<String, KeyTarget>,
    label: Option<String>,
    fingerprint: String,
}

impl RosterRegistry {
    pub fn new(entries: Vec<RosterEntry>, label: Option<String>) -> Result<Self, RosterError> {
        if entries.is_empty() {
            return Err(RosterError::Empty);
        }

        let mut identities: Vec<CanonicalIdentity> = Vec::with_capacity(entries.len());
        for entry in entries {
            let normalized = normalize(&entry.name);
            if normalized.is_empty() {
                return Err(RosterError::BlankName);
            }
            if identities.iter().any(|i| i.normalized == normalized) {
                return Err(RosterError::Duplicate(entry.name));
            }

            let mut keys = vec![normalized.clone()];
            let tokens: Vec<&str> = normalized.split(' ').collect();
            if tokens.len() >= 2 {
                keys.push(format!("{} {}", tokens[0], tokens[1]));
            }
            keys.extend(entry.aliases.iter().map(|a| normalize(a)));
            keys.retain(|k| !k.is_empty());
            let mut seen = Vec::new();
            keys.retain(|k| {
                let fresh = !seen.contains(k);
                seen.push(k.clone());
                fresh
            });

            identities.push(CanonicalIdentity {
                name: entry.name.split_whitespace().collect::<Vec<_>>().join(" "),
                normalized,
                keys,
            });
        }

        let mut keys: HashMap<String, KeyTarget> = HashMap::new();
        for (idx, identity) in identities.iter().enumerate() {
            for key in &identity.keys {
                keys.entry(key.clone())
                    .and_modify(|target| {
                        if *target != KeyTarget::Unique(idx) {
                            *target = KeyTarget::Shared;
                        }
                    })
                    .or_insert(KeyTarget::Unique(idx));
            }
        }

        let fingerprint = Self::compute_fingerprint(&identities);
        Ok(Self {
            identities,
            keys,
            label,
            fingerprint,
        })
    }

    /// SHA-256 over the sorted normalized names, so the roster's identity
    /// does not depend on entry order.
    fn compute_fingerprint(identities: &[CanonicalIdentity]) -> String {
        let mut names: Vec<&str> = identities.iter().map(|i| i.normalized.as_str()).collect();
        names.sort_unstable();
        let mut hasher = Sha256::new();
        for name in names {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn identities(&self) -> &[CanonicalIdentity] {
        &self.identities
    }

    /// O(1) lookup of an already-normalized key.
    pub fn lookup(&self, key: &str) -> KeyLookup<'_> {
        match self.keys.get(key) {
            Some(KeyTarget::Unique(idx)) => KeyLookup::Found(&self.identities[*idx]),
            Some(KeyTarget::Shared) => KeyLookup::Ambiguous,
            None => KeyLookup::Missing,
        }
    }

    /// Every registered key with its target; `None` marks a shared key.
    pub fn lookup_keys(&self) -> Vec<(&str, Option<&CanonicalIdentity>)> {
        let mut out: Vec<(&str, Option<&CanonicalIdentity>)> = self
            .keys
            .iter()
            .map(|(key, target)| match target {
                KeyTarget::Unique(idx) => (key.as_str(), Some(&self.identities[*idx])),
                KeyTarget::Shared => (key.as_str(), None),
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Label plus a short fingerprint, e.g. `2025-03@1f0c9a2b7d3e`.
    pub fn version(&self) -> String {
        let short = &self.fingerprint[..12];
        match &self.label {
            Some(label) => format!("{label}@{short}"),
            None => short.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn registry(names: &[&str]) -> RosterRegistry {
    let entries = names
        .iter()
        .map(|n| RosterEntry {
            name: n.to_string(),
            aliases: Vec::new(),
        })
        .collect();
    RosterRegistry::new(entries, None).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Roseane   Cruz\t"), "ROSEANE CRUZ");
        assert_eq!(normalize("joão"), "JOÃO");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_keys_registered() {
        let roster = registry(&["Tiago Fernandes de Lima", "Roseane Cruz"]);
        let KeyLookup::Found(tiago) = roster.lookup("TIAGO FERNANDES DE LIMA") else {
            panic!("full name should be a key");
        };
        assert_eq!(tiago.name(), "Tiago Fernandes de Lima");
        assert_eq!(
            tiago.keys(),
            &["TIAGO FERNANDES DE LIMA".to_string(), "TIAGO FERNANDES".to_string()]
        );
        // two-token name: full name and pair are the same key
        assert_eq!(roster.identities()[1].keys().len(), 1);
        assert!(matches!(roster.lookup("TIAGO FERNANDES"), KeyLookup::Found(i) if i == tiago));
        assert_eq!(roster.lookup("TIAGO"), KeyLookup::Missing);
    }

    #[test]
    fn test_shared_pair_is_ambiguous() {
        let roster = registry(&["Joao Silva Santos", "Joao Silva Pereira"]);
        assert_eq!(roster.lookup("JOAO SILVA"), KeyLookup::Ambiguous);
        assert!(matches!(roster.lookup("JOAO SILVA SANTOS"), KeyLookup::Found(_)));
        let shared: Vec<_> = roster
            .lookup_keys()
            .into_iter()
            .filter(|(_, target)| target.is_none())
            .collect();
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn test_aliases() {
        let entries = vec![RosterEntry {
            name: "Tiago Fernandes de Lima".into(),
            aliases: vec!["tiago  lima".into()],
        }];
        let roster = RosterRegistry::new(entries, None).unwrap();
        assert!(matches!(roster.lookup("TIAGO LIMA"), KeyLookup::Found(_)));
    }

    #[test]
    fn test_rejects_duplicates_and_blank() {
        let entry = |name: &str| RosterEntry {
            name: name.to_string(),
            aliases: Vec::new(),
        };

        let dup = vec![entry("Ana Souza"), entry("ANA  SOUZA")];
        assert!(matches!(RosterRegistry::new(dup, None), Err(RosterError::Duplicate(_))));

        let blank = vec![entry("  ")];
        assert!(matches!(RosterRegistry::new(blank, None), Err(RosterError::BlankName)));
        assert!(matches!(RosterRegistry::new(vec![], None), Err(RosterError::Empty)));
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let a = registry(&["Ana Souza", "Bruno Dias"]);
        let b = registry(&["Bruno Dias", "Ana Souza"]);
        let c = registry(&["Ana Souza", "Bruno Diaz"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.version().len(), 12);
    }
}
