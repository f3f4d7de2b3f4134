// src/resolver.rs

use crate::roster::{CanonicalIdentity, KeyLookup, RosterRegistry, normalize};
use std::sync::Arc;

/// Shortest fragment allowed to match part of a roster name.
const MIN_PARTIAL_LEN: usize = 3;

/// Result of resolving one raw name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved(&'a CanonicalIdentity),
    /// More than one identity matched weakly; never guessed.
    Ambiguous,
    Unresolved,
}

/// Maps noisy name strings onto roster identities.
///
/// Rules are tried in a fixed order and the first hit wins:
/// full-name substring, exact or two-token key, then unique single-token match.
#[derive(Debug, Clone)]
pub struct NameResolver {
    roster: Arc<RosterRegistry>,
}

impl NameResolver {
    pub fn new(roster: Arc<RosterRegistry>) -> Self {
        Self { roster }
    }

    pub fn resolve(&self, raw: &str) -> Resolution<'_> {
        let text = normalize(raw);
        if text.is_empty() {
            return Resolution::Unresolved;
        }

        if let Some(identity) = self.substring_match(&text) {
            return Resolution::Resolved(identity);
        }

        // exact key (full name or alias), then the first two tokens
        let mut tokens = text.split(' ');
        let first = tokens.next().unwrap_or_default();
        let pair = tokens.next().map(|second| format!("{first} {second}"));
        for key in std::iter::once(text.as_str()).chain(pair.as_deref()) {
            match self.roster.lookup(key) {
                KeyLookup::Found(identity) => return Resolution::Resolved(identity),
                KeyLookup::Ambiguous => return Resolution::Ambiguous,
                KeyLookup::Missing => {}
            }
        }

        self.single_token_match(first)
    }

    /// Text contains a full name (longest wins), or exactly one full name
    /// contains the text.
    fn substring_match(&self, text: &str) -> Option<&CanonicalIdentity> {
        let identities = self.roster.identities();

        let forward = identities
            .iter()
            .filter(|i| text.contains(i.normalized()))
            .fold(None::<&CanonicalIdentity>, |best, i| match best {
                Some(b) if b.normalized().len() >= i.normalized().len() => Some(b),
                _ => Some(i),
            });
        if forward.is_some() {
            return forward;
        }

        if text.chars().count() < MIN_PARTIAL_LEN {
            return None;
        }
        let mut reverse = identities.iter().filter(|i| i.normalized().contains(text));
        match (reverse.next(), reverse.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    fn single_token_match(&self, token: &str) -> Resolution<'_> {
        if token.chars().count() < MIN_PARTIAL_LEN {
            return Resolution::Unresolved;
        }
        let mut hits = self
            .roster
            .identities()
            .iter()
            .filter(|i| i.normalized().contains(token));
        match (hits.next(), hits.next()) {
            (Some(only), None) => Resolution::Resolved(only),
            (Some(_), Some(_)) => Resolution::Ambiguous,
            _ => Resolution::Unresolved,
        }
    }
}
