use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const PRED_ANY: &str = "any";
pub const PRED_ALL: &str = "all";
pub const PRED_AGE18: &str = "age18";
pub const PRED_AGE21: &str = "age21";
pub const PRED_HI_INTENT_RECENT: &str = "hi_intent_recent";

pub const INT_HOME_KITCHEN: &str = "int_home_kitchen";
pub const INT_PERSONAL_CARE: &str = "int_personal_care";
pub const INT_BEAUTY: &str = "int_beauty";
pub const INT_FITNESS: &str = "int_fitness";
pub const INT_GADGETS: &str = "int_gadgets";

/// Interest categories that feed the derived `any` flag.
pub const INTEREST_KEYS: [&str; 5] = [
    INT_HOME_KITCHEN,
    INT_PERSONAL_CARE,
    INT_BEAUTY,
    INT_FITNESS,
    INT_GADGETS,
];

pub fn is_interest_key(key: &str) -> bool {
    INTEREST_KEYS.contains(&key)
}

/// Named boolean claims carried by a session.
///
/// Serialized as a flat JSON object (`{"age18": true, ...}`) with keys in
/// sorted order, so the encoded session payload is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateSet(BTreeMap<String, bool>);

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }

    /// `true` only when the claim is present and set.
    pub fn holds(&self, key: &str) -> bool {
        self.get(key).unwrap_or(false)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: bool) {
        self.0.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Re-derives `any` as the OR of every interest flag. A legacy `any`
    /// bit that is already set stays set.
    pub fn recompute_any(&mut self) {
        let interests = INTEREST_KEYS.iter().any(|key| self.holds(key));
        let legacy = self.holds(PRED_ANY);
        self.0.insert(PRED_ANY.to_string(), interests || legacy);
    }

    /// Sets `key` (and `hi_intent_recent`) to true and recomputes `any`.
    /// Returns the claim names that changed from absent/false to true.
    ///
    /// Never clears a claim.
    pub fn enrich(&mut self, key: &str) -> Vec<String> {
        let mut raised = Vec::new();
        for claim in [key, PRED_HI_INTENT_RECENT] {
            if !self.holds(claim) {
                self.0.insert(claim.to_string(), true);
                raised.push(claim.to_string());
            }
        }
        self.recompute_any();
        raised
    }
}

impl FromIterator<(String, bool)> for PredicateSet {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
