use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    field::{decimal_to_field, field_from_u64, FieldError, FieldString},
    predicates::{
        PredicateSet, INT_BEAUTY, INT_FITNESS, INT_GADGETS, INT_HOME_KITCHEN, INT_PERSONAL_CARE,
        PRED_AGE18, PRED_AGE21, PRED_ALL, PRED_ANY, PRED_HI_INTENT_RECENT,
    },
};

pub const SIGNAL_NONCE: usize = 0;
pub const SIGNAL_ORIGIN: usize = 1;
pub const SIGNAL_NOW_YEAR: usize = 2;
pub const SIGNAL_MASK: usize = 3;
pub const SIGNAL_COMMITMENT: usize = 4;
pub const SIGNAL_NULLIFIER: usize = 5;

/// Number of public signals in the legacy single-bit layout (V1).
pub const SIGNAL_COUNT_V1: usize = 8;
/// V1 plus the `all` bit.
pub const SIGNAL_COUNT_V1_ALL: usize = 9;
/// Per-category layout (V2): age gates, five interests and the intent flag.
pub const SIGNAL_COUNT_V2: usize = 14;

const V1_PREDICATES: &[(&str, usize)] = &[(PRED_ANY, 6), (PRED_AGE18, 7)];
const V1_ALL_PREDICATES: &[(&str, usize)] = &[(PRED_ANY, 6), (PRED_ALL, 7), (PRED_AGE18, 8)];
const V2_PREDICATES: &[(&str, usize)] = &[
    (PRED_AGE18, 6),
    (PRED_AGE21, 7),
    (INT_HOME_KITCHEN, 8),
    (INT_PERSONAL_CARE, 9),
    (INT_BEAUTY, 10),
    (INT_FITNESS, 11),
    (INT_GADGETS, 12),
    (PRED_HI_INTENT_RECENT, 13),
];

/// Public-signal layouts accepted by the verifier.
///
/// All layouts share the `nonce, origin, nowYear, mask, commitment,
/// nullifier` prefix and differ only in the predicate bits that follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalLayout {
    V1,
    V1All,
    V2,
}

impl SignalLayout {
    pub const ALL: [SignalLayout; 3] = [SignalLayout::V1, SignalLayout::V1All, SignalLayout::V2];

    pub fn signal_count(self) -> usize {
        match self {
            SignalLayout::V1 => SIGNAL_COUNT_V1,
            SignalLayout::V1All => SIGNAL_COUNT_V1_ALL,
            SignalLayout::V2 => SIGNAL_COUNT_V2,
        }
    }

    /// Predicate names and their signal indices, in signal order.
    pub fn predicate_slots(self) -> &'static [(&'static str, usize)] {
        match self {
            SignalLayout::V1 => V1_PREDICATES,
            SignalLayout::V1All => V1_ALL_PREDICATES,
            SignalLayout::V2 => V2_PREDICATES,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalLayout::V1 => "v1",
            SignalLayout::V1All => "v1_all",
            SignalLayout::V2 => "v2",
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|layout| layout.signal_count() == len)
    }

    /// Picks the layout for a vector of `len` signals. A declared layout
    /// wins but must agree with the length.
    pub fn resolve(declared: Option<Self>, len: usize) -> Result<Self, LayoutError> {
        match declared {
            Some(layout) if layout.signal_count() == len => Ok(layout),
            Some(layout) => Err(LayoutError::LengthMismatch {
                layout,
                expected: layout.signal_count(),
                actual: len,
            }),
            None => Self::from_len(len).ok_or(LayoutError::UnsupportedLength(len)),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("no signal layout has {0} entries")]
    UnsupportedLength(usize),
    #[error("layout {} expects {expected} signals, got {actual}", .layout.as_str())]
    LengthMismatch {
        layout: SignalLayout,
        expected: usize,
        actual: usize,
    },
    #[error("public signal {index} is not a field element: {source}")]
    InvalidSignal {
        index: usize,
        #[source]
        source: FieldError,
    },
}

/// A public signal as it appears in client JSON: decimal text or a plain
/// non-negative integer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSignal {
    Text(String),
    Number(u64),
}

impl RawSignal {
    fn to_field(&self) -> Result<FieldString, FieldError> {
        match self {
            RawSignal::Text(text) => decimal_to_field(text),
            RawSignal::Number(n) => Ok(field_from_u64(*n)),
        }
    }
}

impl From<&str> for RawSignal {
    fn from(value: &str) -> Self {
        RawSignal::Text(value.to_string())
    }
}

/// A public-signal vector with its layout resolved and every entry reduced
/// to canonical field form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicSignals {
    layout: SignalLayout,
    values: Vec<FieldString>,
}

impl PublicSignals {
    pub fn parse(raw: &[RawSignal], declared: Option<SignalLayout>) -> Result<Self, LayoutError> {
        let layout = SignalLayout::resolve(declared, raw.len())?;
        let values = raw
            .iter()
            .enumerate()
            .map(|(index, signal)| {
                signal
                    .to_field()
                    .map_err(|source| LayoutError::InvalidSignal { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { layout, values })
    }

    pub fn layout(&self) -> SignalLayout {
        self.layout
    }

    pub fn values(&self) -> &[FieldString] {
        &self.values
    }

    /// Canonical decimal strings in signal order, as handed to the oracle.
    pub fn to_strings(&self) -> Vec<String> {
        self.values.iter().map(|v| v.as_str().to_string()).collect()
    }

    pub fn nonce(&self) -> &FieldString {
        &self.values[SIGNAL_NONCE]
    }

    pub fn origin(&self) -> &FieldString {
        &self.values[SIGNAL_ORIGIN]
    }

    pub fn now_year(&self) -> &FieldString {
        &self.values[SIGNAL_NOW_YEAR]
    }

    /// The mask signal as an integer; `None` when it does not fit in `u64`.
    pub fn mask(&self) -> Option<u64> {
        self.values[SIGNAL_MASK].to_u64()
    }

    pub fn commitment(&self) -> &FieldString {
        &self.values[SIGNAL_COMMITMENT]
    }

    pub fn nullifier(&self) -> &FieldString {
        &self.values[SIGNAL_NULLIFIER]
    }

    /// Decodes the layout's predicate bits (a bit holds iff its signal is
    /// exactly `1`) and derives `any`.
    pub fn predicates(&self) -> PredicateSet {
        let mut set: PredicateSet = self
            .layout
            .predicate_slots()
            .iter()
            .map(|(name, index)| (name.to_string(), self.values[*index].is_one()))
            .collect();
        set.recompute_any();
        set
    }
}
