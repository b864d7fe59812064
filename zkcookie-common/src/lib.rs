//! Shared encodings for the zkcookie protocol: BN254 field strings, the
//! public-signal layouts produced by the cookie circuit, and the predicate
//! set a verified proof turns into.

pub mod field;
pub mod layout;
pub mod predicates;

pub use field::{
    canonical_host, decimal_to_field, field_from_bytes, field_from_u64, hex_to_field,
    origin_to_field, to_field, FieldError, FieldInput, FieldString, SNARK_FIELD_PRIME,
};
pub use layout::{LayoutError, PublicSignals, RawSignal, SignalLayout};
pub use predicates::{is_interest_key, PredicateSet, INTEREST_KEYS};

/// Largest category bitmask a challenge may bind.
pub const MAX_CATEGORY_MASK: u64 = 0xFFFF;
