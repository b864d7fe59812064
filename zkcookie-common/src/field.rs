//! Canonical BN254 scalar-field encodings shared by the server and provers.
//!
//! Every value that crosses the prover boundary (nonces, origin identifiers,
//! masks, public signals) is carried as a reduced decimal string so that both
//! sides compare the exact same text.

use std::fmt;

use num_bigint::BigUint;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Order of the BN254 scalar field (the `r` used by circom/snarkjs).
pub const SNARK_FIELD_PRIME: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

static PRIME: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(SNARK_FIELD_PRIME.as_bytes(), 10).expect("field prime literal is decimal")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("invalid field input: {0}")]
    InvalidInput(String),
}

/// A field element rendered as its canonical (reduced, no leading zeros)
/// decimal string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldString(String);

impl FieldString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets the element as a small integer, if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        self.0.parse::<u64>().ok()
    }

    pub fn is_one(&self) -> bool {
        self.0 == "1"
    }

    fn from_reduced(value: &BigUint) -> Self {
        Self((value % &*PRIME).to_str_radix(10))
    }
}

impl fmt::Display for FieldString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldString {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        decimal_to_field(&value)
    }
}

impl From<FieldString> for String {
    fn from(value: FieldString) -> Self {
        value.0
    }
}

/// Application values accepted by [`to_field`].
#[derive(Clone, Copy, Debug)]
pub enum FieldInput<'a> {
    Integer(u128),
    /// Hex digits, with or without a `0x` prefix.
    Hex(&'a str),
    Decimal(&'a str),
    /// Big-endian bytes, e.g. a digest.
    Bytes(&'a [u8]),
}

/// Reduces an application value modulo the field prime.
pub fn to_field(input: FieldInput<'_>) -> Result<FieldString, FieldError> {
    match input {
        FieldInput::Integer(value) => Ok(FieldString::from_reduced(&BigUint::from(value))),
        FieldInput::Hex(hex) => hex_to_field(hex),
        FieldInput::Decimal(dec) => decimal_to_field(dec),
        FieldInput::Bytes(bytes) => Ok(field_from_bytes(bytes)),
    }
}

/// Big-endian bytes reduced into the field.
pub fn field_from_bytes(bytes: &[u8]) -> FieldString {
    FieldString::from_reduced(&BigUint::from_bytes_be(bytes))
}

pub fn field_from_u64(value: u64) -> FieldString {
    FieldString::from_reduced(&BigUint::from(value))
}

pub fn hex_to_field(hex: &str) -> Result<FieldString, FieldError> {
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FieldError::InvalidInput(format!("not a hex value: {hex:?}")));
    }
    let value = BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| FieldError::InvalidInput(format!("not a hex value: {hex:?}")))?;
    Ok(FieldString::from_reduced(&value))
}

pub fn decimal_to_field(dec: &str) -> Result<FieldString, FieldError> {
    let digits = dec.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::InvalidInput(format!(
            "not a decimal value: {dec:?}"
        )));
    }
    let value = BigUint::parse_bytes(digits.as_bytes(), 10)
        .ok_or_else(|| FieldError::InvalidInput(format!("not a decimal value: {dec:?}")))?;
    Ok(FieldString::from_reduced(&value))
}

/// Canonical hostname for origin binding: scheme, port, path and userinfo
/// are dropped and the authority is lower-cased.
pub fn canonical_host(host: &str) -> Result<String, FieldError> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(FieldError::InvalidInput("empty host".into()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&candidate)
        .map_err(|err| FieldError::InvalidInput(format!("invalid host {host:?}: {err}")))?;
    match url.host_str() {
        Some(hostname) if !hostname.is_empty() => Ok(hostname.to_ascii_lowercase()),
        _ => Err(FieldError::InvalidInput(format!("invalid host {host:?}"))),
    }
}

/// `sha256(canonical_host(host)) mod p`.
pub fn origin_to_field(host: &str) -> Result<FieldString, FieldError> {
    let hostname = canonical_host(host)?;
    let digest = Sha256::digest(hostname.as_bytes());
    Ok(field_from_bytes(digest.as_slice()))
}
