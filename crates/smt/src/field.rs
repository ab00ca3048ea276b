//! BN254 scalar field helpers
//!
//! Values are carried as 256-bit unsigned integers rather than reduced field
//! elements, so that out-of-range inputs can be flagged (or tolerated) by the
//! configured [`FieldCheckMode`] instead of being silently reduced.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::SmtError;

/// BN254 scalar field modulus
/// `21888242871839275222246405745257275088548364400416034343698204186575808495617`.
pub const MODULUS: U256 = U256::from_limbs([
    0x43e1_f593_f000_0001,
    0x2833_e848_79b9_7091,
    0xb850_45b6_8181_585d,
    0x3064_4e72_e131_a029,
]);

/// Returns whether `n` is a canonical field element (`n < p`).
pub fn is_in_field(n: &FieldElement) -> bool {
    n.0 < MODULUS
}

/// How out-of-range values are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCheckMode {
    /// Reject values `>= p`
    #[default]
    Strict,
    /// Log values `>= p` and keep going
    Warn,
    /// No check at all
    Disabled,
}

impl FieldCheckMode {
    /// Lowercase name, as accepted by [`FromStr`].
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Warn => "warn",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for FieldCheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldCheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "warn" => Ok(Self::Warn),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown field check mode: {other}")),
        }
    }
}

/// Apply `mode` to `n`.
///
/// Only [`FieldCheckMode::Strict`] can fail; under [`FieldCheckMode::Warn`]
/// the violation is logged and the value is accepted unchanged.
pub fn check_field(n: &FieldElement, mode: FieldCheckMode) -> Result<(), SmtError> {
    if mode == FieldCheckMode::Disabled || is_in_field(n) {
        return Ok(());
    }
    match mode {
        FieldCheckMode::Strict => Err(SmtError::FieldRange(*n)),
        _ => {
            warn!(value = %n, "value is not in the field");
            Ok(())
        }
    }
}

/// A (possibly out-of-range) BN254 scalar.
///
/// Displays and serializes as a decimal string. [`FieldElement::to_hex`]
/// gives the fixed-width big-endian form used in API responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(U256);

impl FieldElement {
    /// Zero
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wrap a raw integer.
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// The underlying integer
    pub const fn as_u256(&self) -> &U256 {
        &self.0
    }

    /// 32-byte big-endian encoding
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes::<32>()
    }

    /// Decode 32 big-endian bytes.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(U256::from_be_bytes(bytes))
    }

    /// `0x`-prefixed, zero-padded 64 digit hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_be_bytes()))
    }

    /// Parse a hex string with or without a single `0x`, at most 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() {
            return Err(format!("empty hex value {s:?}"));
        }
        let padded = if digits.len() % 2 == 1 { format!("0{digits}") } else { digits.to_string() };
        let bytes = hex::decode(&padded).map_err(|e| format!("invalid hex {s:?}: {e}"))?;
        if bytes.len() > 32 {
            return Err(format!("hex value {s:?} is wider than 32 bytes"));
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Self::from_be_bytes(out))
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for FieldElement {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decimal only. Hex input goes through [`FieldElement::from_hex`].
impl FromStr for FieldElement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("not a decimal integer: {s:?}"));
        }
        U256::from_str_radix(s, 10)
            .map(Self)
            .map_err(|e| format!("invalid integer {s:?}: {e}"))
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
