//! Field hash primitive for the SMT
//!
//! The tree never talks to a hash library directly. It goes through
//! [`FieldHasher`], which enforces arity and the field policy and then calls
//! an injected [`HashBackend`]. The default backend is circom-compatible
//! Poseidon over BN254, which is what the registration circuit is bound to.

use std::fmt;
use std::sync::Arc;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::error::SmtError;
use crate::field::{check_field, FieldCheckMode, FieldElement};

/// Largest number of inputs a single hash call accepts.
pub const MAX_HASH_INPUTS: usize = 16;

/// A deterministic hash over field elements.
///
/// Implementations must be pure: the same inputs always give the same output,
/// across processes, or roots stop being comparable.
pub trait HashBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Hash `inputs` (already arity- and policy-checked).
    fn hash(&self, inputs: &[FieldElement]) -> Result<FieldElement, String>;
}

/// Poseidon with the circomlib parameterization.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoseidonBackend;

impl HashBackend for PoseidonBackend {
    fn name(&self) -> &'static str {
        "poseidon-bn254"
    }

    fn hash(&self, inputs: &[FieldElement]) -> Result<FieldElement, String> {
        let mut poseidon = Poseidon::<Fr>::new_circom(inputs.len()).map_err(|e| e.to_string())?;
        // Out-of-range inputs only get here under warn/disabled; circomlibjs
        // reduces them mod p as well.
        let frs: Vec<Fr> =
            inputs.iter().map(|v| Fr::from_be_bytes_mod_order(&v.to_be_bytes())).collect();
        let out = poseidon.hash(&frs).map_err(|e| e.to_string())?;
        let bytes: [u8; 32] = out
            .into_bigint()
            .to_bytes_be()
            .try_into()
            .map_err(|_| "poseidon output is not 32 bytes".to_string())?;
        Ok(FieldElement::from_be_bytes(bytes))
    }
}

/// Policy-enforcing hasher shared by every tree.
#[derive(Clone)]
pub struct FieldHasher {
    backend: Arc<dyn HashBackend>,
    mode: FieldCheckMode,
}

impl FieldHasher {
    /// Wrap `backend` with the given field policy.
    pub fn new(backend: Arc<dyn HashBackend>, mode: FieldCheckMode) -> Self {
        Self { backend, mode }
    }

    /// Poseidon-backed hasher
    pub fn poseidon(mode: FieldCheckMode) -> Self {
        Self::new(Arc::new(PoseidonBackend), mode)
    }

    /// The field policy in force
    pub const fn mode(&self) -> FieldCheckMode {
        self.mode
    }

    /// Backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Apply the field policy to a single value.
    pub fn check(&self, value: &FieldElement) -> Result<(), SmtError> {
        check_field(value, self.mode)
    }

    /// Hash 1..=16 field elements.
    pub fn hash(&self, inputs: &[FieldElement]) -> Result<FieldElement, SmtError> {
        if inputs.is_empty() || inputs.len() > MAX_HASH_INPUTS {
            return Err(SmtError::InputArity { got: inputs.len(), max: MAX_HASH_INPUTS });
        }
        for input in inputs {
            self.check(input)?;
        }
        self.backend.hash(inputs).map_err(SmtError::HashBackend)
    }

    /// Hash two children into their parent.
    pub fn hash_pair(&self, left: &FieldElement, right: &FieldElement) -> Result<FieldElement, SmtError> {
        self.hash(&[*left, *right])
    }
}

impl fmt::Debug for FieldHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHasher")
            .field("backend", &self.backend.name())
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::MODULUS;

    #[test]
    fn test_poseidon_circomlib_vector() {
        let hasher = FieldHasher::poseidon(FieldCheckMode::Strict);
        let out = hasher.hash_pair(&FieldElement::from(1), &FieldElement::from(2)).unwrap();
        assert_eq!(
            out.to_string(),
            "7853200120776062878684798364095072458815029376092732009249414926327459813530"
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = FieldHasher::poseidon(FieldCheckMode::Strict);
        let a = hasher.hash(&[FieldElement::ZERO]).unwrap();
        let b = hasher.hash(&[FieldElement::ZERO]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, FieldElement::ZERO);
    }

    #[test]
    fn test_arity_bounds() {
        let hasher = FieldHasher::poseidon(FieldCheckMode::Strict);
        let inputs = vec![FieldElement::from(1); MAX_HASH_INPUTS + 1];
        assert_eq!(
            hasher.hash(&inputs),
            Err(SmtError::InputArity { got: 17, max: MAX_HASH_INPUTS })
        );
        assert!(matches!(hasher.hash(&[]), Err(SmtError::InputArity { got: 0, .. })));
    }

    #[test]
    fn test_out_of_field_input_follows_policy() {
        let p = FieldElement::new(MODULUS);
        let strict = FieldHasher::poseidon(FieldCheckMode::Strict);
        assert_eq!(strict.hash(&[p]), Err(SmtError::FieldRange(p)));

        // p reduces to zero, so under warn it hashes like zero does
        let warn = FieldHasher::poseidon(FieldCheckMode::Warn);
        assert_eq!(warn.hash(&[p]).unwrap(), warn.hash(&[FieldElement::ZERO]).unwrap());
    }
}
