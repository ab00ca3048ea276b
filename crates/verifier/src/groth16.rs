//! Groth16 verification over BN254 with snarkjs-format keys and proofs

use std::fs;
use std::path::Path;
use std::str::FromStr;

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_ff::{BigInteger, One, PrimeField, Zero};
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use num_bigint::BigUint;
use registry_core::{Groth16Proof, ProofVerifier, PublicSignals};
use registry_smt::FieldElement;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::VerifierError;

/// `verification_key.json` as written by `snarkjs zkey export verificationkey`.
///
/// Points are projective with decimal coordinates; G2 coordinates are
/// `[c0, c1]` pairs.
#[derive(Clone, Debug, Deserialize)]
pub struct SnarkjsVerifyingKey {
    /// Always `"groth16"`
    pub protocol: String,
    /// `"bn128"`
    pub curve: String,
    /// Number of public inputs
    #[serde(rename = "nPublic")]
    pub n_public: usize,
    /// G1 point alpha
    pub vk_alpha_1: Vec<String>,
    /// G2 point beta
    pub vk_beta_2: Vec<Vec<String>>,
    /// G2 point gamma
    pub vk_gamma_2: Vec<Vec<String>>,
    /// G2 point delta
    pub vk_delta_2: Vec<Vec<String>>,
    /// Input commitments, `n_public + 1` G1 points
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<String>>,
}

impl SnarkjsVerifyingKey {
    /// Parse the JSON text of a key file.
    pub fn from_json(raw: &str) -> Result<Self, VerifierError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Convert to an arkworks key, checking every point.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey<Bn254>, VerifierError> {
        if self.protocol != "groth16" {
            return Err(VerifierError::InvalidKey(format!("unsupported protocol {:?}", self.protocol)));
        }
        if self.curve != "bn128" && self.curve != "bn254" {
            return Err(VerifierError::InvalidKey(format!("unsupported curve {:?}", self.curve)));
        }
        if self.ic.len() != self.n_public + 1 {
            return Err(VerifierError::InvalidKey(format!(
                "{} IC points for {} public inputs",
                self.ic.len(),
                self.n_public
            )));
        }
        let invalid = |what: &str, e: PointError| VerifierError::InvalidKey(format!("{what}: {e}"));
        let gamma_abc_g1 = self
            .ic
            .iter()
            .enumerate()
            .map(|(i, point)| parse_g1(point).map_err(|e| invalid(&format!("IC[{i}]"), e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VerifyingKey {
            alpha_g1: parse_g1(&self.vk_alpha_1).map_err(|e| invalid("vk_alpha_1", e))?,
            beta_g2: parse_g2(&self.vk_beta_2).map_err(|e| invalid("vk_beta_2", e))?,
            gamma_g2: parse_g2(&self.vk_gamma_2).map_err(|e| invalid("vk_gamma_2", e))?,
            delta_g2: parse_g2(&self.vk_delta_2).map_err(|e| invalid("vk_delta_2", e))?,
            gamma_abc_g1,
        })
    }
}

/// Why a coordinate list is not a usable point.
#[derive(Debug)]
pub struct PointError(String);

impl std::fmt::Display for PointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_fq(s: &str) -> Result<Fq, PointError> {
    let n = BigUint::from_str(s).map_err(|_| PointError(format!("{s:?} is not a decimal integer")))?;
    if n >= BigUint::from(Fq::MODULUS) {
        return Err(PointError(format!("{s} is not a base field element")));
    }
    Ok(Fq::from(n))
}

fn parse_fq2(pair: &[String]) -> Result<Fq2, PointError> {
    match pair {
        [c0, c1] => Ok(Fq2::new(parse_fq(c0)?, parse_fq(c1)?)),
        _ => Err(PointError(format!("expected 2 coordinates, got {}", pair.len()))),
    }
}

/// `[x, y, z]` with `z` either 1 (affine) or 0 (identity).
fn parse_g1(coords: &[String]) -> Result<G1Affine, PointError> {
    let [x, y, z] = coords else {
        return Err(PointError(format!("expected 3 coordinates, got {}", coords.len())));
    };
    let z = parse_fq(z)?;
    if z.is_zero() {
        return Ok(<G1Affine as AffineRepr>::zero());
    }
    if !z.is_one() {
        return Err(PointError("point is not normalized".into()));
    }
    let point = G1Affine::new_unchecked(parse_fq(x)?, parse_fq(y)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PointError("point is not in G1".into()));
    }
    Ok(point)
}

fn parse_g2(coords: &[Vec<String>]) -> Result<G2Affine, PointError> {
    let [x, y, z] = coords else {
        return Err(PointError(format!("expected 3 coordinates, got {}", coords.len())));
    };
    let z = parse_fq2(z)?;
    if z.is_zero() {
        return Ok(<G2Affine as AffineRepr>::zero());
    }
    if !z.is_one() {
        return Err(PointError("point is not normalized".into()));
    }
    let point = G2Affine::new_unchecked(parse_fq2(x)?, parse_fq2(y)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PointError("point is not in G2".into()));
    }
    Ok(point)
}

/// Convert a snarkjs proof into arkworks points.
pub fn parse_proof(proof: &Groth16Proof) -> Result<Proof<Bn254>, PointError> {
    let b: Vec<Vec<String>> = proof.pi_b.iter().map(|pair| pair.to_vec()).collect();
    Ok(Proof { a: parse_g1(&proof.pi_a)?, b: parse_g2(&b)?, c: parse_g1(&proof.pi_c)? })
}

/// Public signals as scalar field elements; `None` if any is `>= r`.
fn to_scalars(signals: &PublicSignals) -> Option<Vec<Fr>> {
    let modulus = BigUint::from(Fr::MODULUS);
    signals
        .as_slice()
        .iter()
        .map(|signal| {
            let n = BigUint::from_bytes_be(&signal.to_be_bytes());
            (n < modulus).then(|| Fr::from(n))
        })
        .collect()
}

/// Groth16 verifier with a prepared BN254 key.
pub struct Groth16Verifier {
    pvk: PreparedVerifyingKey<Bn254>,
    n_public: usize,
}

impl std::fmt::Debug for Groth16Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Groth16Verifier").field("n_public", &self.n_public).finish_non_exhaustive()
    }
}

impl Groth16Verifier {
    /// Prepare `vk` for repeated verification.
    pub fn new(vk: &VerifyingKey<Bn254>) -> Self {
        Self { pvk: prepare_verifying_key(vk), n_public: vk.gamma_abc_g1.len().saturating_sub(1) }
    }

    /// Load a snarkjs `verification_key.json`.
    pub fn from_file(path: &Path) -> Result<Self, VerifierError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| VerifierError::Io { path: path.to_path_buf(), source })?;
        let key = SnarkjsVerifyingKey::from_json(&raw)?;
        let verifier = Self::new(&key.to_verifying_key()?);
        info!(path = %path.display(), public_inputs = verifier.n_public, "loaded Groth16 verification key");
        Ok(verifier)
    }

    /// Number of public signals a proof must carry
    pub const fn public_inputs(&self) -> usize {
        self.n_public
    }
}

impl ProofVerifier for Groth16Verifier {
    fn name(&self) -> &'static str {
        "groth16"
    }

    fn verify(&self, proof: &Groth16Proof, signals: &PublicSignals) -> anyhow::Result<bool> {
        if signals.len() != self.n_public {
            warn!(expected = self.n_public, got = signals.len(), "public signal count mismatch");
            return Ok(false);
        }
        let Some(inputs) = to_scalars(signals) else {
            warn!("public signal outside the scalar field");
            return Ok(false);
        };
        let proof = match parse_proof(proof) {
            Ok(proof) => proof,
            Err(e) => {
                warn!(error = %e, "proof points rejected");
                return Ok(false);
            }
        };
        let valid = Groth16::<Bn254>::verify_proof(&self.pvk, &proof, &inputs)
            .map_err(|e| anyhow::anyhow!("groth16 verification could not run: {e}"))?;
        debug!(valid, "groth16 verification");
        Ok(valid)
    }
}

/// Render a scalar as the decimal string snarkjs would use.
pub fn scalar_to_signal(value: Fr) -> FieldElement {
    let bytes = value.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    FieldElement::from_be_bytes(out)
}
