use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use anyhow::{anyhow, ensure, Context, Result};
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::PrimeField;
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{OracleError, ProofOracle};

/// snarkjs `verification_key.json`.
#[derive(Deserialize)]
struct SnarkjsVerificationKey {
    protocol: String,
    curve: String,
    #[serde(rename = "nPublic")]
    n_public: usize,
    vk_alpha_1: Vec<String>,
    vk_beta_2: Vec<Vec<String>>,
    vk_gamma_2: Vec<Vec<String>>,
    vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    ic: Vec<Vec<String>>,
}

/// snarkjs `proof.json`.
#[derive(Deserialize)]
struct SnarkjsProof {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
    #[serde(default)]
    protocol: Option<String>,
}

/// Groth16 verifier over a snarkjs verification key.
///
/// The key is read from disk on first use. While the file is missing every
/// call reports [`OracleError::NotReady`] and the next call tries again, so
/// the service can start before the circuit artifacts are deployed.
pub struct Groth16Oracle {
    key_path: Option<PathBuf>,
    prepared: RwLock<Option<Arc<PreparedVerifyingKey<Bn254>>>>,
}

impl Groth16Oracle {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: Some(path.into()),
            prepared: RwLock::new(None),
        }
    }

    pub fn from_verifying_key(vk: &VerifyingKey<Bn254>) -> Self {
        Self {
            key_path: None,
            prepared: RwLock::new(Some(Arc::new(prepare_verifying_key(vk)))),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let vk = verifying_key_from_json(raw)?;
        Ok(Self::from_verifying_key(&vk))
    }

    pub fn key_path(&self) -> Option<&Path> {
        self.key_path.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.prepared
            .read()
            .expect("verifying key lock poisoned")
            .is_some()
    }

    /// Loads the key if it is not loaded yet.
    pub fn ensure_loaded(&self) -> Result<(), OracleError> {
        self.prepared_key().map(|_| ())
    }

    fn prepared_key(&self) -> Result<Arc<PreparedVerifyingKey<Bn254>>, OracleError> {
        if let Some(pvk) = self
            .prepared
            .read()
            .expect("verifying key lock poisoned")
            .as_ref()
        {
            return Ok(Arc::clone(pvk));
        }

        let path = self
            .key_path
            .as_deref()
            .ok_or_else(|| OracleError::NotReady("no verification key configured".into()))?;
        let raw = fs::read_to_string(path)
            .map_err(|err| OracleError::NotReady(format!("{}: {err}", path.display())))?;
        let vk = verifying_key_from_json(&raw)
            .map_err(|err| OracleError::InvalidKey(format!("{}: {err:#}", path.display())))?;

        let mut guard = self.prepared.write().expect("verifying key lock poisoned");
        let pvk = guard.get_or_insert_with(|| Arc::new(prepare_verifying_key(&vk)));
        Ok(Arc::clone(pvk))
    }
}

impl ProofOracle for Groth16Oracle {
    fn verify(&self, public_signals: &[String], proof: &JsonValue) -> Result<bool, OracleError> {
        let pvk = self.prepared_key()?;

        let Ok(proof) = proof_from_json(proof) else {
            return Ok(false);
        };
        if public_signals.len() + 1 != pvk.vk.gamma_abc_g1.len() {
            return Ok(false);
        }
        let Ok(inputs) = public_signals
            .iter()
            .map(|signal| parse_fr(signal))
            .collect::<Result<Vec<_>>>()
        else {
            return Ok(false);
        };

        Ok(Groth16::<Bn254>::verify_proof(&pvk, &proof, &inputs).unwrap_or(false))
    }
}

pub fn verifying_key_from_json(raw: &str) -> Result<VerifyingKey<Bn254>> {
    let vk: SnarkjsVerificationKey =
        serde_json::from_str(raw).context("verification key is not snarkjs JSON")?;
    ensure!(
        vk.protocol.eq_ignore_ascii_case("groth16"),
        "unsupported protocol {:?}",
        vk.protocol
    );
    ensure!(
        matches!(vk.curve.to_ascii_lowercase().as_str(), "bn128" | "bn254"),
        "unsupported curve {:?}",
        vk.curve
    );
    ensure!(
        vk.ic.len() == vk.n_public + 1,
        "IC has {} points for {} public inputs",
        vk.ic.len(),
        vk.n_public
    );

    let gamma_abc_g1 = vk
        .ic
        .iter()
        .enumerate()
        .map(|(i, point)| parse_g1(point).with_context(|| format!("IC[{i}]")))
        .collect::<Result<Vec<_>>>()?;

    Ok(VerifyingKey {
        alpha_g1: parse_g1(&vk.vk_alpha_1).context("vk_alpha_1")?,
        beta_g2: parse_g2(&vk.vk_beta_2).context("vk_beta_2")?,
        gamma_g2: parse_g2(&vk.vk_gamma_2).context("vk_gamma_2")?,
        delta_g2: parse_g2(&vk.vk_delta_2).context("vk_delta_2")?,
        gamma_abc_g1,
    })
}

fn proof_from_json(value: &JsonValue) -> Result<Proof<Bn254>> {
    let proof = SnarkjsProof::deserialize(value).context("proof is not snarkjs JSON")?;
    if let Some(protocol) = &proof.protocol {
        ensure!(
            protocol.eq_ignore_ascii_case("groth16"),
            "unsupported protocol {protocol:?}"
        );
    }
    Ok(Proof {
        a: parse_g1(&proof.pi_a).context("pi_a")?,
        b: parse_g2(&proof.pi_b).context("pi_b")?,
        c: parse_g1(&proof.pi_c).context("pi_c")?,
    })
}

fn parse_decimal(value: &str) -> Result<BigUint> {
    let trimmed = value.trim();
    ensure!(
        !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()),
        "not a decimal integer: {value:?}"
    );
    BigUint::parse_bytes(trimmed.as_bytes(), 10).ok_or_else(|| anyhow!("not a decimal integer"))
}

fn parse_fq(value: &str) -> Result<Fq> {
    let n = parse_decimal(value)?;
    ensure!(n < BigUint::from(Fq::MODULUS), "coordinate exceeds base field");
    Ok(Fq::from(n))
}

fn parse_fr(value: &str) -> Result<Fr> {
    let n = parse_decimal(value)?;
    ensure!(n < BigUint::from(Fr::MODULUS), "public input exceeds scalar field");
    Ok(Fr::from(n))
}

fn parse_fq2(pair: &[String]) -> Result<Fq2> {
    ensure!(pair.len() == 2, "expected [c0, c1]");
    Ok(Fq2::new(parse_fq(&pair[0])?, parse_fq(&pair[1])?))
}

/// `[x, y, z]` in affine form; `z` is `1`, or `0` for the point at infinity.
fn parse_g1(coords: &[String]) -> Result<G1Affine> {
    ensure!(
        coords.len() == 2 || coords.len() == 3,
        "expected 2 or 3 G1 coordinates"
    );
    if let Some(z) = coords.get(2) {
        match z.trim() {
            "0" => return Ok(G1Affine::identity()),
            "1" => {}
            other => return Err(anyhow!("non-affine G1 point (z = {other})")),
        }
    }
    let point = G1Affine::new_unchecked(parse_fq(&coords[0])?, parse_fq(&coords[1])?);
    ensure!(
        point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve(),
        "G1 point not in group"
    );
    Ok(point)
}

fn parse_g2(coords: &[Vec<String>]) -> Result<G2Affine> {
    ensure!(
        coords.len() == 2 || coords.len() == 3,
        "expected 2 or 3 G2 coordinates"
    );
    if let Some(z) = coords.get(2) {
        let z = parse_fq2(z)?;
        if z == Fq2::from(0u64) {
            return Ok(G2Affine::identity());
        }
        ensure!(z == Fq2::from(1u64), "non-affine G2 point");
    }
    let point = G2Affine::new_unchecked(parse_fq2(&coords[0])?, parse_fq2(&coords[1])?);
    ensure!(
        point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve(),
        "G2 point not in group"
    );
    Ok(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::Field;
    use ark_groth16::ProvingKey;
    use ark_relations::{
        lc,
        r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError, Variable},
    };
    use ark_std::rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    /// Public inputs `[square, tag]`; proves knowledge of `root` with
    /// `root * root = square`.
    #[derive(Clone)]
    struct SquareCircuit {
        root: Option<Fr>,
        square: Option<Fr>,
        tag: Option<Fr>,
    }

    impl ConstraintSynthesizer<Fr> for SquareCircuit {
        fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
            let square =
                cs.new_input_variable(|| self.square.ok_or(SynthesisError::AssignmentMissing))?;
            let tag = cs.new_input_variable(|| self.tag.ok_or(SynthesisError::AssignmentMissing))?;
            let root =
                cs.new_witness_variable(|| self.root.ok_or(SynthesisError::AssignmentMissing))?;
            cs.enforce_constraint(lc!() + root, lc!() + root, lc!() + square)?;
            cs.enforce_constraint(lc!() + tag, lc!() + Variable::One, lc!() + tag)?;
            Ok(())
        }
    }

    struct Fixture {
        pk: ProvingKey<Bn254>,
        proof: JsonValue,
        signals: Vec<String>,
    }

    fn fq_dec(value: Fq) -> String {
        BigUint::from(value.into_bigint()).to_str_radix(10)
    }

    fn g1_json(point: &G1Affine) -> JsonValue {
        json!([fq_dec(point.x), fq_dec(point.y), "1"])
    }

    fn g2_json(point: &G2Affine) -> JsonValue {
        json!([
            [fq_dec(point.x.c0), fq_dec(point.x.c1)],
            [fq_dec(point.y.c0), fq_dec(point.y.c1)],
            ["1", "0"]
        ])
    }

    fn vk_json(vk: &VerifyingKey<Bn254>) -> String {
        json!({
            "protocol": "groth16",
            "curve": "bn128",
            "nPublic": vk.gamma_abc_g1.len() - 1,
            "vk_alpha_1": g1_json(&vk.alpha_g1),
            "vk_beta_2": g2_json(&vk.beta_g2),
            "vk_gamma_2": g2_json(&vk.gamma_g2),
            "vk_delta_2": g2_json(&vk.delta_g2),
            "IC": vk.gamma_abc_g1.iter().map(g1_json).collect::<Vec<_>>(),
        })
        .to_string()
    }

    fn fixture() -> Fixture {
        let mut rng = StdRng::seed_from_u64(7);
        let blank = SquareCircuit {
            root: None,
            square: None,
            tag: None,
        };
        let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(blank, &mut rng)
            .unwrap();

        let root = Fr::from(12u64);
        let circuit = SquareCircuit {
            root: Some(root),
            square: Some(root.square()),
            tag: Some(Fr::from(5u64)),
        };
        let proof =
            Groth16::<Bn254>::create_random_proof_with_reduction(circuit, &pk, &mut rng).unwrap();

        Fixture {
            pk,
            proof: json!({
                "pi_a": g1_json(&proof.a),
                "pi_b": g2_json(&proof.b),
                "pi_c": g1_json(&proof.c),
                "protocol": "groth16",
                "curve": "bn128",
            }),
            signals: vec!["144".to_string(), "5".to_string()],
        }
    }

    #[test]
    fn scalar_field_matches_codec_prime() {
        assert_eq!(
            BigUint::from(Fr::MODULUS).to_str_radix(10),
            zkcookie_common::SNARK_FIELD_PRIME
        );
    }

    #[test]
    fn verifies_snarkjs_shaped_proof() {
        let fx = fixture();
        let oracle = Groth16Oracle::from_json(&vk_json(&fx.pk.vk)).unwrap();
        assert!(oracle.is_ready());
        assert_eq!(oracle.verify(&fx.signals, &fx.proof), Ok(true));
    }

    #[test]
    fn altered_public_input_fails() {
        let fx = fixture();
        let oracle = Groth16Oracle::from_verifying_key(&fx.pk.vk);
        let tampered = vec!["144".to_string(), "6".to_string()];
        assert_eq!(oracle.verify(&tampered, &fx.proof), Ok(false));
        let swapped = vec!["5".to_string(), "144".to_string()];
        assert_eq!(oracle.verify(&swapped, &fx.proof), Ok(false));
    }

    #[test]
    fn malformed_proofs_are_false_not_errors() {
        let fx = fixture();
        let oracle = Groth16Oracle::from_verifying_key(&fx.pk.vk);

        assert_eq!(oracle.verify(&fx.signals, &json!({})), Ok(false));
        assert_eq!(oracle.verify(&fx.signals, &json!("proof")), Ok(false));

        let mut off_curve = fx.proof.clone();
        off_curve["pi_a"] = json!(["1", "3", "1"]);
        assert_eq!(oracle.verify(&fx.signals, &off_curve), Ok(false));

        let mut oversized = fx.proof.clone();
        oversized["pi_c"][0] = json!(zkcookie_common::SNARK_FIELD_PRIME.repeat(2));
        assert_eq!(oracle.verify(&fx.signals, &oversized), Ok(false));
    }

    #[test]
    fn wrong_signal_count_is_false() {
        let fx = fixture();
        let oracle = Groth16Oracle::from_verifying_key(&fx.pk.vk);
        assert_eq!(oracle.verify(&fx.signals[..1], &fx.proof), Ok(false));
    }

    #[test]
    fn missing_key_is_not_ready_until_deployed() {
        let fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verification_key.json");
        let oracle = Groth16Oracle::from_path(&path);

        assert!(matches!(
            oracle.verify(&fx.signals, &fx.proof),
            Err(OracleError::NotReady(_))
        ));
        assert!(!oracle.is_ready());

        fs::write(&path, vk_json(&fx.pk.vk)).unwrap();
        assert_eq!(oracle.verify(&fx.signals, &fx.proof), Ok(true));
        assert!(oracle.is_ready());
    }

    #[test]
    fn garbage_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verification_key.json");
        fs::write(&path, r#"{"protocol":"plonk"}"#).unwrap();
        let oracle = Groth16Oracle::from_path(&path);
        assert!(matches!(
            oracle.ensure_loaded(),
            Err(OracleError::InvalidKey(_))
        ));
    }
}
