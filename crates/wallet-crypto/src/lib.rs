//! wallet-crypto — secp256k1 primitives for the wallet core.
//!
//! Pieces:
//! - point/scalar codecs (33-byte SEC1 compressed, 32-byte big-endian)
//! - Pedersen commitments `k·G + a·H` over a derived value generator
//! - two-party Schnorr signing: each side contributes a blinding key and a
//!   nonce, exchanges signature shares, and verifies the counterparty's
//!   share against its public commitments before combining.

pub mod error;
pub mod transcript;

pub use error::CryptoError;
pub use k256::{ProjectivePoint, Scalar};
pub use transcript::{challenge, hash_to_scalar};

use k256::elliptic_curve::group::Group;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::{Field, PrimeField};
use k256::{AffinePoint, EncodedPoint};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::sync::OnceLock;

pub const POINT_SIZE: usize = 33;
pub const SCALAR_SIZE: usize = 32;

pub type PointBytes = [u8; POINT_SIZE];
pub type ScalarBytes = [u8; SCALAR_SIZE];

const VALUE_GENERATOR_TAG: &[u8] = b"wallet.value.generator.v1";

/// Compress to SEC1 bytes. The identity encodes as all-zero.
pub fn compress(point: &ProjectivePoint) -> PointBytes {
    let mut out = [0u8; POINT_SIZE];
    if bool::from(point.is_identity()) {
        return out;
    }
    let encoded = point.to_affine().to_encoded_point(true);
    out.copy_from_slice(encoded.as_bytes());
    out
}

pub fn decompress(bytes: &PointBytes) -> Result<ProjectivePoint, CryptoError> {
    if bytes.iter().all(|b| *b == 0) {
        return Ok(ProjectivePoint::IDENTITY);
    }
    let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| CryptoError::InvalidPoint)?;
    let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    affine
        .map(ProjectivePoint::from)
        .ok_or(CryptoError::InvalidPoint)
}

pub fn scalar_to_bytes(scalar: &Scalar) -> ScalarBytes {
    scalar.to_bytes().into()
}

pub fn scalar_from_bytes(bytes: &ScalarBytes) -> Result<Scalar, CryptoError> {
    let repr: k256::FieldBytes = (*bytes).into();
    let scalar: Option<Scalar> = Scalar::from_repr(repr).into();
    scalar.ok_or(CryptoError::InvalidScalar)
}

pub fn random_scalar() -> Scalar {
    Scalar::random(&mut OsRng)
}

/// Deterministic second generator with unknown discrete log relative to G,
/// derived by try-and-increment over Sha3-256 candidates.
pub fn hash_to_point(tag: &[u8]) -> ProjectivePoint {
    let mut counter: u32 = 0;
    loop {
        let digest = Sha3_256::new()
            .chain_update(tag)
            .chain_update(counter.to_le_bytes())
            .finalize();
        let mut candidate = [0u8; POINT_SIZE];
        candidate[0] = 0x02;
        candidate[1..].copy_from_slice(&digest);
        if let Ok(point) = decompress(&candidate) {
            if !bool::from(point.is_identity()) {
                return point;
            }
        }
        counter += 1;
    }
}

pub fn value_generator() -> &'static ProjectivePoint {
    static H: OnceLock<ProjectivePoint> = OnceLock::new();
    H.get_or_init(|| hash_to_point(VALUE_GENERATOR_TAG))
}

/// Pedersen commitment to an amount under a blinding key: `k·G + a·H`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Commitment(pub PointBytes);

impl Commitment {
    pub fn commit(key: &Scalar, amount: u64) -> Self {
        let point = ProjectivePoint::GENERATOR * key + *value_generator() * Scalar::from(amount);
        Commitment(compress(&point))
    }

    pub fn as_bytes(&self) -> &PointBytes {
        &self.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A secret scalar together with its public point. Used both for blinding
/// contributions and for signing nonces.
#[derive(Clone)]
pub struct KeyPair {
    pub secret: Scalar,
    pub public: ProjectivePoint,
}

impl KeyPair {
    pub fn random() -> Self {
        Self::from_secret(random_scalar())
    }

    pub fn from_secret(secret: Scalar) -> Self {
        let public = ProjectivePoint::GENERATOR * secret;
        KeyPair { secret, public }
    }

    pub fn public_bytes(&self) -> PointBytes {
        compress(&self.public)
    }
}

/// Finished Schnorr signature `(R, k)` over a 32-byte kernel message.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Signature {
    pub nonce: PointBytes,
    pub k: ScalarBytes,
}

/// One party's contribution: `s_i = r_i + e·x_i`.
pub fn sign_share(secret: &Scalar, nonce: &Scalar, challenge: &Scalar) -> Scalar {
    nonce + challenge * secret
}

/// Check a counterparty share against its public commitments:
/// `s_i·G == R_i + e·X_i`.
pub fn verify_share(
    share: &Scalar,
    challenge: &Scalar,
    public: &ProjectivePoint,
    public_nonce: &ProjectivePoint,
) -> bool {
    ProjectivePoint::GENERATOR * share == *public_nonce + *public * challenge
}

pub fn combine_shares(a: &Scalar, b: &Scalar) -> Scalar {
    a + b
}

/// Verify a combined signature against the joint public key.
pub fn verify(sig: &Signature, message: &[u8; 32], joint_public: &ProjectivePoint) -> bool {
    let Ok(nonce) = decompress(&sig.nonce) else {
        return false;
    };
    let Ok(k) = scalar_from_bytes(&sig.k) else {
        return false;
    };
    let e = challenge(message, &nonce, joint_public);
    ProjectivePoint::GENERATOR * k == nonce + *joint_public * e
}
