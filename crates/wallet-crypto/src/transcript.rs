//! Transcript hashing for the joint-signature challenge.

use k256::elliptic_curve::ops::Reduce;
use k256::{ProjectivePoint, Scalar, U256};
use sha3::{Digest, Sha3_256};

use crate::compress;

const CHALLENGE_TAG: &[u8] = b"wallet.kernel.challenge.v1";

/// Sha3-256 over the concatenated parts, reduced mod the group order.
pub fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    <Scalar as Reduce<U256>>::reduce_bytes(&digest)
}

/// Fiat-Shamir challenge binding the joint nonce, joint public key and the
/// kernel message hash. Both parties must derive the identical scalar.
pub fn challenge(
    message: &[u8; 32],
    joint_nonce: &ProjectivePoint,
    joint_public: &ProjectivePoint,
) -> Scalar {
    let nonce_bytes = compress(joint_nonce);
    let public_bytes = compress(joint_public);
    hash_to_scalar(&[CHALLENGE_TAG, &nonce_bytes, &public_bytes, message])
}
