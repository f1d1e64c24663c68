//! Shared at-rest envelope for the keychain and the key store:
//! `magic(4) ‖ version(1) ‖ salt(16) ‖ nonce(24) ‖ aead_ciphertext`,
//! Argon2id password KDF, XChaCha20-Poly1305 AEAD.

use crate::error::{Result, WalletError};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::{rngs::OsRng, RngCore};
use std::fs;
use std::io::Write;
use std::path::Path;
use zeroize::Zeroizing;

pub(crate) const SALT_LEN: usize = 16;
pub(crate) const NONCE_LEN: usize = 24;
const VERSION_BYTE: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + SALT_LEN + NONCE_LEN;

const KDF_MEM_KIB: u32 = 64 * 1024;
const KDF_TIME_COST: u32 = 2;
const KDF_LANES: u32 = 1;

pub(crate) fn derive_key(
    password: &[u8],
    salt: &[u8; SALT_LEN],
) -> Result<Zeroizing<[u8; 32]>> {
    let params = Params::new(KDF_MEM_KIB, KDF_TIME_COST, KDF_LANES, Some(32))
        .map_err(|_| WalletError::Kdf)?;
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password, salt, key.as_mut())
        .map_err(|_| WalletError::Kdf)?;
    Ok(key)
}

pub(crate) fn seal(
    magic: &[u8; 4],
    key: &[u8; 32],
    salt: &[u8; SALT_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| WalletError::Cipher)?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(magic);
    out.push(VERSION_BYTE);
    out.extend_from_slice(salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a sealed blob with the given password. Returns the derived key
/// and salt so callers can re-seal without re-running the KDF.
pub(crate) fn open_sealed(
    magic: &[u8; 4],
    password: &[u8],
    bytes: &[u8],
) -> Result<(Zeroizing<[u8; 32]>, [u8; SALT_LEN], Zeroizing<Vec<u8>>)> {
    if bytes.len() < HEADER_LEN {
        return Err(WalletError::Corrupted("truncated header"));
    }
    if &bytes[..4] != magic {
        return Err(WalletError::Corrupted("bad magic"));
    }
    if bytes[4] != VERSION_BYTE {
        return Err(WalletError::Corrupted("unsupported version"));
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes[5..5 + SALT_LEN]);
    let nonce_start = 5 + SALT_LEN;
    let nonce = &bytes[nonce_start..nonce_start + NONCE_LEN];
    let ciphertext = &bytes[HEADER_LEN..];

    let key = derive_key(password, &salt)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| WalletError::WrongPassword)?;
    Ok((key, salt, Zeroizing::new(plaintext)))
}

/// Full-file rewrite through a sibling temp file and rename, so an
/// interrupted write leaves the previous image intact.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
