//! Durable, password-encrypted store of coins, the master secret, the
//! system-state cursor and wallet addresses (`wallet.db`).

use crate::error::{Result, WalletError};
use crate::model::{Coin, Height, SystemStateId, WalletAddress};
use crate::sealed::{self, SALT_LEN};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use wallet_crypto::{hash_to_scalar, Scalar};
use zeroize::{Zeroize, Zeroizing};

const KEYCHAIN_MAGIC: &[u8; 4] = b"WDB1";
const MASTER_TAG: &[u8] = b"wallet.master.v1";
const COIN_KEY_TAG: &[u8] = b"wallet.coin.key.v1";

#[derive(Serialize, Deserialize, Default)]
struct KeychainImage {
    master_secret: [u8; 32],
    last_coin_id: u64,
    state_id: SystemStateId,
    coins: BTreeMap<u64, Coin>,
    addresses: Vec<WalletAddress>,
}

pub struct Keychain {
    path: PathBuf,
    key: RwLock<Zeroizing<[u8; 32]>>,
    salt: RwLock<[u8; SALT_LEN]>,
    image: RwLock<KeychainImage>,
}

impl Keychain {
    /// Create a new store. Fails if one already exists at `path`. The
    /// master secret, and through it every coin key, derives from
    /// `seed_hash`.
    pub fn init(path: impl AsRef<Path>, password: &str, seed_hash: &[u8; 32]) -> Result<Keychain> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(WalletError::AlreadyInitialized(path));
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = sealed::derive_key(password.as_bytes(), &salt)?;

        let mut master_secret = [0u8; 32];
        master_secret.copy_from_slice(
            &Sha3_256::new()
                .chain_update(MASTER_TAG)
                .chain_update(seed_hash)
                .finalize(),
        );

        let chain = Keychain {
            path,
            key: RwLock::new(key),
            salt: RwLock::new(salt),
            image: RwLock::new(KeychainImage {
                master_secret,
                ..Default::default()
            }),
        };
        chain.persist_image(&chain.image.read())?;
        Ok(chain)
    }

    /// Open an existing store; `WrongPassword` when the AEAD check fails.
    pub fn open(path: impl AsRef<Path>, password: &str) -> Result<Keychain> {
        let path = path.as_ref().to_path_buf();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WalletError::NotInitialized(path));
            }
            Err(err) => return Err(err.into()),
        };
        let (key, salt, plaintext) = sealed::open_sealed(KEYCHAIN_MAGIC, password.as_bytes(), &bytes)?;
        let image: KeychainImage = bincode::deserialize(&plaintext)?;
        Ok(Keychain {
            path,
            key: RwLock::new(key),
            salt: RwLock::new(salt),
            image: RwLock::new(image),
        })
    }

    pub fn is_initialized(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }

    /// Re-encrypt in place under a fresh salt. The temp-file rename in
    /// `write_atomic` keeps the prior store valid on failure.
    pub fn change_password(&self, new_password: &str) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = sealed::derive_key(new_password.as_bytes(), &salt)?;
        {
            let image = self.image.read();
            let plaintext = Zeroizing::new(bincode::serialize(&*image)?);
            let bytes = sealed::seal(KEYCHAIN_MAGIC, &key, &salt, &plaintext)?;
            sealed::write_atomic(&self.path, &bytes)?;
        }
        *self.key.write() = key;
        *self.salt.write() = salt;
        Ok(())
    }

    /// Persist a coin, assigning the next id when `coin.id == 0`. Returns
    /// the assigned id. A caller-supplied id makes this an upsert.
    pub fn store(&self, coin: &mut Coin) -> Result<u64> {
        let mut image = self.image.write();
        if coin.id == 0 {
            image.last_coin_id += 1;
            coin.id = image.last_coin_id;
        } else if coin.id > image.last_coin_id {
            image.last_coin_id = coin.id;
        }
        image.coins.insert(coin.id, coin.clone());
        self.persist_image(&image)?;
        Ok(coin.id)
    }

    /// Bulk update by id; any unknown id fails the whole batch.
    pub fn update(&self, coins: &[Coin]) -> Result<()> {
        let mut image = self.image.write();
        for coin in coins {
            if !image.coins.contains_key(&coin.id) {
                return Err(WalletError::CoinNotFound(coin.id));
            }
        }
        for coin in coins {
            image.coins.insert(coin.id, coin.clone());
        }
        self.persist_image(&image)
    }

    /// Delete coins by id. Unknown ids are ignored.
    pub fn remove(&self, coins: &[Coin]) -> Result<()> {
        let mut image = self.image.write();
        for coin in coins {
            image.coins.remove(&coin.id);
        }
        self.persist_image(&image)
    }

    /// Iterate all coins in id order; return `false` from the callback to
    /// stop early.
    pub fn visit<F>(&self, mut f: F)
    where
        F: FnMut(&Coin) -> bool,
    {
        let image = self.image.read();
        for coin in image.coins.values() {
            if !f(coin) {
                break;
            }
        }
    }

    /// Deterministic per-coin secret scalar from the master secret.
    pub fn calc_key(&self, coin: &Coin) -> Scalar {
        let image = self.image.read();
        hash_to_scalar(&[
            COIN_KEY_TAG,
            &image.master_secret,
            &coin.id.to_le_bytes(),
            &coin.amount.to_le_bytes(),
            &[coin.key_type as u8],
        ])
    }

    pub fn get_system_state_id(&self) -> SystemStateId {
        self.image.read().state_id
    }

    pub fn set_system_state_id(&self, state_id: SystemStateId) -> Result<()> {
        let mut image = self.image.write();
        image.state_id = state_id;
        self.persist_image(&image)
    }

    pub fn get_current_height(&self) -> Height {
        self.image.read().state_id.height
    }

    pub fn save_address(&self, address: WalletAddress) -> Result<()> {
        let mut image = self.image.write();
        if let Some(existing) = image
            .addresses
            .iter_mut()
            .find(|a| a.wallet_id == address.wallet_id)
        {
            *existing = address;
        } else {
            image.addresses.push(address);
        }
        self.persist_image(&image)
    }

    pub fn addresses(&self) -> Vec<WalletAddress> {
        self.image.read().addresses.clone()
    }

    fn persist_image(&self, image: &KeychainImage) -> Result<()> {
        let plaintext = Zeroizing::new(bincode::serialize(image)?);
        let key = self.key.read();
        let salt = self.salt.read();
        let bytes = sealed::seal(KEYCHAIN_MAGIC, &key, &salt, &plaintext)?;
        sealed::write_atomic(&self.path, &bytes)
    }
}

impl Drop for Keychain {
    fn drop(&mut self) {
        self.image.write().master_secret.zeroize();
    }
}
