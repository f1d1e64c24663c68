//! BBS keypair store (`keys.bbs`). Same at-rest envelope as the keychain;
//! the secret halves never leave the store.

use crate::error::{Result, WalletError};
use crate::model::WalletId;
use crate::sealed::{self, SALT_LEN};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use wallet_crypto::KeyPair;
use zeroize::Zeroizing;

const KEYSTORE_MAGIC: &[u8; 4] = b"BBS1";

pub const ENABLE_ALL_KEYS: u32 = 0x1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyStoreStorage {
    LocalFile,
    Memory,
}

#[derive(Clone, Debug)]
pub struct KeyStoreOptions {
    pub storage: KeyStoreStorage,
    pub flags: u32,
    pub file_name: Option<PathBuf>,
}

impl KeyStoreOptions {
    pub fn local_file(path: impl Into<PathBuf>) -> Self {
        KeyStoreOptions {
            storage: KeyStoreStorage::LocalFile,
            flags: ENABLE_ALL_KEYS,
            file_name: Some(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        KeyStoreOptions {
            storage: KeyStoreStorage::Memory,
            flags: ENABLE_ALL_KEYS,
            file_name: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredKeypair {
    #[serde(with = "BigArray")]
    public: [u8; 33],
    secret: Option<[u8; 32]>,
}

#[derive(Serialize, Deserialize, Default)]
struct KeyStoreImage {
    keys: BTreeMap<WalletId, StoredKeypair>,
}

pub struct KeyStore {
    options: KeyStoreOptions,
    key: RwLock<Zeroizing<[u8; 32]>>,
    salt: RwLock<[u8; SALT_LEN]>,
    image: RwLock<KeyStoreImage>,
}

impl KeyStore {
    /// Open or create a store described by `options`.
    pub fn create(options: KeyStoreOptions, password: &str) -> Result<KeyStore> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut key = sealed::derive_key(password.as_bytes(), &salt)?;
        let mut image = KeyStoreImage::default();

        if options.storage == KeyStoreStorage::LocalFile {
            let path = options
                .file_name
                .as_ref()
                .ok_or(WalletError::Corrupted("key store path missing"))?;
            if path.exists() {
                let bytes = fs::read(path)?;
                let (opened_key, opened_salt, plaintext) =
                    sealed::open_sealed(KEYSTORE_MAGIC, password.as_bytes(), &bytes)?;
                key = opened_key;
                salt = opened_salt;
                image = bincode::deserialize(&plaintext)?;
            }
        }

        let store = KeyStore {
            options,
            key: RwLock::new(key),
            salt: RwLock::new(salt),
            image: RwLock::new(image),
        };
        store.persist()?;
        Ok(store)
    }

    /// Produce a new keypair; the private half stays inside the store and
    /// is only written out by `save_keypair`.
    pub fn gen_keypair(&self) -> WalletId {
        let pair = KeyPair::random();
        let id = WalletId(pair.public_bytes());
        self.image.write().keys.insert(
            id,
            StoredKeypair {
                public: id.0,
                secret: Some(wallet_crypto::scalar_to_bytes(&pair.secret)),
            },
        );
        id
    }

    /// Persist a generated keypair. With `is_private == false` the secret
    /// half is dropped before writing.
    pub fn save_keypair(&self, id: &WalletId, is_private: bool) -> Result<()> {
        {
            let mut image = self.image.write();
            let entry = image
                .keys
                .get_mut(id)
                .ok_or(WalletError::Corrupted("unknown keypair"))?;
            if !is_private {
                entry.secret = None;
            }
        }
        self.persist()
    }

    pub fn has_keypair(&self, id: &WalletId) -> bool {
        self.image.read().keys.contains_key(id)
    }

    fn persist(&self) -> Result<()> {
        if self.options.storage != KeyStoreStorage::LocalFile {
            return Ok(());
        }
        let path = self
            .options
            .file_name
            .as_ref()
            .ok_or(WalletError::Corrupted("key store path missing"))?;
        let image = self.image.read();
        let plaintext = Zeroizing::new(bincode::serialize(&*image)?);
        let key = self.key.read();
        let salt = self.salt.read();
        let bytes = sealed::seal(KEYSTORE_MAGIC, &key, &salt, &plaintext)?;
        sealed::write_atomic(path, &bytes)
    }
}
