use crate::model::Amount;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("wrong password")]
    WrongPassword,
    #[error("store already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("no store at {0}")]
    NotInitialized(PathBuf),
    #[error("store corrupted: {0}")]
    Corrupted(&'static str),
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },
    #[error("coin {0} not found")]
    CoinNotFound(u64),
    #[error("crypto: {0}")]
    Crypto(#[from] wallet_crypto::CryptoError),
    #[error("key derivation failed")]
    Kdf,
    #[error("cipher failure")]
    Cipher,
}

pub type Result<T> = std::result::Result<T, WalletError>;
