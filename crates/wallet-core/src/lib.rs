//! wallet-core — confidential UTXO wallet core.
//!
//! Pieces:
//! - Keychain: encrypted-at-rest store of coins, master secret and the
//!   system-state cursor
//! - KeyStore: BBS keypair store, issues wallet identities
//! - Sender/Receiver: the two FSMs of the interactive transfer protocol
//! - Wallet: orchestrator routing peer/node events, driving sync and
//!   queueing transfers until the first sync completes
//! - messages: peer envelopes (wire codec) and node protocol types
//!
//! This crate deliberately owns no transport; the embedder implements
//! `NetworkIo` and feeds callbacks into `Wallet`.

pub mod config;
pub mod error;
pub mod keychain;
pub mod keystore;
pub mod messages;
pub mod model;
pub mod network;
pub mod plan;
pub mod receiver;
pub mod sender;
pub mod wallet;

mod sealed;

pub use config::Rules;
pub use error::{Result, WalletError};
pub use keychain::Keychain;
pub use keystore::{KeyStore, KeyStoreOptions, KeyStoreStorage, ENABLE_ALL_KEYS};
pub use messages::{
    kernel_message, BlockHeader, CodecError, ConfirmInvitation, ConfirmTransaction,
    InviteReceiver, MinedEntry, NodeMessage, NodeRequest, ProofStep, Transaction, TxFailed,
    TxKernel, TxMessage, TxRegistered, UtxoProof,
};
pub use model::{
    Amount, Coin, CoinStatus, Height, KeyType, PrintableAmount, SystemStateId, TxId,
    WalletAddress, WalletId, DURATION_FOREVER, MAX_HEIGHT,
};
pub use network::{NetworkIo, PeerId};
pub use receiver::{Receiver, ReceiverState};
pub use sender::{Sender, SenderState};
pub use wallet::{TxGateway, Wallet};
