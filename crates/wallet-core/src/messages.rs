//! Peer and node protocol types.
//!
//! Peer envelopes share one layout: `magic(4) ‖ version(2) ‖ kind(1) ‖
//! tx_id(16)` followed by payload fields — points as 33-byte compressed
//! SEC1, scalars as 32 bytes, amounts and heights as u64 little-endian,
//! vectors prefixed with a u32 count. Node messages never cross this
//! codec; their framing belongs to the transport.

use crate::model::{Amount, Height, SystemStateId, TxId};
use sha3::{Digest, Sha3_256};
use thiserror::Error;
use wallet_crypto::{decompress, verify, Commitment, PointBytes, ScalarBytes, Signature};

pub const PROTOCOL_MAGIC: u32 = 0x5754_5831;
pub const WIRE_VERSION: u16 = 1;

const KIND_INVITE: u8 = 1;
const KIND_CONFIRM_INVITATION: u8 = 2;
const KIND_CONFIRM_TRANSACTION: u8 = 3;
const KIND_TX_REGISTERED: u8 = 4;
const KIND_TX_FAILED: u8 = 5;

/// Upper bound on any vector in a peer message.
const MAX_VEC_LEN: u32 = 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("message truncated")]
    Truncated,
    #[error("magic mismatch")]
    MagicMismatch,
    #[error("unsupported wire version {0}")]
    VersionUnsupported(u16),
    #[error("unknown message kind {0}")]
    KindUnknown(u8),
    #[error("non-canonical point encoding")]
    PointInvalid,
    #[error("vector length out of range")]
    LengthInvalid,
    #[error("trailing bytes")]
    TrailingBytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InviteReceiver {
    pub tx_id: TxId,
    pub amount: Amount,
    pub fee: Amount,
    pub min_height: Height,
    pub inputs: Vec<Commitment>,
    pub outputs: Vec<Commitment>,
    pub public_blinding: PointBytes,
    pub public_nonce: PointBytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmInvitation {
    pub tx_id: TxId,
    pub public_blinding: PointBytes,
    pub public_nonce: PointBytes,
    pub signature_share: ScalarBytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmTransaction {
    pub tx_id: TxId,
    pub signature_share: ScalarBytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRegistered {
    pub tx_id: TxId,
    pub value: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxFailed {
    pub tx_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxMessage {
    InviteReceiver(InviteReceiver),
    ConfirmInvitation(ConfirmInvitation),
    ConfirmTransaction(ConfirmTransaction),
    TxRegistered(TxRegistered),
    TxFailed(TxFailed),
}

impl TxMessage {
    pub fn tx_id(&self) -> TxId {
        match self {
            TxMessage::InviteReceiver(m) => m.tx_id,
            TxMessage::ConfirmInvitation(m) => m.tx_id,
            TxMessage::ConfirmTransaction(m) => m.tx_id,
            TxMessage::TxRegistered(m) => m.tx_id,
            TxMessage::TxFailed(m) => m.tx_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let (kind, tx_id) = (self.kind(), self.tx_id());
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&PROTOCOL_MAGIC.to_le_bytes());
        out.extend_from_slice(&WIRE_VERSION.to_le_bytes());
        out.push(kind);
        out.extend_from_slice(tx_id.as_bytes());
        match self {
            TxMessage::InviteReceiver(m) => {
                out.extend_from_slice(&m.amount.to_le_bytes());
                out.extend_from_slice(&m.fee.to_le_bytes());
                out.extend_from_slice(&m.min_height.to_le_bytes());
                write_commitments(&mut out, &m.inputs);
                write_commitments(&mut out, &m.outputs);
                out.extend_from_slice(&m.public_blinding);
                out.extend_from_slice(&m.public_nonce);
            }
            TxMessage::ConfirmInvitation(m) => {
                out.extend_from_slice(&m.public_blinding);
                out.extend_from_slice(&m.public_nonce);
                out.extend_from_slice(&m.signature_share);
            }
            TxMessage::ConfirmTransaction(m) => {
                out.extend_from_slice(&m.signature_share);
            }
            TxMessage::TxRegistered(m) => {
                out.push(m.value as u8);
            }
            TxMessage::TxFailed(_) => {}
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<TxMessage, CodecError> {
        let mut cursor = 0usize;
        let magic = read_u32(bytes, &mut cursor)?;
        if magic != PROTOCOL_MAGIC {
            return Err(CodecError::MagicMismatch);
        }
        let version = read_u16(bytes, &mut cursor)?;
        if version != WIRE_VERSION {
            return Err(CodecError::VersionUnsupported(version));
        }
        let kind = read_u8(bytes, &mut cursor)?;
        let tx_id = read_tx_id(bytes, &mut cursor)?;

        let message = match kind {
            KIND_INVITE => {
                let amount = read_u64(bytes, &mut cursor)?;
                let fee = read_u64(bytes, &mut cursor)?;
                let min_height = read_u64(bytes, &mut cursor)?;
                let inputs = read_commitments(bytes, &mut cursor)?;
                let outputs = read_commitments(bytes, &mut cursor)?;
                let public_blinding = read_point(bytes, &mut cursor)?;
                let public_nonce = read_point(bytes, &mut cursor)?;
                TxMessage::InviteReceiver(InviteReceiver {
                    tx_id,
                    amount,
                    fee,
                    min_height,
                    inputs,
                    outputs,
                    public_blinding,
                    public_nonce,
                })
            }
            KIND_CONFIRM_INVITATION => {
                let public_blinding = read_point(bytes, &mut cursor)?;
                let public_nonce = read_point(bytes, &mut cursor)?;
                let signature_share = read_scalar(bytes, &mut cursor)?;
                TxMessage::ConfirmInvitation(ConfirmInvitation {
                    tx_id,
                    public_blinding,
                    public_nonce,
                    signature_share,
                })
            }
            KIND_CONFIRM_TRANSACTION => {
                let signature_share = read_scalar(bytes, &mut cursor)?;
                TxMessage::ConfirmTransaction(ConfirmTransaction {
                    tx_id,
                    signature_share,
                })
            }
            KIND_TX_REGISTERED => {
                let value = read_u8(bytes, &mut cursor)? != 0;
                TxMessage::TxRegistered(TxRegistered { tx_id, value })
            }
            KIND_TX_FAILED => TxMessage::TxFailed(TxFailed { tx_id }),
            other => return Err(CodecError::KindUnknown(other)),
        };

        if cursor != bytes.len() {
            return Err(CodecError::TrailingBytes);
        }
        Ok(message)
    }

    fn kind(&self) -> u8 {
        match self {
            TxMessage::InviteReceiver(_) => KIND_INVITE,
            TxMessage::ConfirmInvitation(_) => KIND_CONFIRM_INVITATION,
            TxMessage::ConfirmTransaction(_) => KIND_CONFIRM_TRANSACTION,
            TxMessage::TxRegistered(_) => KIND_TX_REGISTERED,
            TxMessage::TxFailed(_) => KIND_TX_FAILED,
        }
    }
}

fn write_commitments(out: &mut Vec<u8>, commitments: &[Commitment]) {
    out.extend_from_slice(&(commitments.len() as u32).to_le_bytes());
    for c in commitments {
        out.extend_from_slice(c.as_bytes());
    }
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8, CodecError> {
    if bytes.len() <= *cursor {
        return Err(CodecError::Truncated);
    }
    let value = bytes[*cursor];
    *cursor += 1;
    Ok(value)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16, CodecError> {
    let slice = take_slice(bytes, cursor, 2)?;
    let mut tmp = [0u8; 2];
    tmp.copy_from_slice(slice);
    Ok(u16::from_le_bytes(tmp))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, CodecError> {
    let slice = take_slice(bytes, cursor, 4)?;
    let mut tmp = [0u8; 4];
    tmp.copy_from_slice(slice);
    Ok(u32::from_le_bytes(tmp))
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64, CodecError> {
    let slice = take_slice(bytes, cursor, 8)?;
    let mut tmp = [0u8; 8];
    tmp.copy_from_slice(slice);
    Ok(u64::from_le_bytes(tmp))
}

fn take_slice<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
) -> Result<&'a [u8], CodecError> {
    if bytes.len() < *cursor + len {
        return Err(CodecError::Truncated);
    }
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

fn read_tx_id(bytes: &[u8], cursor: &mut usize) -> Result<TxId, CodecError> {
    let slice = take_slice(bytes, cursor, 16)?;
    let mut tmp = [0u8; 16];
    tmp.copy_from_slice(slice);
    Ok(TxId::from_bytes(tmp))
}

fn read_point(bytes: &[u8], cursor: &mut usize) -> Result<PointBytes, CodecError> {
    let slice = take_slice(bytes, cursor, 33)?;
    let mut tmp = [0u8; 33];
    tmp.copy_from_slice(slice);
    decompress(&tmp).map_err(|_| CodecError::PointInvalid)?;
    Ok(tmp)
}

fn read_scalar(bytes: &[u8], cursor: &mut usize) -> Result<ScalarBytes, CodecError> {
    let slice = take_slice(bytes, cursor, 32)?;
    let mut tmp = [0u8; 32];
    tmp.copy_from_slice(slice);
    Ok(tmp)
}

fn read_commitments(bytes: &[u8], cursor: &mut usize) -> Result<Vec<Commitment>, CodecError> {
    let count = read_u32(bytes, cursor)?;
    if count > MAX_VEC_LEN {
        return Err(CodecError::LengthInvalid);
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(Commitment(read_point(bytes, cursor)?));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Transaction

const KERNEL_TAG: &[u8] = b"wallet.kernel.v1";

/// Signing message for a kernel: binds fee, minimum height and the joint
/// excess. Both parties must derive it identically before exchanging
/// shares.
pub fn kernel_message(fee: Amount, min_height: Height, excess: &PointBytes) -> [u8; 32] {
    Sha3_256::new()
        .chain_update(KERNEL_TAG)
        .chain_update(fee.to_le_bytes())
        .chain_update(min_height.to_le_bytes())
        .chain_update(excess)
        .finalize()
        .into()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxKernel {
    pub excess: PointBytes,
    pub fee: Amount,
    pub min_height: Height,
    pub signature: Signature,
}

impl TxKernel {
    pub fn message_hash(&self) -> [u8; 32] {
        kernel_message(self.fee, self.min_height, &self.excess)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: Vec<Commitment>,
    pub outputs: Vec<Commitment>,
    pub kernel: TxKernel,
}

impl Transaction {
    /// Structural check: the kernel signature verifies against the joint
    /// excess. Balance is enforced by the node, not here.
    pub fn is_valid(&self) -> bool {
        let Ok(excess) = decompress(&self.kernel.excess) else {
            return false;
        };
        verify(&self.kernel.signature, &self.kernel.message_hash(), &excess)
    }
}

// ---------------------------------------------------------------------------
// Node protocol

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeRequest {
    NewTransaction(Transaction),
    GetProofUtxo {
        commitment: Commitment,
        min_height: Height,
    },
    GetMined {
        height: Height,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: Height,
    pub hash: [u8; 32],
    /// Commitment root of the chain's UTXO set, the base for proofs.
    pub definition: [u8; 32],
}

impl BlockHeader {
    pub fn id(&self) -> SystemStateId {
        SystemStateId {
            height: self.height,
            hash: self.hash,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinedEntry {
    pub height: Height,
    pub hash: [u8; 32],
    pub active: bool,
    pub fees: Amount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofStep {
    pub hash: [u8; 32],
    /// Whether the sibling sits to the right of the running hash.
    pub right: bool,
}

/// Merkle-style proof that a commitment is in the UTXO set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoProof {
    pub maturity: Height,
    pub count: u64,
    pub path: Vec<ProofStep>,
}

const PROOF_LEAF_TAG: &[u8] = b"utxo.leaf.v1";
const PROOF_NODE_TAG: &[u8] = b"utxo.node.v1";

impl UtxoProof {
    pub fn leaf_hash(commitment: &Commitment, maturity: Height, count: u64) -> [u8; 32] {
        Sha3_256::new()
            .chain_update(PROOF_LEAF_TAG)
            .chain_update(commitment.as_bytes())
            .chain_update(maturity.to_le_bytes())
            .chain_update(count.to_le_bytes())
            .finalize()
            .into()
    }

    pub fn root(&self, commitment: &Commitment) -> [u8; 32] {
        let mut hash = Self::leaf_hash(commitment, self.maturity, self.count);
        for step in &self.path {
            let (left, right) = if step.right {
                (hash, step.hash)
            } else {
                (step.hash, hash)
            };
            hash = Sha3_256::new()
                .chain_update(PROOF_NODE_TAG)
                .chain_update(left)
                .chain_update(right)
                .finalize()
                .into();
        }
        hash
    }

    pub fn is_valid(&self, commitment: &Commitment, definition: &[u8; 32]) -> bool {
        self.root(commitment) == *definition
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeMessage {
    NewTip(SystemStateId),
    Hdr(BlockHeader),
    Mined(Vec<MinedEntry>),
    ProofUtxo(Vec<UtxoProof>),
    Boolean(bool),
}
