//! Wallet orchestrator: the single entry point for peer and node events.
//!
//! Routes peer messages to the owning FSM by transaction id, drives the
//! synchronization protocol against the node, queues transfers initiated
//! before the first sync completes, and reaps finished FSMs at the end of
//! the dispatch that finished them.

use crate::config::Rules;
use crate::error::{Result, WalletError};
use crate::keychain::Keychain;
use crate::messages::{
    BlockHeader, ConfirmInvitation, ConfirmTransaction, InviteReceiver, MinedEntry, NodeMessage,
    NodeRequest, Transaction, TxMessage, UtxoProof,
};
use crate::model::{Amount, Coin, CoinStatus, Height, KeyType, PrintableAmount, SystemStateId, TxId, MAX_HEIGHT};
use crate::network::{NetworkIo, PeerId};
use crate::plan;
use crate::receiver::{Receiver, ReceiverEvent, ReceiverState};
use crate::sender::{Sender, SenderEvent, SenderState};
use log::{debug, error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use wallet_crypto::Commitment;

/// Callback fired when a transfer reaches a terminal state.
pub type TxCompletedAction = Box<dyn FnMut(TxId)>;

/// What an FSM may do to the outside world while processing an event:
/// send to its peer, or submit a transaction for registration.
pub trait TxGateway {
    fn send_tx_message(&mut self, tx_id: TxId, msg: TxMessage);
    fn register_tx(&mut self, tx_id: TxId, tx: Transaction);
}

struct WalletInner<N: NetworkIo> {
    keychain: Arc<Keychain>,
    network: N,
    rules: Rules,
    peers: HashMap<TxId, PeerId>,
    node_requests_queue: VecDeque<TxId>,
    pending_proofs: VecDeque<Coin>,
    syncing: u32,
    synchronized: bool,
    known_state_id: SystemStateId,
    new_state_id: SystemStateId,
    definition: [u8; 32],
    tx_completed_action: Option<TxCompletedAction>,
}

impl<N: NetworkIo> WalletInner<N> {
    fn remove_peer(&mut self, tx_id: TxId) {
        if let Some(peer) = self.peers.remove(&tx_id) {
            self.network.close_connection(peer);
        }
    }

    fn find_tx_by_peer(&self, from: PeerId) -> Option<TxId> {
        // Linear reverse lookup; the peers map stays small.
        self.peers
            .iter()
            .find(|(_, peer)| **peer == from)
            .map(|(tx_id, _)| *tx_id)
    }

    fn get_utxo_proofs(&mut self, coins: Vec<Coin>) {
        for coin in coins {
            self.syncing += 1;
            let key = self.keychain.calc_key(&coin);
            let commitment = Commitment::commit(&key, coin.amount);
            debug!("get proof: {commitment}");
            self.pending_proofs.push_back(coin);
            self.network.send_node_message(NodeRequest::GetProofUtxo {
                commitment,
                min_height: 0,
            });
        }
    }
}

impl<N: NetworkIo> TxGateway for WalletInner<N> {
    fn send_tx_message(&mut self, tx_id: TxId, msg: TxMessage) {
        match self.peers.get(&tx_id) {
            Some(peer) => self.network.send_tx_message(*peer, msg),
            None => debug!("no peer bound to tx {tx_id}"),
        }
    }

    fn register_tx(&mut self, tx_id: TxId, tx: Transaction) {
        debug!("[Receiver] sending tx for registration");
        self.node_requests_queue.push_back(tx_id);
        self.network.send_node_message(NodeRequest::NewTransaction(tx));
    }
}

pub struct Wallet<N: NetworkIo> {
    senders: HashMap<TxId, Sender>,
    receivers: HashMap<TxId, Receiver>,
    pending_senders: Vec<TxId>,
    pending_receivers: Vec<TxId>,
    removed_senders: Vec<Sender>,
    removed_receivers: Vec<Receiver>,
    inner: WalletInner<N>,
}

impl<N: NetworkIo> Wallet<N> {
    pub fn new(keychain: Arc<Keychain>, network: N) -> Self {
        let known_state_id = keychain.get_system_state_id();
        Wallet {
            senders: HashMap::new(),
            receivers: HashMap::new(),
            pending_senders: Vec::new(),
            pending_receivers: Vec::new(),
            removed_senders: Vec::new(),
            removed_receivers: Vec::new(),
            inner: WalletInner {
                keychain,
                network,
                rules: Rules::default(),
                peers: HashMap::new(),
                node_requests_queue: VecDeque::new(),
                pending_proofs: VecDeque::new(),
                syncing: 0,
                synchronized: false,
                known_state_id,
                new_state_id: known_state_id,
                definition: [0u8; 32],
                tx_completed_action: None,
            },
        }
    }

    pub fn set_tx_completed_action(&mut self, action: TxCompletedAction) {
        self.inner.tx_completed_action = Some(action);
    }

    pub fn is_synchronized(&self) -> bool {
        self.inner.synchronized
    }

    pub fn known_state_id(&self) -> SystemStateId {
        self.inner.known_state_id
    }

    pub fn sender_state(&self, tx_id: TxId) -> Option<SenderState> {
        self.senders.get(&tx_id).map(|s| s.state())
    }

    pub fn receiver_state(&self, tx_id: TxId) -> Option<ReceiverState> {
        self.receivers.get(&tx_id).map(|r| r.state())
    }

    /// Start an outgoing transfer. Fails synchronously when the Unspent
    /// balance cannot cover `amount` plus the fixed fee; otherwise the
    /// sender starts immediately or, before the first sync completes, is
    /// parked until synchronization finishes.
    pub fn transfer_money(&mut self, to: PeerId, amount: Amount) -> Result<TxId> {
        let fee = self.inner.rules.fee;
        let requested = amount.saturating_add(fee);
        let available = plan::available_balance(&self.inner.keychain);
        if available < requested {
            return Err(WalletError::InsufficientFunds {
                available,
                requested,
            });
        }

        let tx_id = TxId::random();
        self.inner.peers.insert(tx_id, to);
        let sender = Sender::new(self.inner.keychain.clone(), tx_id, amount, fee);
        self.senders.insert(tx_id, sender);
        if self.inner.synchronized {
            self.start_sender(tx_id);
        } else {
            debug!("tx {tx_id} deferred until synchronization completes");
            self.pending_senders.push(tx_id);
        }
        self.drain_removed();
        Ok(tx_id)
    }

    /// Entry point for peer messages.
    pub fn handle_tx_message(&mut self, from: PeerId, msg: TxMessage) {
        match msg {
            TxMessage::InviteReceiver(data) => self.on_invite(from, data),
            TxMessage::ConfirmInvitation(data) => self.on_confirm_invitation(data),
            TxMessage::ConfirmTransaction(data) => self.on_confirm_transaction(from, data),
            TxMessage::TxRegistered(data) => self.on_tx_registered_message(from, data.value),
            TxMessage::TxFailed(data) => {
                debug!("tx {} failed by peer", data.tx_id);
                self.handle_tx_failed(data.tx_id, false);
            }
        }
        self.drain_removed();
    }

    /// Entry point for node messages; the return value tells the transport
    /// whether to keep the node connection open.
    pub fn handle_node_message(&mut self, msg: NodeMessage) -> bool {
        let keep = match msg {
            NodeMessage::NewTip(state_id) => self.on_new_tip(state_id),
            NodeMessage::Hdr(header) => self.on_hdr(header),
            NodeMessage::Mined(entries) => self.on_mined(entries),
            NodeMessage::ProofUtxo(proofs) => self.on_proof_utxo(proofs),
            NodeMessage::Boolean(value) => self.on_boolean(value),
        };
        self.drain_removed();
        keep
    }

    /// A peer connection died: fail whatever FSM is bound to it.
    pub fn handle_connection_error(&mut self, from: PeerId) {
        let Some(tx_id) = self.inner.find_tx_by_peer(from) else {
            return;
        };
        self.handle_tx_failed(tx_id, false);
        self.drain_removed();
    }

    fn on_invite(&mut self, from: PeerId, data: InviteReceiver) {
        let tx_id = data.tx_id;
        if self.receivers.contains_key(&tx_id) {
            debug!("[Receiver] unexpected tx invitation {tx_id}");
            return;
        }
        debug!("[Receiver] received tx invitation {tx_id}");
        self.inner.peers.insert(tx_id, from);
        let receiver = Receiver::new(self.inner.keychain.clone(), data);
        self.receivers.insert(tx_id, receiver);
        if self.inner.synchronized {
            self.start_receiver(tx_id);
        } else {
            self.pending_receivers.push(tx_id);
        }
    }

    fn on_confirm_invitation(&mut self, data: ConfirmInvitation) {
        let tx_id = data.tx_id;
        if self.senders.contains_key(&tx_id) {
            debug!("[Sender] received tx confirmation {tx_id}");
            self.dispatch_sender(tx_id, SenderEvent::TxInitCompleted(data));
        } else {
            debug!("[Sender] unexpected tx confirmation {tx_id}");
        }
    }

    fn on_confirm_transaction(&mut self, from: PeerId, data: ConfirmTransaction) {
        let tx_id = data.tx_id;
        if self.receivers.contains_key(&tx_id) {
            debug!("[Receiver] received sender tx confirmation {tx_id}");
            self.dispatch_receiver(tx_id, ReceiverEvent::TxConfirmationCompleted(data));
        } else {
            debug!("[Receiver] unexpected sender tx confirmation {tx_id}");
            self.inner.network.close_connection(from);
        }
    }

    fn on_tx_registered_message(&mut self, from: PeerId, value: bool) {
        let Some(tx_id) = self.inner.find_tx_by_peer(from) else {
            return;
        };
        self.handle_tx_registered(tx_id, value);
    }

    fn handle_tx_registered(&mut self, tx_id: TxId, res: bool) {
        debug!(
            "tx {tx_id} {}",
            if res {
                "has registered"
            } else {
                "has failed to register"
            }
        );
        if res {
            if self.receivers.contains_key(&tx_id) {
                self.dispatch_receiver(tx_id, ReceiverEvent::TxRegistrationCompleted);
            } else if self.senders.contains_key(&tx_id) {
                self.dispatch_sender(tx_id, SenderEvent::TxConfirmationCompleted);
            }
        } else {
            self.handle_tx_failed(tx_id, true);
        }
    }

    fn handle_tx_failed(&mut self, tx_id: TxId, notify_peer: bool) {
        if self.senders.contains_key(&tx_id) {
            self.dispatch_sender(tx_id, SenderEvent::TxFailed { notify_peer });
        } else if self.receivers.contains_key(&tx_id) {
            self.dispatch_receiver(tx_id, ReceiverEvent::TxFailed { notify_peer });
        }
    }

    fn on_new_tip(&mut self, state_id: SystemStateId) -> bool {
        if state_id <= self.inner.known_state_id {
            return true;
        }
        if self.inner.syncing > 0 && state_id == self.inner.new_state_id {
            // Already syncing toward this tip.
            return true;
        }
        info!("new tip at height {}", state_id.height);
        self.inner.new_state_id = state_id;
        self.inner.synchronized = false;
        // One slot for the header, one for the mined list.
        self.inner.syncing += 2;
        let from_height = self.inner.known_state_id.height;
        self.inner
            .network
            .send_node_message(NodeRequest::GetMined {
                height: from_height,
            });
        true
    }

    fn on_hdr(&mut self, header: BlockHeader) -> bool {
        self.inner.definition = header.definition;

        let mut unconfirmed = Vec::new();
        self.inner.keychain.visit(|coin| {
            if matches!(coin.status, CoinStatus::Unconfirmed | CoinStatus::Locked) {
                unconfirmed.push(coin.clone());
            }
            true
        });
        self.inner.get_utxo_proofs(unconfirmed);
        self.inner.new_state_id = header.id();
        self.finish_sync()
    }

    fn on_mined(&mut self, entries: Vec<MinedEntry>) -> bool {
        let current_height = self.inner.keychain.get_current_height();
        let mut mined = Vec::new();
        for entry in entries {
            // Only coins on the active branch are worth tracking.
            if !entry.active || entry.height < current_height {
                continue;
            }
            mined.push(Coin::new(
                self.inner.rules.coinbase_emission,
                CoinStatus::Unconfirmed,
                entry.height,
                MAX_HEIGHT,
                KeyType::Coinbase,
            ));
            if entry.fees > 0 {
                mined.push(Coin::new(
                    entry.fees,
                    CoinStatus::Unconfirmed,
                    entry.height,
                    MAX_HEIGHT,
                    KeyType::Commission,
                ));
            }
        }
        if !mined.is_empty() {
            self.inner.get_utxo_proofs(mined);
        }
        self.finish_sync()
    }

    fn on_proof_utxo(&mut self, proofs: Vec<UtxoProof>) -> bool {
        let Some(mut coin) = self.inner.pending_proofs.pop_front() else {
            debug!("unexpected utxo proof");
            return false;
        };

        let key = self.inner.keychain.calc_key(&coin);
        let commitment = Commitment::commit(&key, coin.amount);

        if proofs.is_empty() {
            debug!("got empty proof for: {commitment}");
            if coin.status == CoinStatus::Locked {
                coin.status = CoinStatus::Spent;
                if let Err(err) = self.inner.keychain.update(&[coin]) {
                    error!("failed to persist spent coin: {err}");
                }
            }
        } else if coin.status == CoinStatus::Unconfirmed {
            let mut accepted: Option<Height> = None;
            for proof in &proofs {
                if !proof.is_valid(&commitment, &self.inner.definition) {
                    error!("invalid proof provided for: {commitment}");
                    continue;
                }
                match accepted {
                    None => {
                        coin.status = CoinStatus::Unspent;
                        coin.maturity = proof.maturity;
                        coin.confirm_height = self.inner.new_state_id.height;
                        coin.confirm_hash = self.inner.new_state_id.hash;
                        accepted = Some(proof.maturity);
                    }
                    Some(maturity) if maturity != proof.maturity => {
                        warn!(
                            "proofs disagree on maturity for {commitment}: {maturity} vs {}",
                            proof.maturity
                        );
                    }
                    Some(_) => {}
                }
            }
            if accepted.is_some() {
                let result = match coin.key_type {
                    KeyType::Coinbase | KeyType::Commission => {
                        info!("block reward received: {}", PrintableAmount(coin.amount));
                        self.inner.keychain.store(&mut coin).map(|_| ())
                    }
                    KeyType::Regular => self.inner.keychain.update(&[coin]),
                };
                if let Err(err) = result {
                    error!("failed to persist confirmed coin: {err}");
                }
            }
        }

        self.finish_sync()
    }

    fn on_boolean(&mut self, value: bool) -> bool {
        let Some(tx_id) = self.inner.node_requests_queue.pop_front() else {
            debug!("received unexpected tx registration confirmation");
            return false;
        };
        self.handle_tx_registered(tx_id, value);
        true
    }

    /// One outstanding sync step finished. On the last one, persist the
    /// cursor, start queued transfers and flip the synchronized flag; when
    /// the wallet goes fully idle, drop the node connection.
    fn finish_sync(&mut self) -> bool {
        if self.inner.syncing > 0 {
            self.inner.syncing -= 1;
            if self.inner.syncing == 0 {
                if let Err(err) = self
                    .inner
                    .keychain
                    .set_system_state_id(self.inner.new_state_id)
                {
                    error!("failed to persist system state: {err}");
                }
                self.inner.known_state_id = self.inner.new_state_id;

                let pending = std::mem::take(&mut self.pending_senders);
                for tx_id in pending {
                    self.start_sender(tx_id);
                }
                let pending = std::mem::take(&mut self.pending_receivers);
                for tx_id in pending {
                    self.start_receiver(tx_id);
                }
                self.inner.synchronized = true;
                info!(
                    "wallet synchronized at height {}",
                    self.inner.known_state_id.height
                );
            }
        }
        if self.inner.syncing == 0 && self.inner.node_requests_queue.is_empty() {
            self.inner.network.close_node_connection();
            return false;
        }
        true
    }

    fn start_sender(&mut self, tx_id: TxId) {
        if let Some(sender) = self.senders.get_mut(&tx_id) {
            sender.start(&mut self.inner);
        }
        self.finalize_tx_state(tx_id);
    }

    fn start_receiver(&mut self, tx_id: TxId) {
        if let Some(receiver) = self.receivers.get_mut(&tx_id) {
            receiver.start(&mut self.inner);
        }
        self.finalize_tx_state(tx_id);
    }

    fn dispatch_sender(&mut self, tx_id: TxId, event: SenderEvent) {
        if let Some(sender) = self.senders.get_mut(&tx_id) {
            sender.process_event(&mut self.inner, event);
        }
        self.finalize_tx_state(tx_id);
    }

    fn dispatch_receiver(&mut self, tx_id: TxId, event: ReceiverEvent) {
        if let Some(receiver) = self.receivers.get_mut(&tx_id) {
            receiver.process_event(&mut self.inner, event);
        }
        self.finalize_tx_state(tx_id);
    }

    fn finalize_tx_state(&mut self, tx_id: TxId) {
        let done = self
            .senders
            .get(&tx_id)
            .map(|s| s.state().is_terminal())
            .unwrap_or(false)
            || self
                .receivers
                .get(&tx_id)
                .map(|r| r.state().is_terminal())
                .unwrap_or(false);
        if done {
            self.on_tx_completed(tx_id);
        }
    }

    fn on_tx_completed(&mut self, tx_id: TxId) {
        self.remove_sender(tx_id);
        self.remove_receiver(tx_id);
        if let Some(action) = self.inner.tx_completed_action.as_mut() {
            action(tx_id);
        }
        if self.inner.node_requests_queue.is_empty() {
            self.inner.network.close_node_connection();
        }
    }

    fn remove_sender(&mut self, tx_id: TxId) {
        if let Some(sender) = self.senders.remove(&tx_id) {
            self.inner.remove_peer(tx_id);
            // Keep the FSM alive until the dispatch that finished it
            // returns.
            self.removed_senders.push(sender);
        }
    }

    fn remove_receiver(&mut self, tx_id: TxId) {
        if let Some(receiver) = self.receivers.remove(&tx_id) {
            self.inner.remove_peer(tx_id);
            self.removed_receivers.push(receiver);
        }
    }

    fn drain_removed(&mut self) {
        self.removed_senders.clear();
        self.removed_receivers.clear();
    }
}
