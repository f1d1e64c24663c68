//! Sender side of the two-party transfer negotiation.

use crate::keychain::Keychain;
use crate::messages::{
    kernel_message, ConfirmInvitation, ConfirmTransaction, InviteReceiver, TxFailed, TxMessage,
};
use crate::model::{Amount, Coin, CoinStatus, Height, KeyType, TxId, MAX_HEIGHT};
use crate::plan;
use crate::wallet::TxGateway;
use log::{debug, error, info};
use std::sync::Arc;
use wallet_crypto::{
    challenge, compress, decompress, scalar_from_bytes, scalar_to_bytes, sign_share, verify_share,
    Commitment, KeyPair, Scalar,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SenderState {
    Initial,
    InvitationSent,
    Confirmed,
    Registered,
    Failed,
    Completed,
}

impl SenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SenderState::Failed | SenderState::Completed)
    }
}

pub enum SenderEvent {
    /// Receiver answered the invitation with its share.
    TxInitCompleted(ConfirmInvitation),
    /// Node accepted the registered transaction.
    TxConfirmationCompleted,
    /// Negotiation failed; `notify_peer` is false when the failure came
    /// from the peer itself or a dead connection.
    TxFailed { notify_peer: bool },
}

pub struct Sender {
    tx_id: TxId,
    amount: Amount,
    fee: Amount,
    keychain: Arc<Keychain>,
    state: SenderState,
    min_height: Height,
    blinding: Option<KeyPair>,
    nonce: Option<KeyPair>,
    input_coins: Vec<Coin>,
    change_coin: Option<Coin>,
}

impl Sender {
    pub fn new(keychain: Arc<Keychain>, tx_id: TxId, amount: Amount, fee: Amount) -> Self {
        Sender {
            tx_id,
            amount,
            fee,
            keychain,
            state: SenderState::Initial,
            min_height: 0,
            blinding: None,
            nonce: None,
            input_coins: Vec::new(),
            change_coin: None,
        }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Select and lock inputs, build the change output and send the
    /// invitation. Runs once the wallet is synchronized.
    pub fn start(&mut self, gateway: &mut dyn TxGateway) {
        if self.state != SenderState::Initial {
            debug!("[Sender] {} start in state {:?}", self.tx_id, self.state);
            return;
        }

        let requested = self.amount + self.fee;
        let selection = match plan::select_coins(&self.keychain, requested) {
            Ok(selection) => selection,
            Err(err) => {
                error!("[Sender] {} cannot fund transfer: {err}", self.tx_id);
                self.state = SenderState::Failed;
                return;
            }
        };

        let current_height = self.keychain.get_current_height();
        let mut inputs = selection.coins;
        for coin in inputs.iter_mut() {
            coin.status = CoinStatus::Locked;
            coin.locked_height = current_height;
            coin.spent_tx_id = Some(self.tx_id);
        }
        if let Err(err) = self.keychain.update(&inputs) {
            error!("[Sender] {} failed to lock inputs: {err}", self.tx_id);
            self.state = SenderState::Failed;
            return;
        }
        self.input_coins = inputs;

        // Excess convention is outputs-minus-inputs; the input keys enter
        // negated.
        let mut excess = Scalar::ZERO;
        let mut input_commitments = Vec::with_capacity(self.input_coins.len());
        for coin in &self.input_coins {
            let key = self.keychain.calc_key(coin);
            excess -= key;
            input_commitments.push(Commitment::commit(&key, coin.amount));
        }

        let mut output_commitments = Vec::new();
        if selection.change > 0 {
            let mut change = Coin::new(
                selection.change,
                CoinStatus::Unconfirmed,
                current_height,
                MAX_HEIGHT,
                KeyType::Regular,
            );
            change.create_tx_id = Some(self.tx_id);
            if let Err(err) = self.keychain.store(&mut change) {
                error!("[Sender] {} failed to store change: {err}", self.tx_id);
                self.fail_tx(gateway, false);
                return;
            }
            let change_key = self.keychain.calc_key(&change);
            excess += change_key;
            output_commitments.push(Commitment::commit(&change_key, change.amount));
            self.change_coin = Some(change);
        }

        let blinding = KeyPair::from_secret(excess);
        let nonce = KeyPair::random();
        self.min_height = current_height;

        info!(
            "[Sender] {} inviting receiver, amount {} fee {}",
            self.tx_id, self.amount, self.fee
        );
        gateway.send_tx_message(
            self.tx_id,
            TxMessage::InviteReceiver(InviteReceiver {
                tx_id: self.tx_id,
                amount: self.amount,
                fee: self.fee,
                min_height: self.min_height,
                inputs: input_commitments,
                outputs: output_commitments,
                public_blinding: blinding.public_bytes(),
                public_nonce: nonce.public_bytes(),
            }),
        );

        self.blinding = Some(blinding);
        self.nonce = Some(nonce);
        self.state = SenderState::InvitationSent;
    }

    pub fn process_event(&mut self, gateway: &mut dyn TxGateway, event: SenderEvent) {
        match event {
            SenderEvent::TxInitCompleted(data) if self.state == SenderState::InvitationSent => {
                self.on_invitation_confirmed(gateway, data);
            }
            SenderEvent::TxConfirmationCompleted if self.state == SenderState::Confirmed => {
                self.on_registered(gateway);
            }
            SenderEvent::TxFailed { notify_peer } if !self.state.is_terminal() => {
                self.fail_tx(gateway, notify_peer);
            }
            _ => {
                debug!(
                    "[Sender] {} dropping unexpected event in state {:?}",
                    self.tx_id, self.state
                );
            }
        }
    }

    fn on_invitation_confirmed(&mut self, gateway: &mut dyn TxGateway, data: ConfirmInvitation) {
        let (Some(blinding), Some(nonce)) = (self.blinding.clone(), self.nonce.clone()) else {
            self.fail_tx(gateway, true);
            return;
        };

        let (receiver_public, receiver_nonce, receiver_share) = match (
            decompress(&data.public_blinding),
            decompress(&data.public_nonce),
            scalar_from_bytes(&data.signature_share),
        ) {
            (Ok(p), Ok(n), Ok(s)) => (p, n, s),
            _ => {
                error!("[Sender] {} malformed confirmation", self.tx_id);
                self.fail_tx(gateway, true);
                return;
            }
        };

        let joint_public = blinding.public + receiver_public;
        let joint_nonce = nonce.public + receiver_nonce;
        let message = kernel_message(self.fee, self.min_height, &compress(&joint_public));
        let e = challenge(&message, &joint_nonce, &joint_public);

        if !verify_share(&receiver_share, &e, &receiver_public, &receiver_nonce) {
            error!(
                "[Sender] {} receiver signature share failed verification",
                self.tx_id
            );
            self.fail_tx(gateway, true);
            return;
        }

        let own_share = sign_share(&blinding.secret, &nonce.secret, &e);
        debug!("[Sender] {} confirming transaction", self.tx_id);
        gateway.send_tx_message(
            self.tx_id,
            TxMessage::ConfirmTransaction(ConfirmTransaction {
                tx_id: self.tx_id,
                signature_share: scalar_to_bytes(&own_share),
            }),
        );
        self.state = SenderState::Confirmed;
    }

    fn on_registered(&mut self, gateway: &mut dyn TxGateway) {
        self.state = SenderState::Registered;
        let mut spent = std::mem::take(&mut self.input_coins);
        for coin in spent.iter_mut() {
            coin.status = CoinStatus::Spent;
        }
        if let Err(err) = self.keychain.update(&spent) {
            error!("[Sender] {} failed to persist spent inputs: {err}", self.tx_id);
            self.input_coins = spent;
            self.fail_tx(gateway, false);
            return;
        }
        info!("[Sender] {} transaction registered", self.tx_id);
        self.state = SenderState::Completed;
    }

    fn fail_tx(&mut self, gateway: &mut dyn TxGateway, notify_peer: bool) {
        let mut locked = std::mem::take(&mut self.input_coins);
        if !locked.is_empty() {
            for coin in locked.iter_mut() {
                coin.status = CoinStatus::Unspent;
                coin.locked_height = 0;
                coin.spent_tx_id = None;
            }
            if let Err(err) = self.keychain.update(&locked) {
                error!("[Sender] {} failed to unlock inputs: {err}", self.tx_id);
            }
        }
        if let Some(change) = self.change_coin.take() {
            if let Err(err) = self.keychain.remove(&[change]) {
                error!("[Sender] {} failed to drop change coin: {err}", self.tx_id);
            }
        }
        if notify_peer {
            gateway.send_tx_message(
                self.tx_id,
                TxMessage::TxFailed(TxFailed { tx_id: self.tx_id }),
            );
        }
        info!("[Sender] {} transaction failed", self.tx_id);
        self.state = SenderState::Failed;
    }
}
