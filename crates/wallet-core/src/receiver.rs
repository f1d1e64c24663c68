//! Receiver side of the two-party transfer negotiation.

use crate::keychain::Keychain;
use crate::messages::{
    kernel_message, ConfirmInvitation, ConfirmTransaction, InviteReceiver, Transaction, TxFailed,
    TxKernel, TxMessage, TxRegistered,
};
use crate::model::{Coin, CoinStatus, KeyType, TxId, MAX_HEIGHT};
use crate::wallet::TxGateway;
use log::{debug, error, info};
use std::sync::Arc;
use wallet_crypto::{
    challenge, combine_shares, compress, decompress, scalar_from_bytes, scalar_to_bytes,
    sign_share, verify_share, Commitment, KeyPair, ProjectivePoint, Scalar, Signature,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReceiverState {
    Initial,
    InvitationConfirmed,
    Registered,
    Failed,
    Completed,
}

impl ReceiverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiverState::Failed | ReceiverState::Completed)
    }
}

pub enum ReceiverEvent {
    /// Sender supplied its signature share.
    TxConfirmationCompleted(ConfirmTransaction),
    /// Node accepted the submitted transaction.
    TxRegistrationCompleted,
    /// Negotiation failed; see `SenderEvent::TxFailed` for the flag.
    TxFailed { notify_peer: bool },
}

struct Negotiation {
    own_share: Scalar,
    sender_public: ProjectivePoint,
    sender_nonce: ProjectivePoint,
    joint_public: ProjectivePoint,
    joint_nonce: ProjectivePoint,
    message: [u8; 32],
    output_commitment: Commitment,
}

pub struct Receiver {
    tx_id: TxId,
    keychain: Arc<Keychain>,
    state: ReceiverState,
    invite: InviteReceiver,
    negotiation: Option<Negotiation>,
    output_coin: Option<Coin>,
}

impl Receiver {
    pub fn new(keychain: Arc<Keychain>, invite: InviteReceiver) -> Self {
        Receiver {
            tx_id: invite.tx_id,
            keychain,
            state: ReceiverState::Initial,
            invite,
            negotiation: None,
            output_coin: None,
        }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Validate the invitation, create the pending output and answer with
    /// the receiver's signature share. Runs once the wallet is
    /// synchronized.
    pub fn start(&mut self, gateway: &mut dyn TxGateway) {
        if self.state != ReceiverState::Initial {
            debug!("[Receiver] {} start in state {:?}", self.tx_id, self.state);
            return;
        }

        if self.invite.inputs.is_empty() || self.invite.amount <= self.invite.fee {
            error!("[Receiver] {} malformed invitation", self.tx_id);
            self.fail_tx(gateway, true);
            return;
        }
        let (sender_public, sender_nonce) = match (
            decompress(&self.invite.public_blinding),
            decompress(&self.invite.public_nonce),
        ) {
            (Ok(p), Ok(n)) => (p, n),
            _ => {
                error!("[Receiver] {} invalid sender points", self.tx_id);
                self.fail_tx(gateway, true);
                return;
            }
        };

        let value = self.invite.amount - self.invite.fee;
        let mut coin = Coin::new(
            value,
            CoinStatus::Unconfirmed,
            self.invite.min_height,
            MAX_HEIGHT,
            KeyType::Regular,
        );
        coin.create_tx_id = Some(self.tx_id);
        if let Err(err) = self.keychain.store(&mut coin) {
            error!("[Receiver] {} failed to store output: {err}", self.tx_id);
            self.fail_tx(gateway, true);
            return;
        }

        let key = self.keychain.calc_key(&coin);
        let blinding = KeyPair::from_secret(key);
        let nonce = KeyPair::random();
        let output_commitment = Commitment::commit(&blinding.secret, value);
        self.output_coin = Some(coin);

        let joint_public = blinding.public + sender_public;
        let joint_nonce = nonce.public + sender_nonce;
        let message = kernel_message(
            self.invite.fee,
            self.invite.min_height,
            &compress(&joint_public),
        );
        let e = challenge(&message, &joint_nonce, &joint_public);
        let own_share = sign_share(&blinding.secret, &nonce.secret, &e);

        info!(
            "[Receiver] {} confirming invitation, receiving {}",
            self.tx_id, value
        );
        gateway.send_tx_message(
            self.tx_id,
            TxMessage::ConfirmInvitation(ConfirmInvitation {
                tx_id: self.tx_id,
                public_blinding: blinding.public_bytes(),
                public_nonce: nonce.public_bytes(),
                signature_share: scalar_to_bytes(&own_share),
            }),
        );

        self.negotiation = Some(Negotiation {
            own_share,
            sender_public,
            sender_nonce,
            joint_public,
            joint_nonce,
            message,
            output_commitment,
        });
        self.state = ReceiverState::InvitationConfirmed;
    }

    pub fn process_event(&mut self, gateway: &mut dyn TxGateway, event: ReceiverEvent) {
        match event {
            ReceiverEvent::TxConfirmationCompleted(data)
                if self.state == ReceiverState::InvitationConfirmed =>
            {
                self.on_confirmation(gateway, data);
            }
            ReceiverEvent::TxRegistrationCompleted
                if self.state == ReceiverState::InvitationConfirmed =>
            {
                self.on_registered(gateway);
            }
            ReceiverEvent::TxFailed { notify_peer } if !self.state.is_terminal() => {
                self.fail_tx(gateway, notify_peer);
            }
            _ => {
                debug!(
                    "[Receiver] {} dropping unexpected event in state {:?}",
                    self.tx_id, self.state
                );
            }
        }
    }

    /// Combine both shares into the final kernel signature and hand the
    /// assembled transaction to the node.
    fn on_confirmation(&mut self, gateway: &mut dyn TxGateway, data: ConfirmTransaction) {
        let Some(neg) = self.negotiation.as_ref() else {
            self.fail_tx(gateway, true);
            return;
        };

        let sender_share = match scalar_from_bytes(&data.signature_share) {
            Ok(share) => share,
            Err(_) => {
                error!("[Receiver] {} malformed signature share", self.tx_id);
                self.fail_tx(gateway, true);
                return;
            }
        };

        let e = challenge(&neg.message, &neg.joint_nonce, &neg.joint_public);
        if !verify_share(&sender_share, &e, &neg.sender_public, &neg.sender_nonce) {
            error!(
                "[Receiver] {} sender signature share failed verification",
                self.tx_id
            );
            self.fail_tx(gateway, true);
            return;
        }

        let signature = Signature {
            nonce: compress(&neg.joint_nonce),
            k: scalar_to_bytes(&combine_shares(&neg.own_share, &sender_share)),
        };

        let mut outputs = self.invite.outputs.clone();
        outputs.push(neg.output_commitment);
        let transaction = Transaction {
            inputs: self.invite.inputs.clone(),
            outputs,
            kernel: TxKernel {
                excess: compress(&neg.joint_public),
                fee: self.invite.fee,
                min_height: self.invite.min_height,
                signature,
            },
        };
        if !transaction.is_valid() {
            error!("[Receiver] {} assembled transaction invalid", self.tx_id);
            self.fail_tx(gateway, true);
            return;
        }

        debug!("[Receiver] {} registering transaction", self.tx_id);
        gateway.register_tx(self.tx_id, transaction);
        // Stays InvitationConfirmed until the node answers.
    }

    fn on_registered(&mut self, gateway: &mut dyn TxGateway) {
        self.state = ReceiverState::Registered;
        gateway.send_tx_message(
            self.tx_id,
            TxMessage::TxRegistered(TxRegistered {
                tx_id: self.tx_id,
                value: true,
            }),
        );
        info!("[Receiver] {} transaction registered", self.tx_id);
        self.state = ReceiverState::Completed;
    }

    fn fail_tx(&mut self, gateway: &mut dyn TxGateway, notify_peer: bool) {
        if let Some(coin) = self.output_coin.take() {
            if let Err(err) = self.keychain.remove(&[coin]) {
                error!(
                    "[Receiver] {} failed to drop pending output: {err}",
                    self.tx_id
                );
            }
        }
        if notify_peer {
            gateway.send_tx_message(
                self.tx_id,
                TxMessage::TxFailed(TxFailed { tx_id: self.tx_id }),
            );
        }
        info!("[Receiver] {} transaction failed", self.tx_id);
        self.state = ReceiverState::Failed;
    }
}
