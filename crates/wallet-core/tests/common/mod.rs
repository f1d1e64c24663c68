//! Shared fixtures: a capturing `NetworkIo` double and sync helpers.
#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use wallet_core::{
    BlockHeader, Keychain, NetworkIo, NodeMessage, NodeRequest, PeerId, SystemStateId, TxMessage,
    Wallet,
};

#[derive(Default)]
pub struct NetLog {
    pub tx_messages: Vec<(PeerId, TxMessage)>,
    pub node_requests: Vec<NodeRequest>,
    pub closed_peers: Vec<PeerId>,
    pub node_closed: u32,
}

/// Records every outbound call so tests can assert exact traces.
#[derive(Clone, Default)]
pub struct TestNetwork(pub Rc<RefCell<NetLog>>);

impl TestNetwork {
    pub fn take_tx_messages(&self) -> Vec<(PeerId, TxMessage)> {
        std::mem::take(&mut self.0.borrow_mut().tx_messages)
    }

    pub fn take_node_requests(&self) -> Vec<NodeRequest> {
        std::mem::take(&mut self.0.borrow_mut().node_requests)
    }

    pub fn closed_peers(&self) -> Vec<PeerId> {
        self.0.borrow().closed_peers.clone()
    }

    pub fn node_closed_count(&self) -> u32 {
        self.0.borrow().node_closed
    }
}

impl NetworkIo for TestNetwork {
    fn send_tx_message(&mut self, peer: PeerId, msg: TxMessage) {
        self.0.borrow_mut().tx_messages.push((peer, msg));
    }

    fn send_node_message(&mut self, msg: NodeRequest) {
        self.0.borrow_mut().node_requests.push(msg);
    }

    fn close_connection(&mut self, peer: PeerId) {
        self.0.borrow_mut().closed_peers.push(peer);
    }

    fn close_node_connection(&mut self) {
        self.0.borrow_mut().node_closed += 1;
    }
}

pub fn make_keychain(path: &Path, seed: u8) -> Arc<Keychain> {
    Arc::new(Keychain::init(path, "passphrase", &[seed; 32]).expect("init keychain"))
}

pub fn state_id(height: u64, tag: u8) -> SystemStateId {
    SystemStateId {
        height,
        hash: [tag; 32],
    }
}

/// Drive a wallet with no Unconfirmed/Locked coins through a full sync.
pub fn sync_empty(wallet: &mut Wallet<TestNetwork>, height: u64, definition: [u8; 32]) {
    let id = state_id(height, 1);
    wallet.handle_node_message(NodeMessage::NewTip(id));
    wallet.handle_node_message(NodeMessage::Mined(vec![]));
    wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition,
    }));
    assert!(wallet.is_synchronized(), "sync should have completed");
}
