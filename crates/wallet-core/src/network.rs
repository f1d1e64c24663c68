//! Outbound transport boundary. The embedder supplies the implementation;
//! the core only ever emits through it and never blocks on delivery.

use crate::messages::{NodeRequest, TxMessage};

pub type PeerId = u64;

pub trait NetworkIo {
    fn send_tx_message(&mut self, peer: PeerId, msg: TxMessage);
    fn send_node_message(&mut self, msg: NodeRequest);
    fn close_connection(&mut self, peer: PeerId);
    fn close_node_connection(&mut self);
}
