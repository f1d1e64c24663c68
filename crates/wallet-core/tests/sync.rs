//! Synchronization protocol: proof fan-out, FIFO pairing, status
//! transitions driven by node proofs.

mod common;

use common::{make_keychain, state_id, TestNetwork};
use std::sync::Arc;
use tempfile::TempDir;
use wallet_core::{
    BlockHeader, Coin, CoinStatus, KeyType, MinedEntry, NodeMessage, NodeRequest, Rules, TxId,
    UtxoProof, Wallet, MAX_HEIGHT,
};
use wallet_crypto::Commitment;

fn store_coin(
    keychain: &Arc<wallet_core::Keychain>,
    amount: u64,
    status: CoinStatus,
    height: u64,
) -> Coin {
    let mut coin = Coin::new(amount, status, height, MAX_HEIGHT, KeyType::Regular);
    keychain.store(&mut coin).expect("store coin");
    coin
}

fn commitment_for(keychain: &Arc<wallet_core::Keychain>, coin: &Coin) -> Commitment {
    Commitment::commit(&keychain.calc_key(coin), coin.amount)
}

fn proof_with_root(maturity: u64, commitment: &Commitment) -> (UtxoProof, [u8; 32]) {
    let proof = UtxoProof {
        maturity,
        count: 1,
        path: Vec::new(),
    };
    let root = proof.root(commitment);
    (proof, root)
}

struct Fixture {
    _dir: TempDir,
    net: TestNetwork,
    wallet: Wallet<TestNetwork>,
    keychain: Arc<wallet_core::Keychain>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let keychain = make_keychain(&dir.path().join("wallet.db"), 0x5);
    let net = TestNetwork::default();
    let wallet = Wallet::new(keychain.clone(), net.clone());
    Fixture {
        _dir: dir,
        net,
        wallet,
        keychain,
    }
}

fn coins_of(keychain: &Arc<wallet_core::Keychain>) -> Vec<Coin> {
    let mut coins = Vec::new();
    keychain.visit(|c| {
        coins.push(c.clone());
        true
    });
    coins
}

#[test]
fn empty_proof_on_locked_coin_marks_it_spent() {
    let mut f = fixture();
    let mut locked = store_coin(&f.keychain, 80, CoinStatus::Locked, 4);
    locked.spent_tx_id = Some(TxId::random());
    f.keychain.update(&[locked]).expect("persist lock");

    let id = state_id(12, 2);
    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::Mined(vec![]));
    f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition: [3u8; 32],
    }));
    assert!(!f.wallet.is_synchronized(), "proof still outstanding");

    let requests = f.net.take_node_requests();
    assert!(requests
        .iter()
        .any(|r| matches!(r, NodeRequest::GetProofUtxo { .. })));

    let keep = f.wallet.handle_node_message(NodeMessage::ProofUtxo(vec![]));
    assert!(f.wallet.is_synchronized());
    assert!(!keep, "idle wallet releases the node connection");

    let coins = coins_of(&f.keychain);
    assert_eq!(coins[0].status, CoinStatus::Spent);
}

#[test]
fn valid_proof_confirms_unconfirmed_coin_with_proof_maturity() {
    let mut f = fixture();
    let coin = store_coin(&f.keychain, 55, CoinStatus::Unconfirmed, 7);
    let commitment = commitment_for(&f.keychain, &coin);
    let (proof, definition) = proof_with_root(67, &commitment);

    let id = state_id(9, 4);
    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::Mined(vec![]));
    f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition,
    }));
    f.wallet
        .handle_node_message(NodeMessage::ProofUtxo(vec![proof]));

    let coins = coins_of(&f.keychain);
    assert_eq!(coins[0].status, CoinStatus::Unspent);
    assert_eq!(coins[0].maturity, 67);
    assert_eq!(coins[0].confirm_height, 9);
    assert_eq!(f.keychain.get_system_state_id(), id);
}

#[test]
fn invalid_proof_leaves_coin_unconfirmed() {
    let mut f = fixture();
    store_coin(&f.keychain, 55, CoinStatus::Unconfirmed, 7);

    let id = state_id(9, 4);
    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::Mined(vec![]));
    f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition: [9u8; 32],
    }));
    f.wallet.handle_node_message(NodeMessage::ProofUtxo(vec![UtxoProof {
        maturity: 50,
        count: 1,
        path: Vec::new(),
    }]));

    let coins = coins_of(&f.keychain);
    assert_eq!(coins[0].status, CoinStatus::Unconfirmed);
    assert!(f.wallet.is_synchronized(), "sync continues past bad proofs");
}

#[test]
fn proofs_pair_with_requests_in_fifo_order() {
    let mut f = fixture();
    let first = store_coin(&f.keychain, 10, CoinStatus::Unconfirmed, 3);
    let second = store_coin(&f.keychain, 20, CoinStatus::Unconfirmed, 3);
    assert!(first.id < second.id);

    let commitment = commitment_for(&f.keychain, &second);
    let (proof, definition) = proof_with_root(30, &commitment);

    let id = state_id(8, 6);
    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::Mined(vec![]));
    f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition,
    }));

    // First response pairs with the first requested coin, not the one the
    // proof happens to match.
    f.wallet.handle_node_message(NodeMessage::ProofUtxo(vec![]));
    f.wallet
        .handle_node_message(NodeMessage::ProofUtxo(vec![proof]));

    let coins = coins_of(&f.keychain);
    assert_eq!(coins[0].amount, 10);
    assert_eq!(coins[0].status, CoinStatus::Unconfirmed);
    assert_eq!(coins[1].amount, 20);
    assert_eq!(coins[1].status, CoinStatus::Unspent);
}

#[test]
fn mined_entries_enqueue_coinbase_and_commission_coins() {
    let mut f = fixture();
    let rules = Rules::default();

    // Compute the expected coinbase commitment the same way the wallet
    // will: an unsaved coin snapshot keyed by the keychain master.
    let coinbase = Coin::new(
        rules.coinbase_emission,
        CoinStatus::Unconfirmed,
        5,
        MAX_HEIGHT,
        KeyType::Coinbase,
    );
    let commitment = commitment_for(&f.keychain, &coinbase);
    let (proof, definition) = proof_with_root(65, &commitment);

    let id = state_id(5, 7);
    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition,
    }));
    f.wallet.handle_node_message(NodeMessage::Mined(vec![MinedEntry {
        height: 5,
        hash: [1u8; 32],
        active: true,
        fees: 7,
    }]));

    let proof_requests: Vec<_> = f
        .net
        .take_node_requests()
        .into_iter()
        .filter(|r| matches!(r, NodeRequest::GetProofUtxo { .. }))
        .collect();
    assert_eq!(proof_requests.len(), 2, "coinbase plus commission");

    // Coinbase proof valid, commission still unmined.
    f.wallet
        .handle_node_message(NodeMessage::ProofUtxo(vec![proof]));
    f.wallet.handle_node_message(NodeMessage::ProofUtxo(vec![]));

    assert!(f.wallet.is_synchronized());
    let coins = coins_of(&f.keychain);
    assert_eq!(coins.len(), 1, "only the proven coinbase got stored");
    assert_eq!(coins[0].amount, rules.coinbase_emission);
    assert_eq!(coins[0].key_type, KeyType::Coinbase);
    assert_eq!(coins[0].status, CoinStatus::Unspent);
    assert_eq!(coins[0].maturity, 65);
}

#[test]
fn inactive_and_stale_mined_entries_are_ignored() {
    let mut f = fixture();

    let id = state_id(5, 7);
    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition: [0u8; 32],
    }));
    f.wallet.handle_node_message(NodeMessage::Mined(vec![MinedEntry {
        height: 5,
        hash: [1u8; 32],
        active: false,
        fees: 0,
    }]));

    assert!(f.wallet.is_synchronized());
    assert!(coins_of(&f.keychain).is_empty());
}

#[test]
fn repeated_new_tip_is_idempotent() {
    let mut f = fixture();
    let id = state_id(12, 2);

    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::NewTip(id));

    let mined_requests = f
        .net
        .take_node_requests()
        .into_iter()
        .filter(|r| matches!(r, NodeRequest::GetMined { .. }))
        .count();
    assert_eq!(mined_requests, 1);

    // Finish the one outstanding round; a later replay of the same tip is
    // a no-op as well.
    f.wallet.handle_node_message(NodeMessage::Mined(vec![]));
    f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition: [0u8; 32],
    }));
    assert!(f.wallet.is_synchronized());

    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    assert!(f.net.take_node_requests().is_empty());
    assert!(f.wallet.is_synchronized());
}

#[test]
fn unsolicited_node_responses_are_dropped() {
    let mut f = fixture();
    assert!(!f.wallet.handle_node_message(NodeMessage::Boolean(true)));
    assert!(!f.wallet.handle_node_message(NodeMessage::ProofUtxo(vec![])));
    assert!(coins_of(&f.keychain).is_empty());
}

#[test]
fn node_connection_closes_when_idle() {
    let mut f = fixture();
    let id = state_id(3, 1);
    f.wallet.handle_node_message(NodeMessage::NewTip(id));
    f.wallet.handle_node_message(NodeMessage::Mined(vec![]));
    let keep = f.wallet.handle_node_message(NodeMessage::Hdr(BlockHeader {
        height: id.height,
        hash: id.hash,
        definition: [0u8; 32],
    }));
    assert!(!keep);
    assert!(f.net.node_closed_count() >= 1);
}
