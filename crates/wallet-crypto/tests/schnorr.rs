use wallet_crypto::{
    challenge, combine_shares, compress, decompress, scalar_from_bytes, scalar_to_bytes,
    sign_share, verify, verify_share, Commitment, KeyPair, Signature,
};

fn joint_context(
    sender: &KeyPair,
    receiver: &KeyPair,
    sender_nonce: &KeyPair,
    receiver_nonce: &KeyPair,
) -> (wallet_crypto::ProjectivePoint, wallet_crypto::ProjectivePoint) {
    (
        sender_nonce.public + receiver_nonce.public,
        sender.public + receiver.public,
    )
}

#[test]
fn two_party_signing_roundtrip() {
    let message = [7u8; 32];
    let sender = KeyPair::random();
    let receiver = KeyPair::random();
    let sender_nonce = KeyPair::random();
    let receiver_nonce = KeyPair::random();

    let (joint_nonce, joint_public) =
        joint_context(&sender, &receiver, &sender_nonce, &receiver_nonce);
    let e = challenge(&message, &joint_nonce, &joint_public);

    let s_sender = sign_share(&sender.secret, &sender_nonce.secret, &e);
    let s_receiver = sign_share(&receiver.secret, &receiver_nonce.secret, &e);

    assert!(verify_share(
        &s_sender,
        &e,
        &sender.public,
        &sender_nonce.public
    ));
    assert!(verify_share(
        &s_receiver,
        &e,
        &receiver.public,
        &receiver_nonce.public
    ));

    let sig = Signature {
        nonce: compress(&joint_nonce),
        k: scalar_to_bytes(&combine_shares(&s_sender, &s_receiver)),
    };
    assert!(verify(&sig, &message, &joint_public));
}

#[test]
fn tampered_share_is_rejected() {
    let message = [1u8; 32];
    let sender = KeyPair::random();
    let receiver = KeyPair::random();
    let sender_nonce = KeyPair::random();
    let receiver_nonce = KeyPair::random();

    let (joint_nonce, joint_public) =
        joint_context(&sender, &receiver, &sender_nonce, &receiver_nonce);
    let e = challenge(&message, &joint_nonce, &joint_public);

    let mut bad = scalar_to_bytes(&sign_share(&receiver.secret, &receiver_nonce.secret, &e));
    bad[31] ^= 1;
    let bad = scalar_from_bytes(&bad).expect("still a valid scalar");
    assert!(!verify_share(
        &bad,
        &e,
        &receiver.public,
        &receiver_nonce.public
    ));
}

#[test]
fn wrong_message_fails_verification() {
    let message = [2u8; 32];
    let sender = KeyPair::random();
    let receiver = KeyPair::random();
    let sender_nonce = KeyPair::random();
    let receiver_nonce = KeyPair::random();

    let (joint_nonce, joint_public) =
        joint_context(&sender, &receiver, &sender_nonce, &receiver_nonce);
    let e = challenge(&message, &joint_nonce, &joint_public);
    let s = combine_shares(
        &sign_share(&sender.secret, &sender_nonce.secret, &e),
        &sign_share(&receiver.secret, &receiver_nonce.secret, &e),
    );
    let sig = Signature {
        nonce: compress(&joint_nonce),
        k: scalar_to_bytes(&s),
    };
    assert!(!verify(&sig, &[3u8; 32], &joint_public));
}

#[test]
fn commitments_are_deterministic_and_binding() {
    let key = KeyPair::random().secret;
    let a = Commitment::commit(&key, 100);
    let b = Commitment::commit(&key, 100);
    let c = Commitment::commit(&key, 101);
    assert_eq!(a, b);
    assert_ne!(a, c);

    let other_key = KeyPair::random().secret;
    assert_ne!(a, Commitment::commit(&other_key, 100));
}

#[test]
fn commitments_are_homomorphic() {
    let k1 = KeyPair::random().secret;
    let k2 = KeyPair::random().secret;

    let sum = decompress(Commitment::commit(&k1, 30).as_bytes()).unwrap()
        + decompress(Commitment::commit(&k2, 12).as_bytes()).unwrap();
    let direct = Commitment::commit(&combine_shares(&k1, &k2), 42);
    assert_eq!(compress(&sum), *direct.as_bytes());
}
