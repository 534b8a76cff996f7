use bytes::Bytes;
use parley_core::config::SessionConfig;
use parley_core::{Envelope, Identity, SendFlags};
use parley_sessions::Inbound;

use crate::*;

fn inject_reliable(net: &Net, from: Identity, to: Identity, seq: u64, payload: &'static [u8]) {
    let env = Envelope::data(from, 1, 0, seq, true, Bytes::from_static(payload));
    assert!(net.hub.inject(to, Inbound::Envelope(env)));
}

#[test]
fn test_reliable_messages_arrive_in_order_once() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);

    send_all(&mut a, b.local_identity(), &["m1", "m2", "m3"], 5)?;
    b.run_callbacks();

    let got = b.receive_messages(5, 10);
    assert_eq!(texts(&got), vec!["m1", "m2", "m3"]);
    assert!(got.iter().all(|m| m.sender() == a.local_identity() && m.channel() == 5));
    assert!(b.receive_messages(5, 10).is_empty());
    Ok(())
}

#[test]
fn test_receive_honours_max_count_and_channel() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    let b_id = b.local_identity();

    send_all(&mut a, b_id, &["x1", "x2", "x3"], 1)?;
    send_all(&mut a, b_id, &["y1"], 2)?;
    b.run_callbacks();

    assert!(b.receive_messages(1, 0).is_empty());
    assert_eq!(texts(&b.receive_messages(1, 2)), vec!["x1", "x2"]);
    assert_eq!(texts(&b.receive_messages(7, 10)), Vec::<String>::new());
    assert_eq!(texts(&b.receive_messages(2, 10)), vec!["y1"]);
    assert_eq!(texts(&b.receive_messages(1, 10)), vec!["x3"]);
    Ok(())
}

#[test]
fn test_receive_merges_peers_in_arrival_order() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    let mut c = net.node(0xc);
    let b_id = b.local_identity();

    send_all(&mut a, b_id, &["a1"], 0)?;
    send_all(&mut c, b_id, &["c1"], 0)?;
    b.run_callbacks();
    send_all(&mut c, b_id, &["c2"], 0)?;
    send_all(&mut a, b_id, &["a2"], 0)?;
    b.run_callbacks();

    let got = b.receive_messages(0, 10);
    assert_eq!(texts(&got), vec!["a1", "c1", "c2", "a2"]);
    let numbers: Vec<u64> = got.iter().map(|m| m.message_number()).collect();
    assert!(numbers.windows(2).all(|w| w[0] < w[1]), "{numbers:?}");
    Ok(())
}

#[test]
fn test_replies_flow_back_on_the_same_channel() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    let a_id = a.local_identity();
    let b_id = b.local_identity();

    send_all(&mut a, b_id, &["ping"], 3)?;
    b.run_callbacks();
    for m in b.receive_messages(3, 10) {
        b.send_message(m.sender(), b"pong", SendFlags::RELIABLE, m.channel())?;
    }
    a.run_callbacks();

    assert_eq!(drain(&mut a, 3), vec![b"pong".to_vec()]);
    // replying is an implicit accept
    assert_eq!(state(&b, a_id), ConnectionState::Connected);
    assert_eq!(state(&a, b_id), ConnectionState::Connected);
    assert!(take_events(&mut b)
        .iter()
        .all(|e| matches!(e, SessionEvent::SessionRequest { .. })));
    Ok(())
}

#[test]
fn test_unreliable_loss_does_not_hold_back_reliable() -> Result<()> {
    let net = Net::new();
    let mut a = net.node_with(0xa, |t| t.drop_unreliable(true));
    let mut b = net.node(0xb);
    let b_id = b.local_identity();

    a.send_message(b_id, b"r1", SendFlags::RELIABLE, 0)?;
    a.send_message(b_id, b"lost", SendFlags::UNRELIABLE, 0)?;
    a.send_message(b_id, b"r2", SendFlags::RELIABLE | SendFlags::NO_NAGLE, 0)?;
    b.run_callbacks();

    let got = b.receive_messages(0, 10);
    assert_eq!(texts(&got), vec!["r1", "r2"]);
    assert!(got.iter().all(|m| m.is_reliable()));
    Ok(())
}

#[test]
fn test_unreliable_messages_are_delivered_when_not_lost() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    let b_id = b.local_identity();

    a.send_message(b_id, b"u1", SendFlags::UNRELIABLE, 0)?;
    a.send_message(b_id, b"u2", SendFlags::NO_DELAY, 0)?;
    b.run_callbacks();

    let got = b.receive_messages(0, 10);
    assert_eq!(texts(&got), vec!["u1", "u2"]);
    assert!(got.iter().all(|m| !m.is_reliable()));
    Ok(())
}

#[test]
fn test_reordered_reliable_datagrams_are_resequenced() {
    let net = Net::new();
    let a_id = Identity::new(0xa);
    let mut b = net.node(0xb);
    let b_id = b.local_identity();

    inject_reliable(&net, a_id, b_id, 1, b"one");
    inject_reliable(&net, a_id, b_id, 3, b"three");
    inject_reliable(&net, a_id, b_id, 2, b"two");
    inject_reliable(&net, a_id, b_id, 2, b"two again");
    b.run_callbacks();

    assert_eq!(texts(&b.receive_messages(0, 10)), vec!["one", "two", "three"]);
}

#[test]
fn test_gap_is_skipped_when_reorder_window_overflows() {
    let net = Net::with_config(SessionConfig {
        reorder_window: 2,
        ..SessionConfig::default()
    });
    let a_id = Identity::new(0xa);
    let mut b = net.node(0xb);
    let b_id = b.local_identity();

    inject_reliable(&net, a_id, b_id, 1, b"1");
    inject_reliable(&net, a_id, b_id, 3, b"3");
    inject_reliable(&net, a_id, b_id, 4, b"4");
    b.run_callbacks();
    assert_eq!(texts(&b.receive_messages(0, 10)), vec!["1"]);

    inject_reliable(&net, a_id, b_id, 5, b"5");
    inject_reliable(&net, a_id, b_id, 2, b"2 too late");
    b.run_callbacks();
    assert_eq!(texts(&b.receive_messages(0, 10)), vec!["3", "4", "5"]);
}

#[test]
fn test_released_message_keeps_its_payload() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);

    send_all(&mut a, b.local_identity(), &["keep me"], 0)?;
    b.run_callbacks();

    let mut got = b.receive_messages(0, 1);
    let message = got.pop().expect("one message");
    let payload = message.clone().into_payload();
    message.release();
    assert_eq!(&payload[..], b"keep me");
    Ok(())
}
