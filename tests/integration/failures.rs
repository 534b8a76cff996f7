use parley_core::wire::WireError;
use parley_core::{EndReason, Identity, SendFlags};
use parley_sessions::{SendError, Status, Transport, TransportError};

use crate::*;

#[test]
fn test_unreachable_peer_fails_the_session() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let ghost = Identity::new(0x6057);

    // the send itself is accepted; the loss shows up on the next tick
    a.send_message(ghost, b"anyone?", SendFlags::RELIABLE, 0)?;
    a.run_callbacks();

    assert_eq!(state(&a, ghost), ConnectionState::Broken);
    assert_eq!(
        take_events(&mut a),
        vec![SessionEvent::SessionFailed {
            identity: ghost,
            reason: EndReason::PeerLost,
        }]
    );
    let info = a.get_session_state(ghost).1.expect("broken session is still listed");
    assert_eq!(info.end_reason, Some(EndReason::PeerLost));

    let r = a.send_message(ghost, b"again", SendFlags::RELIABLE, 0);
    assert_eq!(Status::from(&r), Status::NoConnection);
    Ok(())
}

#[test]
fn test_peer_disconnecting_mid_session() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    connect(&mut a, &mut b)?;
    let b_id = b.local_identity();

    net.hub.disconnect(b_id);
    a.send_message(b_id, b"into the void", SendFlags::RELIABLE, 0)?;
    a.run_callbacks();
    assert_eq!(
        take_events(&mut a),
        vec![SessionEvent::SessionFailed {
            identity: b_id,
            reason: EndReason::PeerLost,
        }]
    );

    // a second loss report for the same session is not a new failure
    net.hub.inject(a.local_identity(), parley_sessions::Inbound::PeerLost(b_id));
    a.run_callbacks();
    assert!(take_events(&mut a).is_empty());
    Ok(())
}

#[test]
fn test_lost_unaccepted_session_posts_no_failure() {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    let a_id = a.local_identity();

    a.send_message(b.local_identity(), b"hi", SendFlags::RELIABLE, 0)
        .unwrap();
    b.run_callbacks();
    take_events(&mut b);

    net.hub.disconnect(a_id);
    net.hub.inject(b.local_identity(), parley_sessions::Inbound::PeerLost(a_id));
    b.run_callbacks();

    assert_eq!(state(&b, a_id), ConnectionState::Broken);
    assert!(take_events(&mut b).is_empty());
}

#[test]
fn test_auto_restart_revives_a_broken_session() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    connect(&mut a, &mut b)?;
    let a_id = a.local_identity();
    let b_id = b.local_identity();

    b.close_session(a_id);
    a.run_callbacks();
    assert_eq!(state(&a, b_id), ConnectionState::Broken);
    take_events(&mut a);

    let restart = SendFlags::RELIABLE | SendFlags::AUTO_RESTART_BROKEN_SESSION;
    a.send_message(b_id, b"back", restart, 0)?;
    b.run_callbacks();

    assert_eq!(
        take_events(&mut b),
        vec![SessionEvent::SessionRequest { identity: a_id }]
    );
    assert_eq!(drain(&mut b, 0), vec![b"back".to_vec()]);
    Ok(())
}

#[test]
fn test_invalid_parameters_create_nothing() {
    let net = Net::new();
    let mut a = net.node(0xa);
    let max = a.config().max_message_size;
    let max_channel = a.config().max_channel;
    let too_big = vec![7u8; max + 1];
    let b = Identity::new(0xb);

    let cases = [
        a.send_message(Identity::INVALID, b"x", SendFlags::RELIABLE, 0),
        a.send_message(b, b"x", SendFlags::RELIABLE, max_channel + 1),
        a.send_message(b, &too_big, SendFlags::RELIABLE, 0),
    ];
    for r in &cases {
        assert_eq!(Status::from(r), Status::InvalidParam, "{r:?}");
    }
    assert!(matches!(cases[2], Err(SendError::PayloadTooLarge { size, .. }) if size == max + 1));
    assert!(a.sessions().is_empty());

    // exactly the maximum is fine
    let _b = net.hub.endpoint(b);
    let at_max = vec![7u8; max];
    assert!(a.send_message(b, &at_max, SendFlags::RELIABLE, 0).is_ok());
}

#[test]
fn test_unknown_flag_bits_are_rejected() {
    assert!(matches!(
        SendFlags::from_bits(0x02),
        Err(WireError::UnknownSendFlags(0x02))
    ));
    let flags = SendFlags::from_bits(0x08 | 0x20).unwrap();
    assert!(flags.is_reliable());
    assert!(flags.auto_restart());
}

#[test]
fn test_busy_transport_keeps_reliable_stream_intact() -> Result<()> {
    let net = Net::new();
    let mut a = net.node_with(0xa, |t| t.with_capacity(3));
    let mut b = net.node(0xb);
    let b_id = b.local_identity();

    let mut sent = Vec::new();
    let mut refused = 0;
    for n in 0..6 {
        let body = format!("m{n}");
        match a.send_message(b_id, body.as_bytes(), SendFlags::RELIABLE, 0) {
            Ok(()) => sent.push(body),
            Err(SendError::Transport(TransportError::Busy)) => {
                refused += 1;
                b.run_callbacks();
                a.send_message(b_id, body.as_bytes(), SendFlags::RELIABLE, 0)?;
                sent.push(body);
            }
            Err(e) => return Err(e.into()),
        }
    }
    b.run_callbacks();

    assert!(refused > 0);
    assert_eq!(texts(&b.receive_messages(0, 10)), sent);
    Ok(())
}

#[test]
fn test_stale_data_from_an_old_session_is_ignored() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    connect(&mut a, &mut b)?;
    let a_id = a.local_identity();
    let b_id = b.local_identity();
    let current = b.get_session_state(a_id).1.map(|i| i.remote_session_id).unwrap_or(0);

    let stale = parley_core::Envelope::data(
        a_id,
        current.wrapping_add(100),
        0,
        1,
        true,
        bytes::Bytes::from_static(b"ghost"),
    );
    net.hub.inject(b_id, parley_sessions::Inbound::Envelope(stale));
    send_all(&mut a, b_id, &["live"], 0)?;
    b.run_callbacks();

    assert_eq!(drain(&mut b, 0), vec![b"live".to_vec()]);
    Ok(())
}

#[test]
fn test_restart_recovers_when_the_first_announcement_is_lost() -> Result<()> {
    let net = Net::new();
    let mut a = net.node(0xa);
    let mut b = net.node(0xb);
    connect(&mut a, &mut b)?;
    let a_id = a.local_identity();
    let b_id = b.local_identity();

    // A restarts its session; everything it sends in the meantime is lost,
    // so B still holds the old session id.
    a.close_session(b_id);
    let restart = SendFlags::RELIABLE | SendFlags::AUTO_RESTART_BROKEN_SESSION;
    a.send_message(b_id, b"lost", restart, 0)?;
    let mut wire = net.hub.endpoint(b_id);
    while wire.poll().is_some() {}

    a.send_message(b_id, b"second", SendFlags::RELIABLE, 0)?;
    b.run_callbacks();
    assert_eq!(drain(&mut b, 0), vec![b"second".to_vec()]);
    assert!(take_events(&mut b).is_empty());

    a.run_callbacks();
    assert_eq!(state(&a, b_id), ConnectionState::Connected);
    send_all(&mut a, b_id, &["third"], 0)?;
    b.run_callbacks();
    assert_eq!(drain(&mut b, 0), vec![b"third".to_vec()]);
    assert_eq!(state(&b, a_id), ConnectionState::Connected);
    Ok(())
}
