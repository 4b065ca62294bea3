// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors
//
// Send side of the session: record validation before any bytes leave,
// the send-confirmation handshake (block-until-verdict, immediate failure
// on denial, denial overriding an earlier grant), source announcement
// with rollback, and per-registration sequence numbering.

mod common;

use common::{logged_in_session, test_key, RecordingTransport, TEST_ASPECT, TEST_GROUP};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telbus::codec::AttributeValue;
use telbus::{DataDescription, DataState, Error, SenderRole};

fn description() -> DataDescription {
    DataDescription::new(TEST_GROUP, TEST_ASPECT, 0)
}

fn ready_record(session: &telbus::Session) -> telbus::DataRecord {
    let mut record = session.create_data(TEST_GROUP).expect("create");
    record.object_id = 1;
    record.description = description();
    record.timestamp = 42;
    record.values = vec![
        AttributeValue::Int(88),
        AttributeValue::String("ok".into()),
    ];
    record
}

#[test]
fn test_create_data_starts_from_undefined_defaults() {
    let session = logged_in_session(RecordingTransport::new());
    let record = session.create_data(TEST_GROUP).expect("create");
    assert_eq!(record.object_id, 0);
    assert_eq!(record.timestamp, 0);
    assert_eq!(record.values.len(), 2);
    assert!(
        record.values.iter().all(|v| !v.is_defined()),
        "defaults are the undefined sentinels: {:?}",
        record.values
    );
    session.disconnect();
}

#[test]
fn test_send_rejects_undefined_attributes_before_the_wire() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");
    session.confirm_send(test_key(1), true);

    let mut record = ready_record(&session);
    record.values[1] = AttributeValue::String(telbus::codec::UNDEFINED_STRING.into());
    let err = session.send_data(&record).err().expect("undefined");
    assert!(
        matches!(err, Error::UndefinedAttribute(ref name) if name == "label"),
        "got {:?}",
        err
    );
    assert_eq!(transport.sent_count(), 0, "nothing may reach the wire");
    session.disconnect();
}

#[test]
fn test_send_rejects_schema_mismatch_before_the_wire() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");
    session.confirm_send(test_key(1), true);

    let mut record = ready_record(&session);
    record.values = vec![AttributeValue::Long(1)]; // wrong arity and kind
    let err = session.send_data(&record).err().expect("mismatch");
    assert!(matches!(err, Error::SchemaMismatch(_)), "got {:?}", err);
    assert_eq!(transport.sent_count(), 0);
    session.disconnect();
}

#[test]
fn test_send_without_registration_fails() {
    let session = logged_in_session(RecordingTransport::new());
    let record = ready_record(&session);
    let err = session.send_data(&record).err().expect("no sender");
    assert!(matches!(err, Error::NoSendSubscription), "got {:?}", err);
    session.disconnect();
}

#[test]
fn test_first_send_blocks_until_the_confirmation_arrives() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");

    let sender = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            let record = ready_record(&session);
            session.send_data(&record)
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(transport.sent_count(), 0, "send parks until the verdict");
    session.confirm_send(test_key(1), true);

    sender.join().expect("join").expect("send succeeds");
    let sent = transport.last_telegram();
    assert_eq!(sent.key, test_key(1));
    assert_eq!(sent.state, DataState::Data);
    session.disconnect();
}

#[test]
fn test_denied_confirmation_fails_the_send_immediately() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");
    session.confirm_send(test_key(1), false);

    let record = ready_record(&session);
    let start = std::time::Instant::now();
    let err = session.send_data(&record).err().expect("denied");
    assert!(matches!(err, Error::SendNotConfirmed), "got {:?}", err);
    assert!(
        start.elapsed() < Duration::from_millis(100),
        "a known denial must not wait out the confirmation bound"
    );
    assert_eq!(transport.sent_count(), 0);
    session.disconnect();
}

#[test]
fn test_denial_overrides_an_earlier_grant() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");
    session.confirm_send(test_key(1), true);
    let record = ready_record(&session);
    session.send_data(&record).expect("granted send");

    session.confirm_send(test_key(1), false);
    let err = session.send_data(&record).err().expect("revoked");
    assert!(matches!(err, Error::SendNotConfirmed), "got {:?}", err);
    assert_eq!(transport.sent_count(), 1, "only the granted send went out");
    session.disconnect();
}

#[test]
fn test_unconfirmed_send_times_out() {
    let session = logged_in_session(RecordingTransport::new());
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");
    let record = ready_record(&session);
    let err = session.send_data(&record).err().expect("no verdict");
    assert!(matches!(err, Error::SendNotConfirmed), "got {:?}", err);
    session.disconnect();
}

#[test]
fn test_sequence_numbers_increment_per_registration() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");
    session.confirm_send(test_key(1), true);

    let record = ready_record(&session);
    for expected in 1..=3u64 {
        session.send_data(&record).expect("send");
        assert_eq!(transport.last_telegram().sequence_number, expected);
    }
    session.disconnect();
}

#[test]
fn test_source_registration_announces_no_data() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Source)
        .expect("register source");

    assert_eq!(transport.sent_count(), 1);
    let announced = transport.last_telegram();
    assert_eq!(announced.key, test_key(1));
    assert_eq!(announced.state, DataState::NoData);
    assert_eq!(announced.payload, None);
    session.disconnect();
}

#[test]
fn test_failed_source_announcement_rolls_the_registration_back() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    transport.fail_sends(true);

    let err = session
        .register_sender(1, description(), SenderRole::Source)
        .err()
        .expect("announcement fails");
    assert!(matches!(err, Error::Transport(_)), "got {:?}", err);

    // The registration did not stick: registering again succeeds once the
    // transport recovers.
    transport.fail_sends(false);
    session
        .register_sender(1, description(), SenderRole::Source)
        .expect("register after rollback");
    session.disconnect();
}

#[test]
fn test_unregister_sender_forgets_the_confirmation() {
    let transport = RecordingTransport::new();
    let session = logged_in_session(Arc::clone(&transport));
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("register");
    session.confirm_send(test_key(1), true);
    session.unregister_sender(1, description()).expect("unregister");
    assert!(matches!(
        session.unregister_sender(1, description()),
        Err(Error::NoSendSubscription)
    ));

    // A fresh registration starts with an unknown verdict again.
    session
        .register_sender(1, description(), SenderRole::Sender)
        .expect("re-register");
    let record = ready_record(&session);
    let err = session.send_data(&record).err().expect("unknown verdict");
    assert!(matches!(err, Error::SendNotConfirmed), "got {:?}", err);
    session.disconnect();
}
