
use std::io::{Read, Write};
use std::sync::Arc;

use reclayer::types::{AlertDescription, AlertLevel, ContentType, ProtocolVersion};
use reclayer::{
    Config, EncryptionAlgorithm, Error, MacAlgorithm, RecordReader, RecordWriter,
    TlsRecordLayer,
};

use record_common::*;

type Layer = TlsRecordLayer<StreamEnd>;

fn layers() -> (Layer, Layer) {
    let config = Arc::new(Config::default());
    let (c, s) = stream_pair();
    (
        TlsRecordLayer::new(config.clone(), c),
        TlsRecordLayer::new(config, s),
    )
}

/// Plaintext handshake flight, then both sides switch to `enc`/`mac`.
fn switch(client: &mut Layer, server: &mut Layer, enc: EncryptionAlgorithm, mac: MacAlgorithm) {
    client.send(ContentType::Handshake, b"client key exchange").unwrap();
    let r = server.receive().unwrap();
    assert_eq!(r.content_type, ContentType::Handshake);

    let (c, s) = transforms(ProtocolVersion::Tls1_2, enc, mac);
    client.install_pending(c).unwrap();
    server.install_pending(s).unwrap();
    for layer in [client, server] {
        layer.activate_write().unwrap();
        layer.activate_read().unwrap();
    }
}

#[test]
fn protected_records_roundtrip() {
    let _ = env_logger::try_init();

    for (enc, mac) in [
        (EncryptionAlgorithm::Aes128Gcm, MacAlgorithm::Null),
        (EncryptionAlgorithm::Aes256Gcm, MacAlgorithm::Null),
        (EncryptionAlgorithm::Aes128Cbc, MacAlgorithm::HmacSha256),
        (EncryptionAlgorithm::Aes256Cbc, MacAlgorithm::HmacSha384),
    ] {
        let (mut client, mut server) = layers();
        switch(&mut client, &mut server, enc, mac);

        for msg in [&b"first"[..], b"second", b""] {
            client.send(ContentType::ApplicationData, msg).unwrap();
        }
        for (i, msg) in [&b"first"[..], b"second", b""].into_iter().enumerate() {
            let r = server.receive().unwrap();
            assert_eq!(r.data, msg, "{:?}", enc);
            // Implicit sequence restarts with the new cipher state.
            assert_eq!(r.sequence, i as u64);
        }

        server.send(ContentType::ApplicationData, b"reply").unwrap();
        assert_eq!(client.receive().unwrap().data, b"reply");
    }
}

#[test]
fn tampering_is_fatal_and_reported_to_peer() {
    let _ = env_logger::try_init();

    let (mut client, mut server) = layers();
    switch(
        &mut client,
        &mut server,
        EncryptionAlgorithm::Aes128Cbc,
        MacAlgorithm::HmacSha256,
    );

    client.send(ContentType::ApplicationData, b"do not touch").unwrap();
    let last = client.stream().sent_len() - 1;
    client.stream().corrupt_sent(last, 0x01);

    let err = server.receive().unwrap_err();
    assert_eq!(err.alert_description(), Some(AlertDescription::BadRecordMac));
    assert!(server.is_closed());
    assert!(matches!(server.receive(), Err(Error::Closed)));

    let err = client.receive().unwrap_err();
    assert!(matches!(err, Error::PeerAlert(AlertDescription::BadRecordMac)));
    assert!(client.is_closed());
}

#[test]
fn replayed_record_fails_authentication() {
    let _ = env_logger::try_init();

    let (mut client, mut server) = layers();
    switch(
        &mut client,
        &mut server,
        EncryptionAlgorithm::Aes128Gcm,
        MacAlgorithm::Null,
    );

    client.send(ContentType::ApplicationData, b"pay 10").unwrap();
    let record = client.stream().sent();
    assert_eq!(server.receive().unwrap().data, b"pay 10");

    // Same bytes again: the implicit sequence number has moved on.
    client.stream_mut().write_all(&record).unwrap();
    let err = server.receive().unwrap_err();
    assert_eq!(err.alert_description(), Some(AlertDescription::BadRecordMac));
}

#[test]
fn fatal_alert_from_application_closes_both_sides() {
    let _ = env_logger::try_init();

    let (mut client, mut server) = layers();
    client
        .send_alert(AlertLevel::Fatal, AlertDescription::HandshakeFailure)
        .unwrap();
    assert!(client.is_closed());
    assert!(matches!(
        client.send(ContentType::ApplicationData, b"x"),
        Err(Error::Closed)
    ));

    let err = server.receive().unwrap_err();
    assert!(matches!(err, Error::PeerAlert(AlertDescription::HandshakeFailure)));
    // No alert is echoed back for a peer's fatal alert.
    assert_eq!(server.stream().sent_len(), 0);
}

#[test]
fn stream_adapters_until_close_notify() {
    let _ = env_logger::try_init();

    let (mut client, mut server) = layers();
    switch(
        &mut client,
        &mut server,
        EncryptionAlgorithm::Aes256Gcm,
        MacAlgorithm::Null,
    );

    let payload = vec![0x5a; 40_000];
    let mut writer = RecordWriter::new(&mut client);
    writer.write_all(&payload).unwrap();
    writer.close().unwrap();

    let mut received = Vec::new();
    RecordReader::new(&mut server)
        .read_to_end(&mut received)
        .unwrap();
    assert_eq!(received.len(), payload.len());
    assert_eq!(received, payload);
    assert!(server.peer_closed());
}
