
use reclayer::crypto::{digest, PrfAlgorithm};
use reclayer::types::{ConnectionEnd, HashAlgorithm, ProtocolVersion};
use reclayer::{Context, Error, SecurityParameters, SrtpProfile};

use record_common::*;

#[test]
fn srtp_keys_agree_across_sides() {
    let _ = env_logger::try_init();

    let (client, server) = established_contexts(ProtocolVersion::Dtls1_2);
    for profile in [
        SrtpProfile::Aes128CmSha1_80,
        SrtpProfile::AeadAes128Gcm,
        SrtpProfile::AeadAes256Gcm,
    ] {
        let a = client.export_srtp_keying_material(profile).unwrap();
        let b = server.export_srtp_keying_material(profile).unwrap();
        assert_eq!(a.len(), profile.keying_material_len(), "{}", profile);
        assert_eq!(&a[..], &b[..]);
    }

    // The SRTP export is the generic exporter under the SRTP label.
    let srtp = client
        .export_srtp_keying_material(SrtpProfile::AeadAes128Gcm)
        .unwrap();
    let generic = client
        .export_keying_material(SrtpProfile::EXPORTER_LABEL, None, 56)
        .unwrap();
    assert_eq!(&srtp[..], &generic[..]);
}

#[test]
fn finished_verify_data_agrees_across_sides() {
    let _ = env_logger::try_init();

    let (client, server) = established_contexts(ProtocolVersion::Tls1_2);
    let transcript = digest(HashAlgorithm::SHA256, b"all handshake messages").unwrap();

    let sent = client.calculate_verify_data(true, &transcript).unwrap();
    let expected = server.calculate_verify_data(true, &transcript).unwrap();
    assert_eq!(sent, expected);
    assert_eq!(sent.len(), 12);

    let server_finished = server.calculate_verify_data(false, &transcript).unwrap();
    assert_ne!(sent, server_finished);
}

#[test]
fn extended_master_secret_depends_on_session_hash() {
    let _ = env_logger::try_init();

    let build = |hash: &[u8]| {
        let params = SecurityParameters::builder(ConnectionEnd::Client)
            .prf_algorithm(PrfAlgorithm::TlsPrfSha384)
            .client_random([1; 32])
            .server_random([2; 32])
            .derive_extended_master_secret(&[9; 48], hash)
            .unwrap()
            .build()
            .unwrap();
        let mut ctx = Context::new(ConnectionEnd::Client, None);
        ctx.establish(params).unwrap();
        ctx.export_keying_material("EXPORTER-test", None, 32)
            .unwrap()
            .to_vec()
    };

    assert_eq!(build(&[1; 48]), build(&[1; 48]));
    assert_ne!(build(&[1; 48]), build(&[2; 48]));
}

#[test]
fn exporter_misuse_is_reported() {
    let _ = env_logger::try_init();

    let unestablished = Context::new(ConnectionEnd::Server, None);
    assert!(matches!(
        unestablished.export_srtp_keying_material(SrtpProfile::Aes128CmSha1_80),
        Err(Error::Security(_))
    ));
    assert!(matches!(
        unestablished.calculate_verify_data(true, &[0; 32]),
        Err(Error::Security(_))
    ));

    let (client, _) = established_contexts(ProtocolVersion::Dtls1_2);
    for label in ["master secret", "client finished", "server finished"] {
        assert!(matches!(
            client.export_keying_material(label, None, 16),
            Err(Error::Security(_))
        ));
    }
}
