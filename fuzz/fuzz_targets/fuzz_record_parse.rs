#![no_main]

//! Fuzz target for record parsing and the inbound record paths.
//!
//! DTLS 1.2 record header:
//! - ContentType: 1 byte (20-24 valid values)
//! - ProtocolVersion: 2 bytes (0xFEFD for DTLS 1.2, 0xFEFF for DTLS 1.0)
//! - Epoch: 2 bytes
//! - Sequence Number: 6 bytes (u48)
//! - Length: 2 bytes
//!
//! TLS drops epoch and sequence number, giving a 5 byte header.

use std::io::{self, Cursor};
use std::sync::Arc;
use std::time::Duration;

use libfuzzer_sys::fuzz_target;

use reclayer::record::RecordHeader;
use reclayer::{Config, DatagramTransport, DtlsRecordLayer, TlsRecordLayer};

/// Maximum DTLS datagram we feed in
const MAX_DATAGRAM: usize = 16384 + 2048 + 13;

/// Hands out a single datagram, then times out.
struct OneShot(Option<Vec<u8>>);

impl DatagramTransport for OneShot {
    fn receive_limit(&self) -> usize {
        MAX_DATAGRAM
    }

    fn send_limit(&self) -> usize {
        1500
    }

    fn receive(&mut self, buf: &mut [u8], _: Duration) -> io::Result<Option<usize>> {
        let Some(d) = self.0.take() else {
            return Ok(None);
        };
        let n = d.len().min(buf.len());
        buf[..n].copy_from_slice(&d[..n]);
        Ok(Some(n))
    }

    fn send(&mut self, _: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads from the fuzz input, discards writes.
struct Sink(Cursor<Vec<u8>>);

impl io::Read for Sink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl io::Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let _ = RecordHeader::parse_dtls(data);
    let _ = RecordHeader::parse_tls(data);

    let config = Arc::new(Config::default());

    // Every record in the datagram until the layer times out or fails.
    let mut dtls = DtlsRecordLayer::new(config.clone(), OneShot(Some(data.to_vec())));
    for _ in 0..64 {
        match dtls.receive(Duration::ZERO) {
            Ok(reclayer::Received::Timeout) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let mut tls = TlsRecordLayer::new(config, Sink(Cursor::new(data.to_vec())));
    for _ in 0..64 {
        if tls.receive().is_err() {
            break;
        }
    }
});
