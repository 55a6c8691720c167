//! TLS record layer over a reliable byte stream.
//!
//! Records arrive in order, so there is no replay window: the read sequence
//! number is implicit and advances by one per record. Every decode failure
//! is fatal.

use std::io::{Read, Write};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::crypto::{CipherTransform, NullTransform};
use crate::dtls::InboundRecord;
use crate::epoch::Epoch;
use crate::record::{parse_error, RecordHeader};
use crate::stream::{ApplicationData, ApplicationRead};
use crate::types::{AlertDescription, AlertLevel, ContentType, EpochId, ProtocolVersion};
use crate::{Config, Error};

/// Space left for the record body in a TLS record (RFC 5246 §6.2.3).
const CIPHERTEXT_LIMIT: usize = crate::record::MAX_CIPHERTEXT_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closed,
    Failed,
}

/// One cipher state per direction, switched independently at
/// ChangeCipherSpec. Cipher states are numbered locally, the numbers never
/// go on the wire.
pub struct TlsRecordLayer<S: Read + Write> {
    config: Arc<Config>,
    stream: S,
    version: ProtocolVersion,
    states: Vec<Epoch>,
    read: EpochId,
    write: EpochId,
    pending: Option<EpochId>,
    read_sequence: u64,
    read_exhausted: bool,
    state: State,
    peer_closed: bool,
}

impl<S: Read + Write> TlsRecordLayer<S> {
    pub fn new(config: Arc<Config>, stream: S) -> Self {
        let margin = config.sequence_warning_margin();
        TlsRecordLayer {
            config,
            stream,
            version: ProtocolVersion::Tls1_2,
            states: vec![Epoch::tls(
                EpochId::INITIAL,
                Box::new(NullTransform::new()),
                margin,
            )],
            read: EpochId::INITIAL,
            write: EpochId::INITIAL,
            pending: None,
            read_sequence: 0,
            read_exhausted: false,
            state: State::Open,
            peer_closed: false,
        }
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    pub fn is_closed(&self) -> bool {
        self.state != State::Open
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Give up the layer and return the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn check_open(&self) -> Result<(), Error> {
        match self.state {
            State::Open => Ok(()),
            _ => Err(Error::Closed),
        }
    }

    fn index(&self, id: EpochId) -> Result<usize, Error> {
        self.states
            .iter()
            .position(|e| e.id() == id)
            .ok_or(Error::Alert(AlertDescription::InternalError))
    }

    /// Install the transform negotiated by the handshake.
    pub fn install_pending(&mut self, transform: Box<dyn CipherTransform>) -> Result<(), Error> {
        self.check_open()?;
        if self.pending.is_some() {
            return Err(Error::Security("a cipher state is already pending".into()));
        }
        let newest = self.read.max(self.write);
        let id = match newest.increase() {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e)),
        };
        let margin = self.config.sequence_warning_margin();
        self.states.push(Epoch::tls(id, transform, margin));
        self.pending = Some(id);
        debug!("Installed pending cipher state {}", id);
        Ok(())
    }

    fn pending_or_err(&self) -> Result<EpochId, Error> {
        self.pending
            .ok_or_else(|| Error::Security("no pending cipher state".into()))
    }

    fn settle(&mut self) {
        if self.pending == Some(self.read) && self.pending == Some(self.write) {
            self.pending = None;
        }
        let (read, write) = (self.read, self.write);
        self.states.retain(|e| e.id() == read || e.id() == write);
    }

    /// Switch the write direction; sequence numbers restart at 0.
    pub fn activate_write(&mut self) -> Result<(), Error> {
        self.check_open()?;
        self.write = self.pending_or_err()?;
        debug!("Write cipher state {}", self.write);
        self.settle();
        Ok(())
    }

    /// Switch the read direction; sequence numbers restart at 0.
    pub fn activate_read(&mut self) -> Result<(), Error> {
        self.check_open()?;
        self.read = self.pending_or_err()?;
        self.read_sequence = 0;
        self.read_exhausted = false;
        debug!("Read cipher state {}", self.read);
        self.settle();
        Ok(())
    }

    pub fn plaintext_limit(&self) -> usize {
        match self.index(self.write) {
            Ok(i) => self.states[i].transform().plaintext_limit(CIPHERTEXT_LIMIT),
            Err(_) => 0,
        }
    }

    pub fn send(&mut self, content_type: ContentType, data: &[u8]) -> Result<(), Error> {
        self.check_open()?;
        let limit = self.plaintext_limit();
        if data.len() > limit {
            return Err(Error::Security(format!(
                "record of {} bytes exceeds plaintext limit {}",
                data.len(),
                limit
            )));
        }
        match self.write_record(content_type, data) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn send_alert(
        &mut self,
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), Error> {
        self.send(ContentType::Alert, &[level.as_u8(), description.as_u8()])?;
        if level == AlertLevel::Fatal {
            self.state = State::Failed;
        }
        Ok(())
    }

    /// Send close_notify. The stream stays open; take it back with
    /// [`TlsRecordLayer::into_inner`] to shut it down.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.state != State::Open {
            return Ok(());
        }
        debug!("Closing TLS record layer");
        let res = self.write_record(
            ContentType::Alert,
            &[AlertLevel::Warning.as_u8(), AlertDescription::CloseNotify.as_u8()],
        );
        self.state = State::Closed;
        res
    }

    fn write_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<(), Error> {
        let idx = self.index(self.write)?;
        let cipher = &mut self.states[idx];
        let seq = cipher.allocate_sequence_number()?;
        let body = cipher.transform_mut().encode(seq, content_type, data)?;

        let header = RecordHeader::tls(content_type, self.version, body.len() as u16);
        trace!("Send {:?} seq {} ({} bytes)", header, seq, data.len());

        let mut out = Vec::with_capacity(RecordHeader::TLS_LEN + body.len());
        out.extend_from_slice(&header.serialize());
        out.extend_from_slice(&body);
        self.stream.write_all(&out)?;
        self.stream.flush()?;
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        if self.state == State::Open {
            warn!("TLS record layer failed: {}", err);
            if let Some(desc) = err.alert_description() {
                let alert = [AlertLevel::Fatal.as_u8(), desc.as_u8()];
                if let Err(e) = self.write_record(ContentType::Alert, &alert) {
                    debug!("Could not send fatal alert: {}", e);
                }
            }
            self.state = State::Failed;
        }
        err
    }

    /// Read and decode the next record. Blocks on the stream.
    pub fn receive(&mut self) -> Result<InboundRecord, Error> {
        self.check_open()?;
        match self.read_record() {
            Ok(record) => Ok(record),
            Err(e @ Error::PeerAlert(_)) => {
                self.state = State::Failed;
                Err(e)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn read_record(&mut self) -> Result<InboundRecord, Error> {
        let mut head = [0u8; RecordHeader::TLS_LEN];
        self.stream.read_exact(&mut head)?;
        let (_, header) = RecordHeader::parse_tls(&head).map_err(parse_error)?;
        trace!("Receive {:?}", header);

        if self.read != EpochId::INITIAL && header.version != self.version {
            return Err(Error::Alert(AlertDescription::ProtocolVersion));
        }

        let mut body = vec![0u8; header.length as usize];
        self.stream.read_exact(&mut body)?;

        if self.read_exhausted {
            return Err(Error::Alert(AlertDescription::InternalError));
        }
        let seq = self.read_sequence;
        match seq.checked_add(1) {
            Some(next) => self.read_sequence = next,
            None => self.read_exhausted = true,
        }

        let idx = self.index(self.read)?;
        let data = self.states[idx]
            .transform_mut()
            .decode(seq, header.content_type, &body)?;

        if header.content_type == ContentType::Alert {
            self.peer_alert(&data)?;
        }

        Ok(InboundRecord {
            content_type: header.content_type,
            epoch: self.read,
            sequence: seq,
            data,
        })
    }

    fn peer_alert(&mut self, data: &[u8]) -> Result<(), Error> {
        let [level, desc] = data else {
            return Err(Error::Alert(AlertDescription::DecodeError));
        };
        let desc = AlertDescription::from_u8(*desc);
        match AlertLevel::from_u8(*level) {
            Some(AlertLevel::Fatal) => {
                warn!("Peer sent fatal alert: {}", desc);
                Err(Error::PeerAlert(desc))
            }
            Some(AlertLevel::Warning) => {
                if desc == AlertDescription::CloseNotify {
                    debug!("Peer sent close_notify");
                    self.peer_closed = true;
                }
                Ok(())
            }
            None => Err(Error::Alert(AlertDescription::IllegalParameter)),
        }
    }
}

impl<S: Read + Write> ApplicationData for TlsRecordLayer<S> {
    fn receive_application_data(&mut self) -> Result<ApplicationRead, Error> {
        loop {
            if self.peer_closed {
                return Ok(ApplicationRead::Closed);
            }
            let record = self.receive()?;
            if record.content_type == ContentType::ApplicationData {
                return Ok(ApplicationRead::Data(record.data));
            }
        }
    }

    fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.send(ContentType::ApplicationData, data)
    }

    fn send_limit(&self) -> usize {
        self.plaintext_limit()
    }

    fn close(&mut self) -> Result<(), Error> {
        TlsRecordLayer::close(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;

    /// Writes go to `out`, reads come from `input`.
    #[derive(Default)]
    struct Pipe {
        input: Cursor<Vec<u8>>,
        out: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.out.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn layer() -> TlsRecordLayer<Pipe> {
        TlsRecordLayer::new(Arc::new(Config::default()), Pipe::default())
    }

    #[test]
    fn plaintext_roundtrip() {
        let mut a = layer();
        a.send(ContentType::Handshake, b"client hello").unwrap();
        a.send(ContentType::ApplicationData, b"data").unwrap();
        let wire = std::mem::take(&mut a.stream_mut().out);
        assert_eq!(&wire[..5], &[22, 3, 3, 0, 12]);

        let mut b = layer();
        b.stream_mut().input = Cursor::new(wire);
        let r = b.receive().unwrap();
        assert_eq!(r.content_type, ContentType::Handshake);
        assert_eq!(r.sequence, 0);
        let r = b.receive().unwrap();
        assert_eq!(r.data, b"data");
        assert_eq!(r.sequence, 1);
    }

    #[test]
    fn truncated_stream_is_fatal() {
        let mut b = layer();
        b.stream_mut().input = Cursor::new(vec![23, 3, 3, 0, 10, 1, 2]);
        assert!(matches!(b.receive(), Err(Error::Transport(_))));
        assert!(matches!(b.receive(), Err(Error::Closed)));
    }

    #[test]
    fn dtls_version_rejected() {
        let mut b = layer();
        b.stream_mut().input = Cursor::new(vec![23, 0xfe, 0xfd, 0, 0]);
        let err = b.receive().unwrap_err();
        assert_eq!(err.alert_description(), Some(AlertDescription::ProtocolVersion));
        // Fatal alert went out before failing.
        assert_eq!(&b.stream().out[..], &[21, 3, 3, 0, 2, 2, 70]);
    }

    #[test]
    fn cipher_state_switch_resets_sequence() {
        let mut a = layer();
        a.send(ContentType::Handshake, b"x").unwrap();
        a.install_pending(Box::new(NullTransform::new())).unwrap();
        assert!(a.install_pending(Box::new(NullTransform::new())).is_err());
        a.activate_write().unwrap();
        a.activate_read().unwrap();
        assert_eq!(a.states.len(), 1);
        a.send(ContentType::ApplicationData, b"y").unwrap();
        assert_eq!(a.states[0].id(), EpochId(1));
    }

    #[test]
    fn close_then_release_stream() {
        let mut a = layer();
        a.close().unwrap();
        assert!(a.is_closed());
        assert!(matches!(
            a.send(ContentType::ApplicationData, b"x"),
            Err(Error::Closed)
        ));
        let pipe = a.into_inner();
        assert_eq!(&pipe.out[..], &[21, 3, 3, 0, 2, 1, 0]);
    }
}
