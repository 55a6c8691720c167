//! DTLS record layer: epoch table, inbound and outbound record paths.
//!
//! Outbound: allocate a sequence number in the write epoch, encode, frame
//! with the 13-byte header and hand the datagram to the transport.
//!
//! Inbound: parse each record of a datagram, find its epoch, check the
//! replay window, decode (which authenticates), and only then mark the
//! sequence number as seen.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::crypto::{CipherTransform, NullTransform};
use crate::epoch::Epoch;
use crate::record::{parse_error, Record, RecordHeader};
use crate::stream::{ApplicationData, ApplicationRead};
use crate::types::{AlertDescription, AlertLevel, ContentType, EpochId, ProtocolVersion};
use crate::{Config, Error};

/// Datagram transport the record layer sends and receives through.
pub trait DatagramTransport {
    /// Largest datagram `receive` can return.
    fn receive_limit(&self) -> usize;

    /// Largest datagram `send` accepts.
    fn send_limit(&self) -> usize;

    /// Receive one datagram into `buf`. `Ok(None)` on timeout.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// Receives handshake records of epochs older than the current read epoch,
/// so the handshake layer can retransmit its last flight.
pub trait HandshakeRetransmit {
    fn received_handshake_record(&mut self, epoch: EpochId, record: &[u8]) -> Result<(), Error>;
}

/// An authenticated record for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub content_type: ContentType,
    pub epoch: EpochId,
    pub sequence: u64,
    pub data: Vec<u8>,
}

/// Why an inbound record was dropped. None of these affect the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Sequence number already seen or older than the window.
    Replay,
    /// No such epoch, or an epoch not yet activated for reading.
    UnknownEpoch,
    /// Non-handshake record in an epoch that no longer carries data: epoch 0
    /// after the switch, or an old write epoch kept only for sending.
    StaleEpoch,
    /// Header could not be parsed. The rest of the datagram is dropped too.
    Malformed,
    /// Failed decode or authentication.
    Invalid,
    /// Handshake record of a previous epoch, passed to the retransmit handler.
    RoutedToHandshake,
}

/// Outcome of one [`DtlsRecordLayer::receive`].
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    Record(InboundRecord),
    Discarded(DropReason),
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closed,
    Failed,
}

/// Record layer over a datagram transport.
///
/// Epochs live in an arena owned by the layer. Epoch 0 (null transform) is
/// installed at construction. New epochs are installed as pending and then
/// activated per direction at the ChangeCipherSpec points.
pub struct DtlsRecordLayer<T: DatagramTransport> {
    config: Arc<Config>,
    transport: T,
    version: ProtocolVersion,
    epochs: Vec<Epoch>,
    read: EpochId,
    write: EpochId,
    pending: Option<EpochId>,
    // Read epoch before the last switch, still accepting delayed records.
    previous: Option<EpochId>,
    retransmit: Option<Box<dyn HandshakeRetransmit + Send>>,
    state: State,
    peer_closed: bool,

    // Datagram being processed and the offset of its next record.
    buf: Vec<u8>,
    len: usize,
    offset: usize,
}

impl<T: DatagramTransport> DtlsRecordLayer<T> {
    pub fn new(config: Arc<Config>, transport: T) -> Self {
        let margin = config.sequence_warning_margin();
        let initial = Epoch::dtls(EpochId::INITIAL, Box::new(NullTransform::new()), margin);
        let buf = vec![0; transport.receive_limit()];
        DtlsRecordLayer {
            config,
            transport,
            version: ProtocolVersion::Dtls1_2,
            epochs: vec![initial],
            read: EpochId::INITIAL,
            write: EpochId::INITIAL,
            pending: None,
            previous: None,
            retransmit: None,
            state: State::Open,
            peer_closed: false,
            buf,
            len: 0,
            offset: 0,
        }
    }

    /// Protocol version written in outgoing headers and required on
    /// records of protected epochs.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    pub fn set_handshake_retransmit(&mut self, handler: Box<dyn HandshakeRetransmit + Send>) {
        self.retransmit = Some(handler);
    }

    pub fn read_epoch(&self) -> EpochId {
        self.read
    }

    pub fn write_epoch(&self) -> EpochId {
        self.write
    }

    pub fn pending_epoch(&self) -> Option<EpochId> {
        self.pending
    }

    /// Read epoch before the last switch, if it is still accepted.
    pub fn previous_epoch(&self) -> Option<EpochId> {
        self.previous
    }

    /// Epoch numbers currently held, oldest first.
    pub fn epochs(&self) -> Vec<EpochId> {
        self.epochs.iter().map(|e| e.id()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state != State::Open
    }

    /// Whether the peer sent close_notify.
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn check_open(&self) -> Result<(), Error> {
        match self.state {
            State::Open => Ok(()),
            _ => Err(Error::Closed),
        }
    }

    fn epoch_index(&self, id: EpochId) -> Option<usize> {
        self.epochs.iter().position(|e| e.id() == id)
    }

    /// Install the transform of a newly negotiated epoch.
    ///
    /// The epoch is pending until activated for each direction.
    pub fn install_pending_epoch(
        &mut self,
        transform: Box<dyn CipherTransform>,
    ) -> Result<EpochId, Error> {
        self.check_open()?;
        if let Some(pending) = self.pending {
            return Err(Error::Security(format!(
                "epoch {} is already pending",
                pending
            )));
        }
        let newest = self
            .epochs
            .iter()
            .map(|e| e.id())
            .max()
            .unwrap_or(EpochId::INITIAL);
        let id = match newest.increase() {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e)),
        };
        let margin = self.config.sequence_warning_margin();
        self.epochs.push(Epoch::dtls(id, transform, margin));
        self.pending = Some(id);
        debug!("Installed pending epoch {}", id);
        Ok(id)
    }

    fn pending_or_err(&self) -> Result<EpochId, Error> {
        self.pending
            .ok_or_else(|| Error::Security("no pending epoch to activate".into()))
    }

    fn settle_pending(&mut self) {
        if self.pending == Some(self.read) && self.pending == Some(self.write) {
            self.pending = None;
        }
    }

    /// Switch outgoing records to the pending epoch (after sending
    /// ChangeCipherSpec).
    pub fn activate_write_epoch(&mut self) -> Result<(), Error> {
        self.check_open()?;
        let id = self.pending_or_err()?;
        debug!("Write epoch {} -> {}", self.write, id);
        self.write = id;
        self.settle_pending();
        Ok(())
    }

    /// Switch incoming records to the pending epoch (after receiving
    /// ChangeCipherSpec).
    ///
    /// With `retain_previous_epoch`, the epoch read until now stays readable:
    /// its handshake records go to the retransmit handler and its other
    /// records are still delivered, tagged with their epoch. Any older epoch
    /// is retired, so at most one previous epoch is held.
    pub fn activate_read_epoch(&mut self) -> Result<(), Error> {
        self.check_open()?;
        let id = self.pending_or_err()?;
        let old = self.read;
        debug!("Read epoch {} -> {}", old, id);
        self.read = id;
        self.settle_pending();
        if self.config.retain_previous_epoch() {
            self.previous = Some(old);
            self.retire(Some(old));
        } else {
            self.retire_previous_epochs();
        }
        Ok(())
    }

    /// Drop epochs older than the read epoch, except the write epoch.
    ///
    /// Call only once both sides are known to have switched. Replay state of
    /// the retired epochs is gone afterwards.
    pub fn retire_previous_epochs(&mut self) {
        self.previous = None;
        self.retire(None);
    }

    fn retire(&mut self, keep: Option<EpochId>) {
        let read = self.read;
        let write = self.write;
        let before = self.epochs.len();
        self.epochs
            .retain(|e| e.id() >= read || e.id() == write || Some(e.id()) == keep);
        if self.epochs.len() != before {
            debug!("Retired {} epoch(s) before {}", before - self.epochs.len(), read);
        }
    }

    /// Max plaintext per record under the current write epoch.
    pub fn plaintext_limit(&self) -> usize {
        let ciphertext_limit = self
            .transport
            .send_limit()
            .saturating_sub(RecordHeader::DTLS_LEN);
        self.epoch_index(self.write)
            .map(|i| self.epochs[i].transform().plaintext_limit(ciphertext_limit))
            .unwrap_or(0)
    }

    /// Protect and send one record under the write epoch.
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

    /// Send an alert record. A fatal level fails the layer after sending.
    pub fn send_alert(
        &mut self,
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), Error> {
        self.send(ContentType::Alert, &[level.as_u8(), description.as_u8()])?;
        if level == AlertLevel::Fatal {
            self.state = State::Failed;
            let _ = self.transport.close();
        }
        Ok(())
    }

    /// Send close_notify and close the transport.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.state != State::Open {
            return Ok(());
        }
        debug!("Closing DTLS record layer");
        let sent = self.write_record(
            ContentType::Alert,
            &[AlertLevel::Warning.as_u8(), AlertDescription::CloseNotify.as_u8()],
        );
        self.state = State::Closed;
        let closed = self.transport.close();
        sent?;
        closed?;
        Ok(())
    }

    fn write_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<(), Error> {
        let idx = self
            .epoch_index(self.write)
            .ok_or(Error::Alert(AlertDescription::InternalError))?;
        let epoch = &mut self.epochs[idx];

        let seq = epoch.allocate_sequence_number()?;
        let record_seq = epoch.record_sequence(seq);
        let body = epoch.transform_mut().encode(record_seq, content_type, data)?;

        let header = RecordHeader::dtls(
            content_type,
            self.version,
            epoch.id().as_u16(),
            seq,
            body.len() as u16,
        );
        trace!("Send {:?} ({} bytes)", header, data.len());

        let mut datagram = Vec::with_capacity(RecordHeader::DTLS_LEN + body.len());
        datagram.extend_from_slice(&header.serialize());
        datagram.extend_from_slice(&body);
        self.transport.send(&datagram)?;
        Ok(())
    }

    /// Mark the layer failed. Local fatal alerts are sent to the peer on a
    /// best-effort basis.
    fn fail(&mut self, err: Error) -> Error {
        if self.state == State::Open {
            warn!("DTLS record layer failed: {}", err);
            if let Some(desc) = err.alert_description() {
                let alert = [AlertLevel::Fatal.as_u8(), desc.as_u8()];
                if let Err(e) = self.write_record(ContentType::Alert, &alert) {
                    debug!("Could not send fatal alert: {}", e);
                }
            }
            let _ = self.transport.close();
            self.state = State::Failed;
        }
        err
    }

    /// Decode failure: dropped by policy, otherwise fatal.
    fn invalid(&mut self, err: Error) -> Result<Received, Error> {
        if self.config.drop_invalid_records() {
            debug!("Dropping invalid record: {}", err);
            Ok(Received::Discarded(DropReason::Invalid))
        } else {
            Err(self.fail(err))
        }
    }

    /// Process the next record, reading a new datagram when the current one
    /// is used up.
    pub fn receive(&mut self, timeout: Duration) -> Result<Received, Error> {
        self.check_open()?;

        if self.offset >= self.len {
            let received = self.transport.receive(&mut self.buf, timeout);
            match received {
                Ok(Some(n)) if n > self.buf.len() => {
                    let msg = format!("received {} bytes into a {} byte buffer", n, self.buf.len());
                    let err = io::Error::new(io::ErrorKind::InvalidData, msg);
                    return Err(self.fail(err.into()));
                }
                Ok(Some(n)) => {
                    self.len = n;
                    self.offset = 0;
                }
                Ok(None) => return Ok(Received::Timeout),
                Err(e) => return Err(self.fail(e.into())),
            }
        }

        self.next_record()
    }

    fn next_record(&mut self) -> Result<Received, Error> {
        let input = &self.buf[self.offset..self.len];
        let parsed = Record::parse_dtls(input).map(|(rest, record)| {
            let start = self.offset + RecordHeader::DTLS_LEN;
            (record.header, start..start + record.fragment.len(), rest.len())
        });
        let (header, range) = match parsed {
            Ok((header, range, rest_len)) => {
                self.offset = self.len - rest_len;
                (header, range)
            }
            Err(e) => {
                let err = parse_error(e);
                self.offset = self.len;
                if self.config.drop_invalid_records() {
                    debug!("Dropping malformed datagram: {}", err);
                    return Ok(Received::Discarded(DropReason::Malformed));
                }
                return Err(self.fail(err));
            }
        };
        trace!("Receive {:?}", header);

        let id = EpochId(header.epoch.unwrap_or_default());
        let Some(idx) = self.epoch_index(id) else {
            trace!("Unknown epoch {}", id);
            return Ok(Received::Discarded(DropReason::UnknownEpoch));
        };
        let current = id == self.read;
        if id > self.read {
            trace!("Epoch {} not yet active for reading", id);
            return Ok(Received::Discarded(DropReason::UnknownEpoch));
        }
        let handshake = header.content_type == ContentType::Handshake;
        // Epoch 0 is unprotected, so only its handshake records are let through.
        let delayed = self.previous == Some(id) && id != EpochId::INITIAL;
        if !current && !handshake && !delayed {
            trace!("Stale {} record in epoch {}", header.content_type, id);
            return Ok(Received::Discarded(DropReason::StaleEpoch));
        }
        if id != EpochId::INITIAL && header.version != self.version {
            return self.invalid(Error::Alert(AlertDescription::ProtocolVersion));
        }

        let decoded = {
            let epoch = &mut self.epochs[idx];
            if !epoch.window().is_fresh(header.sequence) {
                trace!("Replay of {}/{}", id, header.sequence);
                return Ok(Received::Discarded(DropReason::Replay));
            }
            let record_seq = epoch.record_sequence(header.sequence);
            let fragment = &self.buf[range];
            let res = epoch
                .transform_mut()
                .decode(record_seq, header.content_type, fragment);
            if res.is_ok() {
                // Only authenticated records move the window.
                epoch.window_mut().mark_seen(header.sequence);
            }
            res
        };
        let data = match decoded {
            Ok(data) => data,
            Err(e) => return self.invalid(e),
        };

        if !current && handshake {
            let Some(handler) = self.retransmit.as_mut() else {
                return Ok(Received::Discarded(DropReason::StaleEpoch));
            };
            if let Err(e) = handler.received_handshake_record(id, &data) {
                return Err(self.fail(e));
            }
            return Ok(Received::Discarded(DropReason::RoutedToHandshake));
        }

        if !current {
            trace!("Delayed {} record in epoch {}", header.content_type, id);
        }
        if header.content_type == ContentType::Alert {
            self.peer_alert(&data)?;
        }

        Ok(Received::Record(InboundRecord {
            content_type: header.content_type,
            epoch: id,
            sequence: header.sequence,
            data,
        }))
    }

    fn peer_alert(&mut self, data: &[u8]) -> Result<(), Error> {
        let [level, desc] = data else {
            return Err(self.fail(Error::Alert(AlertDescription::DecodeError)));
        };
        let desc = AlertDescription::from_u8(*desc);
        match AlertLevel::from_u8(*level) {
            Some(AlertLevel::Fatal) => {
                warn!("Peer sent fatal alert: {}", desc);
                self.state = State::Failed;
                let _ = self.transport.close();
                Err(Error::PeerAlert(desc))
            }
            Some(AlertLevel::Warning) => {
                if desc == AlertDescription::CloseNotify {
                    debug!("Peer sent close_notify");
                    self.peer_closed = true;
                }
                Ok(())
            }
            None => Err(self.fail(Error::Alert(AlertDescription::IllegalParameter))),
        }
    }
}

impl<T: DatagramTransport> ApplicationData for DtlsRecordLayer<T> {
    fn receive_application_data(&mut self) -> Result<ApplicationRead, Error> {
        loop {
            if self.peer_closed {
                return Ok(ApplicationRead::Closed);
            }
            match self.receive(self.config.receive_timeout())? {
                Received::Record(r) if r.content_type == ContentType::ApplicationData => {
                    return Ok(ApplicationRead::Data(r.data));
                }
                Received::Record(_) | Received::Discarded(_) => continue,
                Received::Timeout => return Ok(ApplicationRead::Timeout),
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
        DtlsRecordLayer::close(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    struct Loopback {
        inbox: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
        closed: bool,
        // Added to the length reported for each received datagram.
        overstate: usize,
    }

    impl DatagramTransport for Loopback {
        fn receive_limit(&self) -> usize {
            1500
        }

        fn send_limit(&self) -> usize {
            1500
        }

        fn receive(&mut self, buf: &mut [u8], _: Duration) -> io::Result<Option<usize>> {
            let Some(d) = self.inbox.pop_front() else {
                return Ok(None);
            };
            buf[..d.len()].copy_from_slice(&d);
            Ok(Some(d.len() + self.overstate))
        }

        fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
            self.sent.push(datagram.to_vec());
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn layer() -> DtlsRecordLayer<Loopback> {
        DtlsRecordLayer::new(Arc::new(Config::default()), Loopback::default())
    }

    #[test]
    fn epoch_zero_roundtrip_and_replay() {
        let mut a = layer();
        a.send(ContentType::Handshake, b"hello").unwrap();
        let datagram = a.transport_mut().sent.remove(0);

        let mut b = layer();
        b.transport_mut().inbox.push_back(datagram.clone());
        b.transport_mut().inbox.push_back(datagram);
        let Received::Record(r) = b.receive(Duration::ZERO).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(r.data, b"hello");
        assert_eq!(r.sequence, 0);
        assert_eq!(
            b.receive(Duration::ZERO).unwrap(),
            Received::Discarded(DropReason::Replay)
        );
        assert_eq!(b.receive(Duration::ZERO).unwrap(), Received::Timeout);
    }

    #[test]
    fn malformed_datagram_is_discarded() {
        let mut b = layer();
        b.transport_mut().inbox.push_back(vec![0x17, 0xfe, 0xfd, 0]);
        assert_eq!(
            b.receive(Duration::ZERO).unwrap(),
            Received::Discarded(DropReason::Malformed)
        );
        assert!(!b.is_closed());
    }

    #[test]
    fn unknown_epoch_is_discarded() {
        let mut a = layer();
        a.send(ContentType::ApplicationData, b"x").unwrap();
        let mut d = a.transport_mut().sent.remove(0);
        d[4] = 7; // epoch 7
        let mut b = layer();
        b.transport_mut().inbox.push_back(d);
        assert_eq!(
            b.receive(Duration::ZERO).unwrap(),
            Received::Discarded(DropReason::UnknownEpoch)
        );
    }

    #[test]
    fn epoch_activation_and_retirement() {
        let mut a = layer();
        assert!(a.activate_write_epoch().is_err());
        let id = a.install_pending_epoch(Box::new(NullTransform::new())).unwrap();
        assert_eq!(id, EpochId(1));
        assert!(a.install_pending_epoch(Box::new(NullTransform::new())).is_err());
        a.activate_write_epoch().unwrap();
        assert_eq!(a.pending_epoch(), Some(id));
        a.activate_read_epoch().unwrap();
        assert_eq!(a.pending_epoch(), None);
        assert_eq!(a.epochs(), vec![EpochId(0), EpochId(1)]);
        a.retire_previous_epochs();
        assert_eq!(a.epochs(), vec![EpochId(1)]);
        assert_eq!(a.previous_epoch(), None);
    }

    #[test]
    fn only_one_previous_read_epoch_is_kept() {
        let mut a = layer();
        for n in 1..=4 {
            a.install_pending_epoch(Box::new(NullTransform::new())).unwrap();
            a.activate_write_epoch().unwrap();
            a.activate_read_epoch().unwrap();
            assert_eq!(a.previous_epoch(), Some(EpochId(n - 1)));
            assert_eq!(a.epochs(), vec![EpochId(n - 1), EpochId(n)]);
        }
    }

    #[test]
    fn old_write_epoch_survives_read_switch() {
        let mut a = layer();
        a.install_pending_epoch(Box::new(NullTransform::new())).unwrap();
        a.activate_write_epoch().unwrap();
        a.activate_read_epoch().unwrap();
        a.install_pending_epoch(Box::new(NullTransform::new())).unwrap();
        a.activate_read_epoch().unwrap();
        // Reading epoch 2, still writing epoch 1.
        assert_eq!(a.pending_epoch(), Some(EpochId(2)));
        assert_eq!(a.write_epoch(), EpochId(1));
        assert_eq!(a.epochs(), vec![EpochId(1), EpochId(2)]);
    }

    #[test]
    fn overstated_datagram_length_is_a_transport_error() {
        let mut a = layer();
        a.send(ContentType::Handshake, b"hello").unwrap();
        let datagram = a.transport_mut().sent.remove(0);

        let mut b = layer();
        b.transport_mut().overstate = 1500;
        b.transport_mut().inbox.push_back(datagram);
        let err = b.receive(Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "{:?}", err);
        assert!(b.is_closed());
        assert!(b.transport().closed);
    }

    #[test]
    fn oversize_send_is_rejected_without_failing() {
        let mut a = layer();
        let big = vec![0; 1500];
        assert!(matches!(
            a.send(ContentType::ApplicationData, &big),
            Err(Error::Security(_))
        ));
        assert!(!a.is_closed());
    }

    #[test]
    fn peer_fatal_alert_fails_layer() {
        let mut a = layer();
        a.send_alert(AlertLevel::Fatal, AlertDescription::HandshakeFailure)
            .unwrap();
        assert!(a.is_closed());
        let datagram = a.transport_mut().sent.remove(0);

        let mut b = layer();
        b.transport_mut().inbox.push_back(datagram);
        let err = b.receive(Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::PeerAlert(AlertDescription::HandshakeFailure)));
        assert!(matches!(b.receive(Duration::ZERO), Err(Error::Closed)));
    }

    #[test]
    fn close_sends_close_notify() {
        let mut a = layer();
        a.close().unwrap();
        assert!(a.transport().closed);
        assert!(matches!(
            a.send(ContentType::ApplicationData, b"x"),
            Err(Error::Closed)
        ));
        let datagram = a.transport_mut().sent.remove(0);
        let mut b = layer();
        b.transport_mut().inbox.push_back(datagram);
        let Received::Record(r) = b.receive(Duration::ZERO).unwrap() else {
            panic!("expected alert record");
        };
        assert_eq!(r.content_type, ContentType::Alert);
        assert!(b.peer_closed());
    }
}
