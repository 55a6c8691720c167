//! `std::io` views over a record layer.

use std::io::{self, Read, Write};

use crate::Error;

/// Result of waiting for application data.
#[derive(Debug, PartialEq, Eq)]
pub enum ApplicationRead {
    Data(Vec<u8>),
    /// Nothing arrived within the receive timeout.
    Timeout,
    /// The peer sent close_notify.
    Closed,
}

/// Application data operations shared by the TLS and DTLS record layers.
pub trait ApplicationData {
    /// Next decrypted application data record. Other content types and
    /// discarded records are skipped.
    fn receive_application_data(&mut self) -> Result<ApplicationRead, Error>;

    /// Send `data` as one record. Must fit [`ApplicationData::send_limit`].
    fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Max plaintext per record.
    fn send_limit(&self) -> usize;

    /// Send close_notify. A DTLS layer also closes its transport; a TLS
    /// layer leaves the stream to be taken back with `into_inner`.
    fn close(&mut self) -> Result<(), Error>;
}

fn to_io(err: Error) -> io::Error {
    match err {
        Error::Transport(e) => e,
        Error::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
        e => io::Error::new(io::ErrorKind::Other, e),
    }
}

/// Reads decrypted application data.
///
/// Returns `Ok(0)` once the peer has sent close_notify. A receive timeout is
/// `io::ErrorKind::TimedOut` and may be retried.
#[derive(Debug)]
pub struct RecordReader<'a, L: ApplicationData> {
    layer: &'a mut L,
    pending: Vec<u8>,
    pos: usize,
}

impl<'a, L: ApplicationData> RecordReader<'a, L> {
    pub fn new(layer: &'a mut L) -> Self {
        RecordReader {
            layer,
            pending: Vec::new(),
            pos: 0,
        }
    }
}

impl<L: ApplicationData> Read for RecordReader<'_, L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            match self.layer.receive_application_data().map_err(to_io)? {
                ApplicationRead::Data(data) => {
                    self.pending = data;
                    self.pos = 0;
                }
                ApplicationRead::Closed => return Ok(0),
                ApplicationRead::Timeout => return Err(io::ErrorKind::TimedOut.into()),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Writes application data. Each `write` sends one record of at most the
/// plaintext limit; use `write_all` for longer buffers.
#[derive(Debug)]
pub struct RecordWriter<'a, L: ApplicationData> {
    layer: &'a mut L,
}

impl<'a, L: ApplicationData> RecordWriter<'a, L> {
    pub fn new(layer: &'a mut L) -> Self {
        RecordWriter { layer }
    }

    /// Send close_notify through the layer.
    pub fn close(self) -> io::Result<()> {
        self.layer.close().map_err(to_io)
    }
}

impl<L: ApplicationData> Write for RecordWriter<'_, L> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = self.layer.send_limit();
        if limit == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "transport leaves no room for plaintext",
            ));
        }
        let n = buf.len().min(limit);
        self.layer.send_application_data(&buf[..n]).map_err(to_io)?;
        Ok(n)
    }

    /// Records are sent as they are written.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    struct Fake {
        inbound: VecDeque<ApplicationRead>,
        sent: Vec<Vec<u8>>,
        closed: bool,
        // Sends fail once this many records went out.
        fail_after: Option<usize>,
    }

    impl ApplicationData for Fake {
        fn receive_application_data(&mut self) -> Result<ApplicationRead, Error> {
            Ok(self.inbound.pop_front().unwrap_or(ApplicationRead::Closed))
        }

        fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
            if self.fail_after == Some(self.sent.len()) {
                return Err(Error::Transport(io::ErrorKind::Interrupted.into()));
            }
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn send_limit(&self) -> usize {
            4
        }

        fn close(&mut self) -> Result<(), Error> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn reader_spans_records_and_ends_at_close() {
        let mut fake = Fake::default();
        fake.inbound.push_back(ApplicationRead::Data(b"hel".to_vec()));
        fake.inbound.push_back(ApplicationRead::Data(b"lo".to_vec()));
        let mut out = String::new();
        RecordReader::new(&mut fake).read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn reader_reports_timeout() {
        let mut fake = Fake::default();
        fake.inbound.push_back(ApplicationRead::Timeout);
        let err = RecordReader::new(&mut fake).read(&mut [0; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn writer_fragments_and_close_releases() {
        let mut fake = Fake::default();
        let mut w = RecordWriter::new(&mut fake);
        w.write_all(b"abcdefghij").unwrap();
        w.flush().unwrap();
        w.close().unwrap();
        assert_eq!(fake.sent, vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]);
        assert!(fake.closed);
    }

    #[test]
    fn write_sends_one_record_and_reports_its_length() {
        let mut fake = Fake::default();
        let mut w = RecordWriter::new(&mut fake);
        assert_eq!(w.write(b"abcdefghij").unwrap(), 4);
        assert_eq!(w.write(b"ij").unwrap(), 2);
        assert_eq!(fake.sent, vec![b"abcd".to_vec(), b"ij".to_vec()]);
    }

    #[test]
    fn failing_write_leaves_earlier_records_alone() {
        let mut fake = Fake {
            fail_after: Some(1),
            ..Default::default()
        };
        let mut w = RecordWriter::new(&mut fake);
        assert_eq!(w.write(b"abcdefghij").unwrap(), 4);
        let err = w.write(b"efghij").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(fake.sent, vec![b"abcd".to_vec()]);
    }
}
