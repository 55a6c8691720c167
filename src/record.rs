//! Record header framing for TLS (5 bytes) and DTLS (13 bytes).

use std::fmt;

use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};
use tinyvec::ArrayVec;

use crate::types::{AlertDescription, ContentType, ProtocolVersion, DTLS_MAX_SEQUENCE};
use crate::Error;

/// Largest record body accepted on the wire (RFC 5246 §6.2.3).
pub const MAX_CIPHERTEXT_LEN: usize = (1 << 14) + 2048;

/// Header of one record.
///
/// `epoch` is `Some` for DTLS. For TLS the sequence number is implicit and
/// `sequence` is filled in by the record layer, never read off the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: Option<u16>,
    pub sequence: u64,
    pub length: u16,
}

/// A record header and its body, borrowed from the datagram or stream buffer.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub header: RecordHeader,
    pub fragment: &'a [u8],
}

fn be_u48(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, bytes) = take(6_usize)(input)?;
    let mut v = [0u8; 8];
    v[2..].copy_from_slice(bytes);
    Ok((input, u64::from_be_bytes(v)))
}

fn content_type(input: &[u8]) -> IResult<&[u8], ContentType> {
    let (rest, v) = be_u8(input)?;
    let ct = ContentType::try_from(v)
        .map_err(|_| Err::Failure(NomError::new(input, ErrorKind::Switch)))?;
    Ok((rest, ct))
}

fn version(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
    let (rest, major) = be_u8(input)?;
    let (rest, minor) = be_u8(rest)?;
    let v = ProtocolVersion::from_bytes(major, minor)
        .map_err(|_| Err::Failure(NomError::new(input, ErrorKind::Tag)))?;
    Ok((rest, v))
}

fn length(input: &[u8]) -> IResult<&[u8], u16> {
    let (rest, len) = be_u16(input)?;
    if len as usize > MAX_CIPHERTEXT_LEN {
        return Err(Err::Failure(NomError::new(input, ErrorKind::TooLarge)));
    }
    Ok((rest, len))
}

impl RecordHeader {
    /// content_type(1) + version(2) + epoch(2) + seq(6) + length(2)
    pub const DTLS_LEN: usize = 13;

    /// content_type(1) + version(2) + length(2)
    pub const TLS_LEN: usize = 5;

    pub fn dtls(
        content_type: ContentType,
        version: ProtocolVersion,
        epoch: u16,
        sequence: u64,
        length: u16,
    ) -> Self {
        RecordHeader {
            content_type,
            version,
            epoch: Some(epoch),
            sequence,
            length,
        }
    }

    pub fn tls(content_type: ContentType, version: ProtocolVersion, length: u16) -> Self {
        RecordHeader {
            content_type,
            version,
            epoch: None,
            sequence: 0,
            length,
        }
    }

    pub fn header_len(&self) -> usize {
        if self.epoch.is_some() {
            Self::DTLS_LEN
        } else {
            Self::TLS_LEN
        }
    }

    pub fn parse_dtls(input: &[u8]) -> IResult<&[u8], RecordHeader> {
        let (input, content_type) = content_type(input)?;
        let (input, version) = version(input)?;
        if !version.is_dtls() {
            return Err(Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, epoch) = be_u16(input)?;
        let (input, sequence) = be_u48(input)?;
        let (input, length) = length(input)?;
        Ok((
            input,
            RecordHeader::dtls(content_type, version, epoch, sequence, length),
        ))
    }

    pub fn parse_tls(input: &[u8]) -> IResult<&[u8], RecordHeader> {
        let (input, content_type) = content_type(input)?;
        let (input, version) = version(input)?;
        if version.is_dtls() {
            return Err(Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, length) = length(input)?;
        Ok((input, RecordHeader::tls(content_type, version, length)))
    }

    /// Wire bytes of the header.
    pub fn serialize(&self) -> ArrayVec<[u8; 13]> {
        let mut out = ArrayVec::new();
        out.push(self.content_type.as_u8());
        out.extend_from_slice(&self.version.to_bytes());
        if let Some(epoch) = self.epoch {
            out.extend_from_slice(&epoch.to_be_bytes());
            out.extend_from_slice(&(self.sequence & DTLS_MAX_SEQUENCE).to_be_bytes()[2..]);
        }
        out.extend_from_slice(&self.length.to_be_bytes());
        out
    }
}

impl<'a> Record<'a> {
    /// Parse one DTLS record off the front of a datagram.
    pub fn parse_dtls(input: &'a [u8]) -> IResult<&'a [u8], Record<'a>> {
        let (input, header) = RecordHeader::parse_dtls(input)?;
        let (rest, fragment) = take(header.length as usize)(input)?;
        Ok((rest, Record { header, fragment }))
    }
}

/// Map a header parse failure to the alert the peer should see.
pub(crate) fn parse_error(err: Err<NomError<&[u8]>>) -> Error {
    let kind = match &err {
        Err::Error(e) | Err::Failure(e) => Some(e.code),
        Err::Incomplete(_) => None,
    };
    let alert = match kind {
        Some(ErrorKind::TooLarge) => AlertDescription::RecordOverflow,
        Some(ErrorKind::Tag) => AlertDescription::ProtocolVersion,
        Some(ErrorKind::Switch) => AlertDescription::UnexpectedMessage,
        _ => AlertDescription::DecodeError,
    };
    Error::Alert(alert)
}

impl fmt::Debug for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHeader")
            .field("content_type", &self.content_type)
            .field("version", &self.version)
            .field("epoch", &self.epoch)
            .field("sequence", &self.sequence)
            .field("length", &self.length)
            .finish()
    }
}
