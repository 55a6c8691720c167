use thiserror::Error;

use crate::types::AlertDescription;

/// Errors surfaced by the record layer and its collaborators.
///
/// Every variant is fatal for the connection except [`Error::Crypto`],
/// where the handshake layer decides, and [`Error::Security`], which is
/// caller misuse and leaves the connection open. Duplicate and stale
/// datagrams are never reported through this type, see
/// [`crate::dtls::Received`].
#[derive(Debug, Error)]
pub enum Error {
    /// A fatal alert raised locally. The peer should be told before teardown.
    #[error("Fatal alert: {0}")]
    Alert(AlertDescription),

    /// A fatal alert received from the peer.
    #[error("Peer sent fatal alert: {0}")]
    PeerAlert(AlertDescription),

    /// I/O failure from the transport collaborator.
    #[error("Transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// Signing or signature verification failed, or a key could not be
    /// loaded.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// API misuse: keys used before establishment, reserved exporter labels,
    /// oversized records, unsupported algorithm pairs, wrong key sizes.
    /// Does not fail the connection.
    #[error("Security error: {0}")]
    Security(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Epoch is not allowed to wrap")]
    WrappedEpoch,

    #[error("Connection is closed")]
    Closed,
}

impl Error {
    /// The alert description to send to the peer, if this error maps to one.
    pub fn alert_description(&self) -> Option<AlertDescription> {
        match self {
            Error::Alert(d) => Some(*d),
            Error::WrappedEpoch => Some(AlertDescription::InternalError),
            _ => None,
        }
    }

    /// Whether this is a fatal alert raised by us.
    pub fn is_fatal_alert(&self) -> bool {
        matches!(self, Error::Alert(_))
    }
}
