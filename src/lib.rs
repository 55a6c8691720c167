//! Record-layer security core for TLS 1.2 and DTLS 1.2.
//!
//! The handshake layer negotiates algorithms and secrets, fills a
//! [`SecurityParametersBuilder`], establishes the result on a [`Context`] and
//! asks a [`CipherTransformFactory`] for the transform of the next epoch.
//! The record layers ([`DtlsRecordLayer`], [`TlsRecordLayer`]) own the
//! epochs and do the per-record work:
//!
//! ```text
//! send:    allocate sequence -> encode -> header -> transport
//! receive: transport -> header -> epoch lookup -> replay check
//!          -> decode (authenticates) -> mark seen -> caller
//! ```
//!
//! Duplicate and stale DTLS records are [`Received::Discarded`], never an
//! [`Error`].
#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod error;
pub use error::Error;

mod config;
pub use config::{Config, ConfigBuilder};

pub mod types;

pub mod crypto;
pub use crypto::{CipherTransform, CipherTransformFactory, DEFAULT_CIPHER_FACTORY};
pub use crypto::{EncryptionAlgorithm, MacAlgorithm};
pub use crypto::{KeyingMaterial, SrtpProfile};

mod params;
pub use params::{CompressionMethod, SecurityParameters, SecurityParametersBuilder};
pub use params::{DEFAULT_VERIFY_DATA_LEN, MASTER_SECRET_LEN, RANDOM_LEN};

mod rng;

mod context;
pub use context::Context;

mod window;
pub use window::{ReplayWindow, REPLAY_WINDOW_WIDTH};

mod epoch;
pub use epoch::Epoch;

pub mod record;

mod dtls;
pub use dtls::{DatagramTransport, DropReason, DtlsRecordLayer, HandshakeRetransmit};
pub use dtls::{InboundRecord, Received};

mod tls;
pub use tls::TlsRecordLayer;

mod stream;
pub use stream::{ApplicationData, ApplicationRead, RecordReader, RecordWriter};

pub mod auth;
