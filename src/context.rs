//! Connection security context shared by the handshake and record layers.

use std::any::Any;
use std::fmt;

use log::debug;

use crate::crypto::prf::prf;
use crate::crypto::{KeyingMaterial, SrtpProfile};
use crate::params::{SecurityParameters, RANDOM_LEN};
use crate::rng::SeededRng;
use crate::types::{ConnectionEnd, ProtocolVersion};
use crate::{Config, Error};

/// Labels the TLS key schedule uses itself. Exporters must not collide
/// with them (RFC 5705 §4).
const RESERVED_LABELS: &[&str] = &[
    "client finished",
    "server finished",
    "master secret",
    "extended master secret",
    "key expansion",
];

/// Connection-wide security state.
///
/// The entity is fixed at construction. Security parameters are absent until
/// the handshake calls [`Context::establish`], and read-only afterwards.
pub struct Context {
    entity: ConnectionEnd,
    params: Option<SecurityParameters>,
    rng: SeededRng,
    client_version: Option<ProtocolVersion>,
    server_version: Option<ProtocolVersion>,
    user_object: Option<Box<dyn Any + Send>>,
}

impl Context {
    pub fn new(entity: ConnectionEnd, rng_seed: Option<u64>) -> Self {
        Context {
            entity,
            params: None,
            rng: SeededRng::new(rng_seed),
            client_version: None,
            server_version: None,
            user_object: None,
        }
    }

    /// A context drawing its random source from `config`.
    pub fn with_config(entity: ConnectionEnd, config: &Config) -> Self {
        Self::new(entity, config.rng_seed())
    }

    #[inline(always)]
    pub fn entity(&self) -> ConnectionEnd {
        self.entity
    }

    #[inline(always)]
    pub fn is_server(&self) -> bool {
        self.entity == ConnectionEnd::Server
    }

    pub fn client_version(&self) -> Option<ProtocolVersion> {
        self.client_version
    }

    pub fn set_client_version(&mut self, version: ProtocolVersion) {
        self.client_version = Some(version);
    }

    /// The negotiated version, which records are protected under.
    pub fn server_version(&self) -> Option<ProtocolVersion> {
        self.server_version
    }

    pub fn set_server_version(&mut self, version: ProtocolVersion) {
        self.server_version = Some(version);
    }

    /// Install the negotiated parameters. Only once per context.
    pub fn establish(&mut self, params: SecurityParameters) -> Result<(), Error> {
        if params.entity() != self.entity {
            return Err(Error::Security(format!(
                "parameters built for {:?} installed on {:?} context",
                params.entity(),
                self.entity
            )));
        }
        if self.params.is_some() {
            return Err(Error::Security(
                "security parameters already established".into(),
            ));
        }
        debug!("Security parameters established: {:?}", params);
        self.params = Some(params);
        Ok(())
    }

    pub fn security_parameters(&self) -> Option<&SecurityParameters> {
        self.params.as_ref()
    }

    pub(crate) fn established(&self) -> Result<&SecurityParameters, Error> {
        self.params
            .as_ref()
            .ok_or_else(|| Error::Security("master secret not yet established".into()))
    }

    /// Fill `out` from the context's random source.
    pub fn random_bytes(&mut self, out: &mut [u8]) {
        self.rng.fill_bytes(out);
    }

    /// A fresh Hello random.
    pub fn generate_random(&mut self) -> [u8; RANDOM_LEN] {
        let mut random = [0u8; RANDOM_LEN];
        self.rng.fill_bytes(&mut random);
        random
    }

    /// Opaque caller data. Never inspected by this crate.
    pub fn user_object(&self) -> Option<&(dyn Any + Send)> {
        self.user_object.as_deref()
    }

    pub fn set_user_object(&mut self, object: Box<dyn Any + Send>) {
        self.user_object = Some(object);
    }

    pub fn take_user_object(&mut self) -> Option<Box<dyn Any + Send>> {
        self.user_object.take()
    }

    /// Keying material exporter (RFC 5705).
    ///
    /// ```text
    /// PRF(master_secret, label,
    ///     client_random + server_random [+ context_value_length + context_value]
    /// )[length]
    /// ```
    ///
    /// `None` and `Some(&[])` for the context value give different output.
    pub fn export_keying_material(
        &self,
        label: &str,
        context_value: Option<&[u8]>,
        length: usize,
    ) -> Result<KeyingMaterial, Error> {
        let params = self.established()?;

        if RESERVED_LABELS.contains(&label) {
            return Err(Error::Security(format!(
                "exporter label collides with TLS label: {:?}",
                label
            )));
        }

        let context_len = context_value.map_or(0, |c| c.len());
        let mut seed = Vec::with_capacity(RANDOM_LEN * 2 + 2 + context_len);
        seed.extend_from_slice(params.client_random());
        seed.extend_from_slice(params.server_random());

        if let Some(ctx) = context_value {
            let len = u16::try_from(ctx.len()).map_err(|_| {
                Error::Security(format!("exporter context too long: {}", ctx.len()))
            })?;
            seed.extend_from_slice(&len.to_be_bytes());
            seed.extend_from_slice(ctx);
        }

        let out = prf(
            params.prf_algorithm(),
            params.master_secret(),
            label,
            &seed,
            length,
        )?;
        Ok(KeyingMaterial::new(out))
    }

    /// Keying material for DTLS-SRTP (RFC 5764 §4.2).
    pub fn export_srtp_keying_material(
        &self,
        profile: SrtpProfile,
    ) -> Result<KeyingMaterial, Error> {
        self.export_keying_material(
            SrtpProfile::EXPORTER_LABEL,
            None,
            profile.keying_material_len(),
        )
    }

    /// Finished message verify_data (RFC 5246 §7.4.9).
    pub fn calculate_verify_data(
        &self,
        from_client: bool,
        handshake_hash: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let params = self.established()?;
        let label = if from_client {
            "client finished"
        } else {
            "server finished"
        };
        let out = prf(
            params.prf_algorithm(),
            params.master_secret(),
            label,
            handshake_hash,
            params.verify_data_length(),
        )?;
        Ok(out.to_vec())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entity", &self.entity)
            .field("established", &self.params.is_some())
            .field("client_version", &self.client_version)
            .field("server_version", &self.server_version)
            .field("rng", &self.rng)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established(entity: ConnectionEnd) -> Context {
        let mut ctx = Context::new(entity, Some(1));
        let params = SecurityParameters::builder(entity)
            .client_random([1; 32])
            .server_random([2; 32])
            .master_secret(&[3; 48])
            .build()
            .unwrap();
        ctx.establish(params).unwrap();
        ctx
    }

    #[test]
    fn export_fails_before_establishment() {
        let ctx = Context::new(ConnectionEnd::Client, None);
        let err = ctx
            .export_keying_material("EXPORTER-test", None, 32)
            .unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[test]
    fn export_is_deterministic_and_agrees_across_sides() {
        let client = established(ConnectionEnd::Client);
        let server = established(ConnectionEnd::Server);
        let a = client.export_keying_material("EXPORTER-test", Some(b"ctx"), 40).unwrap();
        let b = client.export_keying_material("EXPORTER-test", Some(b"ctx"), 40).unwrap();
        let c = server.export_keying_material("EXPORTER-test", Some(b"ctx"), 40).unwrap();
        assert_eq!(&a[..], &b[..]);
        assert_eq!(&a[..], &c[..]);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn export_depends_on_label_and_context() {
        let ctx = established(ConnectionEnd::Client);
        let base = ctx.export_keying_material("EXPORTER-a", None, 32).unwrap();
        let label = ctx.export_keying_material("EXPORTER-b", None, 32).unwrap();
        let empty = ctx.export_keying_material("EXPORTER-a", Some(&[]), 32).unwrap();
        let value = ctx.export_keying_material("EXPORTER-a", Some(b"v"), 32).unwrap();
        assert_ne!(&base[..], &label[..]);
        assert_ne!(&base[..], &empty[..]);
        assert_ne!(&empty[..], &value[..]);
    }

    #[test]
    fn export_rejects_reserved_label_and_long_context() {
        let ctx = established(ConnectionEnd::Client);
        assert!(ctx.export_keying_material("key expansion", None, 32).is_err());
        let long = vec![0u8; 65536];
        assert!(ctx
            .export_keying_material("EXPORTER-a", Some(&long), 32)
            .is_err());
    }

    #[test]
    fn srtp_export_length_follows_profile() {
        let ctx = established(ConnectionEnd::Server);
        for p in [
            SrtpProfile::Aes128CmSha1_80,
            SrtpProfile::AeadAes128Gcm,
            SrtpProfile::AeadAes256Gcm,
        ] {
            let km = ctx.export_srtp_keying_material(p).unwrap();
            assert_eq!(km.len(), p.keying_material_len());
        }
    }

    #[test]
    fn verify_data_differs_per_side() {
        let ctx = established(ConnectionEnd::Client);
        let c = ctx.calculate_verify_data(true, &[5; 32]).unwrap();
        let s = ctx.calculate_verify_data(false, &[5; 32]).unwrap();
        assert_eq!(c.len(), 12);
        assert_ne!(c, s);
    }

    #[test]
    fn establish_checks_entity_and_only_once() {
        let mut ctx = Context::new(ConnectionEnd::Server, None);
        assert!(ctx.is_server());
        let wrong = SecurityParameters::builder(ConnectionEnd::Client)
            .client_random([1; 32])
            .server_random([2; 32])
            .master_secret(&[3; 48])
            .build()
            .unwrap();
        assert!(ctx.establish(wrong).is_err());

        let mut ctx = established(ConnectionEnd::Server);
        let again = SecurityParameters::builder(ConnectionEnd::Server)
            .client_random([1; 32])
            .server_random([2; 32])
            .master_secret(&[3; 48])
            .build()
            .unwrap();
        assert!(ctx.establish(again).is_err());
        assert!(ctx.is_server());
    }

    #[test]
    fn user_object_is_opaque_passthrough() {
        let mut ctx = Context::new(ConnectionEnd::Client, None);
        assert!(ctx.user_object().is_none());
        ctx.set_user_object(Box::new(42u32));
        let v = ctx.user_object().and_then(|o| o.downcast_ref::<u32>());
        assert_eq!(v, Some(&42));
        let taken = ctx.take_user_object().unwrap();
        assert_eq!(*taken.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn seeded_context_random_is_deterministic() {
        let config = Config::builder().rng_seed(9).build().unwrap();
        let mut a = Context::with_config(ConnectionEnd::Client, &config);
        let mut b = Context::new(ConnectionEnd::Client, Some(9));
        assert_eq!(a.generate_random(), b.generate_random());
    }
}
