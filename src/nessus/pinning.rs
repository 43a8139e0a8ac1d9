//! Server public key pinning
//!
//! A fingerprint is the base64 encoded SHA-256 digest of the server
//! certificate's DER SubjectPublicKeyInfo. Pinned clients replace chain
//! validation with a fingerprint check inside the TLS handshake, so no
//! request is written to a peer whose key is not pinned.

use openssl::base64;
use openssl::sha::sha256;
use openssl::x509::X509;
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ServerName};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{ExportError, ExportResult};

/// Set of accepted SPKI fingerprints
#[derive(Debug, Clone)]
pub struct PinnedKeys {
    fingerprints: HashSet<String>,
}

impl PinnedKeys {
    /// Parse base64 SHA-256 fingerprints
    pub fn parse(raw: &[String]) -> ExportResult<Self> {
        let mut fingerprints = HashSet::new();

        for entry in raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let digest = base64::decode_block(entry).map_err(|e| {
                ExportError::ConfigError(format!("Fingerprint '{}' is not valid base64: {}", entry, e))
            })?;
            if digest.len() != 32 {
                return Err(ExportError::ConfigError(format!(
                    "Fingerprint '{}' is {} bytes, expected a 32 byte SHA-256 digest",
                    entry,
                    digest.len()
                )));
            }
            fingerprints.insert(base64::encode_block(&digest));
        }

        if fingerprints.is_empty() {
            return Err(ExportError::ConfigError("No fingerprints given".to_string()));
        }

        Ok(Self { fingerprints })
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// Check a DER encoded leaf certificate
    pub fn verify_certificate(&self, der: &[u8]) -> ExportResult<()> {
        let fingerprint = spki_fingerprint(der)?;
        if self.contains(&fingerprint) {
            Ok(())
        } else {
            Err(ExportError::RemoteError(format!(
                "Server public key fingerprint {} is not pinned",
                fingerprint
            )))
        }
    }

    /// TLS client configuration that only completes handshakes with pinned keys
    pub fn tls_config(&self) -> ClientConfig {
        ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(PinnedVerifier { pins: self.clone() }))
            .with_no_client_auth()
    }
}

/// Handshake verifier accepting exactly the pinned leaf keys
///
/// Chain and hostname are not checked; handshake signatures still are.
struct PinnedVerifier {
    pins: PinnedKeys,
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.pins
            .verify_certificate(&end_entity.0)
            .map(|_| ServerCertVerified::assertion())
            .map_err(|e| rustls::Error::General(e.to_string()))
    }
}

/// Fingerprint of the public key inside a DER certificate
pub fn spki_fingerprint(der: &[u8]) -> ExportResult<String> {
    let unreadable =
        |e: openssl::error::ErrorStack| ExportError::RemoteError(format!("Unreadable server certificate: {}", e));

    let cert = X509::from_der(der).map_err(unreadable)?;
    let key = cert.public_key().map_err(unreadable)?;
    let spki = key.public_key_to_der().map_err(unreadable)?;

    Ok(base64::encode_block(&sha256(&spki)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkey::{PKey, Private};
    use openssl::x509::{X509Builder, X509NameBuilder};

    fn self_signed() -> (Vec<u8>, PKey<Private>) {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "nessus.test").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        (builder.build().to_der().unwrap(), key)
    }

    #[test]
    fn test_fingerprint_matches_public_key_digest() {
        let (der, key) = self_signed();
        let expected = base64::encode_block(&sha256(&key.public_key_to_der().unwrap()));

        assert_eq!(spki_fingerprint(&der).unwrap(), expected);

        let pins = PinnedKeys::parse(&[expected]).unwrap();
        assert!(pins.verify_certificate(&der).is_ok());
    }

    #[test]
    fn test_unpinned_key_is_rejected() {
        let (der, _) = self_signed();
        let (other_der, _) = self_signed();
        let pins = PinnedKeys::parse(&[spki_fingerprint(&other_der).unwrap()]).unwrap();

        assert!(matches!(
            pins.verify_certificate(&der),
            Err(ExportError::RemoteError(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_fingerprints() {
        assert!(PinnedKeys::parse(&["not base64!".to_string()]).is_err());
        assert!(PinnedKeys::parse(&["AAAA".to_string()]).is_err());
        assert!(PinnedKeys::parse(&[" ".to_string()]).is_err());

        let valid = base64::encode_block(&[7u8; 32]);
        let pins = PinnedKeys::parse(&[valid.clone(), format!(" {} ", valid)]).unwrap();
        assert_eq!(pins.len(), 1);
    }

    #[test]
    fn test_handshake_verifier_checks_leaf_key() {
        let (der, _) = self_signed();
        let (other_der, _) = self_signed();
        let verifier = PinnedVerifier {
            pins: PinnedKeys::parse(&[spki_fingerprint(&der).unwrap()]).unwrap(),
        };
        let name = ServerName::try_from("nessus.test").unwrap();
        let verify = |cert: Vec<u8>| {
            verifier.verify_server_cert(
                &Certificate(cert),
                &[],
                &name,
                &mut std::iter::empty(),
                &[],
                SystemTime::now(),
            )
        };

        assert!(verify(der).is_ok());
        match verify(other_der) {
            Err(rustls::Error::General(message)) => assert!(message.contains("not pinned"), "{}", message),
            other => panic!("expected rejection, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_garbage_certificate() {
        assert!(spki_fingerprint(b"not a certificate").is_err());
    }
}
