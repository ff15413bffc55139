/*!
Server certificate policy for client sessions.

Peers on a point-to-point raw channel usually present self-signed
certificates, so chain validation is replaced by an optional SHA-256
fingerprint pin. Handshake signatures are always checked.
*/

use std::collections::BTreeSet;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};

/// SHA-256 digest of a DER certificate
pub fn certificate_fingerprint(certificate: &[u8]) -> [u8; 32] {
    Sha256::digest(certificate).into()
}

/// Accepts a server whose end-entity certificate matches a pinned
/// fingerprint; accepts any certificate when no pin is configured.
#[derive(Debug)]
pub struct PinnedCertVerifier {
    supported_algs: WebPkiSupportedAlgorithms,
    fingerprints: BTreeSet<[u8; 32]>,
}

impl PinnedCertVerifier {
    /// Verifier checking signatures with `supported_algs`; an empty pin set accepts any certificate
    pub fn new(
        supported_algs: WebPkiSupportedAlgorithms,
        fingerprints: BTreeSet<[u8; 32]>,
    ) -> Self {
        Self {
            supported_algs,
            fingerprints,
        }
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.fingerprints.is_empty() {
            return Ok(ServerCertVerified::assertion());
        }

        let fingerprint = certificate_fingerprint(end_entity.as_ref());
        if self.fingerprints.contains(&fingerprint) {
            Ok(ServerCertVerified::assertion())
        } else {
            let hex_fingerprint = fingerprint
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<String>>()
                .join(":");
            log::warn!("Rejecting server certificate {}", hex_fingerprint);
            Err(rustls::Error::General(format!(
                "unknown server fingerprint: {}",
                hex_fingerprint
            )))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported_algs)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported_algs)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported_algs.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(pins: &[[u8; 32]]) -> PinnedCertVerifier {
        let provider = rustls::crypto::ring::default_provider();
        PinnedCertVerifier::new(
            provider.signature_verification_algorithms,
            pins.iter().copied().collect(),
        )
    }

    #[test]
    fn test_pin_match_and_mismatch() {
        let der = CertificateDer::from(vec![1u8, 2, 3, 4]);
        let name = ServerName::try_from("localhost").unwrap();
        let now = UnixTime::now();

        let pinned = verifier(&[certificate_fingerprint(der.as_ref())]);
        assert!(pinned.verify_server_cert(&der, &[], &name, &[], now).is_ok());

        let other = verifier(&[[0u8; 32]]);
        assert!(other.verify_server_cert(&der, &[], &name, &[], now).is_err());
    }

    #[test]
    fn test_no_pin_accepts_any() {
        let der = CertificateDer::from(vec![9u8; 16]);
        let name = ServerName::try_from("localhost").unwrap();
        assert!(verifier(&[]).verify_server_cert(&der, &[], &name, &[], UnixTime::now()).is_ok());
    }
}
