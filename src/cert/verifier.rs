// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::binding::BindingMode;
use super::builder::CertConfig;
use super::extension::{self, Extension};
use super::DEFAULT_EXTENSION_OID;
use crate::claims::{ClaimMismatch, ClaimSet};
use crate::errors::Error;
use crate::evidence::VerifierRegistry;
use openssl::x509::X509;
use x509_parser::prelude::*;

/// The parts of an attested certificate that verification works on
#[derive(Debug)]
pub struct AttestedCertificate {
    /// DER SubjectPublicKeyInfo of the certificate key
    pub spki: Vec<u8>,
    pub extension: Extension,
}

/// Parse a DER or PEM certificate and decode the attestation extension found
/// under `oid`.  The certificate signature is not checked: integrity of the
/// contents rests on the evidence binding and the claims policy.
pub fn extract(cert: &[u8], oid: &str) -> Result<AttestedCertificate, Error> {
    let x = if cert.starts_with(b"-----BEGIN") {
        X509::from_pem(cert)
    } else {
        X509::from_der(cert)
    }
    .map_err(|e| Error::Parse(format!("certificate: {e}")))?;

    let pkey = x
        .public_key()
        .map_err(|e| Error::Parse(format!("certificate public key: {e}")))?;

    let spki = pkey
        .public_key_to_der()
        .map_err(|e| Error::Parse(format!("certificate public key: {e}")))?;

    let der = x
        .to_der()
        .map_err(|e| Error::Parse(format!("certificate: {e}")))?;

    let (_, c) =
        parse_x509_certificate(&der).map_err(|e| Error::Parse(format!("certificate: {e}")))?;

    let mut found = c
        .extensions()
        .iter()
        .filter(|e| e.oid.to_id_string() == oid);

    let ext = match (found.next(), found.next()) {
        (Some(e), None) => e,
        (None, _) => {
            return Err(Error::Parse(format!(
                "no attestation extension {oid} in certificate"
            )))
        }
        (Some(_), Some(_)) => {
            return Err(Error::Parse(format!(
                "attestation extension {oid} appears more than once"
            )))
        }
    };

    Ok(AttestedCertificate {
        spki,
        extension: extension::decode(ext.value)?,
    })
}

/// Checks attested certificates: the binding between evidence and certificate
/// key, the evidence itself, and finally the claims against a caller policy
pub struct CertificateVerifier {
    registry: VerifierRegistry,
    extension_oid: String,
    binding: BindingMode,
}

impl CertificateVerifier {
    pub fn new(registry: VerifierRegistry) -> Self {
        Self {
            registry,
            extension_oid: DEFAULT_EXTENSION_OID.to_string(),
            binding: BindingMode::default(),
        }
    }

    /// Use the extension OID and binding mode of a certificate configuration
    pub fn from_config(registry: VerifierRegistry, config: &CertConfig) -> Self {
        Self::new(registry)
            .extension_oid(&config.extension_oid)
            .binding(config.binding)
    }

    pub fn extension_oid(mut self, oid: &str) -> Self {
        self.extension_oid = oid.to_string();
        self
    }

    pub fn binding(mut self, binding: BindingMode) -> Self {
        self.binding = binding;
        self
    }

    /// Verify `cert` (DER or PEM).  `policy` is only consulted once the
    /// evidence has been found genuine and bound to the certificate key.
    pub fn verify<C, F>(&self, cert: &[u8], policy: F, ctx: &C) -> Result<(), Error>
    where
        F: Fn(&ClaimSet, &C) -> Result<(), Vec<ClaimMismatch>>,
    {
        let c = extract(cert, &self.extension_oid)?;

        let binding = self.binding.compute(&c.spki, &c.extension.claims)?;

        self.registry.verify(&c.extension.evidence, &binding)?;

        policy(&c.extension.claims, ctx).map_err(Error::PolicyReject)?;

        tracing::info!(
            "attested certificate verified ({} evidence, {} claims)",
            c.extension.evidence.kind,
            c.extension.claims.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{build_with_evidence, CertificateBuilder};
    use crate::claims::{match_claims, Claim};
    use crate::evidence::{Evidence, EvidenceCollector};
    use crate::snp::{SnpAttester, SnpVerifier};
    use crate::testutil::Platform;
    use openssl::pkey::PKey;

    fn registry(p: &Platform) -> VerifierRegistry {
        let mut r = VerifierRegistry::new();
        r.register(Box::new(SnpVerifier::new(p.anchors())));
        r
    }

    fn scenario() -> ClaimSet {
        ClaimSet::try_from(vec![
            Claim::new("nonce", b"ab12"),
            Claim::new("role", b"server"),
        ])
        .unwrap()
    }

    fn build(p: &Platform, config: CertConfig, claims: &ClaimSet) -> (Vec<u8>, Vec<u8>) {
        let b = CertificateBuilder::new(config, SnpAttester::new(p.device(), p.endorsements()));

        let (der, key) = b.build(None, claims).unwrap();

        (der, key.unwrap())
    }

    #[test]
    fn round_trip_binary_claims() {
        let p = Platform::new();
        let claims = ClaimSet::try_from(vec![
            Claim::new("nonce", &[0x00, 0xff, 0x10, 0x00]),
            Claim::new("empty", b""),
            Claim::new("role", b"server"),
        ])
        .unwrap();

        let (der, _) = build(&p, CertConfig::default(), &claims);

        let v = CertificateVerifier::new(registry(&p));
        v.verify(&der, match_claims, &claims).unwrap();

        let c = extract(&der, DEFAULT_EXTENSION_OID).unwrap();
        assert_eq!(c.extension.claims, claims);
    }

    #[test]
    fn round_trip_pem() {
        let p = Platform::new();
        let (der, _) = build(&p, CertConfig::default(), &scenario());
        let pem = X509::from_der(&der).unwrap().to_pem().unwrap();

        CertificateVerifier::new(registry(&p))
            .verify(&pem, match_claims, &scenario())
            .unwrap();
    }

    #[test]
    fn round_trip_claims_binding() {
        let p = Platform::new();
        let config = CertConfig {
            binding: BindingMode::PublicKeyAndClaims,
            extension_oid: "1.3.6.1.4.1.99999.1".to_string(),
            ..Default::default()
        };
        let (der, _) = build(&p, config.clone(), &scenario());

        CertificateVerifier::from_config(registry(&p), &config)
            .verify(&der, match_claims, &scenario())
            .unwrap();

        // a verifier looking for the default OID finds nothing
        let r = CertificateVerifier::new(registry(&p)).verify(&der, match_claims, &scenario());
        assert!(matches!(r, Err(Error::Parse(_))));
    }

    #[test]
    fn scenario_role_mismatch() {
        let p = Platform::new();
        let (der, _) = build(&p, CertConfig::default(), &scenario());

        let expected = ClaimSet::try_from(vec![
            Claim::new("nonce", b"ab12"),
            Claim::new("role", b"client"),
        ])
        .unwrap();

        let r = CertificateVerifier::new(registry(&p)).verify(&der, match_claims, &expected);

        match r {
            Err(Error::PolicyReject(m)) => {
                assert_eq!(m.len(), 1);
                assert_eq!(m[0].name(), "role");
            }
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn tampered_claim() {
        let p = Platform::new();
        let claims = scenario();
        let (der, key) = build(&p, CertConfig::default(), &claims);

        // re-issue with the same key and evidence, one claim byte flipped
        let c = extract(&der, DEFAULT_EXTENSION_OID).unwrap();
        let mut nonce = claims.get("nonce").unwrap().value.clone();
        nonce[0] ^= 0x01;
        let tampered = ClaimSet::try_from(vec![
            Claim::new("nonce", &nonce),
            Claim::new("role", b"server"),
        ])
        .unwrap();

        let pkey = PKey::private_key_from_pem(&key).unwrap();
        let forged = build_with_evidence(
            &CertConfig::default(),
            &pkey,
            &c.extension.evidence,
            &tampered,
        )
        .unwrap();

        let r = CertificateVerifier::new(registry(&p)).verify(&forged, match_claims, &claims);

        match r {
            Err(Error::PolicyReject(m)) => {
                assert_eq!(m.len(), 1);
                assert_eq!(m[0].name(), "nonce");
            }
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn tampered_claim_with_claims_binding() {
        let p = Platform::new();
        let config = CertConfig {
            binding: BindingMode::PublicKeyAndClaims,
            ..Default::default()
        };
        let (der, key) = build(&p, config.clone(), &scenario());

        let c = extract(&der, DEFAULT_EXTENSION_OID).unwrap();
        let tampered = ClaimSet::try_from(vec![
            Claim::new("nonce", b"ab13"),
            Claim::new("role", b"server"),
        ])
        .unwrap();

        let pkey = PKey::private_key_from_pem(&key).unwrap();
        let forged = build_with_evidence(&config, &pkey, &c.extension.evidence, &tampered).unwrap();

        let r = CertificateVerifier::from_config(registry(&p), &config).verify(
            &forged,
            match_claims,
            &tampered,
        );

        assert_eq!(r, Err(Error::HashMismatch));
    }

    #[test]
    fn substituted_evidence() {
        let p = Platform::new();
        let (der_a, _) = build(&p, CertConfig::default(), &scenario());
        let a = extract(&der_a, DEFAULT_EXTENSION_OID).unwrap();

        // key B, evidence bound to key A
        let key_b = {
            let group = openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1)
                .unwrap();
            PKey::from_ec_key(openssl::ec::EcKey::generate(&group).unwrap()).unwrap()
        };
        let forged = build_with_evidence(
            &CertConfig::default(),
            &key_b,
            &a.extension.evidence,
            &scenario(),
        )
        .unwrap();

        let r = CertificateVerifier::new(registry(&p)).verify(&forged, match_claims, &scenario());

        assert_eq!(r, Err(Error::HashMismatch));
    }

    #[test]
    fn unknown_evidence_type() {
        let p = Platform::new();
        let key = PKey::private_key_from_pem(&build(&p, CertConfig::default(), &scenario()).1)
            .unwrap();

        for payload in [vec![], vec![0x5a; 1184]] {
            let forged = build_with_evidence(
                &CertConfig::default(),
                &key,
                &Evidence::new("tdx", payload),
                &scenario(),
            )
            .unwrap();

            let r =
                CertificateVerifier::new(registry(&p)).verify(&forged, match_claims, &scenario());

            assert_eq!(r, Err(Error::UnsupportedEvidenceType("tdx".to_string())));
        }
    }

    #[test]
    fn untrusted_platform() {
        let p = Platform::new();
        let other = Platform::new();
        let (der, _) = build(&p, CertConfig::default(), &scenario());

        let r = CertificateVerifier::new(registry(&other)).verify(&der, match_claims, &scenario());

        assert!(matches!(r, Err(Error::EvidenceInvalid(_))));
    }

    #[test]
    fn policy_sees_typed_context() {
        struct Expect {
            role: &'static [u8],
        }

        let p = Platform::new();
        let (der, _) = build(&p, CertConfig::default(), &scenario());

        let policy = |c: &ClaimSet, x: &Expect| -> Result<(), Vec<ClaimMismatch>> {
            match c.get("role") {
                Some(r) if r.value == x.role => Ok(()),
                _ => Err(vec![ClaimMismatch::Missing {
                    name: "role".to_string(),
                }]),
            }
        };

        let v = CertificateVerifier::new(registry(&p));

        v.verify(&der, policy, &Expect { role: b"server" }).unwrap();
        assert!(matches!(
            v.verify(&der, policy, &Expect { role: b"client" }),
            Err(Error::PolicyReject(_))
        ));
    }

    #[test]
    fn flipped_claim_byte() {
        let p = Platform::new();
        let (mut der, _) = build(&p, CertConfig::default(), &scenario());

        let pos = der
            .windows(b"server".len())
            .position(|w| w == b"server")
            .unwrap();
        der[pos] ^= 0x01;

        let r = CertificateVerifier::new(registry(&p)).verify(&der, match_claims, &scenario());

        match r {
            Err(Error::PolicyReject(m)) => {
                assert_eq!(m.len(), 1);
                assert_eq!(m[0].name(), "role");
            }
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn flipped_claim_byte_with_claims_binding() {
        let p = Platform::new();
        let config = CertConfig {
            binding: BindingMode::PublicKeyAndClaims,
            ..Default::default()
        };
        let (mut der, _) = build(&p, config.clone(), &scenario());

        let pos = der
            .windows(b"ab12".len())
            .position(|w| w == b"ab12")
            .unwrap();
        der[pos] ^= 0x01;

        let r = CertificateVerifier::from_config(registry(&p), &config).verify(
            &der,
            match_claims,
            &scenario(),
        );

        assert_eq!(r, Err(Error::HashMismatch));
    }

    #[test]
    fn no_attestation_extension() {
        let p = Platform::new();

        let r = extract(&p.vcek.to_der().unwrap(), DEFAULT_EXTENSION_OID);

        assert!(matches!(r, Err(Error::Parse(m)) if m.contains("no attestation extension")));
    }

    #[test]
    fn garbage() {
        assert!(matches!(
            extract(b"\x30\x03\x02\x01\x00", DEFAULT_EXTENSION_OID),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn direct_collector() {
        // evidence collected by the caller and embedded as is
        let p = Platform::new();
        let key = PKey::private_key_from_pem(&build(&p, CertConfig::default(), &scenario()).1)
            .unwrap();
        let spki = key.public_key_to_der().unwrap();
        let binding = BindingMode::PublicKeyHash.compute(&spki, &scenario()).unwrap();
        let evidence = SnpAttester::new(p.device(), p.endorsements())
            .collect(&binding)
            .unwrap();

        let der = build_with_evidence(&CertConfig::default(), &key, &evidence, &scenario()).unwrap();

        CertificateVerifier::new(registry(&p))
            .verify(&der, match_claims, &scenario())
            .unwrap();
    }
}
