// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::binding::BindingMode;
use super::{extension, DEFAULT_EXTENSION_OID};
use crate::claims::ClaimSet;
use crate::errors::Error;
use crate::evidence::{Evidence, EvidenceCollector};
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Extension, X509NameBuilder, X509};
use serde::{Deserialize, Serialize};

/// Certificate appearance and binding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CertConfig {
    pub organization: String,
    pub common_name: String,
    pub validity_days: u32,
    pub extension_oid: String,
    pub binding: BindingMode,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self {
            organization: "Inclavare Containers".to_string(),
            common_name: "LibRATS".to_string(),
            validity_days: 365,
            extension_oid: DEFAULT_EXTENSION_OID.to_string(),
            binding: BindingMode::default(),
        }
    }
}

fn x509_err(what: &'static str) -> impl FnOnce(ErrorStack) -> Error {
    move |e| Error::Serialization(format!("{what}: {e}"))
}

fn generate_key() -> Result<PKey<Private>, Error> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).map_err(x509_err("P-256 group"))?;
    let key = EcKey::generate(&group).map_err(x509_err("P-256 key generation"))?;

    PKey::from_ec_key(key).map_err(x509_err("P-256 key"))
}

/// Produces self-signed certificates whose extension carries evidence bound
/// to the certificate key
pub struct CertificateBuilder<C> {
    config: CertConfig,
    collector: C,
}

impl<C: EvidenceCollector> CertificateBuilder<C> {
    pub fn new(config: CertConfig, collector: C) -> Self {
        Self { config, collector }
    }

    /// Build a DER certificate for the key in `private_key_pem`, or for a
    /// fresh P-256 key when none is given.  A generated key is returned as
    /// PKCS#8 PEM next to the certificate.
    pub fn build(
        &self,
        private_key_pem: Option<&[u8]>,
        claims: &ClaimSet,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), Error> {
        let (pkey, generated) = match private_key_pem {
            Some(pem) => {
                let k = PKey::private_key_from_pem(pem)
                    .map_err(|e| Error::PreconditionViolation(format!("private key: {e}")))?;
                (k, None)
            }
            None => {
                let k = generate_key()?;
                let pem = k
                    .private_key_to_pem_pkcs8()
                    .map_err(x509_err("PKCS#8 encoding"))?;
                (k, Some(pem))
            }
        };

        let spki = pkey
            .public_key_to_der()
            .map_err(x509_err("SubjectPublicKeyInfo"))?;

        let binding = self.config.binding.compute(&spki, claims)?;

        let evidence = self
            .collector
            .collect(&binding)
            .map_err(|e| Error::CertGen(Box::new(e)))?;

        let der = build_with_evidence(&self.config, &pkey, &evidence, claims)?;

        tracing::info!(
            "built {} attested certificate for CN={} with {} claims",
            evidence.kind,
            self.config.common_name,
            claims.len()
        );

        Ok((der, generated))
    }
}

/// Wrap already collected `evidence` and `claims` into a certificate signed
/// by `pkey`.  The caller is responsible for the evidence carrying the right
/// binding.
pub fn build_with_evidence(
    config: &CertConfig,
    pkey: &PKey<Private>,
    evidence: &Evidence,
    claims: &ClaimSet,
) -> Result<Vec<u8>, Error> {
    let ext = extension::encode(evidence, claims)?;

    let oid = Asn1Object::from_str(&config.extension_oid)
        .map_err(|e| Error::Config(format!("extension OID {}: {e}", config.extension_oid)))?;
    let octets = Asn1OctetString::new_from_bytes(&ext).map_err(x509_err("extension value"))?;
    let ext = X509Extension::new_from_der(&oid, false, &octets).map_err(x509_err("extension"))?;

    let mut name = X509NameBuilder::new().map_err(x509_err("subject"))?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, &config.organization)
        .map_err(x509_err("subject O"))?;
    name.append_entry_by_nid(Nid::COMMONNAME, &config.common_name)
        .map_err(x509_err("subject CN"))?;
    let name = name.build();

    let mut serial = BigNum::new().map_err(x509_err("serial"))?;
    serial
        .rand(127, MsbOption::MAYBE_ZERO, false)
        .map_err(x509_err("serial"))?;
    let serial = serial.to_asn1_integer().map_err(x509_err("serial"))?;

    let not_before = Asn1Time::days_from_now(0).map_err(x509_err("notBefore"))?;
    let not_after = Asn1Time::days_from_now(config.validity_days).map_err(x509_err("notAfter"))?;

    let mut b = X509::builder().map_err(x509_err("certificate"))?;
    b.set_version(2).map_err(x509_err("version"))?;
    b.set_serial_number(&serial).map_err(x509_err("serial"))?;
    b.set_subject_name(&name).map_err(x509_err("subject"))?;
    b.set_issuer_name(&name).map_err(x509_err("issuer"))?;
    b.set_pubkey(pkey).map_err(x509_err("public key"))?;
    b.set_not_before(&not_before).map_err(x509_err("notBefore"))?;
    b.set_not_after(&not_after).map_err(x509_err("notAfter"))?;
    b.append_extension(ext).map_err(x509_err("extension"))?;
    b.sign(pkey, MessageDigest::sha256())
        .map_err(x509_err("signature"))?;

    b.build().to_der().map_err(x509_err("DER encoding"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;
    use crate::testutil::Platform;
    use crate::snp::SnpAttester;
    use x509_parser::prelude::*;

    fn claims() -> ClaimSet {
        ClaimSet::try_from(vec![Claim::new("role", b"server")]).unwrap()
    }

    #[test]
    fn build_generates_key() {
        let p = Platform::new();
        let b = CertificateBuilder::new(
            CertConfig::default(),
            SnpAttester::new(p.device(), p.endorsements()),
        );

        let (der, key) = b.build(None, &claims()).unwrap();

        let key = PKey::private_key_from_pem(&key.unwrap()).unwrap();
        let x = X509::from_der(&der).unwrap();
        assert!(x.verify(&key).unwrap());
        assert_eq!(key.id(), openssl::pkey::Id::EC);

        let (_, c) = parse_x509_certificate(&der).unwrap();
        assert_eq!(c.subject().to_string(), "O=Inclavare Containers, CN=LibRATS");
        assert_eq!(c.subject().as_raw(), c.issuer().as_raw());

        let ext = c
            .extensions()
            .iter()
            .find(|e| e.oid.to_id_string() == DEFAULT_EXTENSION_OID)
            .unwrap();
        assert!(!ext.critical);
    }

    #[test]
    fn build_with_caller_key() {
        let p = Platform::new();
        let config = CertConfig {
            common_name: "node-1".to_string(),
            ..Default::default()
        };
        let b = CertificateBuilder::new(config, SnpAttester::new(p.device(), p.endorsements()));

        let k = generate_key().unwrap();
        let pem = k.private_key_to_pem_pkcs8().unwrap();

        let (der, key) = b.build(Some(&pem), &claims()).unwrap();

        assert!(key.is_none());
        let x = X509::from_der(&der).unwrap();
        assert!(x.public_key().unwrap().public_eq(&k));
    }

    #[test]
    fn bad_caller_key() {
        let p = Platform::new();
        let b = CertificateBuilder::new(
            CertConfig::default(),
            SnpAttester::new(p.device(), p.endorsements()),
        );

        let r = b.build(Some(b"not a key"), &claims());

        assert!(matches!(r, Err(Error::PreconditionViolation(_))));
    }

    #[test]
    fn collector_failure_is_wrapped() {
        let p = Platform::new();
        let offline =
            |_: &[u8; 64], _: &crate::snp::TcbVersion| -> Result<Vec<u8>, Error> {
                Err(Error::CertFetch("KDS unreachable".to_string()))
            };
        let b = CertificateBuilder::new(CertConfig::default(), SnpAttester::new(p.device(), offline));

        let r = b.build(None, &claims());

        match r {
            Err(Error::CertGen(source)) => {
                assert!(matches!(*source, Error::CertFetch(_)));
            }
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn bad_extension_oid() {
        let config = CertConfig {
            extension_oid: "not-an-oid".to_string(),
            ..Default::default()
        };

        let r = build_with_evidence(
            &config,
            &generate_key().unwrap(),
            &Evidence::new("sev_snp", vec![]),
            &ClaimSet::new(),
        );

        assert!(matches!(r, Err(Error::Config(_))));
    }
}
