// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::endorsement::split_chain;
use super::report::{AttestationReport, TcbVersion, REPORT_SIZE, SIG_ALGO_ECDSA_P384_SHA384};
use super::EVIDENCE_TYPE;
use crate::errors::Error;
use crate::evidence::{pad_binding, Evidence, EvidenceVerifier};
use crate::store::ITrustAnchorStore;
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::x509::X509;
use x509_parser::prelude::*;

/// VCEK extensions, see "Versioned Chip Endorsement Key (VCEK) Certificate
/// and KDS Interface Specification" §3.1
pub const OID_BL_SPL: &str = "1.3.6.1.4.1.3704.1.3.1";
pub const OID_TEE_SPL: &str = "1.3.6.1.4.1.3704.1.3.2";
pub const OID_SNP_SPL: &str = "1.3.6.1.4.1.3704.1.3.3";
pub const OID_UCODE_SPL: &str = "1.3.6.1.4.1.3704.1.3.8";
pub const OID_HWID: &str = "1.3.6.1.4.1.3704.1.4";

fn invalid(s: impl Into<String>) -> Error {
    Error::EvidenceInvalid(s.into())
}

/// Checks SEV-SNP evidence against a set of trusted AMD root keys
pub struct SnpVerifier<S> {
    tas: S,
    allow_debug: bool,
}

impl<S: ITrustAnchorStore> SnpVerifier<S> {
    pub fn new(tas: S) -> Self {
        Self {
            tas,
            allow_debug: false,
        }
    }

    /// Accept guests whose policy lets the hypervisor debug them
    pub fn allow_debug(mut self, allow: bool) -> Self {
        self.allow_debug = allow;
        self
    }

    /// Check that ASK chains up to a trusted ARK.  An ARK carried in the
    /// evidence is only accepted if it is byte-identical to a trusted one.
    fn verify_ask(&self, ask_der: &[u8], ark_der: Option<&[u8]>) -> Result<(), Error> {
        let (_, ask) = parse_x509_certificate(ask_der).map_err(|e| invalid(format!("ASK: {e}")))?;

        check_validity(&ask, "ASK")?;

        let anchors = self.tas.lookup(ask.issuer().as_raw()).ok_or_else(|| {
            invalid(format!("no trust anchor for ASK issuer '{}'", ask.issuer()))
        })?;

        let ask = X509::from_der(ask_der).map_err(|e| invalid(format!("ASK: {e}")))?;

        let mut reason = "ASK is not signed by a trusted ARK".to_string();

        for ta in anchors.iter() {
            if let Some(ark) = ark_der {
                if ark != ta.ark.as_slice() {
                    continue;
                }
            }

            let (_, parsed) =
                parse_x509_certificate(&ta.ark).map_err(|e| invalid(format!("ARK: {e}")))?;

            if let Err(Error::EvidenceInvalid(e)) = check_validity(&parsed, "ARK") {
                tracing::warn!("skipping the {} ARK: {e}", ta.product);
                reason = e;
                continue;
            }

            let ark = X509::from_der(&ta.ark).map_err(|e| invalid(format!("ARK: {e}")))?;

            match signed_by(&ask, &ark, "ASK") {
                Ok(()) => {
                    tracing::debug!("ASK verified by the {} ARK", ta.product);
                    return Ok(());
                }
                Err(Error::EvidenceInvalid(e)) => reason = e,
                Err(e) => return Err(e),
            }
        }

        Err(invalid(reason))
    }
}

fn check_validity(cert: &X509Certificate<'_>, what: &str) -> Result<(), Error> {
    if !cert.validity().is_valid() {
        return Err(invalid(format!("{what} is outside its validity period")));
    }

    Ok(())
}

/// Check the signature on `cert` with the public key of `issuer`
fn signed_by(cert: &X509, issuer: &X509, what: &str) -> Result<(), Error> {
    let pkey = issuer
        .public_key()
        .map_err(|e| invalid(format!("{what} issuer public key: {e}")))?;

    match cert.verify(&pkey) {
        Ok(true) => Ok(()),
        Ok(false) => Err(invalid(format!("{what} signature does not verify"))),
        Err(e) => Err(invalid(format!("{what} signature check failed: {e}"))),
    }
}

/// DER INTEGER to u8, as found in the SPL extensions
fn spl_value(v: &[u8]) -> Option<u8> {
    match v {
        [0x02, 0x01, x] => Some(*x),
        [0x02, 0x02, 0x00, x] if *x >= 0x80 => Some(*x),
        _ => None,
    }
}

/// The hwID extension is the raw chip id, sometimes wrapped in an OCTET
/// STRING
fn hwid_value(v: &[u8]) -> &[u8] {
    match v {
        [0x04, 0x40, rest @ ..] if rest.len() == 0x40 => rest,
        _ => v,
    }
}

fn extension<'a>(cert: &X509Certificate<'a>, oid: &str) -> Result<&'a [u8], Error> {
    cert.extensions()
        .iter()
        .find(|e| e.oid.to_id_string() == oid)
        .map(|e| e.value)
        .ok_or_else(|| invalid(format!("VCEK lacks extension {oid}")))
}

/// Check that the VCEK certifies the chip and TCB the report claims
fn check_vcek_identity(vcek_der: &[u8], report: &AttestationReport) -> Result<(), Error> {
    let (_, vcek) = parse_x509_certificate(vcek_der).map_err(|e| invalid(format!("VCEK: {e}")))?;

    check_validity(&vcek, "VCEK")?;

    if hwid_value(extension(&vcek, OID_HWID)?) != report.chip_id.as_slice() {
        return Err(invalid("VCEK hwID does not match the report chip id"));
    }

    let spl = |oid: &str| -> Result<u8, Error> {
        spl_value(extension(&vcek, oid)?)
            .ok_or_else(|| invalid(format!("malformed VCEK extension {oid}")))
    };

    let certified = TcbVersion {
        bootloader: spl(OID_BL_SPL)?,
        tee: spl(OID_TEE_SPL)?,
        snp: spl(OID_SNP_SPL)?,
        microcode: spl(OID_UCODE_SPL)?,
    };

    if certified != report.reported_tcb {
        return Err(invalid(format!(
            "VCEK certifies {certified}, report claims {}",
            report.reported_tcb
        )));
    }

    Ok(())
}

fn be_bignum(le: &[u8]) -> Result<BigNum, Error> {
    let mut be = le.to_vec();
    be.reverse();

    BigNum::from_slice(&be).map_err(|e| invalid(format!("signature component: {e}")))
}

/// Verify the report signature with the VCEK public key
fn check_report_signature(vcek: &X509, report: &AttestationReport) -> Result<(), Error> {
    if report.signature_algo != SIG_ALGO_ECDSA_P384_SHA384 {
        return Err(invalid(format!(
            "unsupported signature algorithm {}",
            report.signature_algo
        )));
    }

    let sig = EcdsaSig::from_private_components(
        be_bignum(&report.signature_r)?,
        be_bignum(&report.signature_s)?,
    )
    .map_err(|e| invalid(format!("report signature: {e}")))?;

    let key = vcek
        .public_key()
        .and_then(|k| k.ec_key())
        .map_err(|e| invalid(format!("VCEK is not an EC key: {e}")))?;

    let digest = openssl::sha::sha384(report.signed_bytes());

    match sig.verify(&digest, &key) {
        Ok(true) => {}
        Ok(false) => return Err(invalid("report signature does not verify with the VCEK")),
        Err(e) => return Err(invalid(format!("report signature check failed: {e}"))),
    }

    Ok(())
}

impl<S: ITrustAnchorStore> EvidenceVerifier for SnpVerifier<S> {
    fn kind(&self) -> &str {
        EVIDENCE_TYPE
    }

    fn verify_evidence(&self, evidence: &Evidence, expected_binding: &[u8]) -> Result<(), Error> {
        if evidence.payload.len() < REPORT_SIZE {
            return Err(invalid(format!(
                "payload is {} bytes, shorter than a report",
                evidence.payload.len()
            )));
        }

        let (raw_report, raw_chain) = evidence.payload.split_at(REPORT_SIZE);

        let report = AttestationReport::decode(raw_report)?;

        if report.report_data != pad_binding(expected_binding)? {
            return Err(Error::HashMismatch);
        }

        let chain = split_chain(raw_chain).map_err(|e| invalid(format!("endorsements: {e}")))?;

        let (vcek_der, ask_der, ark_der) = match chain.as_slice() {
            [vcek, ask] => (*vcek, *ask, None),
            [vcek, ask, ark] => (*vcek, *ask, Some(*ark)),
            c => {
                return Err(invalid(format!(
                    "expecting VCEK, ASK and optional ARK, got {} certificates",
                    c.len()
                )))
            }
        };

        self.verify_ask(ask_der, ark_der)?;

        let vcek = X509::from_der(vcek_der).map_err(|e| invalid(format!("VCEK: {e}")))?;

        let ask = X509::from_der(ask_der).map_err(|e| invalid(format!("ASK: {e}")))?;

        signed_by(&vcek, &ask, "VCEK")?;

        check_vcek_identity(vcek_der, &report)?;

        check_report_signature(&vcek, &report)?;

        if report.debug_allowed() && !self.allow_debug {
            return Err(invalid("guest policy allows debugging"));
        }

        tracing::info!(
            "SEV-SNP evidence verified: chip {}.., {}, measurement {}",
            hex::encode(&report.chip_id[..8]),
            report.reported_tcb,
            hex::encode(report.measurement)
        );

        Ok(())
    }
}
