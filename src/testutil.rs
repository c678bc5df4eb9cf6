// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! A fabricated SEV-SNP platform: an ARK → ASK → VCEK chain shaped like
//! AMD's, and a guest device that answers report requests signed with the
//! VCEK key.

use crate::errors::Error;
use crate::snp::device::{GuestDevice, ReportRequest, ReportResponse, REQUEST_SIZE, RESPONSE_SIZE};
use crate::snp::report::{ReportBuilder, TcbVersion, SIG_COMPONENT_SIZE};
use crate::snp::verifier::{OID_BL_SPL, OID_HWID, OID_SNP_SPL, OID_TEE_SPL, OID_UCODE_SPL};
use crate::store::MemoTrustAnchorStore;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumRef};
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Extension, X509NameBuilder, X509};
use tempfile::TempDir;

pub struct Platform {
    pub ark: X509,
    pub ask: X509,
    ark_key: PKey<Private>,
    ask_key: PKey<Private>,
    pub vcek: X509,
    pub vcek_key: EcKey<Private>,
    pub chip_id: [u8; 64],
    pub tcb: TcbVersion,
}

fn p384() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn der_int(v: u8) -> Vec<u8> {
    if v < 0x80 {
        vec![0x02, 0x01, v]
    } else {
        vec![0x02, 0x02, 0x00, v]
    }
}

fn custom_ext(oid: &str, value: &[u8]) -> X509Extension {
    X509Extension::new_from_der(
        &Asn1Object::from_str(oid).unwrap(),
        false,
        &Asn1OctetString::new_from_bytes(value).unwrap(),
    )
    .unwrap()
}

fn make_cert(
    cn: &str,
    serial: u32,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
    exts: Vec<X509Extension>,
    expired: bool,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("O", "Advanced Micro Devices")
        .unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut b = X509::builder().unwrap();
    b.set_version(2).unwrap();
    let sn = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    b.set_serial_number(&sn).unwrap();
    b.set_subject_name(&name).unwrap();
    match issuer {
        Some((ic, _)) => b.set_issuer_name(ic.subject_name()).unwrap(),
        None => b.set_issuer_name(&name).unwrap(),
    }
    b.set_pubkey(key).unwrap();
    if expired {
        // 2001-09-09 .. 2004-11-09
        b.set_not_before(&Asn1Time::from_unix(1_000_000_000).unwrap())
            .unwrap();
        b.set_not_after(&Asn1Time::from_unix(1_100_000_000).unwrap())
            .unwrap();
    } else {
        b.set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        b.set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
    }
    for e in exts {
        b.append_extension(e).unwrap();
    }

    let signer = issuer.map(|(_, k)| k).unwrap_or(key);
    b.sign(signer, MessageDigest::sha384()).unwrap();

    b.build()
}

fn le_component(v: &BigNumRef) -> [u8; SIG_COMPONENT_SIZE] {
    let mut be = v.to_vec();
    be.reverse();

    let mut out = [0u8; SIG_COMPONENT_SIZE];
    out[..be.len()].copy_from_slice(&be);
    out
}

impl Platform {
    pub fn new() -> Self {
        let chip_id = [0x42; 64];
        let tcb = TcbVersion {
            bootloader: 3,
            tee: 0,
            snp: 8,
            microcode: 0xd1,
        };

        Self::with_identity(chip_id, tcb)
    }

    /// A platform whose VCEK certifies `chip_id` and `tcb`
    pub fn with_identity(chip_id: [u8; 64], tcb: TcbVersion) -> Self {
        Self::build(chip_id, tcb, false)
    }

    /// A platform whose root key has expired
    pub fn with_expired_ark() -> Self {
        let p = Self::new();

        Self::build(p.chip_id, p.tcb, true)
    }

    fn build(chip_id: [u8; 64], tcb: TcbVersion, expired_ark: bool) -> Self {
        let ark_key = p384();
        let ark = make_cert(
            "ARK-Milan",
            1,
            &ark_key,
            None,
            vec![BasicConstraints::new().critical().ca().build().unwrap()],
            expired_ark,
        );

        let ask_key = p384();
        let ask = make_cert(
            "SEV-Milan",
            2,
            &ask_key,
            Some((&ark, &ark_key)),
            vec![BasicConstraints::new().critical().ca().build().unwrap()],
            false,
        );

        let vcek_pkey = p384();
        let vcek = make_cert(
            "SEV-VCEK",
            3,
            &vcek_pkey,
            Some((&ask, &ask_key)),
            vec![
                custom_ext(OID_BL_SPL, &der_int(tcb.bootloader)),
                custom_ext(OID_TEE_SPL, &der_int(tcb.tee)),
                custom_ext(OID_SNP_SPL, &der_int(tcb.snp)),
                custom_ext(OID_UCODE_SPL, &der_int(tcb.microcode)),
                custom_ext(OID_HWID, &chip_id),
            ],
            false,
        );

        Self {
            ark,
            ask,
            ark_key,
            ask_key,
            vcek,
            vcek_key: vcek_pkey.ec_key().unwrap(),
            chip_id,
            tcb,
        }
    }

    /// The ASK re-issued with the same key and name, but long expired
    pub fn expired_ask(&self) -> X509 {
        make_cert(
            "SEV-Milan",
            2,
            &self.ask_key,
            Some((&self.ark, &self.ark_key)),
            vec![BasicConstraints::new().critical().ca().build().unwrap()],
            true,
        )
    }

    /// VCEK ‖ ASK ‖ ARK
    pub fn chain(&self) -> Vec<u8> {
        let mut c = self.vcek.to_der().unwrap();
        c.extend(self.ask.to_der().unwrap());
        c.extend(self.ark.to_der().unwrap());
        c
    }

    pub fn ark_pem(&self) -> String {
        String::from_utf8(self.ark.to_pem().unwrap()).unwrap()
    }

    pub fn ask_pem(&self) -> String {
        String::from_utf8(self.ask.to_pem().unwrap()).unwrap()
    }

    pub fn anchors_json(&self) -> String {
        serde_json::json!([{ "product": "Milan", "ark": self.ark_pem() }]).to_string()
    }

    pub fn anchors(&self) -> MemoTrustAnchorStore {
        let mut s = MemoTrustAnchorStore::new();
        s.load_json(&self.anchors_json()).unwrap();
        s
    }

    /// Write the chain into a KDS-shaped cache directory
    pub fn write_cache(&self, product: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();

        let chip = dir.path().join(product).join(hex::encode(self.chip_id));
        std::fs::create_dir_all(&chip).unwrap();
        std::fs::write(
            chip.join(format!("{:016x}.der", self.tcb.raw())),
            self.vcek.to_der().unwrap(),
        )
        .unwrap();

        let mut pem = self.ask.to_pem().unwrap();
        pem.extend(self.ark.to_pem().unwrap());
        std::fs::write(dir.path().join(product).join("cert_chain.pem"), pem).unwrap();

        dir
    }

    pub fn device(&self) -> FakeDevice {
        FakeDevice {
            chip_id: self.chip_id,
            tcb: self.tcb,
            policy: 0x30000,
            key: self.vcek_key.clone(),
        }
    }

    pub fn endorsements(&self) -> impl Fn(&[u8; 64], &TcbVersion) -> Result<Vec<u8>, Error> {
        let chain = self.chain();
        move |_: &[u8; 64], _: &TcbVersion| -> Result<Vec<u8>, Error> { Ok(chain.clone()) }
    }
}

/// Answers report requests the way the PSP would, signing with the VCEK key
pub struct FakeDevice {
    pub chip_id: [u8; 64],
    pub tcb: TcbVersion,
    pub policy: u64,
    key: EcKey<Private>,
}

impl GuestDevice for FakeDevice {
    fn get_report(
        &self,
        request: &[u8; REQUEST_SIZE],
        response: &mut [u8; RESPONSE_SIZE],
    ) -> Result<(), Error> {
        let req = ReportRequest::from_bytes(request);

        let b = ReportBuilder::new()
            .policy(self.policy)
            .vmpl(req.vmpl)
            .report_data(&req.user_data)
            .measurement(&[0x11; 48])
            .chip_id(&self.chip_id)
            .tcb(self.tcb);

        let digest = openssl::sha::sha384(b.signed_bytes());
        let sig = EcdsaSig::sign(&digest, &self.key).unwrap();

        let report = b
            .signature(&le_component(sig.r()), &le_component(sig.s()))
            .build();

        ReportResponse::encode(0, &report, response);

        Ok(())
    }
}
