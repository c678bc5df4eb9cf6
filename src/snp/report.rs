// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! SEV-SNP attestation report, §7.3 of the "SEV Secure Nested Paging
//! Firmware ABI Specification" (report versions 2 and 3).

use crate::errors::Error;
use crate::evidence::BINDING_CAPACITY;
use std::fmt;

/// Size of an attestation report
pub const REPORT_SIZE: usize = 0x4A0;

/// Bytes covered by the report signature
pub const SIGNED_SIZE: usize = 0x2A0;

/// ECDSA P-384 with SHA-384, the only algorithm defined by the ABI
pub const SIG_ALGO_ECDSA_P384_SHA384: u32 = 1;

const VERSION: usize = 0x00;
const GUEST_SVN: usize = 0x04;
const POLICY: usize = 0x08;
const FAMILY_ID: usize = 0x10;
const IMAGE_ID: usize = 0x20;
const VMPL: usize = 0x30;
const SIGNATURE_ALGO: usize = 0x34;
const CURRENT_TCB: usize = 0x38;
const PLATFORM_INFO: usize = 0x40;
const REPORT_DATA: usize = 0x50;
const MEASUREMENT: usize = 0x90;
const HOST_DATA: usize = 0xC0;
const ID_KEY_DIGEST: usize = 0xE0;
const AUTHOR_KEY_DIGEST: usize = 0x110;
const REPORT_ID: usize = 0x140;
const REPORTED_TCB: usize = 0x180;
const CHIP_ID: usize = 0x1A0;
const COMMITTED_TCB: usize = 0x1E0;
const CURRENT_BUILD: usize = 0x1E8;
const COMMITTED_BUILD: usize = 0x1EC;
const LAUNCH_TCB: usize = 0x1F0;
const SIGNATURE_R: usize = 0x2A0;
const SIGNATURE_S: usize = 0x2E8;

/// Width of each signature component, little-endian, zero extended
pub const SIG_COMPONENT_SIZE: usize = 72;

/// Guest policy bit allowing the hypervisor to debug the guest
pub const POLICY_DEBUG: u64 = 1 << 19;

/// Security patch levels of the firmware components making up the TCB
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TcbVersion {
    pub bootloader: u8,
    pub tee: u8,
    pub snp: u8,
    pub microcode: u8,
}

impl TcbVersion {
    pub fn from_bytes(b: &[u8; 8]) -> Self {
        Self {
            bootloader: b[0],
            tee: b[1],
            snp: b[6],
            microcode: b[7],
        }
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        [
            self.bootloader,
            self.tee,
            0,
            0,
            0,
            0,
            self.snp,
            self.microcode,
        ]
    }

    /// The raw 64-bit value, as used by the KDS to name VCEKs
    pub fn raw(&self) -> u64 {
        u64::from_le_bytes(self.to_bytes())
    }
}

impl fmt::Display for TcbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blSPL={} teeSPL={} snpSPL={} ucodeSPL={}",
            self.bootloader, self.tee, self.snp, self.microcode
        )
    }
}

/// Firmware version triple
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Version {
    pub build: u8,
    pub minor: u8,
    pub major: u8,
}

/// A decoded attestation report.  `raw` keeps the exact bytes the firmware
/// returned so that the signature can be checked over them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationReport {
    pub version: u32,
    pub guest_svn: u32,
    pub policy: u64,
    pub family_id: [u8; 16],
    pub image_id: [u8; 16],
    pub vmpl: u32,
    pub signature_algo: u32,
    pub current_tcb: TcbVersion,
    pub platform_info: u64,
    pub report_data: [u8; BINDING_CAPACITY],
    pub measurement: [u8; 48],
    pub host_data: [u8; 32],
    pub id_key_digest: [u8; 48],
    pub author_key_digest: [u8; 48],
    pub report_id: [u8; 32],
    pub reported_tcb: TcbVersion,
    pub chip_id: [u8; 64],
    pub committed_tcb: TcbVersion,
    pub current: Version,
    pub committed: Version,
    pub launch_tcb: TcbVersion,
    pub signature_r: [u8; SIG_COMPONENT_SIZE],
    pub signature_s: [u8; SIG_COMPONENT_SIZE],

    raw: Vec<u8>,
}

fn field<const N: usize>(b: &[u8], off: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[off..off + N]);
    out
}

fn u32_at(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(field::<4>(b, off))
}

fn u64_at(b: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(field::<8>(b, off))
}

fn tcb_at(b: &[u8], off: usize) -> TcbVersion {
    TcbVersion::from_bytes(&field::<8>(b, off))
}

fn version_at(b: &[u8], off: usize) -> Version {
    Version {
        build: b[off],
        minor: b[off + 1],
        major: b[off + 2],
    }
}

impl AttestationReport {
    /// Decode a report.  The input must be exactly [`REPORT_SIZE`] bytes;
    /// every field offset is only read after that check.
    pub fn decode(b: &[u8]) -> Result<Self, Error> {
        if b.len() != REPORT_SIZE {
            return Err(Error::SizeMismatch {
                expected: REPORT_SIZE,
                got: b.len(),
            });
        }

        Ok(Self {
            version: u32_at(b, VERSION),
            guest_svn: u32_at(b, GUEST_SVN),
            policy: u64_at(b, POLICY),
            family_id: field(b, FAMILY_ID),
            image_id: field(b, IMAGE_ID),
            vmpl: u32_at(b, VMPL),
            signature_algo: u32_at(b, SIGNATURE_ALGO),
            current_tcb: tcb_at(b, CURRENT_TCB),
            platform_info: u64_at(b, PLATFORM_INFO),
            report_data: field(b, REPORT_DATA),
            measurement: field(b, MEASUREMENT),
            host_data: field(b, HOST_DATA),
            id_key_digest: field(b, ID_KEY_DIGEST),
            author_key_digest: field(b, AUTHOR_KEY_DIGEST),
            report_id: field(b, REPORT_ID),
            reported_tcb: tcb_at(b, REPORTED_TCB),
            chip_id: field(b, CHIP_ID),
            committed_tcb: tcb_at(b, COMMITTED_TCB),
            current: version_at(b, CURRENT_BUILD),
            committed: version_at(b, COMMITTED_BUILD),
            launch_tcb: tcb_at(b, LAUNCH_TCB),
            signature_r: field(b, SIGNATURE_R),
            signature_s: field(b, SIGNATURE_S),
            raw: b.to_vec(),
        })
    }

    /// The exact report bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The portion of the report covered by the signature
    pub fn signed_bytes(&self) -> &[u8] {
        &self.raw[..SIGNED_SIZE]
    }

    pub fn debug_allowed(&self) -> bool {
        self.policy & POLICY_DEBUG != 0
    }
}

/// Assemble raw report bytes from the fields that matter to collection and
/// verification.  Used to fabricate reports for tests and tooling.
#[derive(Clone, Debug)]
pub struct ReportBuilder {
    raw: Vec<u8>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        let mut raw = vec![0u8; REPORT_SIZE];
        raw[VERSION..VERSION + 4].copy_from_slice(&2u32.to_le_bytes());
        raw[SIGNATURE_ALGO..SIGNATURE_ALGO + 4]
            .copy_from_slice(&SIG_ALGO_ECDSA_P384_SHA384.to_le_bytes());

        Self { raw }
    }

    fn put(mut self, off: usize, v: &[u8]) -> Self {
        self.raw[off..off + v.len()].copy_from_slice(v);
        self
    }

    pub fn policy(self, v: u64) -> Self {
        self.put(POLICY, &v.to_le_bytes())
    }

    pub fn vmpl(self, v: u32) -> Self {
        self.put(VMPL, &v.to_le_bytes())
    }

    pub fn signature_algo(self, v: u32) -> Self {
        self.put(SIGNATURE_ALGO, &v.to_le_bytes())
    }

    pub fn report_data(self, v: &[u8; BINDING_CAPACITY]) -> Self {
        self.put(REPORT_DATA, v)
    }

    pub fn measurement(self, v: &[u8; 48]) -> Self {
        self.put(MEASUREMENT, v)
    }

    pub fn chip_id(self, v: &[u8; 64]) -> Self {
        self.put(CHIP_ID, v)
    }

    pub fn tcb(self, v: TcbVersion) -> Self {
        self.put(CURRENT_TCB, &v.to_bytes())
            .put(REPORTED_TCB, &v.to_bytes())
            .put(COMMITTED_TCB, &v.to_bytes())
            .put(LAUNCH_TCB, &v.to_bytes())
    }

    /// Set the signature components, given little-endian
    pub fn signature(self, r: &[u8; SIG_COMPONENT_SIZE], s: &[u8; SIG_COMPONENT_SIZE]) -> Self {
        self.put(SIGNATURE_R, r).put(SIGNATURE_S, s)
    }

    /// The bytes that a signature must cover
    pub fn signed_bytes(&self) -> &[u8] {
        &self.raw[..SIGNED_SIZE]
    }

    pub fn build(self) -> Vec<u8> {
        self.raw
    }
}
