// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::device::{request_report, GuestDevice, SevGuestDevice, DEFAULT_VMPL};
use super::endorsement::{DirectoryEndorsements, EndorsementProvider};
use super::EVIDENCE_TYPE;
use crate::config::AttesterConfig;
use crate::errors::Error;
use crate::evidence::{Evidence, EvidenceCollector};

/// Collects SEV-SNP evidence: a fresh report from the guest device followed
/// by the VCEK chain endorsing the reporting chip.
pub struct SnpAttester<D, P> {
    device: D,
    endorsements: P,
    vmpl: u32,
}

impl<D: GuestDevice, P: EndorsementProvider> SnpAttester<D, P> {
    pub fn new(device: D, endorsements: P) -> Self {
        Self {
            device,
            endorsements,
            vmpl: DEFAULT_VMPL,
        }
    }

    /// Request reports at the given VM privilege level
    pub fn vmpl(mut self, vmpl: u32) -> Self {
        self.vmpl = vmpl;
        self
    }
}

impl SnpAttester<SevGuestDevice, DirectoryEndorsements> {
    pub fn from_config(c: &AttesterConfig) -> Self {
        Self::new(
            SevGuestDevice::new(&c.device),
            DirectoryEndorsements::new(&c.endorsements, &c.product),
        )
        .vmpl(c.vmpl)
    }
}

impl<D: GuestDevice, P: EndorsementProvider> EvidenceCollector for SnpAttester<D, P> {
    fn collect(&self, binding: &[u8]) -> Result<Evidence, Error> {
        let report = request_report(&self.device, binding, self.vmpl)?;

        tracing::debug!(
            "got report v{} from chip {}.. at {}",
            report.version,
            hex::encode(&report.chip_id[..8]),
            report.reported_tcb
        );

        let chain = self
            .endorsements
            .fetch_chain(&report.chip_id, &report.reported_tcb)
            .map_err(|e| match e {
                Error::CertFetch(_) => e,
                e => Error::CertFetch(e.to_string()),
            })?;

        if chain.is_empty() {
            return Err(Error::CertFetch("empty endorsement chain".to_string()));
        }

        let mut payload = report.as_bytes().to_vec();
        payload.extend_from_slice(&chain);

        Ok(Evidence::new(EVIDENCE_TYPE, payload))
    }
}
