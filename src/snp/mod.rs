// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! AMD SEV-SNP backend.
//!
//! The attesting side asks the guest device for a report whose `report_data`
//! carries the binding value, then appends the VCEK chain that endorses the
//! chip.  The relying side walks that chain to a trusted ARK, checks that the
//! VCEK certifies the reporting chip and TCB, and verifies the report
//! signature.

pub use self::attester::SnpAttester;
pub use self::device::{GuestDevice, SevGuestDevice};
pub use self::endorsement::{DirectoryEndorsements, EndorsementProvider};
pub use self::report::{AttestationReport, TcbVersion};
pub use self::verifier::SnpVerifier;

pub mod attester;
pub mod device;
pub mod endorsement;
pub mod report;
pub mod verifier;

/// Evidence type tag for SEV-SNP
pub const EVIDENCE_TYPE: &str = "sev_snp";
