// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::claims::ClaimMismatch;

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Report request failed with firmware status {0:#x}")]
    RequestFailed(u32),
    #[error("Report size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("Endorsement fetch failed: {0}")]
    CertFetch(String),
    #[error("Certificate generation failed: {0}")]
    CertGen(#[source] Box<Error>),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Report data does not match the certificate binding")]
    HashMismatch,
    #[error("Unsupported evidence type: {0}")]
    UnsupportedEvidenceType(String),
    #[error("Invalid evidence: {0}")]
    EvidenceInvalid(String),
    #[error("Claims rejected by policy: {}", display_mismatches(.0))]
    PolicyReject(Vec<ClaimMismatch>),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

fn display_mismatches(m: &[ClaimMismatch]) -> String {
    m.iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::CertGen(e) => write!(f, "certificate generation: {:?}", e),
            e => write!(f, "{}", e),
        }
    }
}

impl From<crate::store::Error> for Error {
    fn from(e: crate::store::Error) -> Self {
        Error::Config(e.to_string())
    }
}
