// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Backend-neutral evidence type and the contracts that TEE backends
//! implement to produce and check it.
//!
//! A backend supplies an [`EvidenceCollector`] on the attesting side and an
//! [`EvidenceVerifier`] on the relying side.  Verifiers are looked up by the
//! evidence type tag through a [`VerifierRegistry`].

pub use self::registry::VerifierRegistry;

pub mod base64;
mod registry;

use crate::errors::Error;
use serde::{Deserialize, Serialize};

/// Capacity of the binding value carried in a hardware report
pub const BINDING_CAPACITY: usize = 64;

/// A backend-tagged binary bundle asserting a TEE's identity and state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Selects the verifier that understands `payload`
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(with = "self::base64")]
    pub payload: Vec<u8>,
}

impl Evidence {
    pub fn new(kind: &str, payload: Vec<u8>) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
        }
    }
}

/// Attesting side of a TEE backend
pub trait EvidenceCollector {
    /// Produce evidence whose hardware report carries `binding`, zero padded
    /// to [`BINDING_CAPACITY`]
    fn collect(&self, binding: &[u8]) -> Result<Evidence, Error>;
}

/// Relying side of a TEE backend
pub trait EvidenceVerifier {
    /// The evidence type tag this verifier accepts
    fn kind(&self) -> &str;

    /// Check that `evidence` carries exactly `expected_binding` (zero padded)
    /// and that it is genuine.  Binding failures are reported as
    /// [`Error::HashMismatch`] before any other check runs.
    fn verify_evidence(&self, evidence: &Evidence, expected_binding: &[u8]) -> Result<(), Error>;
}

/// Zero-pad `v` to the binding capacity
pub fn pad_binding(v: &[u8]) -> Result<[u8; BINDING_CAPACITY], Error> {
    if v.len() > BINDING_CAPACITY {
        return Err(Error::PreconditionViolation(format!(
            "binding value is {} bytes, capacity is {}",
            v.len(),
            BINDING_CAPACITY
        )));
    }

    let mut out = [0u8; BINDING_CAPACITY];
    out[..v.len()].copy_from_slice(v);

    Ok(out)
}
