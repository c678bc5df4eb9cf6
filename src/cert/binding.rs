// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::extension::encode_claims;
use crate::claims::ClaimSet;
use crate::errors::Error;
use crate::evidence::{pad_binding, BINDING_CAPACITY};
use openssl::sha::Sha256;
use serde::{Deserialize, Serialize};

/// How the value placed in the hardware report is derived from the
/// certificate
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BindingMode {
    /// SHA-256 of the DER SubjectPublicKeyInfo
    #[default]
    PublicKeyHash,
    /// SHA-256 of the DER SubjectPublicKeyInfo followed by the CBOR encoded
    /// claims
    PublicKeyAndClaims,
}

impl BindingMode {
    /// Compute the binding value, zero padded to the report capacity
    pub fn compute(&self, spki: &[u8], claims: &ClaimSet) -> Result<[u8; BINDING_CAPACITY], Error> {
        let mut h = Sha256::new();

        h.update(spki);

        if *self == BindingMode::PublicKeyAndClaims {
            h.update(&encode_claims(claims)?);
        }

        pad_binding(&h.finish())
    }
}
