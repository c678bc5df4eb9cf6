// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! JSON configuration shared by the attesting and relying sides.  Every
//! field has a default, so an empty object is a valid configuration.

use crate::cert::CertConfig;
use crate::errors::Error;
use crate::snp::device::{DEFAULT_DEVICE, DEFAULT_VMPL};
use crate::snp::endorsement::DEFAULT_PRODUCT;
use crate::store::MemoTrustAnchorStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDORSEMENTS: &str = "/var/cache/amd-kds";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub attester: AttesterConfig,
    pub certificate: CertConfig,
    pub verifier: VerifierConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct AttesterConfig {
    /// SEV guest device node
    pub device: PathBuf,
    /// VM privilege level requested for reports
    pub vmpl: u32,
    /// Root of the local VCEK cache
    pub endorsements: PathBuf,
    /// Product line, e.g., "Milan" or "Genoa"
    pub product: String,
}

impl Default for AttesterConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.into(),
            vmpl: DEFAULT_VMPL,
            endorsements: DEFAULT_ENDORSEMENTS.into(),
            product: DEFAULT_PRODUCT.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct VerifierConfig {
    /// JSON file with the trusted ARKs
    pub trust_anchors: Option<PathBuf>,
    /// Accept guests whose policy allows debugging
    pub allow_debug: bool,
}

impl VerifierConfig {
    /// Load the trust anchor store named by `trust-anchors`
    pub fn trust_anchor_store(&self) -> Result<MemoTrustAnchorStore, Error> {
        let p = self
            .trust_anchors
            .as_ref()
            .ok_or_else(|| Error::Config("no trust anchor store configured".to_string()))?;

        let j = std::fs::read_to_string(p)
            .map_err(|e| Error::Config(format!("reading {}: {e}", p.display())))?;

        let mut tas = MemoTrustAnchorStore::new();
        tas.load_json(&j)?;

        Ok(tas)
    }
}

impl Config {
    pub fn parse(j: &str) -> Result<Self, Error> {
        serde_json::from_str(j).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let j = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;

        Self::parse(&j)
    }
}
