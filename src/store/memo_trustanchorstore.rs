// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::trustanchor::TrustAnchor;
use super::ITrustAnchorStore;
use multimap::MultiMap;
use std::sync::RwLock;

/// The store where the trusted ARKs are stashed.  ARKs are indexed by their
/// subject name; several keys may share a name across rollovers.
#[derive(Debug)]
pub struct MemoTrustAnchorStore {
    p: RwLock<MultiMap<Vec<u8>, TrustAnchor>>,
}

impl Default for MemoTrustAnchorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoTrustAnchorStore {
    /// Returns a new empty TrustAnchorStore
    pub fn new() -> Self {
        Self {
            p: Default::default(),
        }
    }

    /// Add to an existing (and possibly empty) TrustAnchorStore the trust
    /// anchors loaded from the given JSON file
    pub fn load_json(&mut self, j: &str) -> Result<(), Error> {
        let mut tas: Vec<TrustAnchor> =
            serde_json::from_str(j).map_err(|e| Error::Malformed(e.to_string()))?;

        for ta in tas.iter_mut() {
            ta.parse_ark()?;
        }

        for ta in tas {
            self.add(ta);
        }

        Ok(())
    }

    pub fn add(&mut self, ta: TrustAnchor) {
        tracing::debug!("adding trust anchor for {}", ta.product);

        self.p
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ta.subject.clone(), ta);
    }
}

impl ITrustAnchorStore for MemoTrustAnchorStore {
    fn lookup(&self, subject: &[u8]) -> Option<Vec<TrustAnchor>> {
        let p = self.p.read().unwrap_or_else(|e| e.into_inner());

        p.get_vec(subject).cloned()
    }
}
