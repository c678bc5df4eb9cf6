// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::{Evidence, EvidenceVerifier};
use crate::errors::Error;
use std::collections::HashMap;

/// Maps evidence type tags to the verifier that handles them.  Populate it
/// once at start-up and share it read-only.
#[derive(Default)]
pub struct VerifierRegistry {
    v: HashMap<String, Box<dyn EvidenceVerifier + Send + Sync>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self {
            v: Default::default(),
        }
    }

    /// Register `verifier` under its own type tag, replacing any previous
    /// verifier for that tag
    pub fn register(&mut self, verifier: Box<dyn EvidenceVerifier + Send + Sync>) {
        let kind = verifier.kind().to_string();

        if self.v.insert(kind.clone(), verifier).is_some() {
            tracing::warn!("replaced evidence verifier for type {kind}");
        }
    }

    pub fn lookup(&self, kind: &str) -> Option<&(dyn EvidenceVerifier + Send + Sync)> {
        self.v.get(kind).map(|b| b.as_ref())
    }

    /// Find the verifier for `evidence` and run it
    pub fn verify(&self, evidence: &Evidence, expected_binding: &[u8]) -> Result<(), Error> {
        let verifier = self
            .lookup(&evidence.kind)
            .ok_or_else(|| Error::UnsupportedEvidenceType(evidence.kind.clone()))?;

        verifier.verify_evidence(evidence, expected_binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Accept;

    impl EvidenceVerifier for Accept {
        fn kind(&self) -> &str {
            "test"
        }

        fn verify_evidence(&self, _: &Evidence, _: &[u8]) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn dispatch_by_kind() {
        let mut r = VerifierRegistry::new();
        r.register(Box::new(Accept));

        let e = Evidence::new("test", vec![]);
        assert!(r.verify(&e, &[]).is_ok());
    }

    #[test]
    fn unknown_kind_whatever_the_payload() {
        let mut r = VerifierRegistry::new();
        r.register(Box::new(Accept));

        for payload in [vec![], vec![0xff; 2000]] {
            let e = Evidence::new("tdx", payload);

            assert_eq!(
                r.verify(&e, &[]),
                Err(Error::UnsupportedEvidenceType("tdx".to_string()))
            );
        }
    }
}
