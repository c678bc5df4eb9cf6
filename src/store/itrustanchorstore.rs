// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::trustanchor::TrustAnchor;

/// Interface to the store where the trusted AMD root keys are stashed.
pub trait ITrustAnchorStore {
    /// Lookup all trust anchors whose subject matches the given DER-encoded
    /// name, i.e., the candidates for having issued a certificate with that
    /// issuer
    fn lookup(&self, subject: &[u8]) -> Option<Vec<TrustAnchor>>;
}
