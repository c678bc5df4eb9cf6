// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

/// An AMD Root Key (ARK) trusted to anchor VCEK chains, together with the
/// product line it belongs to
#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct TrustAnchor {
    /// The product line, e.g., "Milan" or "Genoa"
    pub product: String,

    /// The self-signed ARK certificate, serialised using the textual encoding
    /// described in §5 of RFC7468
    #[serde(rename = "ark")]
    raw_ark: String,

    /// DER encoding of the ARK, populated by [`TrustAnchor::parse_ark`]
    #[serde(skip)]
    pub ark: Vec<u8>,

    /// DER encoding of the ARK subject name
    #[serde(skip)]
    pub subject: Vec<u8>,
}

impl TrustAnchor {
    pub fn from_pem(product: &str, pem: &str) -> Result<Self, Error> {
        let mut ta = Self {
            product: product.to_string(),
            raw_ark: pem.to_string(),
            ark: Default::default(),
            subject: Default::default(),
        };

        ta.parse_ark()?;

        Ok(ta)
    }

    /// Decode the PEM ARK and check that it is self-signed
    pub fn parse_ark(&mut self) -> Result<(), Error> {
        let x = X509::from_pem(self.raw_ark.as_bytes())
            .map_err(|e| Error::Malformed(format!("ARK for {}: {e}", self.product)))?;

        let pkey = x
            .public_key()
            .map_err(|e| Error::Malformed(format!("ARK public key for {}: {e}", self.product)))?;

        let self_signed = x
            .verify(&pkey)
            .map_err(|e| Error::Malformed(format!("ARK signature for {}: {e}", self.product)))?;

        if !self_signed {
            return Err(Error::NotSelfSigned(self.product.clone()));
        }

        let der = x
            .to_der()
            .map_err(|e| Error::Malformed(format!("ARK for {}: {e}", self.product)))?;

        let (_, cert) = parse_x509_certificate(&der)
            .map_err(|e| Error::Malformed(format!("ARK for {}: {e}", self.product)))?;

        self.subject = cert.subject().as_raw().to_vec();
        self.ark = der;

        Ok(())
    }
}
