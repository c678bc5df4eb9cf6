// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Endorsement chain sources.  A chain is the VCEK for a given chip and TCB,
//! followed by the ASK and (optionally) the ARK, as concatenated DER.

use super::report::TcbVersion;
use crate::errors::Error;
use openssl::x509::X509;
use std::fs;
use std::path::{Path, PathBuf};
use x509_parser::prelude::*;

pub const DEFAULT_PRODUCT: &str = "Milan";

/// Where the VCEK chain for a chip/TCB pair comes from
pub trait EndorsementProvider {
    fn fetch_chain(&self, chip_id: &[u8; 64], tcb: &TcbVersion) -> Result<Vec<u8>, Error>;
}

impl<F> EndorsementProvider for F
where
    F: Fn(&[u8; 64], &TcbVersion) -> Result<Vec<u8>, Error>,
{
    fn fetch_chain(&self, chip_id: &[u8; 64], tcb: &TcbVersion) -> Result<Vec<u8>, Error> {
        self(chip_id, tcb)
    }
}

/// A local cache laid out after the AMD Key Distribution Service:
///
/// ```text
/// <root>/<product>/cert_chain.pem               ASK then ARK
/// <root>/<product>/<chip-id hex>/<tcb hex>.der  VCEK
/// ```
#[derive(Clone, Debug)]
pub struct DirectoryEndorsements {
    root: PathBuf,
    product: String,
}

impl DirectoryEndorsements {
    pub fn new(root: impl Into<PathBuf>, product: &str) -> Self {
        Self {
            root: root.into(),
            product: product.to_string(),
        }
    }

    pub fn vcek_path(&self, chip_id: &[u8; 64], tcb: &TcbVersion) -> PathBuf {
        self.root
            .join(&self.product)
            .join(hex::encode(chip_id))
            .join(format!("{:016x}.der", tcb.raw()))
    }

    pub fn cert_chain_path(&self) -> PathBuf {
        self.root.join(&self.product).join("cert_chain.pem")
    }
}

fn read(p: &Path) -> Result<Vec<u8>, Error> {
    fs::read(p).map_err(|e| Error::CertFetch(format!("reading {}: {e}", p.display())))
}

impl EndorsementProvider for DirectoryEndorsements {
    fn fetch_chain(&self, chip_id: &[u8; 64], tcb: &TcbVersion) -> Result<Vec<u8>, Error> {
        let vcek = read(&self.vcek_path(chip_id, tcb))?;

        X509::from_der(&vcek).map_err(|e| Error::CertFetch(format!("malformed VCEK: {e}")))?;

        let pem = read(&self.cert_chain_path())?;

        let ca = X509::stack_from_pem(&pem)
            .map_err(|e| Error::CertFetch(format!("malformed cert_chain.pem: {e}")))?;

        if ca.is_empty() {
            return Err(Error::CertFetch("cert_chain.pem holds no certificate".to_string()));
        }

        let mut chain = vcek;

        for c in ca.iter() {
            let der = c
                .to_der()
                .map_err(|e| Error::CertFetch(format!("re-encoding CA certificate: {e}")))?;
            chain.extend_from_slice(&der);
        }

        tracing::debug!(
            "fetched VCEK chain for chip {}.. at {tcb}, {} bytes",
            hex::encode(&chip_id[..8]),
            chain.len()
        );

        Ok(chain)
    }
}

/// Split concatenated DER certificates
pub fn split_chain(mut b: &[u8]) -> Result<Vec<&[u8]>, String> {
    let mut certs = Vec::new();

    while !b.is_empty() {
        let (rest, _) =
            parse_x509_certificate(b).map_err(|e| format!("certificate #{}: {e}", certs.len()))?;

        let (der, tail) = b.split_at(b.len() - rest.len());
        certs.push(der);
        b = tail;
    }

    Ok(certs)
}
