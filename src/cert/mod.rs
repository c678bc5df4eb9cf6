// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Self-signed X.509 certificates carrying TEE evidence and application
//! claims in a custom extension, and their verification.
//!
//! The evidence is bound to the certificate key: the hardware report carries
//! a digest of the subject public key (and, optionally, of the claims), so a
//! report lifted into a certificate for another key fails verification.

pub use self::binding::BindingMode;
pub use self::builder::{build_with_evidence, CertConfig, CertificateBuilder};
pub use self::extension::Extension;
pub use self::verifier::{extract, AttestedCertificate, CertificateVerifier};

pub mod binding;
mod builder;
pub mod extension;
mod verifier;

/// Private enterprise arc for the attestation extension
pub const DEFAULT_EXTENSION_OID: &str = "1.3.6.1.4.1.54392.5.1000";
