// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! AMD SEV-SNP evidence collection and attested X.509 certificates.
//!
//! The crate covers both sides of a remote attestation exchange built on
//! TLS-style certificates:
//!
//! * On the attesting side, it obtains a signed hardware report from the
//!   SEV guest device, bundles it with the VCEK certificate chain, and embeds
//!   the resulting evidence, together with application claims, in a
//!   self-signed certificate.  The report carries a digest of the
//!   certificate public key, binding the two.
//! * On the relying side, it checks the binding, the report and its
//!   endorsement chain against trusted AMD root keys, and finally hands the
//!   claims to a caller-supplied policy.
//!
//! Evidence verifiers are selected by evidence type through an explicit
//! [`evidence::VerifierRegistry`]; SEV-SNP is the only backend provided.

pub use self::errors::Error;

pub mod cert;
pub mod claims;
pub mod config;
pub mod evidence;
pub mod snp;
pub mod store;

mod errors;

#[cfg(test)]
mod testutil;
