// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Application-level claims carried next to the evidence in an attested
//! certificate, and the reference policy used to check them.

use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, opaque byte value
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub name: String,

    /// The claim value.  Binary values are allowed, including empty ones.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub value: Vec<u8>,
}

impl Claim {
    pub fn new(name: &str, value: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_vec(),
        }
    }
}

/// An ordered sequence of claims with unique names
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClaimSet(Vec<Claim>);

impl ClaimSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a claim, refusing a name that is already in the set
    pub fn push(&mut self, claim: Claim) -> Result<(), Error> {
        if self.get(&claim.name).is_some() {
            return Err(Error::PreconditionViolation(format!(
                "duplicated claim name '{}'",
                claim.name
            )));
        }

        self.0.push(claim);

        Ok(())
    }

    /// Exact, case-sensitive lookup by name
    pub fn get(&self, name: &str) -> Option<&Claim> {
        self.0.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Claim> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a JSON array of `{"name": .., "value": <hex>}` objects
    pub fn from_json(j: &str) -> Result<Self, Error> {
        let v: Vec<Claim> = serde_json::from_str(j).map_err(|e| Error::Parse(e.to_string()))?;

        Self::try_from(v)
    }
}

impl TryFrom<Vec<Claim>> for ClaimSet {
    type Error = Error;

    fn try_from(v: Vec<Claim>) -> Result<Self, Error> {
        let mut s = ClaimSet::new();

        for c in v {
            s.push(c)?;
        }

        Ok(s)
    }
}

impl<'a> IntoIterator for &'a ClaimSet {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Renders a claim value quoted when printable, hex otherwise
pub struct DisplayValue<'a>(pub &'a [u8]);

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(f, "'{}'", String::from_utf8_lossy(self.0))
        } else {
            write!(f, "(hex){}", hex::encode_upper(self.0))
        }
    }
}

/// One way in which a received claim set fails to meet an expectation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimMismatch {
    Missing {
        name: String,
    },
    Length {
        name: String,
        expected: usize,
        got: usize,
    },
    Value {
        name: String,
        expected: Vec<u8>,
        got: Vec<u8>,
    },
}

impl ClaimMismatch {
    pub fn name(&self) -> &str {
        match self {
            ClaimMismatch::Missing { name }
            | ClaimMismatch::Length { name, .. }
            | ClaimMismatch::Value { name, .. } => name,
        }
    }
}

impl fmt::Display for ClaimMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimMismatch::Missing { name } => write!(f, "'{name}' not found"),
            ClaimMismatch::Length {
                name,
                expected,
                got,
            } => write!(
                f,
                "'{name}' expected value_size: {expected} got: {got}"
            ),
            ClaimMismatch::Value {
                name,
                expected,
                got,
            } => write!(
                f,
                "'{name}' expected value: {} got: {}",
                DisplayValue(expected),
                DisplayValue(got)
            ),
        }
    }
}

/// Reference claims policy: every expected claim must be present in
/// `received` with the same length and the same bytes.  The whole expected
/// set is scanned and each mismatch is reported.
pub fn match_claims(received: &ClaimSet, expected: &ClaimSet) -> Result<(), Vec<ClaimMismatch>> {
    let mut mismatches = Vec::new();

    for want in expected {
        let m = match received.get(&want.name) {
            None => ClaimMismatch::Missing {
                name: want.name.clone(),
            },
            Some(got) if got.value.len() != want.value.len() => ClaimMismatch::Length {
                name: want.name.clone(),
                expected: want.value.len(),
                got: got.value.len(),
            },
            Some(got) if got.value != want.value => ClaimMismatch::Value {
                name: want.name.clone(),
                expected: want.value.clone(),
                got: got.value.clone(),
            },
            Some(_) => continue,
        };

        tracing::warn!("different claim detected -> {m}");

        mismatches.push(m);
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(mismatches)
    }
}
