// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The attestation extension payload:
//!
//! ```text
//! extension = {
//!   1 => tstr,                ; evidence type
//!   2 => bstr,                ; evidence payload
//!   3 => [ * [ tstr, bstr ] ] ; claims, names unique
//! }
//! ```

use crate::claims::{Claim, ClaimSet};
use crate::errors::Error;
use crate::evidence::Evidence;
use bitmask::*;
use ciborium::de::from_reader;
use ciborium::ser::into_writer;
use ciborium::Value;
use std::io::Cursor;

const TYPE_LABEL: i128 = 1;
const PAYLOAD_LABEL: i128 = 2;
const CLAIMS_LABEL: i128 = 3;

bitmask! {
    #[derive(Debug)]
    mask FieldSet: u8 where flags Field {
        Type    = 0x01,
        Payload = 0x02,
        Claims  = 0x04,
    }
}

/// Decoded contents of the attestation extension
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extension {
    pub evidence: Evidence,
    pub claims: ClaimSet,
}

fn label(l: i128) -> Value {
    // labels are small positive integers
    Value::Integer((l as u8).into())
}

fn claims_value(claims: &ClaimSet) -> Value {
    Value::Array(
        claims
            .iter()
            .map(|c| {
                Value::Array(vec![
                    Value::Text(c.name.clone()),
                    Value::Bytes(c.value.clone()),
                ])
            })
            .collect(),
    )
}

fn to_cbor(v: &Value) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();

    into_writer(v, &mut buf).map_err(|e| Error::Serialization(e.to_string()))?;

    Ok(buf)
}

/// CBOR encoding of the claims alone, as used by claim-covering bindings
pub fn encode_claims(claims: &ClaimSet) -> Result<Vec<u8>, Error> {
    to_cbor(&claims_value(claims))
}

pub fn encode(evidence: &Evidence, claims: &ClaimSet) -> Result<Vec<u8>, Error> {
    let v = Value::Map(vec![
        (label(TYPE_LABEL), Value::Text(evidence.kind.clone())),
        (label(PAYLOAD_LABEL), Value::Bytes(evidence.payload.clone())),
        (label(CLAIMS_LABEL), claims_value(claims)),
    ]);

    to_cbor(&v)
}

/// Decode an extension payload.  The input must hold exactly one map with
/// each of the three fields exactly once and nothing else.
pub fn decode(b: &[u8]) -> Result<Extension, Error> {
    let mut cur = Cursor::new(b);

    let v: Value = from_reader(&mut cur).map_err(|e| Error::Parse(e.to_string()))?;

    if cur.position() as usize != b.len() {
        return Err(Error::Parse(format!(
            "{} trailing bytes after the extension",
            b.len() - cur.position() as usize
        )));
    }

    let contents = match v {
        Value::Map(m) => m,
        _ => return Err(Error::Parse("expecting map type".to_string())),
    };

    let mut found = FieldSet::none();
    let mut kind = String::new();
    let mut payload = Vec::new();
    let mut claims = ClaimSet::new();

    for (k, v) in contents {
        let l: i128 = match k {
            Value::Integer(i) => i.into(),
            k => return Err(Error::Parse(format!("unexpected key {k:?}"))),
        };

        let f = match l {
            TYPE_LABEL => Field::Type,
            PAYLOAD_LABEL => Field::Payload,
            CLAIMS_LABEL => Field::Claims,
            _ => return Err(Error::Parse(format!("unknown key {l}"))),
        };

        if found.contains(f) {
            return Err(Error::Parse(format!("duplicated key {l}")));
        }

        match f {
            Field::Type => {
                kind = v
                    .into_text()
                    .map_err(|_| Error::Parse("evidence type MUST be tstr".to_string()))?
            }
            Field::Payload => {
                payload = v
                    .into_bytes()
                    .map_err(|_| Error::Parse("evidence payload MUST be bstr".to_string()))?
            }
            Field::Claims => claims = decode_claims(v)?,
        }

        found.set(f);
    }

    let mandatory = [
        (Field::Type, "evidence type"),
        (Field::Payload, "evidence payload"),
        (Field::Claims, "claims"),
    ];

    for (f, n) in mandatory.iter() {
        if !found.contains(*f) {
            return Err(Error::Parse(format!("missing {n}")));
        }
    }

    Ok(Extension {
        evidence: Evidence { kind, payload },
        claims,
    })
}

fn decode_claims(v: Value) -> Result<ClaimSet, Error> {
    let items = v
        .into_array()
        .map_err(|_| Error::Parse("claims MUST be an array".to_string()))?;

    let mut claims = ClaimSet::new();

    for item in items {
        let pair = item
            .into_array()
            .map_err(|_| Error::Parse("claim MUST be a [name, value] array".to_string()))?;

        let (name, value) = match <[Value; 2]>::try_from(pair) {
            Ok([Value::Text(n), Value::Bytes(v)]) => (n, v),
            _ => {
                return Err(Error::Parse(
                    "claim MUST be a [tstr, bstr] array".to_string(),
                ))
            }
        };

        if claims.get(&name).is_some() {
            return Err(Error::Parse(format!("duplicated claim '{name}'")));
        }

        claims.push(Claim { name, value })?;
    }

    Ok(claims)
}
