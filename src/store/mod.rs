// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

pub use self::errors::Error;
pub use self::itrustanchorstore::ITrustAnchorStore;
pub use self::memo_trustanchorstore::MemoTrustAnchorStore;
pub use self::trustanchor::TrustAnchor;

mod errors;
mod itrustanchorstore;
mod memo_trustanchorstore;
mod trustanchor;
