// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that propagate to the caller.
///
/// Absent customers/invoices are not errors: per-entity operations no-op with
/// a typed outcome, read APIs return `Option`/empty. Validation and
/// credit-limit rejections are structured results, never `Err`. A failed
/// store query is always `Err(Storage)` so callers can tell it apart from a
/// legitimately empty result set.
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine platform-specific data dir")]
    DataDir,

    #[error("corrupt {what}: {detail}")]
    Corrupt {
        what: &'static str,
        detail: String,
    },
}

impl Error {
    pub fn corrupt(what: &'static str, detail: impl Into<String>) -> Self {
        Error::Corrupt {
            what,
            detail: detail.into(),
        }
    }
}
