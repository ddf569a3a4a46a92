// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Core error type. Every fallible operation in this crate returns
/// `Result<T, Error>` rather than panicking.
#[derive(Debug, Error)]
pub enum Error {
    #[error("normalization output buffer overflowed")]
    NormalizationOverflow,

    #[error("normalized title length {len} out of range [{min}, {max}]")]
    TitleLengthOutOfRange { len: usize, min: usize, max: usize },

    #[error("normalized name length {len} below minimum {min}")]
    NameTooShort { len: usize, min: usize },

    #[error("row {row} reached ROW_SLOTS_MAX")]
    RowFull { row: u32 },

    #[error("row {row} reached MAX_SLOTS_PER_TITLE for hash32={hash32:#010x}")]
    TitleSlotsExhausted { row: u32, hash32: u32 },

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
