// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("HTTP error: {0:?}")]
    Http(#[from] reqwest::Error),

    #[error("fetch of {url} failed after {attempts} attempts: {source}")]
    FetchFailed {
        url: String,
        attempts: usize,
        #[source]
        source: Box<MaterializeError>,
    },

    #[error("URL has no file name component: {0}")]
    UrlNoFileName(String),

    #[error("package {0} does not exist in any configured repository")]
    UnknownPackage(String),

    #[error("package archive declares unsupported format version: {0:?}")]
    FormatVersion(String),

    #[error("member not found in package archive: {0}")]
    MissingMember(String),

    #[error("unknown compression in stream; leading bytes: {0:?}")]
    UnknownCompression(Vec<u8>),

    #[error("unsupported tar entry type for {0}")]
    UnsupportedTarEntry(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, MaterializeError>;
