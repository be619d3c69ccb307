// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! URL splitting.

Repository URLs are never normalized: dependency resolution joins and
compares them as plain strings, so splitting must be able to reproduce its
input exactly. That rules out full URL parsers, which canonicalize.
*/

use crate::error::{MaterializeError, Result};

/// Split a URL into `(scheme, host, path)`.
///
/// The scheme includes the `://` separator and is empty if the URL has none.
/// The host ends at the first `/` after the scheme. The path is the
/// remainder, including its leading `/`, or empty if there is none.
///
/// Concatenating the three parts reproduces the input.
pub fn split_url(url: &str) -> (&str, &str, &str) {
    let (scheme, rest) = match url.find("://") {
        Some(pos) => url.split_at(pos + "://".len()),
        None => ("", url),
    };

    let (host, path) = match rest.find('/') {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };

    (scheme, host, path)
}

/// The final path segment of a URL.
///
/// Used to name downloaded files after the artifact they hold.
pub fn file_name(url: &str) -> Result<&str> {
    let (_, _, path) = split_url(url);

    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(MaterializeError::UrlNoFileName(url.to_string())),
    }
}
