// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Extraction destinations.

A destination is either a single directory receiving a package's whole file
tree, or an ordered list of prefix mappings that routes subtrees to distinct
directories. The mapped form makes it possible to, say, split a library
package's `usr/lib` and `usr/include` payloads into separate install roots.
*/

use std::path::{Path, PathBuf};

/// One prefix mapping of a routed destination.
#[derive(Clone, Debug)]
pub struct PathMapping {
    /// Archive path prefix this mapping claims. Matching is an exact,
    /// slash-sensitive string prefix test against entry paths as stored in
    /// the archive (typically `./usr/...`).
    pub prefix: String,

    /// Directory receiving entries under the prefix, with the prefix
    /// stripped.
    pub directory: PathBuf,
}

impl PathMapping {
    pub fn new(prefix: impl ToString, directory: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.to_string(),
            directory: directory.into(),
        }
    }
}

/// Where extracted package files land.
#[derive(Clone, Debug)]
pub enum DestinationSpec {
    /// Every entry is written under one directory, preserving its
    /// archive-relative path.
    Directory(PathBuf),

    /// Entries are routed by the first mapping whose prefix matches;
    /// entries matching no mapping are skipped.
    Mapped(Vec<PathMapping>),
}

impl DestinationSpec {
    /// Resolve the filesystem path an archive entry should be written to.
    ///
    /// `None` means the entry is not wanted by this destination.
    pub fn route(&self, entry_path: &str) -> Option<PathBuf> {
        match self {
            Self::Directory(directory) => {
                Some(directory.join(entry_path.trim_start_matches('/')))
            }
            Self::Mapped(mappings) => mappings.iter().find_map(|mapping| {
                entry_path
                    .strip_prefix(&mapping.prefix)
                    .map(|rest| mapping.directory.join(rest.trim_start_matches('/')))
            }),
        }
    }
}

impl From<PathBuf> for DestinationSpec {
    fn from(directory: PathBuf) -> Self {
        Self::Directory(directory)
    }
}

impl From<&Path> for DestinationSpec {
    fn from(directory: &Path) -> Self {
        Self::Directory(directory.to_path_buf())
    }
}

impl From<&str> for DestinationSpec {
    fn from(directory: &str) -> Self {
        Self::Directory(PathBuf::from(directory))
    }
}

impl From<Vec<PathMapping>> for DestinationSpec {
    fn from(mappings: Vec<PathMapping>) -> Self {
        Self::Mapped(mappings)
    }
}
