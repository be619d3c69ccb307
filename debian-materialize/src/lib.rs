// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Materialize Debian packages from APT repositories.

This crate resolves Debian-format binary packages from APT-style
repositories and unpacks them into destination directory trees. It does
not use the host's package manager: there is no dpkg database, no
privileged operation, and no maintainer script execution. "Installed" is
an in-memory, per-run notion.

# A Tour of Functionality

[installer::Installer] is the entry point. Construct one from APT source
lines (`deb <url> <suite> <component>...`), then call
[installer::Installer::install] with whitespace-separated package names
and a destination. Indices are fetched and parsed concurrently into a
provider map covering real, virtual (`Provides`) and source names;
dependency closures are walked by a pool of workers that de-duplicate on
artifact URL.

A destination is a single directory or a list of prefix mappings routing
subtrees to distinct directories; see [destination::DestinationSpec].

The supporting modules stand alone: [deb::DebArchive] reads the
`ar → tar+{xz,gz}` container format of a `.deb`,
[tar_extract::TarExtractor] unpacks tar payloads through a destination,
[decompress::Decompressor] sniffs xz vs gzip, [packages_index] parses
`Packages` indices, and [fetch::RepositoryFetcher] is the transport seam
(implement it to fetch from somewhere other than HTTP).

```no_run
use debian_materialize::installer::Installer;

# async fn example() -> debian_materialize::error::Result<()> {
let installer = Installer::new([
    "deb http://archive.ubuntu.com/ubuntu jammy main universe",
])?;

installer.install("qtbase5-dev qt5-qmake", "./sysroot").await?;
# Ok(())
# }
```

# Security

Repository `Release`/`InRelease` signatures are **not** verified, and
downloaded content is **not** checksummed against index digests. Only use
repositories and transports you trust.
*/

pub mod control;
pub mod deb;
pub mod decompress;
pub mod destination;
pub mod error;
pub mod fetch;
pub mod installer;
pub mod packages_index;
pub mod pool;
pub mod source;
pub mod tar_extract;
pub mod urlsplit;
