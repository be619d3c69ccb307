// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Tar payload extraction with destination routing.

`.deb` payloads are POSIX tar streams whose entry paths are `./`-rooted.
[TarExtractor] walks a stream once, routes each entry through a
[DestinationSpec], and materializes files, directories and links. Entries
the destination does not claim are skipped, as are metadata pseudo-entries.
*/

use {
    crate::{
        destination::DestinationSpec,
        error::{MaterializeError, Result},
    },
    std::{
        fs,
        io::Read,
        path::Path,
    },
    tar::EntryType,
};

/// Streaming extractor for one tar payload.
pub struct TarExtractor<R: Read> {
    archive: tar::Archive<R>,
    strict: bool,
    links_as_copies: bool,
}

impl<R: Read> TarExtractor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            archive: tar::Archive::new(reader),
            strict: false,
            links_as_copies: false,
        }
    }

    /// Whether unsupported entry types abort extraction instead of being
    /// skipped.
    pub fn set_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Whether link entries are materialized as copies of their targets
    /// instead of real links.
    pub fn set_links_as_copies(mut self, links_as_copies: bool) -> Self {
        self.links_as_copies = links_as_copies;
        self
    }

    /// Extract every entry the destination claims.
    pub fn extract_all(&mut self, destination: &DestinationSpec) -> Result<()> {
        let strict = self.strict;
        let links_as_copies = self.links_as_copies;

        for entry in self.archive.entries()? {
            let mut entry = entry?;
            let entry_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

            if entry_path.split('/').any(|segment| segment == "..") {
                log::warn!("skipping tar entry escaping destination: {}", entry_path);
                continue;
            }

            extract_entry(
                &mut entry,
                &entry_path,
                destination,
                strict,
                links_as_copies,
            )?;
        }

        Ok(())
    }
}

/// Read one member of a tar stream into memory.
///
/// Member names match with any leading `./` stripped.
pub fn tar_member_bytes<R: Read>(reader: R, name: &str) -> Result<Vec<u8>> {
    let wanted = name.trim_start_matches("./");
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if path.trim_start_matches("./") == wanted && entry.header().entry_type().is_file() {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return Ok(data);
        }
    }

    Err(MaterializeError::MissingMember(name.to_string()))
}

fn extract_entry<R: Read>(
    entry: &mut tar::Entry<R>,
    entry_path: &str,
    destination: &DestinationSpec,
    strict: bool,
    links_as_copies: bool,
) -> Result<()> {
    let entry_type = entry.header().entry_type();

    match entry_type {
        // Metadata pseudo-entries; path resolution already consumed them.
        EntryType::XHeader
        | EntryType::XGlobalHeader
        | EntryType::GNULongName
        | EntryType::GNULongLink => return Ok(()),
        _ => {}
    }

    let target = match destination.route(entry_path) {
        Some(target) => target,
        None => return Ok(()),
    };

    match entry_type {
        EntryType::Directory => {
            fs::create_dir_all(&target).map_err(|e| io_path(&target, e))?;
        }
        EntryType::Regular => {
            ensure_parent(&target)?;
            entry.unpack(&target).map_err(|e| io_path(&target, e))?;
        }
        EntryType::Symlink => {
            let link = match link_name(entry) {
                Some(link) => link,
                None => return Ok(()),
            };
            ensure_parent(&target)?;

            if links_as_copies {
                if let Some(source_path) = resolve_relative(entry_path, &link) {
                    copy_routed(destination, &source_path, &target)?;
                }
            } else {
                remove_existing(&target)?;
                make_symlink(Path::new(&link), &target)?;
            }
        }
        EntryType::Link => {
            let link = match link_name(entry) {
                Some(link) => link,
                None => return Ok(()),
            };
            ensure_parent(&target)?;

            let source_path = archive_rooted(&link);
            if links_as_copies {
                copy_routed(destination, &source_path, &target)?;
            } else if let Some(source) = destination.route(&source_path) {
                if source.exists() {
                    remove_existing(&target)?;
                    fs::hard_link(&source, &target).map_err(|e| io_path(&target, e))?;
                } else {
                    log::debug!("skipping dangling hardlink {} -> {}", entry_path, link);
                }
            }
        }
        other => {
            if strict {
                return Err(MaterializeError::UnsupportedTarEntry(format!(
                    "{} ({:?})",
                    entry_path, other
                )));
            }
            log::debug!("skipping unsupported tar entry {} ({:?})", entry_path, other);
        }
    }

    Ok(())
}

fn link_name<R: Read>(entry: &tar::Entry<R>) -> Option<String> {
    entry
        .link_name_bytes()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Map a link target, as stored in the archive, to the `./`-rooted form
/// entry paths use, so it can be routed through the destination.
fn archive_rooted(link: &str) -> String {
    if let Some(rest) = link.strip_prefix('/') {
        format!("./{}", rest)
    } else if link.starts_with("./") {
        link.to_string()
    } else {
        format!("./{}", link)
    }
}

/// Resolve a link target relative to the linking entry's directory into a
/// `./`-rooted archive path. `None` if the target walks out of the archive
/// root.
fn resolve_relative(entry_path: &str, link: &str) -> Option<String> {
    if link.starts_with('/') {
        return Some(archive_rooted(link));
    }

    let mut segments: Vec<&str> = entry_path.split('/').collect();
    segments.pop();

    for segment in link.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            segment => segments.push(segment),
        }
    }

    Some(segments.join("/"))
}

fn copy_routed(destination: &DestinationSpec, source_path: &str, target: &Path) -> Result<()> {
    let source = match destination.route(source_path) {
        Some(source) => source,
        None => return Ok(()),
    };

    if source.exists() {
        remove_existing(target)?;
        fs::copy(&source, target).map_err(|e| io_path(target, e))?;
    } else {
        log::debug!("skipping dangling link copy from {}", source_path);
    }

    Ok(())
}

fn ensure_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| io_path(parent, e))?;
    }

    Ok(())
}

fn remove_existing(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(_) => fs::remove_file(target).map_err(|e| io_path(target, e)),
        Err(_) => Ok(()),
    }
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target).map_err(|e| io_path(target, e))
}

#[cfg(not(unix))]
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    log::warn!(
        "symlinks unsupported on this platform; skipping {} -> {}",
        target.display(),
        link.display()
    );
    Ok(())
}

fn io_path(path: &Path, error: std::io::Error) -> MaterializeError {
    MaterializeError::IoPath(path.display().to_string(), error)
}
