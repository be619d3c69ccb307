// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading `.deb` package archives.

A `.deb` is a Unix `ar` archive with three canonical members:
`debian-binary` (format version), `control.tar.{xz,gz}` (metadata) and
`data.tar.{xz,gz}` (payload). Members are located by rescanning from the
start of the file, so any member can be opened any number of times in any
order.
*/

use {
    crate::{
        decompress::Decompressor,
        destination::DestinationSpec,
        error::{MaterializeError, Result},
        tar_extract::{tar_member_bytes, TarExtractor},
    },
    std::{
        fs::File,
        io::{BufReader, Read, Seek, SeekFrom},
        path::{Path, PathBuf},
    },
};

/// A `.deb` archive on disk.
pub struct DebArchive {
    file: File,
    path: PathBuf,
}

impl DebArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| MaterializeError::IoPath(path.display().to_string(), e))?;

        Ok(Self { file, path })
    }

    /// Content of the `debian-binary` member.
    ///
    /// Callers decide what format versions they accept; this only reads.
    pub fn format_version(&mut self) -> Result<String> {
        self.with_member("debian-binary", |reader| {
            let mut version = String::new();
            reader.read_to_string(&mut version)?;
            Ok(version)
        })
    }

    /// Unpack the payload (`data.tar.*`) into a destination.
    ///
    /// `data.tar.xz` is preferred; on any failure the archive is rescanned
    /// for `data.tar.gz`. Archives in the wild carry one or the other.
    pub fn extract_data(
        &mut self,
        destination: &DestinationSpec,
        strict: bool,
        links_as_copies: bool,
    ) -> Result<()> {
        match self.extract_tar_member("data.tar.xz", destination, strict, links_as_copies) {
            Ok(()) => Ok(()),
            Err(error) => {
                log::debug!(
                    "{}: data.tar.xz unusable ({}); trying data.tar.gz",
                    self.path.display(),
                    error
                );
                self.extract_tar_member("data.tar.gz", destination, strict, links_as_copies)
            }
        }
    }

    /// Text of the `control` file within `control.tar.*`.
    ///
    /// Same xz-then-gz fallback as the payload.
    pub fn control_text(&mut self) -> Result<String> {
        let bytes = match self.control_member_bytes("control.tar.xz") {
            Ok(bytes) => bytes,
            Err(error) => {
                log::debug!(
                    "{}: control.tar.xz unusable ({}); trying control.tar.gz",
                    self.path.display(),
                    error
                );
                self.control_member_bytes("control.tar.gz")?
            }
        };

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn extract_tar_member(
        &mut self,
        member: &str,
        destination: &DestinationSpec,
        strict: bool,
        links_as_copies: bool,
    ) -> Result<()> {
        self.with_member(member, |reader| {
            let decoder = Decompressor::new(BufReader::new(reader))?;

            TarExtractor::new(decoder)
                .set_strict(strict)
                .set_links_as_copies(links_as_copies)
                .extract_all(destination)
        })
    }

    fn control_member_bytes(&mut self, member: &str) -> Result<Vec<u8>> {
        self.with_member(member, |reader| {
            let decoder = Decompressor::new(BufReader::new(reader))?;

            tar_member_bytes(decoder, "control")
        })
    }

    /// Rescan the archive from the start and hand the named member's byte
    /// stream to `read`.
    fn with_member<T>(
        &mut self,
        name: &str,
        read: impl FnOnce(&mut dyn Read) -> Result<T>,
    ) -> Result<T> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut archive = ar::Archive::new(&mut self.file);

        while let Some(entry) = archive.next_entry() {
            let mut entry = entry?;

            if member_name(entry.header().identifier()) == name {
                return read(&mut entry);
            }
        }

        Err(MaterializeError::MissingMember(name.to_string()))
    }
}

/// Member identifiers may carry a trailing `/` (GNU style) and whitespace
/// padding.
fn member_name(identifier: &[u8]) -> String {
    String::from_utf8_lossy(identifier)
        .trim_end_matches(|c: char| c == '/' || c.is_ascii_whitespace())
        .to_string()
}

#[cfg(test)]
mod test {
    use {super::*, std::io::Write, tar::EntryType};

    fn gzip_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = libflate::gzip::Encoder::new(Vec::new()).unwrap();
        encoder.write_all(data).unwrap();
        encoder.finish().into_result().unwrap()
    }

    fn xz_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn tar_with_file(path: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, std::io::Cursor::new(data.to_vec()))
            .unwrap();
        builder.into_inner().unwrap()
    }

    fn ar_archive(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut builder = ar::Builder::new(&mut buffer);
            for (name, data) in members {
                let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
                builder.append(&header, &data[..]).unwrap();
            }
        }
        buffer
    }

    fn write_deb(dir: &Path, members: &[(&str, Vec<u8>)]) -> PathBuf {
        let path = dir.join("fixture.deb");
        std::fs::write(&path, ar_archive(members)).unwrap();
        path
    }

    const CONTROL: &[u8] = b"Package: fixture\nVersion: 1.0\nDepends: libc6\n";

    #[test]
    fn reads_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_deb(dir.path(), &[("debian-binary", b"2.0\n".to_vec())]);

        let mut deb = DebArchive::open(&path).unwrap();
        assert_eq!(deb.format_version().unwrap(), "2.0\n");
    }

    #[test]
    fn missing_member_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_deb(dir.path(), &[("debian-binary", b"2.0\n".to_vec())]);

        let mut deb = DebArchive::open(&path).unwrap();
        assert!(matches!(
            deb.control_text(),
            Err(MaterializeError::MissingMember(_))
        ));
    }

    #[test]
    fn extracts_xz_payload() {
        let dir = tempfile::tempdir().unwrap();
        let data_tar = tar_with_file("./usr/share/fixture.txt", b"payload\n");
        let path = write_deb(
            dir.path(),
            &[
                ("debian-binary", b"2.0\n".to_vec()),
                ("control.tar.xz", xz_compress(&tar_with_file("./control", CONTROL))),
                ("data.tar.xz", xz_compress(&data_tar)),
            ],
        );

        let out = dir.path().join("out");
        let mut deb = DebArchive::open(&path).unwrap();
        deb.extract_data(&DestinationSpec::from(out.as_path()), false, false)
            .unwrap();

        assert_eq!(
            std::fs::read(out.join("usr/share/fixture.txt")).unwrap(),
            b"payload\n"
        );
    }

    #[test]
    fn falls_back_to_gz_members() {
        let dir = tempfile::tempdir().unwrap();
        let data_tar = tar_with_file("./usr/share/fixture.txt", b"payload\n");
        let path = write_deb(
            dir.path(),
            &[
                ("debian-binary", b"2.0\n".to_vec()),
                ("control.tar.gz", gzip_compress(&tar_with_file("./control", CONTROL))),
                ("data.tar.gz", gzip_compress(&data_tar)),
            ],
        );

        let out = dir.path().join("out");
        let mut deb = DebArchive::open(&path).unwrap();
        deb.extract_data(&DestinationSpec::from(out.as_path()), false, false)
            .unwrap();
        assert_eq!(
            std::fs::read(out.join("usr/share/fixture.txt")).unwrap(),
            b"payload\n"
        );

        let control = deb.control_text().unwrap();
        assert!(control.contains("Package: fixture"));
    }

    #[test]
    fn members_reopen_in_any_order() {
        let dir = tempfile::tempdir().unwrap();
        let data_tar = tar_with_file("./usr/share/fixture.txt", b"payload\n");
        let path = write_deb(
            dir.path(),
            &[
                ("debian-binary", b"2.0\n".to_vec()),
                ("control.tar.xz", xz_compress(&tar_with_file("./control", CONTROL))),
                ("data.tar.xz", xz_compress(&data_tar)),
            ],
        );

        let mut deb = DebArchive::open(&path).unwrap();
        let control = deb.control_text().unwrap();
        assert!(control.contains("Depends: libc6"));

        let out = dir.path().join("out");
        deb.extract_data(&DestinationSpec::from(out.as_path()), false, false)
            .unwrap();

        assert_eq!(deb.format_version().unwrap(), "2.0\n");
        assert!(control.contains("Package: fixture"));
    }
}
