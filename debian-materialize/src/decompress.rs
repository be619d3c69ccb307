// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Transparent streaming decompression.

Repository indices and `.deb` members arrive either gzip or xz compressed.
[Decompressor] sniffs the format from the stream's magic bytes and delegates
to the matching decoder, so callers never branch on file extensions.
*/

use {
    crate::error::{MaterializeError, Result},
    std::io::{BufRead, Read},
};

const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// A reader yielding the decompressed form of a gzip or xz stream.
pub enum Decompressor<R: BufRead> {
    Xz(xz2::read::XzDecoder<R>),
    Gzip(libflate::gzip::Decoder<R>),
}

impl<R: BufRead> Decompressor<R> {
    /// Construct an instance by sniffing the compression format.
    ///
    /// Reads (without consuming) the leading bytes of `reader` and selects
    /// the decoder whose magic matches.
    pub fn new(mut reader: R) -> Result<Self> {
        let leading = reader.fill_buf()?;

        if leading.starts_with(XZ_MAGIC) {
            Ok(Self::Xz(xz2::read::XzDecoder::new(reader)))
        } else if leading.starts_with(GZIP_MAGIC) {
            Ok(Self::Gzip(libflate::gzip::Decoder::new(reader)?))
        } else {
            Err(MaterializeError::UnknownCompression(
                leading.iter().take(6).copied().collect(),
            ))
        }
    }
}

impl<R: BufRead> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Xz(decoder) => decoder.read(buf),
            Self::Gzip(decoder) => decoder.read(buf),
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, std::io::Write};

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

    #[test]
    fn sniffs_gzip() {
        let compressed = gzip_compress(b"Package: hello\n");

        let mut decoded = String::new();
        Decompressor::new(&compressed[..])
            .unwrap()
            .read_to_string(&mut decoded)
            .unwrap();

        assert_eq!(decoded, "Package: hello\n");
    }

    #[test]
    fn sniffs_xz() {
        let compressed = xz_compress(b"some payload bytes");

        let mut decoded = Vec::new();
        Decompressor::new(&compressed[..])
            .unwrap()
            .read_to_end(&mut decoded)
            .unwrap();

        assert_eq!(decoded, b"some payload bytes");
    }

    #[test]
    fn rejects_unknown_magic() {
        assert!(matches!(
            Decompressor::new(&b"plain text"[..]),
            Err(MaterializeError::UnknownCompression(_))
        ));
    }
}
