//! Transparent gzip decoding for input tables.
//!
//! Count matrices are commonly shipped as `.csv.gz`. Inputs are sniffed by
//! magic bytes rather than by extension, so a mislabelled file still decodes.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::{Result, ScatacError};

/// Supported compression formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Gzip,
}

/// Detect the compression format from the magic bytes of `data`.
///
/// Returns `None` for plain (uncompressed) data.
pub fn detect_algorithm(data: &[u8]) -> Option<Algorithm> {
    if data.len() >= 2 && data[..2] == [0x1F, 0x8B] {
        Some(Algorithm::Gzip)
    } else {
        None
    }
}

/// Open `path` for reading, decoding gzip when the magic bytes say so.
pub fn open_maybe_gzip(path: impl AsRef<Path>) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ScatacError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mut reader = BufReader::new(file);
    let algorithm = detect_algorithm(reader.fill_buf()?);
    match algorithm {
        Some(Algorithm::Gzip) => Ok(Box::new(MultiGzDecoder::new(reader))),
        None => Ok(Box::new(reader)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn detect_gzip() {
        assert_eq!(detect_algorithm(&[0x1F, 0x8B, 0x08]), Some(Algorithm::Gzip));
    }

    #[test]
    fn detect_plain() {
        assert_eq!(detect_algorithm(b"peak,cell_1"), None);
        assert_eq!(detect_algorithm(b""), None);
    }

    fn read_all(path: &Path) -> String {
        let mut text = String::new();
        open_maybe_gzip(path)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn reads_plain_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "peak,c1\np1,3\n").unwrap();
        file.flush().unwrap();
        let text = read_all(file.path());
        assert_eq!(text, "peak,c1\np1,3\n");
    }

    #[test]
    fn reads_gzip_file() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
        encoder.write_all(b"peak,c1\np1,3\n").unwrap();
        let bytes = encoder.finish().unwrap();

        let mut file = NamedTempFile::with_suffix(".csv.gz").unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let text = read_all(file.path());
        assert_eq!(text, "peak,c1\np1,3\n");
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = open_maybe_gzip("/nonexistent/counts.csv.gz");
        assert!(matches!(result, Err(ScatacError::Io(_))));
    }
}
