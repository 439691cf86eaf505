//! Writing and reading compiled images.
//!
//! The binary form is the image words as little-endian `u32`s, so
//! `hexdump -e '"%08x\n"'` prints them in shift order.  The text forms
//! are `.word` directives, either bare or wrapped in a C-preprocessor
//! macro for assembly test headers.

use crate::bitstream::ScanChainImage;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while writing or reading images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image is {len} bytes, not a whole number of 32-bit words")]
    Misaligned { len: usize },
}

/// Image words as little-endian bytes.
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Parse little-endian bytes back into words.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<u32>, ImageError> {
    if bytes.len() % 4 != 0 {
        return Err(ImageError::Misaligned { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Save an image as a binary blob.
pub fn save_binary(image: &ScanChainImage, path: &Path) -> Result<(), ImageError> {
    let mut file = File::create(path)?;
    file.write_all(&to_bytes(&image.words()))?;
    Ok(())
}

/// Load raw image words from a binary blob.
pub fn load_binary(path: &Path) -> Result<Vec<u32>, ImageError> {
    let bytes = std::fs::read(path)?;
    from_bytes(&bytes)
}

/// One `.word 0x%08x` line per image word.
pub fn format_word_directives(image: &ScanChainImage) -> String {
    let mut out = String::new();
    for word in image.words() {
        out.push_str(&format!(".word 0x{:08x}\n", word));
    }
    out
}

/// A `#define` block emitting the image as `.word` directives.
///
/// ```
/// use chiffre_fault::bitstream::ScanChainImage;
/// use chiffre_fault::image::format_asm_macro;
///
/// let image = ScanChainImage {
///     header: 0x1e3,
///     checksum: None,
///     payload: vec![0xdeadbeef],
///     payload_bits: 32,
/// };
/// assert_eq!(
///     format_asm_macro("FAULT", &image),
///     "#define FAULT \\\n  .word 0x000001e3;\\\n  .word 0xdeadbeef;\n"
/// );
/// ```
pub fn format_asm_macro(name: &str, image: &ScanChainImage) -> String {
    let words = image.words();
    let mut out = format!("#define {} \\\n", name);
    for (i, word) in words.iter().enumerate() {
        let cont = if i + 1 < words.len() { "\\" } else { "" };
        out.push_str(&format!("  .word 0x{:08x};{}\n", word, cont));
    }
    out
}

/// Save an image as assembly: a macro block when `macro_name` is given,
/// bare `.word` directives otherwise.
pub fn save_word_directives(
    image: &ScanChainImage,
    macro_name: Option<&str>,
    path: &Path,
) -> Result<(), ImageError> {
    let text = match macro_name {
        Some(name) => format_asm_macro(name, image),
        None => format_word_directives(image),
    };
    let mut file = File::create(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

/// Save any report as pretty JSON.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ImageError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn image() -> ScanChainImage {
        ScanChainImage {
            header: 0x0000_01e3,
            checksum: Some(0x1234_5678),
            payload: vec![0xffff_ffff, 0xdead_beef],
            payload_bits: 64,
        }
    }

    #[test]
    fn bytes_are_little_endian_words() {
        let bytes = to_bytes(&[0x0000_01e3, 0xdead_beef]);
        assert_eq!(bytes, vec![0xe3, 0x01, 0, 0, 0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(from_bytes(&bytes).unwrap(), vec![0x0000_01e3, 0xdead_beef]);
    }

    #[test]
    fn misaligned_bytes_rejected() {
        assert!(matches!(
            from_bytes(&[1, 2, 3]),
            Err(ImageError::Misaligned { len: 3 })
        ));
    }

    #[test]
    fn binary_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.bin");
        let image = image();

        save_binary(&image, &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
        assert_eq!(load_binary(&path).unwrap(), image.words());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_binary(&dir.path().join("absent.bin")),
            Err(ImageError::Io(_))
        ));
    }

    #[test]
    fn word_directives_keep_order() {
        let text = format_word_directives(&image());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                ".word 0x000001e3",
                ".word 0x12345678",
                ".word 0xffffffff",
                ".word 0xdeadbeef",
            ]
        );
    }

    #[test]
    fn macro_block_continues_all_but_last() {
        let text = format_asm_macro("SCAN_MAIN", &image());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#define SCAN_MAIN \\");
        assert_eq!(lines.len(), 5);
        assert!(lines[1..4].iter().all(|l| l.ends_with(";\\")));
        assert_eq!(lines[4], "  .word 0xdeadbeef;");
    }

    #[test]
    fn save_asm_variants() {
        let dir = TempDir::new().unwrap();
        let bare = dir.path().join("bare.S");
        let wrapped = dir.path().join("wrapped.S");

        save_word_directives(&image(), None, &bare).unwrap();
        save_word_directives(&image(), Some("FAULT"), &wrapped).unwrap();

        assert!(std::fs::read_to_string(&bare).unwrap().starts_with(".word"));
        assert!(std::fs::read_to_string(&wrapped)
            .unwrap()
            .starts_with("#define FAULT"));
    }

    #[test]
    fn json_report_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        save_json(&vec![1u32, 2, 3], &path).unwrap();
        let back: Vec<u32> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
