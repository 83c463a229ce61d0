//! Transparent compression for data files and chunk dumps.
//!
//! Readers detect a codec from the file extension first and fall back to the
//! stream's magic bytes; writers go by extension only. Codecs are compiled in
//! through cargo features:
//!
//! - **Gzip** (`.gz`) - `compression-gzip`, on by default
//! - **Zstd** (`.zst`) - `compression-zstd`, on by default
//! - **Bzip2** (`.bz2`) - `compression-bzip2`
//! - **Xz** (`.xz`) - `compression-xz`
//!
//! Decompressing readers are `Send` so a reader worker thread can own them.
//!
//! ```no_run
//! use mldp::io::compression::{auto_detect_reader, auto_detect_writer};
//! use std::fs::File;
//! # fn main() -> anyhow::Result<()> {
//! let reader = auto_detect_reader(File::open("train.csv.gz")?, "train.csv.gz")?;
//! let writer = auto_detect_writer(File::create("dump.tsv.zst")?, "dump.tsv.zst")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Boxed decompressing reader.
pub type DynRead = Box<dyn Read + Send>;

/// A compression format.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowercase extensions with the leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &'static [&'static str];

    /// Stream signature, if the format has a reliable one.
    fn magic_bytes(&self) -> Option<&'static [u8]>;

    /// Wrap `reader` with decompression.
    ///
    /// # Errors
    /// Codec initialisation failures.
    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead>;

    /// Wrap `writer` with compression.
    ///
    /// # Errors
    /// Codec initialisation failures.
    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

/// Every codec enabled in this build.
#[must_use]
pub fn builtin_codecs() -> Vec<Box<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Box::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Box::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Box::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Box::new(XzCodec),
    ]
}

/// The codec whose extension ends `path`, matched case-insensitively.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<Box<dyn CompressionCodec>> {
    let name = path.as_ref().to_string_lossy().to_lowercase();
    builtin_codecs()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

/// `path` with a trailing compression extension removed, lowercased.
///
/// `data/train.CSV.gz` becomes `data/train.csv`, which lets callers filter
/// files by their logical extension.
#[must_use]
pub fn logical_name(path: impl AsRef<Path>) -> String {
    let name = path.as_ref().to_string_lossy().to_lowercase();
    for codec in builtin_codecs() {
        for ext in codec.extensions() {
            if let Some(stripped) = name.strip_suffix(ext) {
                return stripped.to_string();
            }
        }
    }
    name
}

fn codec_for_magic<R: BufRead>(reader: &mut R) -> Option<Box<dyn CompressionCodec>> {
    let head = reader.fill_buf().ok()?;
    if head.is_empty() {
        return None;
    }
    builtin_codecs()
        .into_iter()
        .find(|codec| codec.magic_bytes().is_some_and(|magic| head.starts_with(magic)))
}

/// Wrap `reader` with decompression if the path or the stream says so.
///
/// # Errors
/// Codec initialisation failures.
pub fn auto_detect_reader<R>(reader: R, path_hint: impl AsRef<Path>) -> Result<DynRead>
where
    R: Read + Send + 'static,
{
    if let Some(codec) = codec_for_path(&path_hint) {
        return codec
            .wrap_reader(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buffered = BufReader::new(reader);
    if let Some(codec) = codec_for_magic(&mut buffered) {
        return codec
            .wrap_reader(Box::new(buffered))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buffered))
}

/// Wrap `writer` with compression when the path carries a codec extension,
/// otherwise buffer it.
///
/// # Errors
/// Codec initialisation failures.
pub fn auto_detect_writer<W>(writer: W, path_hint: impl AsRef<Path>) -> Result<Box<dyn Write>>
where
    W: Write + 'static,
{
    if let Some(codec) = codec_for_path(&path_hint) {
        return codec
            .wrap_writer(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as DynRead)
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_name_strips_codec_suffix() {
        #[cfg(feature = "compression-gzip")]
        assert_eq!(logical_name("data/Train.CSV.gz"), "data/train.csv");
        assert_eq!(logical_name("data/train.csv"), "data/train.csv");
    }

    #[test]
    fn plain_stream_passes_through() {
        let mut out = String::new();
        auto_detect_reader(std::io::Cursor::new(b"a,b\n".to_vec()), "x.csv")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "a,b\n");
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_magic_bytes() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(b"hello").unwrap();
        let bytes = enc.finish().unwrap();

        let mut out = String::new();
        auto_detect_reader(std::io::Cursor::new(bytes), "no-extension")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "hello");
    }
}
