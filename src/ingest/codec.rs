// src/ingest/codec.rs
//! Payload decompression. The export is shipped either gzip'd or as a single-entry zip;
//! anything else is treated as already-plain text.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::{DeflateDecoder, MultiGzDecoder};
use flate2::Crc;

use crate::ingest::error::CodecError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_LOCAL_HEADER: [u8; 4] = *b"PK\x03\x04";
const ZIP_HEADER_LEN: usize = 30;
const ZIP_FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const ZIP_DESCRIPTOR_SIG: [u8; 4] = *b"PK\x07\x08";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Gzip,
    Zip,
    Plain,
}

pub fn detect(bytes: &[u8]) -> PayloadKind {
    if bytes.starts_with(&GZIP_MAGIC) {
        PayloadKind::Gzip
    } else if bytes.starts_with(&ZIP_LOCAL_HEADER) {
        PayloadKind::Zip
    } else {
        PayloadKind::Plain
    }
}

pub fn decompress(bytes: &[u8]) -> Result<Cow<'_, [u8]>, CodecError> {
    match detect(bytes) {
        PayloadKind::Gzip => {
            let mut out = Vec::with_capacity(bytes.len() * 4);
            MultiGzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(CodecError::Gzip)?;
            Ok(Cow::Owned(out))
        }
        PayloadKind::Zip => first_zip_entry(bytes).map(Cow::Owned),
        PayloadKind::Plain => Ok(Cow::Borrowed(bytes)),
    }
}

fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Reads the first local file entry of a zip archive (stored or deflate).
fn first_zip_entry(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if bytes.len() < ZIP_HEADER_LEN {
        return Err(CodecError::Zip("truncated local header".into()));
    }

    let flags = le_u16(bytes, 6);
    let method = le_u16(bytes, 8);
    let header_crc = le_u32(bytes, 14);
    let compressed_size = le_u32(bytes, 18);
    let name_len = le_u16(bytes, 26) as usize;
    let extra_len = le_u16(bytes, 28) as usize;

    let data_start = ZIP_HEADER_LEN + name_len + extra_len;
    if data_start > bytes.len() {
        return Err(CodecError::Zip("entry header runs past end of archive".into()));
    }
    let rest = &bytes[data_start..];

    // Sizes are zero (or the zip64 sentinel) when a data descriptor follows the entry.
    let size_known = flags & ZIP_FLAG_DATA_DESCRIPTOR == 0 && compressed_size != u32::MAX;
    let data = if size_known {
        let len = compressed_size as usize;
        if len > rest.len() {
            return Err(CodecError::Zip(format!(
                "entry claims {len} bytes, only {} present",
                rest.len()
            )));
        }
        &rest[..len]
    } else {
        rest
    };

    let (out, consumed) = match method {
        0 if size_known => (data.to_vec(), data.len()),
        0 => return Err(CodecError::Zip("stored entry without a known size".into())),
        8 => {
            let mut out = Vec::with_capacity(data.len() * 4);
            let mut decoder = DeflateDecoder::new(data);
            decoder.read_to_end(&mut out).map_err(CodecError::Inflate)?;
            (out, decoder.total_in() as usize)
        }
        other => {
            return Err(CodecError::Zip(format!(
                "unsupported compression method {other}"
            )))
        }
    };

    let expected = if size_known {
        header_crc
    } else {
        descriptor_crc(data.get(consumed..).unwrap_or_default())?
    };
    let mut crc = Crc::new();
    crc.update(&out);
    if crc.sum() != expected {
        return Err(CodecError::Zip(format!(
            "crc mismatch: entry says {expected:08x}, data is {:08x}",
            crc.sum()
        )));
    }
    Ok(out)
}

/// CRC-32 from the data descriptor trailing an entry; the signature is optional.
fn descriptor_crc(trailer: &[u8]) -> Result<u32, CodecError> {
    let at = if trailer.starts_with(&ZIP_DESCRIPTOR_SIG) { 4 } else { 0 };
    if trailer.len() < at + 4 {
        return Err(CodecError::Zip("missing data descriptor".into()));
    }
    Ok(le_u32(trailer, at))
}
