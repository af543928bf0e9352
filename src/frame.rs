//! Frame packaging and back-end compression dispatch.
//!
//! Every compressed payload inside a block — the shape stream and each of
//! the 16 buckets — is wrapped as:
//!
//! ```text
//! u24 LE body length | body
//! ```
//!
//! The length excludes its own three bytes and must stay below 2^21; a
//! zero length is a legal empty payload.  The body format is selected by
//! the block's one-byte algorithm tag:
//!
//! | tag | body |
//! |-----|------|
//! | 0   | zstd frame |
//! | 1   | LZ block, size-prepended |
//! | 2   | one sub-codec byte, then: 0 = LZ block, 1 = int8 vector, 2 = numeric vector |
//!
//! Specialization is an encode-time heuristic driven by [`BucketHints`];
//! when a specialized encode rejects its input the frame silently falls
//! back to sub-codec 0.  Decoders accept any valid sub-codec regardless
//! of what the hints said.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::ion::Type;
use crate::vector;

/// Bytes of the u24 length prefix.
pub const FRAME_HEADER_LEN: usize = 3;

/// Largest legal frame body.
pub const MAX_FRAME_BODY: usize = (1 << 21) - 1;

/// Upper bound on a single decompressed bucket (and on decoder retry growth).
pub const MAX_BUCKET_SIZE: usize = 1 << 21;

/// Zstd level used for bucket bodies.
const ZSTD_LEVEL: i32 = 3;

// Sub-codec tags inside an algo-2 body.
const SUB_LZ: u8 = 0;
const SUB_INT8: u8 = 1;
const SUB_NUMERIC: u8 = 2;

// ── Algorithm tags ───────────────────────────────────────────────────────────

/// Back-end compression algorithm, as encoded in seed bits 4..12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Algo {
    Zstd = 0,
    #[default]
    Lz = 1,
    /// LZ with per-bucket specialization for small-integer and numeric
    /// vector contents.
    LzSpecialized = 2,
}

impl Algo {
    pub fn from_tag(tag: u8) -> Result<Algo> {
        match tag {
            0 => Ok(Algo::Zstd),
            1 => Ok(Algo::Lz),
            2 => Ok(Algo::LzSpecialized),
            t => Err(Error::UnsupportedAlgo(t)),
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

// ── Hints ────────────────────────────────────────────────────────────────────

const INT_BITS: u16 = Type::PosInt.bit() | Type::NegInt.bit();
const NUMERIC_BITS: u16 = INT_BITS | Type::Float.bit();

/// Encode-time content hints for one bucket, supplied by the caller
/// (typically the ingestion layer that built the records).
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketHints {
    /// Approximate number of list elements in the bucket.
    pub elements: usize,
    /// Bitmap of top-level value types seen in the bucket.
    pub type_set: u16,
    /// Bitmap of list element types seen in the bucket.
    pub list_type_set: u16,
}

impl BucketHints {
    /// All values are lists of integers: candidate for the int8 codec.
    fn wants_int8(&self) -> bool {
        self.type_set == Type::List.bit()
            && self.list_type_set != 0
            && self.list_type_set & !INT_BITS == 0
    }

    /// All values are lists of numbers: candidate for the numeric codec.
    fn wants_numeric(&self) -> bool {
        self.type_set == Type::List.bit()
            && self.list_type_set != 0
            && self.list_type_set & !NUMERIC_BITS == 0
    }
}

// ── Compression ──────────────────────────────────────────────────────────────

/// Compress `src` and append a complete frame to `dst`.
pub fn compress(
    algo: Algo,
    hints: Option<&BucketHints>,
    src: &[u8],
    dst: &mut Vec<u8>,
) -> Result<()> {
    if src.is_empty() {
        dst.extend_from_slice(&[0, 0, 0]);
        return Ok(());
    }
    let body = match algo {
        Algo::Zstd => zstd::encode_all(src, ZSTD_LEVEL)?,
        Algo::Lz => lz4_flex::compress_prepend_size(src),
        Algo::LzSpecialized => specialized_body(hints, src),
    };
    if body.len() > MAX_FRAME_BODY {
        return Err(Error::TooLarge {
            what:  "compressed frame",
            size:  body.len(),
            limit: MAX_FRAME_BODY,
        });
    }
    let mut len = [0u8; FRAME_HEADER_LEN];
    LittleEndian::write_u24(&mut len, body.len() as u32);
    dst.extend_from_slice(&len);
    dst.extend_from_slice(&body);
    Ok(())
}

fn specialized_body(hints: Option<&BucketHints>, src: &[u8]) -> Vec<u8> {
    if let Some(h) = hints {
        if h.wants_int8() {
            if let Ok(enc) = vector::int8::encode(src) {
                let mut body = Vec::with_capacity(1 + enc.len());
                body.push(SUB_INT8);
                body.extend_from_slice(&enc);
                return body;
            }
        } else if h.wants_numeric() {
            if let Ok(enc) = vector::numeric::encode(src) {
                let mut body = Vec::with_capacity(1 + enc.len());
                body.push(SUB_NUMERIC);
                body.extend_from_slice(&enc);
                return body;
            }
        }
    }
    let mut body = lz4_flex::compress_prepend_size(src);
    body.insert(0, SUB_LZ);
    body
}

// ── Decompression ────────────────────────────────────────────────────────────

/// Total on-wire size (header + body) of the frame at the start of `src`.
pub fn frame_size(src: &[u8]) -> Result<usize> {
    if src.len() < FRAME_HEADER_LEN {
        return Err(Error::Truncated("frame length"));
    }
    Ok(FRAME_HEADER_LEN + LittleEndian::read_u24(src) as usize)
}

/// Decompress the frame at the start of `src`, appending the payload to
/// `dst`.  Returns the on-wire bytes consumed.
pub fn decompress_into(algo: Algo, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
    let total = frame_size(src)?;
    if src.len() < total {
        return Err(Error::Truncated("frame body"));
    }
    let body = &src[FRAME_HEADER_LEN..total];
    if body.is_empty() {
        return Ok(total);
    }

    let before = dst.len();
    match algo {
        Algo::Zstd => {
            let out = zstd::decode_all(body)
                .map_err(|_| Error::Corrupt("zstd frame body"))?;
            dst.extend_from_slice(&out);
        }
        Algo::Lz => decompress_lz(body, dst)?,
        Algo::LzSpecialized => match body[0] {
            SUB_LZ => decompress_lz(&body[1..], dst)?,
            SUB_INT8 => vector::int8::decode(&body[1..], dst)?,
            SUB_NUMERIC => vector::numeric::decode(&body[1..], dst)?,
            _ => return Err(Error::Corrupt("unknown bucket sub-codec tag")),
        },
    }

    let produced = dst.len() - before;
    if produced > MAX_BUCKET_SIZE {
        return Err(Error::TooLarge {
            what:  "decompressed payload",
            size:  produced,
            limit: MAX_BUCKET_SIZE,
        });
    }
    Ok(total)
}

fn decompress_lz(body: &[u8], dst: &mut Vec<u8>) -> Result<()> {
    // The size prefix drives the output allocation; bound it before
    // trusting it.
    if body.len() >= 4 {
        let claimed = u32::from_le_bytes(body[..4].try_into().unwrap()) as usize;
        if claimed > MAX_BUCKET_SIZE {
            return Err(Error::TooLarge {
                what:  "decompressed payload",
                size:  claimed,
                limit: MAX_BUCKET_SIZE,
            });
        }
    }
    let out = lz4_flex::decompress_size_prepended(body)
        .map_err(|_| Error::Corrupt("lz frame body"))?;
    dst.extend_from_slice(&out);
    Ok(())
}
