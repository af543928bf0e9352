//! Error taxonomy for the whole crate.
//!
//! Every variant maps to exactly one failure class of the block format:
//! corrupt bytes, truncated bucket reads, size-limit violations, and
//! unsupported wire tags.  All of them are fatal for the current block;
//! `TooLarge` on the decode side is additionally recoverable by retrying
//! with a larger destination (see `Decoder::copy_bytes`).

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input bytes: bad shape nibble count, bad varint, size
    /// descriptor inconsistency, unknown sub-codec tag, non-struct record.
    /// The decoder may be reused for the next block after `reset()`.
    #[error("corrupt input: {0}")]
    Corrupt(&'static str),

    /// A label or value overruns its bucket slice.
    #[error("truncated input: {0}")]
    Truncated(&'static str),

    /// Encode side: a frame body would exceed the 2^21-1 byte limit.
    /// Decode side: a decompressed bucket exceeds [`MAX_BUCKET_SIZE`];
    /// recoverable by growing the destination up to that bound.
    ///
    /// [`MAX_BUCKET_SIZE`]: crate::MAX_BUCKET_SIZE
    #[error("{what} of {size} bytes exceeds the {limit}-byte limit")]
    TooLarge {
        what:  &'static str,
        size:  usize,
        limit: usize,
    },

    /// The block names a compression algorithm tag this build does not
    /// implement.  Decoding MUST NOT continue; there is no fallback.
    #[error("unsupported compression algorithm tag {0:#04x}")]
    UnsupportedAlgo(u8),

    /// Reserved bits of the on-disk seed word are set.  A future format
    /// revision may assign them; this build rejects the block.
    #[error("unsupported seed bits {0:#010x} (reserved bits must be zero)")]
    UnsupportedSeedBits(u32),

    /// A record's total value payload does not fit any size class.
    #[error("record payload of {0} bytes exceeds the largest size class")]
    OversizedRecord(usize),

    /// A specialized bucket codec was handed an empty bucket; it cannot
    /// learn the shared label, so the caller must fall back.
    #[error("specialized codec requires a non-empty bucket")]
    EmptyField,

    /// The decoder reported success yet produced zero bytes for a
    /// non-empty block.  Indicates an implementation bug, never bad input.
    #[error("decoder made no progress on a non-empty block")]
    NoProgress,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
