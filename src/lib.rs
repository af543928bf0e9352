//! # zion — bucket-partitioned columnar block codec
//!
//! Zion compresses streams of self-describing binary records by hashing
//! every field's symbol into one of 16 buckets, concatenating each
//! bucket's fields, and compressing buckets independently.  A compact
//! per-record *shape* stream records bucket assignments, so a decoder
//! can rebuild records exactly — or decompress only the buckets that
//! hold requested fields (projection pushdown).
//!
//! Format guarantees:
//! - Every block is self-describing: magic, seed word (hash selector +
//!   compression algo), then 17 length-framed payloads (shape + buckets)
//! - All numeric wire fields are little-endian; frame bodies stay below
//!   2^21 bytes
//! - Symbol dispatch is keyed SipHash-2-4 over the symbol's varuint
//!   bytes; encoder and decoder derive identical tables from the wire
//! - Reserved seed bits and unknown algo tags abort decoding — no
//!   negotiation, no fallback
//! - Symbol tables ride in-band at the head of the shape frame and are
//!   append-only between block version markers
//!
//! Encode one block, decode it wholly or projected:
//!
//! ```
//! use zion::{Decoder, Encoder};
//!
//! let mut table = zion::ion::SymbolTable::new();
//! let x = table.intern("x");
//! let mut block = Vec::new();
//! table.write_update(&mut block);
//! let mut payload = Vec::new();
//! zion::ion::write_varuint(&mut payload, x as u64);
//! zion::ion::write_int(&mut payload, 7);
//! zion::ion::write_container(&mut block, zion::ion::Type::Struct, &payload);
//!
//! let mut encoded = Vec::new();
//! Encoder::new().encode(&block, &mut encoded)?;
//!
//! let mut decoded = Vec::new();
//! Decoder::new().decode(&encoded, &mut decoded)?;
//! assert_eq!(decoded, block);
//! # Ok::<(), zion::Error>(())
//! ```

pub mod dispatch;
pub mod error;
pub mod frame;
pub mod ion;
pub mod shape;
pub mod vector;

mod decoder;
mod encoder;

// Flat re-exports for the most common types.
pub use decoder::{Decoder, TARGET_WRITE_SIZE};
pub use dispatch::{bucket_of, NUM_BUCKETS};
pub use encoder::{Encoder, MAGIC};
pub use error::{Error, Result};
pub use frame::{Algo, BucketHints, MAX_BUCKET_SIZE, MAX_FRAME_BODY};
