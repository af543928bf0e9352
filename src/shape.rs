//! Shape bitstream — the per-record descriptor stream.
//!
//! # Entry layout
//!
//! ```text
//! desc = size_class<<6 | field_count     one byte, field_count in [0,16]
//! bucket nibbles                         ceil(field_count/2) bytes,
//!                                        little-endian nibble order
//! ```
//!
//! `field_count == 16` marks a continuation: the record carries on in the
//! next entry, and only the terminating entry (`field_count < 16`)
//! supplies the record's size class.  A record therefore always ends on
//! an entry with fewer than 16 fields — possibly one with zero fields.
//!
//! Values 17..=31 in the 5-bit count field never appear in valid streams.

use crate::error::{Error, Result};

/// Maximum fields representable by a single shape entry.
pub const MAX_ENTRY_FIELDS: usize = 16;

// ── Encoder ──────────────────────────────────────────────────────────────────

/// Builds the shape stream for one block.  The caller feeds bucket
/// nibbles in field order and closes each record with its size class.
#[derive(Debug, Default)]
pub struct ShapeEncoder {
    buf: Vec<u8>,
    /// Offset of the open entry's descriptor byte, if a record is mid-entry.
    entry_at: Option<usize>,
    nibbles:  usize,
}

impl ShapeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh block whose shape stream opens with `prefix`
    /// (the raw symbol-table update bytes, possibly empty).
    pub fn start_block(&mut self, prefix: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(prefix);
        self.entry_at = None;
        self.nibbles = 0;
    }

    /// Append one field's bucket index to the current record.
    pub fn push_bucket(&mut self, bucket: u8) {
        debug_assert!(bucket < 16);
        let at = match self.entry_at {
            Some(at) => at,
            None => {
                let at = self.buf.len();
                self.buf.push(0);
                self.entry_at = Some(at);
                at
            }
        };
        if self.nibbles % 2 == 0 {
            self.buf.push(bucket);
        } else {
            let last = self.buf.len() - 1;
            self.buf[last] |= bucket << 4;
        }
        self.nibbles += 1;
        if self.nibbles == MAX_ENTRY_FIELDS {
            // Seal as a continuation; size-class bits stay zero and are
            // ignored by readers.
            self.buf[at] = MAX_ENTRY_FIELDS as u8;
            self.entry_at = None;
            self.nibbles = 0;
        }
    }

    /// Close the current record with its size class, emitting an empty
    /// terminating entry if the field count was a multiple of 16.
    pub fn finish_record(&mut self, class: u8) {
        debug_assert!(class < 4);
        let at = match self.entry_at.take() {
            Some(at) => at,
            None => {
                let at = self.buf.len();
                self.buf.push(0);
                at
            }
        };
        self.buf[at] = class << 6 | self.nibbles as u8;
        self.nibbles = 0;
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

// ── Decoder ──────────────────────────────────────────────────────────────────

/// One parsed shape entry borrowing its nibble bytes.
#[derive(Debug, Clone, Copy)]
pub struct ShapeEntry<'a> {
    /// Size class from the descriptor; meaningful on terminating entries only.
    pub class:  u8,
    /// Field count in `[0, 16]`; 16 means the record continues.
    pub fields: usize,
    nibbles:    &'a [u8],
}

impl ShapeEntry<'_> {
    /// Bucket index of field `i` within this entry.
    #[inline]
    pub fn bucket(&self, i: usize) -> u8 {
        debug_assert!(i < self.fields);
        self.nibbles[i / 2] >> ((i % 2) * 4) & 0x0F
    }

    /// True if the record carries on into the next entry.
    #[inline]
    pub fn is_continuation(&self) -> bool {
        self.fields == MAX_ENTRY_FIELDS
    }
}

/// Parse the entry at the start of `shape`; returns it and the bytes consumed.
pub fn read_entry(shape: &[u8]) -> Result<(ShapeEntry<'_>, usize)> {
    let &desc = shape.first().ok_or(Error::Truncated("shape descriptor"))?;
    let fields = (desc & 0x1F) as usize;
    if fields > MAX_ENTRY_FIELDS {
        return Err(Error::Corrupt("shape field count exceeds 16"));
    }
    let total = 1 + (fields + 1) / 2;
    if shape.len() < total {
        return Err(Error::Truncated("shape nibbles"));
    }
    let entry = ShapeEntry {
        class:   desc >> 6,
        fields,
        nibbles: &shape[1..total],
    };
    Ok((entry, total))
}

/// Count the records described by a shape stream without touching buckets.
/// Each terminating entry closes exactly one record.
pub fn count_records(mut shape: &[u8]) -> Result<usize> {
    let mut count = 0;
    while !shape.is_empty() {
        let (entry, consumed) = read_entry(shape)?;
        if !entry.is_continuation() {
            count += 1;
        }
        shape = &shape[consumed..];
    }
    Ok(count)
}
