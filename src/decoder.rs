//! Block decoder — selective bucket decompression and record reassembly.
//!
//! # Decode modes
//!
//! - **Wildcard** (default): every bucket is decompressed and every field
//!   re-emitted; output equals the encoder's input byte-for-byte (minus
//!   no-op padding).
//! - **Projection**: only buckets containing requested top-level fields
//!   are decompressed; unrequested fields are dropped during reassembly.
//!   With exactly one requested field a fast path walks the single bucket
//!   linearly — this may permute record order within a block (callers
//!   that need input order force the general loop with `set_portable`).
//!
//! # Reassembly
//!
//! All decompressed buckets live in one growing arena; `pos[b]` holds
//! each bucket's start offset or `-1` for "skipped", so the
//! absent-bucket check is a sign test.  Per-bucket cursors (`base[b]`)
//! advance monotonically as shape entries are walked; a cursor that runs
//! off its bucket means the block is corrupt.
//!
//! Blocks of a stream must be decoded in order by one instance: the
//! symbol table is extended by in-band updates.

use std::io::Write;

use crate::dispatch::{BucketTable, NUM_BUCKETS};
use crate::encoder::{MAGIC, SEED_RESERVED};
use crate::error::{Error, Result};
use crate::frame::{self, Algo};
use crate::ion::{self, Symbol, SymbolTable};
use crate::shape;

/// Flush granularity for [`Decoder::copy_bytes`].
pub const TARGET_WRITE_SIZE: usize = 128 * 1024;

/// One requested projection path component.  `symbol` is resolved lazily
/// against the running symbol table; `None` means unresolved.
#[derive(Debug, Clone)]
struct Component {
    name:   String,
    symbol: Option<Symbol>,
}

/// Streaming block decoder.  Single-threaded; one instance per stream.
pub struct Decoder {
    st:    SymbolTable,
    table: BucketTable,
    /// `None` = wildcard; `Some` = projection over these components,
    /// deduplicated and lexicographically sorted.
    components: Option<Vec<Component>>,
    portable:   bool,

    // Block-scoped state.
    arena: Vec<u8>,
    pos:   [i32; NUM_BUCKETS],
    lens:  [u32; NUM_BUCKETS],
    base:  [u32; NUM_BUCKETS],

    /// Cumulative bucket decompressions (observable for tests/metrics).
    decomps: u64,

    scratch: Vec<u8>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            st:         SymbolTable::new(),
            table:      BucketTable::new(0),
            components: None,
            portable:   false,
            arena:      Vec::new(),
            pos:        [-1; NUM_BUCKETS],
            lens:       [0; NUM_BUCKETS],
            base:       [0; NUM_BUCKETS],
            decomps:    0,
            scratch:    Vec::new(),
        }
    }

    /// Clear the symbol table and all caches.  The projection selection is
    /// kept but its symbols become unresolved again.
    pub fn reset(&mut self) {
        self.st = SymbolTable::new();
        self.table.clear();
        self.arena.clear();
        self.pos = [-1; NUM_BUCKETS];
        self.decomps = 0;
        if let Some(comps) = &mut self.components {
            for c in comps {
                c.symbol = None;
            }
        }
    }

    /// Decode all fields (the default).
    pub fn set_wildcard(&mut self) {
        self.components = None;
    }

    /// Decode only top-level fields named in `paths`.  Paths are
    /// deduplicated and sorted; symbols resolve lazily as symbol-table
    /// updates arrive.
    pub fn set_components<S: AsRef<str>>(&mut self, paths: &[S]) {
        let mut names: Vec<String> =
            paths.iter().map(|p| p.as_ref().to_string()).collect();
        names.sort();
        names.dedup();
        self.components = Some(
            names
                .into_iter()
                .map(|name| Component { name, symbol: None })
                .collect(),
        );
    }

    /// Force the order-preserving general reassembly loop even when the
    /// single-field fast path would apply.
    pub fn set_portable(&mut self, portable: bool) {
        self.portable = portable;
    }

    /// Bucket decompressions performed so far.
    #[inline]
    pub fn decompressions(&self) -> u64 {
        self.decomps
    }

    // ── Block decoding ───────────────────────────────────────────────────

    /// Decode one block, appending the record stream to `dst`.  Returns
    /// the number of bytes appended.
    pub fn decode(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
        let written_from = dst.len();
        let (algo, shape_buf, buckets_at) = self.read_block_header(src)?;

        let prefix = self.consume_table_update(&shape_buf)?;
        dst.extend_from_slice(&shape_buf[..prefix]);
        let shape_stream = &shape_buf[prefix..];
        let buckets_src = &src[buckets_at..];

        self.resolve_components();
        let records = if let Some(single) = self.single_field() {
            self.decode_single_field(algo, single, shape_stream, buckets_src, dst)?
        } else {
            let (selected, bucket_bits) = self.selection();
            self.load_buckets(algo, buckets_src, bucket_bits)?;
            self.reassemble(shape_stream, selected.as_deref(), dst)?
        };

        if records > 0 && dst.len() == written_from {
            return Err(Error::NoProgress);
        }
        Ok(dst.len() - written_from)
    }

    /// Streaming variant of [`decode`]: flushes into `sink` in chunks of
    /// roughly [`TARGET_WRITE_SIZE`] and returns the bytes written.  A sink
    /// error aborts the block.
    ///
    /// [`decode`]: Decoder::decode
    pub fn copy_bytes<W: Write>(&mut self, sink: &mut W, src: &[u8]) -> Result<u64> {
        let mut buf = std::mem::take(&mut self.scratch);
        buf.clear();
        let res = self.decode(src, &mut buf);
        let out = match res {
            Ok(_) => {
                let mut written = 0u64;
                let mut rest = buf.as_slice();
                while !rest.is_empty() {
                    let n = rest.len().min(TARGET_WRITE_SIZE);
                    sink.write_all(&rest[..n])?;
                    written += n as u64;
                    rest = &rest[n..];
                }
                Ok(written)
            }
            Err(e) => Err(e),
        };
        self.scratch = buf;
        out
    }

    /// Count the records in a block without decompressing any bucket.
    /// Stateful: consumes the block's symbol-table update like `decode`.
    pub fn count(&mut self, src: &[u8]) -> Result<usize> {
        let (_, shape_buf, _) = self.read_block_header(src)?;
        let prefix = self.consume_table_update(&shape_buf)?;
        self.resolve_components();
        shape::count_records(&shape_buf[prefix..])
    }

    /// Verify magic and seed, decompress the shape frame.  Returns the
    /// algo, the decompressed shape body, and the offset of bucket 0's
    /// frame within `src`.
    fn read_block_header(&mut self, src: &[u8]) -> Result<(Algo, Vec<u8>, usize)> {
        if src.len() < 8 {
            return Err(Error::Truncated("block header"));
        }
        if src[..4] != MAGIC {
            return Err(Error::Corrupt("bad block magic"));
        }
        let seed = u32::from_le_bytes(src[4..8].try_into().unwrap());
        if seed & SEED_RESERVED != 0 {
            return Err(Error::UnsupportedSeedBits(seed));
        }
        let algo = Algo::from_tag((seed >> 4) as u8)?;
        if seed != self.table.seed() {
            self.table.reseed(seed);
        }
        let mut shape_buf = Vec::new();
        let consumed = frame::decompress_into(algo, &src[8..], &mut shape_buf)?;
        Ok((algo, shape_buf, 8 + consumed))
    }

    /// Replay a leading symbol-table update into the running table.
    fn consume_table_update(&mut self, shape_buf: &[u8]) -> Result<usize> {
        if ion::is_bvm(shape_buf) {
            self.table.clear();
        }
        let prefix = self.st.read_update(shape_buf)?;
        self.table.extend_to(self.st.max_symbol());
        Ok(prefix)
    }

    /// Re-resolve projection components against the current table.
    fn resolve_components(&mut self) {
        let Some(comps) = &mut self.components else { return };
        for c in comps {
            c.symbol = self.st.lookup(&c.name);
        }
    }

    /// The single projection component, when the fast path applies.
    fn single_field(&self) -> Option<Option<Symbol>> {
        if self.portable {
            return None;
        }
        match self.components.as_deref() {
            Some([only]) => Some(only.symbol),
            _ => None,
        }
    }

    /// Sorted selected symbols and the bitmap of buckets they live in.
    /// Wildcard yields `(None, all buckets)`.
    fn selection(&mut self) -> (Option<Vec<Symbol>>, u16) {
        match &self.components {
            None => (None, u16::MAX),
            Some(comps) => {
                let mut syms: Vec<Symbol> =
                    comps.iter().filter_map(|c| c.symbol).collect();
                syms.sort_unstable();
                syms.dedup();
                let mut bits = 0u16;
                for &sym in &syms {
                    bits |= 1 << self.table.get(sym);
                }
                (Some(syms), bits)
            }
        }
    }

    /// Walk the 16 bucket frames: decompress the selected ones into the
    /// arena, skip the rest.
    fn load_buckets(&mut self, algo: Algo, mut src: &[u8], bucket_bits: u16) -> Result<()> {
        self.arena.clear();
        self.base = [0; NUM_BUCKETS];
        for b in 0..NUM_BUCKETS {
            if bucket_bits & 1 << b != 0 {
                let at = self.arena.len();
                let consumed = frame::decompress_into(algo, src, &mut self.arena)?;
                self.pos[b] = at as i32;
                self.lens[b] = (self.arena.len() - at) as u32;
                if consumed > frame::FRAME_HEADER_LEN {
                    self.decomps += 1;
                }
                src = &src[consumed..];
            } else {
                let skip = frame::frame_size(src)?;
                if src.len() < skip {
                    return Err(Error::Truncated("bucket frame"));
                }
                self.pos[b] = -1;
                self.lens[b] = 0;
                src = &src[skip..];
            }
        }
        if !src.is_empty() {
            return Err(Error::Corrupt("trailing bytes after bucket frames"));
        }
        // Let reassembly load up to 8 bytes past any bucket's last byte.
        self.arena.extend_from_slice(&[0u8; 8]);
        Ok(())
    }

    /// The normative portable reassembly loop.  Returns the record count.
    fn reassemble(
        &mut self,
        mut shape: &[u8],
        selected: Option<&[Symbol]>,
        dst: &mut Vec<u8>,
    ) -> Result<usize> {
        let mut records = 0usize;
        let mut rec_start: Option<usize> = None;
        while !shape.is_empty() {
            let (entry, n) = shape::read_entry(shape)?;
            shape = &shape[n..];
            let start = *rec_start.get_or_insert(dst.len());

            for i in 0..entry.fields {
                let b = entry.bucket(i) as usize;
                if self.pos[b] < 0 {
                    continue;
                }
                let off = self.pos[b] as usize + self.base[b] as usize;
                let end = self.pos[b] as usize + self.lens[b] as usize;
                if off >= end {
                    return Err(Error::Truncated("bucket cursor at end"));
                }
                let slice = &self.arena[off..end];
                let (sym, flen) = ion::read_field(slice)?;
                if slice.len() < flen {
                    return Err(Error::Truncated("bucket value"));
                }
                self.base[b] += flen as u32;
                let emit = match selected {
                    None => true,
                    Some(sel) => sel.binary_search(&sym).is_ok(),
                };
                if emit {
                    dst.extend_from_slice(&self.arena[off..off + flen]);
                }
            }

            if !entry.is_continuation() {
                finish_record(dst, start, entry.class)?;
                rec_start = None;
                records += 1;
            }
        }
        if rec_start.is_some() {
            return Err(Error::Corrupt("shape stream ends mid-record"));
        }
        Ok(records)
    }

    /// Single-field projection fast path: walk one bucket linearly and
    /// emit `{field: value}` per entry, padding with empty records to
    /// preserve the block's record count (order within the block may
    /// permute).
    fn decode_single_field(
        &mut self,
        algo: Algo,
        sym: Option<Symbol>,
        shape_stream: &[u8],
        buckets_src: &[u8],
        dst: &mut Vec<u8>,
    ) -> Result<usize> {
        let records = shape::count_records(shape_stream)?;
        let Some(sym) = sym else {
            // Unresolved path: nothing to find, emit `records` empty
            // structs without touching any bucket.
            self.load_buckets(algo, buckets_src, 0)?;
            dst.resize(dst.len() + records, 0xD0);
            return Ok(records);
        };

        let bucket = self.table.get(sym) as usize;
        self.load_buckets(algo, buckets_src, 1 << bucket)?;
        let start = self.pos[bucket] as usize;
        let mut cur = &self.arena[start..start + self.lens[bucket] as usize];

        let mut emitted = 0usize;
        while !cur.is_empty() {
            let (fsym, flen) = ion::read_field(cur)?;
            if cur.len() < flen {
                return Err(Error::Truncated("bucket value"));
            }
            if fsym == sym {
                let class = ion::size_class(flen)?;
                ion::write_struct_header(dst, class, flen);
                dst.extend_from_slice(&cur[..flen]);
                emitted += 1;
            }
            cur = &cur[flen..];
        }
        if emitted > records {
            return Err(Error::Corrupt("bucket holds more fields than records"));
        }
        dst.resize(dst.len() + (records - emitted), 0xD0);
        Ok(records)
    }
}

/// Insert the struct header for a finished record whose fields occupy
/// `dst[start..]`, shifting the payload right by the header width.
fn finish_record(dst: &mut Vec<u8>, start: usize, class: u8) -> Result<()> {
    let payload = dst.len() - start;
    let cap: usize = match class {
        0 => 0x0E,
        1 => 1 << 7,
        2 => 1 << 14,
        _ => 1 << 21,
    };
    if payload >= cap {
        return Err(Error::Corrupt("record payload exceeds its size class"));
    }
    let hdr_len = ion::struct_header_len(class);
    dst.resize(dst.len() + hdr_len, 0);
    dst.copy_within(start..start + payload, start + hdr_len);

    let mut hdr = Vec::with_capacity(4);
    ion::write_struct_header(&mut hdr, class, payload);
    dst[start..start + hdr_len].copy_from_slice(&hdr);
    Ok(())
}
