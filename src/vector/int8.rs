//! Raw int8 vector codec.
//!
//! Bucket contents are `(label, list<int>)` pairs, every pair carrying the
//! same label and every element fitting a signed byte.  Encoded stream:
//!
//! ```text
//! varuint(label)
//! repeat { varuint(list_byte_length); list_byte_length element bytes }
//! ```
//!
//! An element byte is `0x00` for zero, the raw value for positive ints,
//! and the two's-complement byte for negative ints.

use crate::error::{Error, Result};
use crate::ion::{self, Type};

/// Encode a bucket of int8 lists.  Rejects empty buckets, mixed labels,
/// non-list values, and elements outside `[-128, 127]`.
pub fn encode(bucket: &[u8]) -> Result<Vec<u8>> {
    if bucket.is_empty() {
        return Err(Error::EmptyField);
    }
    let mut out = Vec::new();
    let mut label: Option<ion::Symbol> = None;
    let mut cur = bucket;
    while !cur.is_empty() {
        let (sym, lab_len) = ion::read_varuint(cur)?;
        let h = ion::parse_header(&cur[lab_len..])?;
        if h.ty != Type::List || h.is_null {
            return Err(Error::Corrupt("int8 bucket value is not a list"));
        }
        let start = lab_len + h.hdr_len;
        let end = start + h.len;
        if cur.len() < end {
            return Err(Error::Truncated("int8 bucket list"));
        }
        match label {
            None => {
                label = Some(sym as ion::Symbol);
                ion::write_varuint(&mut out, sym);
            }
            Some(l) if l as u64 != sym => {
                return Err(Error::Corrupt("int8 bucket labels differ"));
            }
            Some(_) => {}
        }
        let elems = encode_list(&cur[start..end])?;
        ion::write_varuint(&mut out, elems.len() as u64);
        out.extend_from_slice(&elems);
        cur = &cur[end..];
    }
    Ok(out)
}

fn encode_list(mut list: &[u8]) -> Result<Vec<u8>> {
    let mut elems = Vec::with_capacity(list.len());
    while !list.is_empty() {
        let h = ion::parse_header(list)?;
        let total = h.hdr_len + h.len;
        if list.len() < total {
            return Err(Error::Truncated("int8 list element"));
        }
        if h.is_null || h.len > 1 {
            return Err(Error::Corrupt("int8 element out of range"));
        }
        let mag = if h.len == 1 { list[h.hdr_len] as i32 } else { 0 };
        let v = match h.ty {
            Type::PosInt => {
                if mag > i8::MAX as i32 {
                    return Err(Error::Corrupt("int8 element out of range"));
                }
                mag
            }
            Type::NegInt => {
                if mag == 0 || mag > 128 {
                    return Err(Error::Corrupt("int8 element out of range"));
                }
                -mag
            }
            _ => return Err(Error::Corrupt("int8 element is not an integer")),
        };
        elems.push(v as i8 as u8);
        list = &list[total..];
    }
    Ok(elems)
}

/// Decode an int8 vector stream, appending the reconstructed
/// `(label, list)` pairs to `dst`.
pub fn decode(body: &[u8], dst: &mut Vec<u8>) -> Result<()> {
    let (label, n) = ion::read_varuint(body)?;
    if label > u32::MAX as u64 {
        return Err(Error::Corrupt("int8 label out of range"));
    }
    let mut cur = &body[n..];
    let mut payload = Vec::new();
    while !cur.is_empty() {
        let (len, m) = ion::read_varuint(cur)?;
        let len = len as usize;
        cur = &cur[m..];
        if cur.len() < len {
            return Err(Error::Truncated("int8 element bytes"));
        }
        payload.clear();
        payload.reserve(len * 2);
        for &b in &cur[..len] {
            match b as i8 {
                0 => payload.push(0x20),
                v if v > 0 => payload.extend_from_slice(&[0x21, v as u8]),
                v => payload.extend_from_slice(&[0x31, v.unsigned_abs()]),
            }
        }
        ion::write_varuint(dst, label);
        ion::write_container(dst, Type::List, &payload);
        cur = &cur[len..];
    }
    Ok(())
}
