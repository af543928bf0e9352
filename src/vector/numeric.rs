//! Clustered numeric vector codec.
//!
//! Bucket contents are `(label, list<float64>)` pairs sharing one label.
//! Encoded stream:
//!
//! ```text
//! varuint(label)
//! repeat { varuint(element_count); varuint(list_byte_len); clusters }
//! ```
//!
//! A cluster is a one-byte header `encoding:3 | count_minus_1:5` followed
//! by its payload:
//!
//! | id | name | payload per element |
//! |----|------|---------------------|
//! | 0  | Int0 | none — the cluster is N zeros |
//! | 1  | IntX | single integer; low header bits are `sign<<3 | len-1`, payload `len` LE bytes |
//! | 2  | Int8 | one signed byte |
//! | 3  | CF12 | 12-bit compact float, two per 3 bytes; exponent from {1e3, 1e4} |
//! | 4  | CF16 | 16-bit compact float, two per 4 bytes; exponent from {1e4, 1e5} |
//! | 5  | CF24 | 3 bytes; 3-bit exponent from {1e5..1e11, 1e13}, 21-bit mantissa |
//! | 6  | CF32 | 4 bytes; exponent from {1e9, 1e13}, 31-bit mantissa |
//! | 7  | FP64 | 8 bytes, IEEE-754 little-endian |
//!
//! CF12/CF16 headers count *pairs*, so a coalesced cluster can span up to
//! 64 elements; every other encoding caps at 32.  A compact-float
//! encoding is only ever chosen when decode(encode(v)) reproduces `v`
//! bitwise; integer-valued elements always use the integer encodings.
//! Decoded elements are emitted as the 8-byte big-endian float form.

use crate::error::{Error, Result};
use crate::ion::{self, Type};

const CF12_EXP: [f64; 2] = [1e3, 1e4];
const CF16_EXP: [f64; 2] = [1e4, 1e5];
const CF24_EXP: [f64; 8] = [1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e13];
const CF32_EXP: [f64; 2] = [1e9, 1e13];

/// Elements per cluster before coalescing.
const CLUSTER_CAP: usize = 32;

/// Minimum run length that justifies its own cluster, per encoding.
/// Shorter runs are absorbed into the surrounding wider cluster.
const CLUSTER_SIZE_HINT: [usize; 8] = [1, 1, 2, 4, 6, 8, 8, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Enc {
    Int0 = 0,
    IntX = 1,
    Int8 = 2,
    Cf12 = 3,
    Cf16 = 4,
    Cf24 = 5,
    Cf32 = 6,
    Fp64 = 7,
}

impl Enc {
    fn from_tag(tag: u8) -> Result<Enc> {
        Ok(match tag {
            0 => Enc::Int0,
            1 => Enc::IntX,
            2 => Enc::Int8,
            3 => Enc::Cf12,
            4 => Enc::Cf16,
            5 => Enc::Cf24,
            6 => Enc::Cf32,
            7 => Enc::Fp64,
            _ => return Err(Error::Corrupt("cluster encoding tag")),
        })
    }

    /// Payload bytes per element, doubled so CF12 stays integral.
    fn cost_x2(self) -> u32 {
        match self {
            Enc::Int0 => 0,
            Enc::Int8 => 2,
            Enc::Cf12 => 3,
            Enc::Cf16 => 4,
            Enc::Cf24 => 6,
            Enc::Cf32 => 8,
            Enc::IntX => 12,
            Enc::Fp64 => 16,
        }
    }

    fn hint(self) -> usize {
        CLUSTER_SIZE_HINT[self as usize]
    }
}

// ── Per-value classification ─────────────────────────────────────────────────

/// `v` reproduced bitwise by an i64 round-trip (rules out -0.0 and NaN).
#[inline]
fn as_integer(v: f64) -> Option<i64> {
    let i = v as i64;
    if (i as f64).to_bits() == v.to_bits() {
        Some(i)
    } else {
        None
    }
}

/// Find `(selector, mantissa)` such that `mantissa / exps[selector]`
/// reproduces `v` bitwise and the mantissa fits `bits` signed bits.
fn compact_params(v: f64, exps: &[f64], bits: u32) -> Option<(u8, i32)> {
    let lo = -(1i64 << (bits - 1));
    let hi = (1i64 << (bits - 1)) - 1;
    for (s, &e) in exps.iter().enumerate() {
        let m = (v * e).round();
        if !m.is_finite() {
            continue;
        }
        let mi = m as i64;
        if mi < lo || mi > hi {
            continue;
        }
        if (mi as f64 / e).to_bits() == v.to_bits() {
            return Some((s as u8, mi as i32));
        }
    }
    None
}

/// Narrowest encoding that losslessly represents `v`.
fn narrowest(v: f64) -> Enc {
    if let Some(i) = as_integer(v) {
        return match i {
            0 => Enc::Int0,
            -128..=127 => Enc::Int8,
            _ => Enc::IntX,
        };
    }
    if compact_params(v, &CF12_EXP, 11).is_some() {
        Enc::Cf12
    } else if compact_params(v, &CF16_EXP, 15).is_some() {
        Enc::Cf16
    } else if compact_params(v, &CF24_EXP, 21).is_some() {
        Enc::Cf24
    } else if compact_params(v, &CF32_EXP, 31).is_some() {
        Enc::Cf32
    } else {
        Enc::Fp64
    }
}

/// Can `v` be carried by encoding `e` without loss?
fn representable(v: f64, e: Enc) -> bool {
    match e {
        Enc::Int0 => v.to_bits() == 0,
        Enc::Int8 => matches!(as_integer(v), Some(-128..=127)),
        Enc::IntX => as_integer(v).is_some(),
        Enc::Cf12 => compact_params(v, &CF12_EXP, 11).is_some(),
        Enc::Cf16 => compact_params(v, &CF16_EXP, 15).is_some(),
        Enc::Cf24 => compact_params(v, &CF24_EXP, 21).is_some(),
        Enc::Cf32 => compact_params(v, &CF32_EXP, 31).is_some(),
        Enc::Fp64 => true,
    }
}

#[inline]
fn is_float_enc(e: Enc) -> bool {
    matches!(e, Enc::Cf12 | Enc::Cf16 | Enc::Cf24 | Enc::Cf32 | Enc::Fp64)
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Encode a bucket of float64 lists.  Rejects empty buckets, mixed
/// labels, and any element that is not an 8-byte float.
pub fn encode(bucket: &[u8]) -> Result<Vec<u8>> {
    if bucket.is_empty() {
        return Err(Error::EmptyField);
    }
    let mut out = Vec::new();
    let mut label: Option<u64> = None;
    let mut cur = bucket;
    while !cur.is_empty() {
        let (sym, lab_len) = ion::read_varuint(cur)?;
        let h = ion::parse_header(&cur[lab_len..])?;
        if h.ty != Type::List || h.is_null {
            return Err(Error::Corrupt("numeric bucket value is not a list"));
        }
        let start = lab_len + h.hdr_len;
        let end = start + h.len;
        if cur.len() < end {
            return Err(Error::Truncated("numeric bucket list"));
        }
        match label {
            None => {
                label = Some(sym);
                ion::write_varuint(&mut out, sym);
            }
            Some(l) if l != sym => {
                return Err(Error::Corrupt("numeric bucket labels differ"));
            }
            Some(_) => {}
        }

        let values = parse_float_list(&cur[start..end])?;
        ion::write_varuint(&mut out, values.len() as u64);
        ion::write_varuint(&mut out, h.len as u64);
        encode_values(&values, &mut out);
        cur = &cur[end..];
    }
    Ok(out)
}

fn parse_float_list(mut list: &[u8]) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(list.len() / 9);
    while !list.is_empty() {
        if list[0] != 0x48 || list.len() < 9 {
            return Err(Error::Corrupt("numeric element is not an 8-byte float"));
        }
        let bits = u64::from_be_bytes(list[1..9].try_into().unwrap());
        values.push(f64::from_bits(bits));
        list = &list[9..];
    }
    Ok(values)
}

/// Split `values` into clusters and emit them.
fn encode_values(values: &[f64], out: &mut Vec<u8>) {
    // Phase 1: greedy runs of a shared encoding, absorbing short narrow
    // runs and widening short clusters instead of fragmenting.
    let enc: Vec<Enc> = values.iter().map(|&v| narrowest(v)).collect();
    let mut clusters: Vec<(Enc, usize, usize)> = Vec::new(); // (enc, start, len)
    let mut i = 0;
    while i < values.len() {
        let mut e = enc[i];
        if e == Enc::IntX {
            clusters.push((e, i, 1));
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < values.len() && j - i < CLUSTER_CAP {
            let ej = enc[j];
            if ej == e {
                j += 1;
                continue;
            }
            if ej == Enc::IntX || is_float_enc(ej) != is_float_enc(e) {
                // Integer values never ride in float clusters (or vice
                // versa); IntX always stands alone.
                break;
            }
            if ej.cost_x2() < e.cost_x2() && representable(values[j], e) {
                // A narrower value: absorb it unless enough follow to be
                // worth their own cluster.
                if run_len(&enc, j) >= ej.hint() {
                    break;
                }
                j += 1;
                continue;
            }
            if ej.cost_x2() > e.cost_x2()
                && j - i < e.hint()
                && values[i..j].iter().all(|&v| representable(v, ej))
            {
                // The run so far is too short to stand alone: widen it.
                e = ej;
                j += 1;
                continue;
            }
            break;
        }
        // CF12/CF16 clusters must hold an even element count.
        if matches!(e, Enc::Cf12 | Enc::Cf16) && (j - i) % 2 == 1 {
            if j - i == 1 {
                // Lone value: promote rather than emit a one-element pair
                // encoding.
                e = if representable(values[i], Enc::Cf24) {
                    Enc::Cf24
                } else {
                    Enc::Fp64
                };
            } else {
                j -= 1;
            }
        }
        clusters.push((e, i, j - i));
        i = j;
    }

    // Phase 2: coalesce adjacent CF12/CF12 and CF16/CF16 clusters through
    // the pair-counted header (up to 32 pairs = 64 elements).
    let mut merged: Vec<(Enc, usize, usize)> = Vec::new();
    for (e, start, len) in clusters {
        if let Some(&mut (pe, _, ref mut plen)) = merged.last_mut() {
            if pe == e
                && matches!(e, Enc::Cf12 | Enc::Cf16)
                && *plen + len <= 2 * CLUSTER_CAP
            {
                *plen += len;
                continue;
            }
        }
        merged.push((e, start, len));
    }

    for (e, start, len) in merged {
        emit_cluster(e, &values[start..start + len], out);
    }
}

/// Length of the homogeneous run starting at `j`, capped by the
/// lookahead window.
fn run_len(enc: &[Enc], j: usize) -> usize {
    enc[j..]
        .iter()
        .take(8)
        .take_while(|&&e| e == enc[j])
        .count()
}

fn emit_cluster(e: Enc, vals: &[f64], out: &mut Vec<u8>) {
    debug_assert!(!vals.is_empty());
    match e {
        Enc::Int0 => {
            out.push(header(e, vals.len()));
        }
        Enc::Int8 => {
            out.push(header(e, vals.len()));
            for &v in vals {
                out.push((v as i64) as i8 as u8);
            }
        }
        Enc::IntX => {
            let i = vals[0] as i64;
            let mag = i.unsigned_abs();
            let len = (((64 - mag.leading_zeros() + 7) / 8).max(1)) as usize;
            let sign = (i < 0) as u8;
            out.push((Enc::IntX as u8) << 5 | sign << 3 | (len as u8 - 1));
            out.extend_from_slice(&mag.to_le_bytes()[..len]);
        }
        Enc::Cf12 => {
            out.push(header_pairs(e, vals.len()));
            for pair in vals.chunks_exact(2) {
                let a = cf_bits(pair[0], &CF12_EXP, 11);
                let b = cf_bits(pair[1], &CF12_EXP, 11);
                let packed = a | b << 12;
                out.extend_from_slice(&packed.to_le_bytes()[..3]);
            }
        }
        Enc::Cf16 => {
            out.push(header_pairs(e, vals.len()));
            for pair in vals.chunks_exact(2) {
                let a = cf_bits(pair[0], &CF16_EXP, 15);
                let b = cf_bits(pair[1], &CF16_EXP, 15);
                let packed = a | b << 16;
                out.extend_from_slice(&packed.to_le_bytes());
            }
        }
        Enc::Cf24 => {
            out.push(header(e, vals.len()));
            for &v in vals {
                let bits = cf_bits(v, &CF24_EXP, 21);
                out.extend_from_slice(&bits.to_le_bytes()[..3]);
            }
        }
        Enc::Cf32 => {
            out.push(header(e, vals.len()));
            for &v in vals {
                let bits = cf_bits(v, &CF32_EXP, 31);
                out.extend_from_slice(&bits.to_le_bytes());
            }
        }
        Enc::Fp64 => {
            out.push(header(e, vals.len()));
            for &v in vals {
                out.extend_from_slice(&v.to_bits().to_le_bytes());
            }
        }
    }
}

#[inline]
fn header(e: Enc, count: usize) -> u8 {
    debug_assert!((1..=CLUSTER_CAP).contains(&count));
    (e as u8) << 5 | (count as u8 - 1)
}

#[inline]
fn header_pairs(e: Enc, count: usize) -> u8 {
    debug_assert!(count % 2 == 0 && count <= 2 * CLUSTER_CAP);
    let pairs = count / 2;
    (e as u8) << 5 | (pairs as u8 - 1)
}

/// Bit pattern `selector<<bits | mantissa` for a value already known to be
/// representable.
fn cf_bits(v: f64, exps: &[f64], bits: u32) -> u32 {
    let (s, m) = match compact_params(v, exps, bits) {
        Some(p) => p,
        // encode_values only routes representable values here
        None => unreachable!("unrepresentable compact float"),
    };
    (s as u32) << bits | (m as u32 & ((1 << bits) - 1))
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Decode a numeric vector stream, appending the reconstructed
/// `(label, list)` pairs to `dst`.
pub fn decode(body: &[u8], dst: &mut Vec<u8>) -> Result<()> {
    let (label, n) = ion::read_varuint(body)?;
    if label > u32::MAX as u64 {
        return Err(Error::Corrupt("numeric label out of range"));
    }
    let mut cur = &body[n..];
    let mut payload = Vec::new();
    while !cur.is_empty() {
        let (count, a) = ion::read_varuint(cur)?;
        let (list_len, b) = ion::read_varuint(&cur[a..])?;
        cur = &cur[a + b..];

        payload.clear();
        let mut decoded = 0u64;
        while decoded < count {
            let consumed = decode_cluster(cur, &mut payload, &mut decoded)?;
            cur = &cur[consumed..];
        }
        if decoded != count {
            return Err(Error::Corrupt("cluster counts overshoot the list"));
        }
        if payload.len() as u64 != list_len {
            return Err(Error::Corrupt("numeric list length mismatch"));
        }
        ion::write_varuint(dst, label);
        ion::write_container(dst, Type::List, &payload);
    }
    Ok(())
}

/// Decode one cluster; pushes 8-byte float elements onto `payload` and
/// bumps `decoded`.  Returns the cluster's encoded size.
fn decode_cluster(cur: &[u8], payload: &mut Vec<u8>, decoded: &mut u64) -> Result<usize> {
    let &h = cur.first().ok_or(Error::Truncated("cluster header"))?;
    let e = Enc::from_tag(h >> 5)?;
    let cf = (h & 0x1F) as usize;
    let body = &cur[1..];

    let mut push = |v: f64| {
        payload.push(0x48);
        payload.extend_from_slice(&v.to_bits().to_be_bytes());
        *decoded += 1;
    };

    let consumed = match e {
        Enc::Int0 => {
            for _ in 0..=cf {
                push(0.0);
            }
            0
        }
        Enc::IntX => {
            let len = (cf & 7) + 1;
            if body.len() < len {
                return Err(Error::Truncated("intx payload"));
            }
            let mut mag = [0u8; 8];
            mag[..len].copy_from_slice(&body[..len]);
            let mag = u64::from_le_bytes(mag);
            let v = if cf & 8 != 0 { -(mag as f64) } else { mag as f64 };
            push(v);
            len
        }
        Enc::Int8 => {
            let n = cf + 1;
            if body.len() < n {
                return Err(Error::Truncated("int8 cluster payload"));
            }
            for &b in &body[..n] {
                push(b as i8 as f64);
            }
            n
        }
        Enc::Cf12 => {
            let pairs = cf + 1;
            if body.len() < pairs * 3 {
                return Err(Error::Truncated("cf12 cluster payload"));
            }
            for chunk in body[..pairs * 3].chunks_exact(3) {
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], 0]);
                push(cf_value(bits & 0xFFF, &CF12_EXP, 11));
                push(cf_value(bits >> 12 & 0xFFF, &CF12_EXP, 11));
            }
            pairs * 3
        }
        Enc::Cf16 => {
            let pairs = cf + 1;
            if body.len() < pairs * 4 {
                return Err(Error::Truncated("cf16 cluster payload"));
            }
            for chunk in body[..pairs * 4].chunks_exact(4) {
                let bits = u32::from_le_bytes(chunk.try_into().unwrap());
                push(cf_value(bits & 0xFFFF, &CF16_EXP, 15));
                push(cf_value(bits >> 16, &CF16_EXP, 15));
            }
            pairs * 4
        }
        Enc::Cf24 => {
            let n = cf + 1;
            if body.len() < n * 3 {
                return Err(Error::Truncated("cf24 cluster payload"));
            }
            for chunk in body[..n * 3].chunks_exact(3) {
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], 0]);
                push(cf_value(bits, &CF24_EXP, 21));
            }
            n * 3
        }
        Enc::Cf32 => {
            let n = cf + 1;
            if body.len() < n * 4 {
                return Err(Error::Truncated("cf32 cluster payload"));
            }
            for chunk in body[..n * 4].chunks_exact(4) {
                let bits = u32::from_le_bytes(chunk.try_into().unwrap());
                push(cf_value(bits, &CF32_EXP, 31));
            }
            n * 4
        }
        Enc::Fp64 => {
            let n = cf + 1;
            if body.len() < n * 8 {
                return Err(Error::Truncated("fp64 cluster payload"));
            }
            for chunk in body[..n * 8].chunks_exact(8) {
                push(f64::from_bits(u64::from_le_bytes(chunk.try_into().unwrap())));
            }
            n * 8
        }
    };
    Ok(1 + consumed)
}

/// Reconstruct a compact-float value from its packed bits.
fn cf_value(bits: u32, exps: &[f64], mant_bits: u32) -> f64 {
    let sel = (bits >> mant_bits) as usize;
    let shift = 32 - mant_bits;
    let m = ((bits << shift) as i32) >> shift;
    m as f64 / exps[sel]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_of(label: u64, lists: &[&[f64]]) -> Vec<u8> {
        let mut out = Vec::new();
        for vals in lists {
            let mut payload = Vec::new();
            for &v in *vals {
                ion::write_f64(&mut payload, v);
            }
            ion::write_varuint(&mut out, label);
            ion::write_container(&mut out, Type::List, &payload);
        }
        out
    }

    fn roundtrip(vals: &[f64]) {
        let bucket = bucket_of(10, &[vals]);
        let enc = encode(&bucket).unwrap();
        let mut dec = Vec::new();
        decode(&enc, &mut dec).unwrap();
        assert_eq!(dec, bucket, "values {vals:?}");
    }

    #[test]
    fn narrowest_classification() {
        assert_eq!(narrowest(0.0), Enc::Int0);
        assert_eq!(narrowest(3.0), Enc::Int8);
        assert_eq!(narrowest(-128.0), Enc::Int8);
        assert_eq!(narrowest(1000.0), Enc::IntX);
        assert_eq!(narrowest(0.015), Enc::Cf12);
        assert_eq!(narrowest(0.12345), Enc::Cf16);
        assert_eq!(narrowest(1.33333), Enc::Cf24);
        assert_eq!(narrowest(0.234567891), Enc::Cf32);
        assert_eq!(narrowest(std::f64::consts::PI), Enc::Fp64);
        // -0.0 is not integer-representable bitwise.
        assert_eq!(narrowest(-0.0), Enc::Fp64);
    }

    #[test]
    fn roundtrip_per_encoding() {
        roundtrip(&[0.0; 5]);
        roundtrip(&[1.0, -1.0, 127.0, -128.0]);
        roundtrip(&[1000.0, -70000.0, 9007199254740991.0]); // 2^53 - 1
        roundtrip(&[0.001, -0.002, 0.003, 0.004]);
        roundtrip(&[0.12345, -0.54321, 1.2345, -1.5432]);
        roundtrip(&[1.33333, 2.44444, -3.55555]);
        roundtrip(&[0.234567891, -0.123456789]);
        roundtrip(&[std::f64::consts::PI, std::f64::consts::E, -0.0]);
    }

    #[test]
    fn roundtrip_mixed_and_multi_list() {
        let lists: Vec<Vec<f64>> = vec![
            vec![0.0, 1.5, 2.0, -0.25, 1e-4, 1e-5],
            vec![],
            vec![9007199254740991.0, -0.0, 0.5],
        ];
        let refs: Vec<&[f64]> = lists.iter().map(|l| l.as_slice()).collect();
        let bucket = bucket_of(12, &refs);
        let enc = encode(&bucket).unwrap();
        let mut dec = Vec::new();
        decode(&enc, &mut dec).unwrap();
        assert_eq!(dec, bucket);
    }

    #[test]
    fn long_runs_split_and_coalesce() {
        // 100 CF12-able values: phase 1 caps clusters at 32 elements,
        // phase 2 coalesces adjacent pairs up to 64.
        let vals: Vec<f64> = (0..100).map(|i| (i % 7 + 1) as f64 / 1e3).collect();
        roundtrip(&vals);

        let vals: Vec<f64> = (0..80).map(|i| (i + 1) as f64).collect();
        roundtrip(&vals); // Int8 then IntX territory
    }

    #[test]
    fn lone_compact_pair_value_is_promoted() {
        // One CF12-able value between integers cannot form a pair; it must
        // still round-trip (via CF24 or wider).
        roundtrip(&[1.0, 0.015, 2.0]);
    }

    #[test]
    fn rejects_non_float_lists() {
        let mut payload = Vec::new();
        ion::write_int(&mut payload, 3);
        let mut bucket = Vec::new();
        ion::write_varuint(&mut bucket, 10);
        ion::write_container(&mut bucket, Type::List, &payload);
        assert!(encode(&bucket).is_err());
        assert!(matches!(encode(&[]), Err(Error::EmptyField)));
    }

    #[test]
    fn proptest_style_sweep() {
        // Deterministic pseudo-random doubles across magnitudes.
        let mut rng = 0x9E3779B97F4A7C15u64;
        let mut vals = Vec::new();
        for i in 0..400 {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let v = match i % 5 {
                0 => (rng % 256) as f64 - 128.0,
                1 => (rng % 2048) as f64 / 1e3,
                2 => (rng % 100_000) as f64 / 1e5,
                3 => f64::from_bits(rng >> 2 | 0x3FF0_0000_0000_0000),
                _ => (rng % 1_000_000_000) as f64,
            };
            vals.push(v);
        }
        roundtrip(&vals);
    }
}
