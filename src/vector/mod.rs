//! Specialized bucket codecs.
//!
//! When a bucket holds nothing but `(label, list)` pairs of small integers
//! or numbers, encoding the elements directly beats handing the raw bytes
//! to a general-purpose compressor.  Two sub-codecs exist:
//!
//! - [`int8`] — lists of integers in `[-128, 127]`, one byte per element.
//! - [`numeric`] — lists of 8-byte floats, clustered per-run into the
//!   narrowest lossless encoding (zeros, small ints, compact decimal
//!   floats, raw IEEE-754).
//!
//! Both share the outer framing: the common label once, then one group per
//! list.  Encoders reject unsuitable buckets with an error; the frame
//! layer treats any rejection as "fall back to the unspecialized codec".
//! Decoders reproduce the exact canonical record-format bytes the encoder
//! consumed (bitwise for `f64` values).

pub mod int8;
pub mod numeric;
