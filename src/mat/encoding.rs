//! Binary matrix format.
//!
//! # Layout
//!
//! ```text
//! ┌──────────┬──────────┬──────────────────────────────┐
//! │ i32 rows │ i32 cols │ [f32; rows * cols] row-major │
//! └──────────┴──────────┴──────────────────────────────┘
//! ```
//!
//! Every field is little-endian. A sequence of matrices is stored as the
//! matrices back to back, with no count in front: the reader must know
//! how many to expect.
//!
//! # Failures
//!
//! Decoding never treats a short read as a clean end of stream:
//!
//! - a header whose `rows * cols` is not positive is [`DecodeError::InvalidSize`];
//! - one larger than the largest possible `f32` buffer is [`DecodeError::TooLarge`];
//! - a stream that ends anywhere inside a matrix is [`DecodeError::Truncated`].
//!
//! # Example
//!
//! ```rust
//! use briny_grad::mat::Dense;
//! use briny_grad::mat::encoding::{decode_dense, encode_dense};
//!
//! let d = Dense::new(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! let mut bytes = Vec::new();
//! encode_dense(&mut bytes, &d).unwrap();
//! assert_eq!(bytes.len(), 8 + 6 * 4);
//!
//! let back = decode_dense(&mut bytes.as_slice()).unwrap();
//! assert_eq!(back, d);
//! ```

use std::io::{ErrorKind, Read, Write};

use briny::prelude::*;

use super::Dense;
use crate::error::DecodeError;

const HEADER_LEN: usize = 8;

/// Largest element count whose byte length still fits an allocation.
const MAX_ELEMENTS: i64 = (isize::MAX as i64) / 4;

/// A decoded matrix before it becomes a pooled [`Dense`].
struct PackedMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Validate for PackedMatrix {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.rows == 0 || self.cols == 0 || self.data.len() != self.rows * self.cols {
            return Err(ValidationError);
        }
        Ok(())
    }
}

fn read_exact(r: &mut impl Read, buf: &mut [u8]) -> Result<(), DecodeError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => DecodeError::Truncated { expected: buf.len() },
        _ => DecodeError::Io(e),
    })
}

/// Writes one matrix.
///
/// # Errors
///
/// [`DecodeError::TooLarge`] if a dimension does not fit an `i32`, otherwise
/// any I/O failure of `w`.
pub fn encode_dense(w: &mut impl Write, d: &Dense) -> Result<(), DecodeError> {
    let too_large = || DecodeError::TooLarge {
        rows: i32::try_from(d.rows()).unwrap_or(i32::MAX),
        cols: i32::try_from(d.cols()).unwrap_or(i32::MAX),
    };
    let rows = i32::try_from(d.rows()).map_err(|_| too_large())?;
    let cols = i32::try_from(d.cols()).map_err(|_| too_large())?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + d.size() * 4);
    bytes.extend_from_slice(&rows.to_le_bytes());
    bytes.extend_from_slice(&cols.to_le_bytes());
    for &v in d.data() {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    w.write_all(&bytes)?;
    Ok(())
}

/// Reads one matrix into a pooled [`Dense`].
///
/// # Errors
///
/// See the [module documentation](self).
pub fn decode_dense(r: &mut impl Read) -> Result<Dense, DecodeError> {
    let mut header = [0u8; HEADER_LEN];
    read_exact(r, &mut header)?;
    let rows = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let cols = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let size = i64::from(rows) * i64::from(cols);
    if rows <= 0 || cols <= 0 || size <= 0 {
        return Err(DecodeError::InvalidSize { rows, cols });
    }
    if size > MAX_ELEMENTS {
        return Err(DecodeError::TooLarge { rows, cols });
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let (rows, cols, size) = (rows as usize, cols as usize, size as usize);
    // grow with the stream so a lying header cannot force a huge allocation
    let want = size * 4;
    let mut raw = Vec::with_capacity(want.min(1 << 20));
    r.by_ref().take(want as u64).read_to_end(&mut raw)?;
    if raw.len() < want {
        return Err(DecodeError::Truncated {
            expected: want - raw.len(),
        });
    }
    let data = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let packed = TrustedData::new(PackedMatrix { rows, cols, data })
        .map_err(|_| DecodeError::Invalid)?
        .into_inner();
    Dense::new(packed.rows, packed.cols, &packed.data).map_err(|_| DecodeError::Invalid)
}

/// Writes every matrix of `ds` back to back.
///
/// # Errors
///
/// As [`encode_dense`].
pub fn encode_dense_slice(w: &mut impl Write, ds: &[Dense]) -> Result<(), DecodeError> {
    for d in ds {
        encode_dense(w, d)?;
    }
    Ok(())
}

/// Reads exactly `count` matrices.
///
/// # Errors
///
/// As [`decode_dense`]; a stream holding fewer than `count` matrices is
/// [`DecodeError::Truncated`].
pub fn decode_dense_slice(r: &mut impl Read, count: usize) -> Result<Vec<Dense>, DecodeError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_dense(r)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(rows: i32, cols: i32, values: &[f32]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&rows.to_le_bytes());
        b.extend_from_slice(&cols.to_le_bytes());
        for v in values {
            b.extend_from_slice(&v.to_le_bytes());
        }
        b
    }

    #[test]
    fn layout_is_little_endian() {
        let d = Dense::new(1, 2, &[1.0, -2.5]).unwrap();
        let mut out = Vec::new();
        encode_dense(&mut out, &d).unwrap();
        assert_eq!(out, bytes_of(1, 2, &[1.0, -2.5]));
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let values = [1.0, f32::MIN_POSITIVE, -0.0, f32::INFINITY, 3.25, f32::from_bits(1)];
        let d = Dense::new(2, 3, &values).unwrap();
        let mut out = Vec::new();
        encode_dense(&mut out, &d).unwrap();
        let back = decode_dense(&mut out.as_slice()).unwrap();
        assert_eq!(back.dims(), (2, 3));
        let bits = |m: &Dense| m.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back), bits(&d));
    }

    #[test]
    fn slice_has_no_length_prefix() {
        let a = Dense::vec(&[1.0, 2.0]);
        let b = Dense::new(2, 2, &[3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut out = Vec::new();
        encode_dense_slice(&mut out, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(out.len(), (8 + 8) + (8 + 16));

        let mut r = out.as_slice();
        let back = decode_dense_slice(&mut r, 2).unwrap();
        assert_eq!(back, vec![a, b]);
        assert!(r.is_empty());
    }

    #[test]
    fn non_positive_sizes_are_invalid() {
        for (rows, cols) in [(0, 3), (-1, 2), (2, -2)] {
            let b = bytes_of(rows, cols, &[]);
            assert!(matches!(
                decode_dense(&mut b.as_slice()),
                Err(DecodeError::InvalidSize { .. })
            ));
        }
    }

    #[test]
    fn oversized_header_is_rejected() {
        let b = bytes_of(i32::MAX, i32::MAX, &[]);
        assert!(matches!(
            decode_dense(&mut b.as_slice()),
            Err(DecodeError::TooLarge { .. })
        ));
        // within the limit but with no payload
        let b = bytes_of(1 << 20, 1 << 8, &[]);
        assert!(matches!(
            decode_dense(&mut b.as_slice()),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn truncation_is_an_error() {
        let full = bytes_of(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        for cut in [0, 3, 8, 15] {
            assert!(matches!(
                decode_dense(&mut &full[..cut]),
                Err(DecodeError::Truncated { .. })
            ));
        }
        let mut r = full.as_slice();
        assert!(matches!(decode_dense_slice(&mut r, 2), Err(DecodeError::Truncated { .. })));
    }
}
