//! Utilities to approximate equality of floating point values.
//!
//! Matrices are `f32` throughout, so only the `f32` tolerances are kept.

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The expected minimum epsilon accepted on `f32`s.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected epsilon accepted on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// Checks the relative distance based off epsilon.
pub trait RelativeEq<Rhs: ?Sized> {
    /// Enumerates the equality of `self`
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

impl RelativeEq<Self> for f32 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        // identical infinities (and identical bit patterns) are exact
        if self == rhs || (self.is_nan() && rhs.is_nan()) {
            return ApproxEquality::Precise;
        }
        let dif = (self - rhs).abs();

        if dif < F32_MIN_ERROR {
            ApproxEquality::Precise
        } else if dif < F32_AVG_ERROR {
            ApproxEquality::Partial
        } else if dif < F32_MAX_ERROR {
            ApproxEquality::Relative
        } else {
            ApproxEquality::Scarce
        }
    }
}

impl<T: RelativeEq<U>, U> RelativeEq<[U]> for [T] {
    fn approx_eq(&self, rhs: &[U]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        self.iter()
            .zip(rhs.iter())
            .map(|(t, u)| t.approx_eq(u))
            .max()
            .unwrap_or(ApproxEquality::Precise)
    }
}

/// The approximated equality enumerated.
///
/// Variants are ordered from best to worst, so the rating of a collection
/// is the maximum rating of its elements.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Approximates equality based off the relative difference.
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) == ApproxEquality::Precise
}

/// Approximates equality, accepting anything better than [`ApproxEquality::Scarce`].
pub fn roughly_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) != ApproxEquality::Scarce
}

/// Absolute-tolerance comparison of two slices.
pub fn within(a: &[f32], b: &[f32], tolerance: f32) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x == y || (x - y).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_rating_is_worst_element() {
        let a = [1.0_f32, 2.0, 3.0];
        let b = [1.0_f32, 2.000_002, 3.000_5];
        assert_eq!(a[..].approx_eq(&b[..]), ApproxEquality::Relative);
        assert!(roughly_eq(&a[..], &b[..]));
        assert!(!approx_eq(&a[..], &b[..]));
    }

    #[test]
    fn length_mismatch_is_scarce() {
        let a = [1.0_f32];
        let b = [1.0_f32, 1.0];
        assert_eq!(a[..].approx_eq(&b[..]), ApproxEquality::Scarce);
    }
}
