//! Scalar kernels.
//!
//! Every elementwise operation of the engine bottoms out in one of these
//! functions. They wrap the `f32` intrinsics with the edge-case policy the
//! rest of the crate relies on:
//!
//! - `NaN` inputs always produce `NaN` (never a panic, never a sentinel).
//! - Overflow saturates to `±Inf`, underflow flushes to `0.0`.
//! - Subnormal inputs are computed exactly, not flushed.
//! - [`safe_log`] is the only kernel that rejects input: zero maps to a
//!   finite sentinel, negatives are a domain error.

use crate::error::{Error, Result};

/// Largest `x` for which `exp(x)` is finite in `f32`.
pub const EXP_OVERFLOW: f32 = 88.722_84;

/// Smallest `x` for which `exp(x)` is non-zero in `f32` (subnormal range included).
pub const EXP_UNDERFLOW: f32 = -103.972_08;

/// Value substituted for `0` before taking a logarithm.
pub const LOG_EPSILON: f32 = 1e-8;

/// `sqrt(2 / pi)`, used by the tanh approximation of GELU.
const SQRT_2_OVER_PI: f32 = 0.797_884_6;

/// Exponential with explicit saturation.
#[inline]
#[must_use]
pub fn exp(x: f32) -> f32 {
    if x.is_nan() {
        f32::NAN
    } else if x > EXP_OVERFLOW {
        f32::INFINITY
    } else if x < EXP_UNDERFLOW {
        0.0
    } else {
        x.exp()
    }
}

/// Natural logarithm following IEEE-754: `log(0) = -Inf`, `log(x<0) = NaN`.
#[inline]
#[must_use]
pub fn log(x: f32) -> f32 {
    if x.is_nan() || x < 0.0 {
        f32::NAN
    } else if x == 0.0 {
        f32::NEG_INFINITY
    } else {
        x.ln()
    }
}

/// Logarithm used by differentiable operators.
///
/// `0` is replaced by [`LOG_EPSILON`] so the result stays finite.
///
/// # Errors
///
/// Returns [`Error::NegativeLog`] for negative input.
#[inline]
pub fn safe_log(x: f32) -> Result<f32> {
    if x > 0.0 {
        Ok(x.ln())
    } else if x == 0.0 {
        Ok(LOG_EPSILON.ln())
    } else if x.is_nan() {
        Ok(f32::NAN)
    } else {
        Err(Error::NegativeLog(x))
    }
}

/// Hyperbolic tangent, saturating to `±1` where `f32` cannot tell the difference.
#[inline]
#[must_use]
pub fn tanh(x: f32) -> f32 {
    if x > 9.0 {
        1.0
    } else if x < -9.0 {
        -1.0
    } else {
        x.tanh()
    }
}

/// Square root; negative input gives `NaN`, `-0.0` is preserved.
#[inline]
#[must_use]
pub fn sqrt(x: f32) -> f32 {
    if x < 0.0 { f32::NAN } else { x.sqrt() }
}

/// `x` raised to `y`.
///
/// Integral exponents go through `powi`, which is exact for small powers
/// and well defined for negative bases.
#[inline]
#[must_use]
pub fn pow(x: f32, y: f32) -> f32 {
    if y.fract() == 0.0 && y.abs() <= i32::MAX as f32 {
        #[allow(clippy::cast_possible_truncation)]
        let n = y as i32;
        x.powi(n)
    } else {
        x.powf(y)
    }
}

/// Clamps `x` into `[lo, hi]`. `NaN` passes through unchanged.
#[inline]
#[must_use]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

/// Numerically stable logistic function.
#[inline]
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + exp(-x))
    } else {
        let e = exp(x);
        e / (1.0 + e)
    }
}

/// `log(1 + exp(beta * x)) / beta`, linear above `threshold`.
#[inline]
#[must_use]
pub fn softplus(x: f32, beta: f32, threshold: f32) -> f32 {
    let bx = beta * x;
    if bx > threshold {
        x
    } else {
        (1.0 + exp(bx)).ln() / beta
    }
}

/// GELU with the tanh approximation.
#[inline]
#[must_use]
pub fn gelu(x: f32) -> f32 {
    0.5 * x * (1.0 + tanh(SQRT_2_OVER_PI * (x + 0.044_715 * x * x * x)))
}

/// Derivative of [`gelu`].
#[inline]
#[must_use]
pub fn gelu_derivative(x: f32) -> f32 {
    let x3 = x * x * x;
    let inner = SQRT_2_OVER_PI * (x + 0.044_715 * x3);
    let t = tanh(inner);
    let sech2 = 1.0 - t * t;
    0.5 * (1.0 + t) + 0.5 * x * sech2 * SQRT_2_OVER_PI * (1.0 + 3.0 * 0.044_715 * x * x)
}

/// `x * tanh(softplus(x))`.
#[inline]
#[must_use]
pub fn mish(x: f32) -> f32 {
    x * tanh(softplus(x, 1.0, 20.0))
}

/// Derivative of [`mish`].
#[inline]
#[must_use]
pub fn mish_derivative(x: f32) -> f32 {
    let sp = softplus(x, 1.0, 20.0);
    let tsp = tanh(sp);
    tsp + x * (1.0 - tsp * tsp) * sigmoid(x)
}

/// Maximum of two values where `NaN` wins, so it is never silently dropped.
#[inline]
#[must_use]
pub fn max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a >= b {
        a
    } else {
        b
    }
}

/// Minimum of two values where `NaN` wins.
#[inline]
#[must_use]
pub fn min(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a <= b {
        a
    } else {
        b
    }
}
