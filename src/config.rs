//! Runtime configuration.
//!
//! This module holds the process-wide knobs of the engine. There is only
//! one today: the [`Parallelism`] mode, which decides whether dense matrix
//! multiplication and the two-gradient fan-out of
//! [`Mul`](crate::graph::ops::Mul) run on the `rayon` pool or on the
//! calling thread.
//!
//! The mode is stored globally using an `AtomicU8`, so switching it is cheap
//! and safe from any thread.
//!
//! # Example
//!
//! ```
//! use briny_grad::config::{get_parallelism, set_parallelism, Parallelism};
//!
//! set_parallelism(Parallelism::Sequential);
//! assert_eq!(get_parallelism(), Parallelism::Sequential);
//! set_parallelism(Parallelism::Rayon);
//! ```

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};

/// How bounded fan-out work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Parallelism {
    /// Everything runs on the calling thread, in a fixed order.
    Sequential = 0,
    /// Row blocks and independent gradients are spread over the `rayon` pool (default).
    #[default]
    Rayon,
}

impl TryFrom<u8> for Parallelism {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Sequential),
            1 => Ok(Self::Rayon),
            _ => Err(()),
        }
    }
}

/// Relaxed-frequency global; the mode is expected to change rarely.
static GLOBAL_PARALLELISM: AtomicU8 = AtomicU8::new(Parallelism::Rayon as u8);

/// Sets the scheduling mode for subsequent operations.
pub fn set_parallelism(mode: Parallelism) {
    GLOBAL_PARALLELISM.store(mode as u8, Ordering::Release);
}

/// Returns the current scheduling mode.
///
/// If the stored value is invalid, defaults to [`Parallelism::Rayon`].
pub fn get_parallelism() -> Parallelism {
    Parallelism::try_from(GLOBAL_PARALLELISM.load(Ordering::Acquire)).unwrap_or_default()
}

/// Shorthand used by the kernels.
#[inline]
pub(crate) fn is_parallel() -> bool {
    get_parallelism() == Parallelism::Rayon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_modes_only() {
        assert_eq!(Parallelism::try_from(0), Ok(Parallelism::Sequential));
        assert_eq!(Parallelism::try_from(1), Ok(Parallelism::Rayon));
        assert!(Parallelism::try_from(7).is_err());
    }
}
