//! Workspace pool.
//!
//! A forward/backward pass creates a very large number of short-lived
//! [`Dense`] buffers. The [`Workspace`] amortises their allocation with a
//! set of power-of-two size classes, each backed by its own free-list.
//!
//! # Size classes
//!
//! A request for `n` elements is served from class `ceil(log2(n))`, whose
//! buffers hold exactly `2^class` elements. The matrix only exposes the
//! first `n` of them; the rest is spare capacity that survives round trips
//! through the pool.
//!
//! # Dirty and empty buffers
//!
//! - [`Workspace::get_dense`] hands out a buffer as-is. Whatever the
//!   previous owner wrote is still there.
//! - [`Workspace::get_empty_dense`] zeroes the visible part, unless the
//!   buffer was freshly allocated (and therefore already zero).
//!
//! # Release
//!
//! [`Workspace::release_dense`] files a buffer under the class of its
//! *capacity*, not of its logical size. Matrices that were not obtained
//! from a pool are rejected with [`PoolError::NotPooled`]; borrowed
//! [`DenseView`](crate::mat::DenseView)s cannot be released at all.
//!
//! # Concurrency
//!
//! Each class has its own `parking_lot::Mutex`, so independent operators
//! running on different threads only contend when they hit the same class.

use core::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::error::PoolError;
use crate::mat::Dense;

/// Number of size classes; class `k` holds buffers of `2^k` elements.
pub const SIZE_CLASSES: usize = usize::BITS as usize;

lazy_static::lazy_static! {
    static ref GLOBAL_WORKSPACE: Workspace = Workspace::new();
}

/// Returns `ceil(log2(n))`, the size class serving a request of `n` elements.
///
/// Requests of zero or one element share class `0`.
#[inline]
#[must_use]
pub const fn size_class(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// A size-classed allocator for dense matrix buffers.
pub struct Workspace {
    classes: Vec<Mutex<Vec<Vec<f32>>>>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let cached: usize = (0..SIZE_CLASSES).map(|c| self.cached(c)).sum();
        f.debug_struct("Workspace")
            .field("classes", &SIZE_CLASSES)
            .field("cached", &cached)
            .finish()
    }
}

impl Workspace {
    /// Creates an empty workspace.
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: (0..SIZE_CLASSES).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// The process-wide workspace used by every [`Dense`] constructor.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_WORKSPACE
    }

    /// Takes a buffer of `2^size_class(len)` elements.
    ///
    /// The flag is `true` when the buffer was allocated just now and is
    /// therefore known to be all zeros.
    fn take(&self, len: usize) -> Option<(Vec<f32>, bool)> {
        let class = size_class(len);
        if class >= SIZE_CLASSES {
            return None;
        }
        if let Some(buf) = self.classes[class].lock().pop() {
            return Some((buf, false));
        }
        let capacity = 1usize << class;
        log::trace!("workspace: allocating fresh buffer of {capacity} elements for {len}");
        Some((vec![0.0; capacity], true))
    }

    fn acquire(&self, rows: usize, cols: usize, zeroed: bool) -> Result<Dense, PoolError> {
        let len = rows
            .checked_mul(cols)
            .ok_or(PoolError::SizeOverflow { rows, cols })?;
        let (mut buf, fresh) = self
            .take(len)
            .ok_or(PoolError::SizeOverflow { rows, cols })?;
        if zeroed && !fresh {
            buf[..len].fill(0.0);
        }
        Ok(Dense::from_parts(rows, cols, buf, true))
    }

    /// Lends a `rows x cols` matrix whose contents are unspecified.
    ///
    /// # Errors
    ///
    /// [`PoolError::SizeOverflow`] if `rows * cols` is not addressable.
    pub fn get_dense(&self, rows: usize, cols: usize) -> Result<Dense, PoolError> {
        self.acquire(rows, cols, false)
    }

    /// Lends a `rows x cols` matrix filled with zeros.
    ///
    /// # Errors
    ///
    /// [`PoolError::SizeOverflow`] if `rows * cols` is not addressable.
    pub fn get_empty_dense(&self, rows: usize, cols: usize) -> Result<Dense, PoolError> {
        self.acquire(rows, cols, true)
    }

    /// Returns a matrix's buffer to the free-list of its capacity class.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotPooled`] if `d` was not obtained from a workspace.
    pub fn release_dense(&self, d: Dense) -> Result<(), PoolError> {
        if !d.is_pooled() {
            return Err(PoolError::NotPooled);
        }
        let buf = d.into_buffer();
        let capacity = buf.len();
        if !capacity.is_power_of_two() {
            return Err(PoolError::NotPooled);
        }
        let class = capacity.trailing_zeros() as usize;
        log::trace!("workspace: releasing buffer of {capacity} elements to class {class}");
        self.classes[class].lock().push(buf);
        Ok(())
    }

    /// Number of idle buffers cached in `class`.
    #[must_use]
    pub fn cached(&self, class: usize) -> usize {
        self.classes.get(class).map_or(0, |c| c.lock().len())
    }

    /// Drops every cached buffer.
    pub fn trim(&self) {
        for (class, list) in self.classes.iter().enumerate() {
            let mut list = list.lock();
            if !list.is_empty() {
                log::debug!("workspace: dropping {} idle buffers of class {class}", list.len());
                list.clear();
            }
        }
    }
}

/// A pooled matrix that goes back to the global workspace when dropped.
///
/// Operators use it for backward-pass temporaries so every early return
/// still releases the buffer.
pub struct Scratch {
    inner: Option<Dense>,
}

impl Scratch {
    /// Wraps a pooled matrix.
    #[must_use]
    pub const fn new(d: Dense) -> Self {
        Self { inner: Some(d) }
    }

    /// Keeps the matrix instead of releasing it.
    #[must_use]
    pub fn into_inner(mut self) -> Dense {
        match self.inner.take() {
            Some(d) => d,
            None => unreachable!("scratch matrix taken twice"),
        }
    }
}

impl Deref for Scratch {
    type Target = Dense;

    fn deref(&self) -> &Dense {
        match &self.inner {
            Some(d) => d,
            None => unreachable!("scratch matrix already released"),
        }
    }
}

impl DerefMut for Scratch {
    fn deref_mut(&mut self) -> &mut Dense {
        match &mut self.inner {
            Some(d) => d,
            None => unreachable!("scratch matrix already released"),
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Some(d) = self.inner.take() {
            if let Err(e) = Workspace::global().release_dense(d) {
                log::warn!("scratch release failed: {e}");
            }
        }
    }
}
