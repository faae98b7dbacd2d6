//! Transform shapes and advanced memory layouts.
//!
//! # Addressing
//!
//! Layouts follow the advanced-layout convention of cuFFT/hipFFT: element
//! `(i0, …, i_{r-1})` of batch `b` lives at
//!
//! ```text
//! b * distance + stride * ((i0 * embed[1] + i1) * embed[2] + i2 …)
//! ```
//!
//! so `embed[0]` never takes part in address computation; it only documents the
//! extent of the slowest axis. Packed layouts use `embed = dims`, `stride = 1`
//! and `distance = prod(dims)`.

use serde::{Deserialize, Serialize};

/// Logical extents and batch count of a real-input transform.
///
/// The spectrum side of a real-to-complex transform keeps only the
/// non-redundant half of the last axis (`n / 2 + 1` bins), so every count
/// on the complex side is derived from `dims` and never set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformShape {
    dims: Vec<usize>,
    #[serde(default = "default_batch")]
    batch: usize,
}

impl TransformShape {
    /// Build a shape of arbitrary rank. Rank and extents are checked by the
    /// plan builder, not here.
    pub fn new(dims: impl Into<Vec<usize>>, batch: usize) -> Self {
        Self {
            dims: dims.into(),
            batch,
        }
    }

    pub fn new_2d(rows: usize, cols: usize, batch: usize) -> Self {
        Self::new(vec![rows, cols], batch)
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of real samples in one transform, saturating at `usize::MAX`.
    pub fn logical_len(&self) -> usize {
        self.checked_logical_len().unwrap_or(usize::MAX)
    }

    /// `None` when `prod(dims)` overflows `usize`.
    pub fn checked_logical_len(&self) -> Option<usize> {
        checked_product(&self.dims)
    }

    /// Extents of the packed Hermitian spectrum (last axis halved).
    pub fn spectrum_dims(&self) -> Vec<usize> {
        let mut dims = self.dims.clone();
        if let Some(last) = dims.last_mut() {
            *last = *last / 2 + 1;
        }
        dims
    }

    /// Number of complex bins in one transform, saturating at `usize::MAX`.
    pub fn spectrum_len(&self) -> usize {
        checked_product(&self.spectrum_dims()).unwrap_or(usize::MAX)
    }

    /// `prod(dims) * batch`.
    pub fn input_len(&self) -> usize {
        self.logical_len().saturating_mul(self.batch)
    }

    /// `prod(dims[..r-1]) * (dims[r-1] / 2 + 1) * batch`.
    pub fn output_len(&self) -> usize {
        self.spectrum_len().saturating_mul(self.batch)
    }
}

fn checked_product(dims: &[usize]) -> Option<usize> {
    if dims.is_empty() {
        return Some(0);
    }
    dims.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}

impl std::fmt::Display for TransformShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extents: Vec<String> = self.dims.iter().map(ToString::to_string).collect();
        write!(f, "{} (batch {})", extents.join("×"), self.batch)
    }
}

fn default_batch() -> usize {
    1
}

/// Placement of one side (real or complex) of a batched transform in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    /// Storage extents per axis; `embed[a] >= dims[a]` for every `a >= 1`.
    pub embed: Vec<usize>,
    /// Element stride within one transform.
    pub stride: usize,
    /// Element offset between consecutive transforms of a batch.
    pub distance: usize,
}

impl LayoutDescriptor {
    pub fn new(embed: impl Into<Vec<usize>>, stride: usize, distance: usize) -> Self {
        Self {
            embed: embed.into(),
            stride,
            distance,
        }
    }

    /// Contiguous real-domain layout for `shape`.
    pub fn real_packed(shape: &TransformShape) -> Self {
        Self::new(shape.dims().to_vec(), 1, shape.logical_len())
    }

    /// Contiguous complex-domain layout for `shape`.
    pub fn complex_packed(shape: &TransformShape) -> Self {
        Self::new(shape.spectrum_dims(), 1, shape.spectrum_len())
    }

    /// Element offset of `index` within transform `batch`.
    ///
    /// Only meaningful for layouts a plan has accepted; use
    /// [`checked_offset`](Self::checked_offset) otherwise.
    #[inline]
    pub fn offset(&self, batch: usize, index: &[usize]) -> usize {
        let flat = index
            .iter()
            .zip(&self.embed)
            .fold(0usize, |acc, (&i, &extent)| acc * extent + i);
        batch * self.distance + self.stride * flat
    }

    pub fn checked_offset(&self, batch: usize, index: &[usize]) -> Option<usize> {
        let flat = index
            .iter()
            .zip(&self.embed)
            .try_fold(0usize, |acc, (&i, &extent)| acc.checked_mul(extent)?.checked_add(i))?;
        batch
            .checked_mul(self.distance)?
            .checked_add(self.stride.checked_mul(flat)?)
    }

    /// Number of elements one transform of `dims` touches, from its first to
    /// its last addressed element. Saturates at `usize::MAX`.
    pub fn span(&self, dims: &[usize]) -> usize {
        self.checked_span(dims).unwrap_or(usize::MAX)
    }

    pub fn checked_span(&self, dims: &[usize]) -> Option<usize> {
        if dims.is_empty() || dims.contains(&0) {
            return Some(0);
        }
        let last: Vec<usize> = dims.iter().map(|&n| n - 1).collect();
        self.checked_offset(0, &last)?.checked_add(1)
    }

    /// Minimum buffer length that holds `batch` transforms of `dims`.
    /// Saturates at `usize::MAX`.
    pub fn required_len(&self, dims: &[usize], batch: usize) -> usize {
        self.checked_required_len(dims, batch).unwrap_or(usize::MAX)
    }

    pub fn checked_required_len(&self, dims: &[usize], batch: usize) -> Option<usize> {
        if batch == 0 {
            return Some(0);
        }
        (batch - 1)
            .checked_mul(self.distance)?
            .checked_add(self.checked_span(dims)?)
    }
}

/// Visit every multi-index of `dims` in row-major order.
pub fn for_each_index(dims: &[usize], mut visit: impl FnMut(&[usize])) {
    if dims.is_empty() || dims.contains(&0) {
        return;
    }
    let mut index = vec![0usize; dims.len()];
    loop {
        visit(&index);
        let mut axis = dims.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

/// Row-major position of `index` in a dense array of `dims`.
#[inline]
pub fn row_major(dims: &[usize], index: &[usize]) -> usize {
    index
        .iter()
        .zip(dims)
        .fold(0usize, |acc, (&i, &extent)| acc * extent + i)
}
