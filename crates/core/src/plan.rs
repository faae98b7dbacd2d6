//! Plan descriptors for real-to-complex and complex-to-real transforms.
//!
//! A descriptor binds one shape, one real-domain layout, one complex-domain
//! layout and one direction. The forward plan reads the real layout and writes
//! the complex one; the inverse plan swaps the two roles. Descriptors are
//! immutable: any change of shape or layout requires a new plan.

use log::debug;

use crate::backend::FftDevice;
use crate::diagnostics::FftStatus;
use crate::error::FftError;
use crate::shape::{LayoutDescriptor, TransformShape};

/// Ranks accepted by the plan builder.
pub const SUPPORTED_RANKS: std::ops::RangeInclusive<usize> = 1..=3;

/// Direction of a real transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// Real input, packed Hermitian spectrum output.
    RealToComplex,
    /// Packed Hermitian spectrum input, real output (unnormalized).
    ComplexToReal,
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformKind::RealToComplex => write!(f, "R2C"),
            TransformKind::ComplexToReal => write!(f, "C2R"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDescriptor {
    pub shape: TransformShape,
    pub real_layout: LayoutDescriptor,
    pub complex_layout: LayoutDescriptor,
    pub kind: TransformKind,
}

impl PlanDescriptor {
    pub fn new(
        shape: TransformShape,
        real_layout: LayoutDescriptor,
        complex_layout: LayoutDescriptor,
        kind: TransformKind,
    ) -> Self {
        Self {
            shape,
            real_layout,
            complex_layout,
            kind,
        }
    }

    /// Descriptor with contiguous layouts on both sides.
    pub fn packed(shape: TransformShape, kind: TransformKind) -> Self {
        let real_layout = LayoutDescriptor::real_packed(&shape);
        let complex_layout = LayoutDescriptor::complex_packed(&shape);
        Self::new(shape, real_layout, complex_layout, kind)
    }

    pub fn input_layout(&self) -> &LayoutDescriptor {
        match self.kind {
            TransformKind::RealToComplex => &self.real_layout,
            TransformKind::ComplexToReal => &self.complex_layout,
        }
    }

    pub fn output_layout(&self) -> &LayoutDescriptor {
        match self.kind {
            TransformKind::RealToComplex => &self.complex_layout,
            TransformKind::ComplexToReal => &self.real_layout,
        }
    }

    /// Logical extents addressed through the input layout.
    pub fn input_dims(&self) -> Vec<usize> {
        match self.kind {
            TransformKind::RealToComplex => self.shape.dims().to_vec(),
            TransformKind::ComplexToReal => self.shape.spectrum_dims(),
        }
    }

    /// Logical extents addressed through the output layout.
    pub fn output_dims(&self) -> Vec<usize> {
        match self.kind {
            TransformKind::RealToComplex => self.shape.spectrum_dims(),
            TransformKind::ComplexToReal => self.shape.dims().to_vec(),
        }
    }

    /// Minimum input buffer length in elements.
    pub fn input_required_len(&self) -> usize {
        self.input_layout()
            .required_len(&self.input_dims(), self.shape.batch())
    }

    /// Minimum output buffer length in elements.
    pub fn output_required_len(&self) -> usize {
        self.output_layout()
            .required_len(&self.output_dims(), self.shape.batch())
    }

    /// Check the shape/layout combination the way the FFT libraries do.
    pub fn validate(&self) -> Result<(), FftError> {
        self.validate_status()
            .map_err(|status| FftError::plan(self.kind, status))
    }

    fn validate_status(&self) -> Result<(), FftStatus> {
        let shape = &self.shape;
        if !SUPPORTED_RANKS.contains(&shape.rank()) {
            return Err(FftStatus::InvalidSize);
        }
        if shape
            .dims()
            .iter()
            .any(|&n| n == 0 || i32::try_from(n).is_err())
        {
            return Err(FftStatus::InvalidSize);
        }
        if shape.batch() == 0 || i32::try_from(shape.batch()).is_err() {
            return Err(FftStatus::InvalidValue);
        }
        if shape
            .checked_logical_len()
            .and_then(|len| len.checked_mul(shape.batch()))
            .is_none()
        {
            return Err(FftStatus::InvalidSize);
        }
        check_layout(self.input_layout(), &self.input_dims(), shape.batch())?;
        check_layout(self.output_layout(), &self.output_dims(), shape.batch())?;
        Ok(())
    }
}

fn check_layout(layout: &LayoutDescriptor, dims: &[usize], batch: usize) -> Result<(), FftStatus> {
    if layout.embed.len() != dims.len() || layout.stride == 0 {
        return Err(FftStatus::InvalidValue);
    }
    let too_narrow = layout
        .embed
        .iter()
        .zip(dims)
        .skip(1)
        .any(|(&extent, &n)| extent < n);
    if too_narrow {
        return Err(FftStatus::InvalidValue);
    }
    let span = layout.checked_span(dims).ok_or(FftStatus::InvalidSize)?;
    if batch > 1 && layout.distance < span {
        return Err(FftStatus::InvalidValue);
    }
    if layout.checked_required_len(dims, batch).is_none() {
        return Err(FftStatus::InvalidSize);
    }
    let addressable = [layout.stride, layout.distance]
        .into_iter()
        .chain(layout.embed.iter().copied())
        .all(|value| i32::try_from(value).is_ok());
    if !addressable {
        return Err(FftStatus::InvalidSize);
    }
    Ok(())
}

/// Build a plan for `shape` on `device`.
///
/// `RealToComplex` reads `real_layout` and writes `complex_layout`;
/// `ComplexToReal` reads `complex_layout` and writes `real_layout`.
pub fn build_plan<D: FftDevice>(
    device: &D,
    shape: &TransformShape,
    real_layout: &LayoutDescriptor,
    complex_layout: &LayoutDescriptor,
    kind: TransformKind,
) -> Result<D::Plan, FftError> {
    let descriptor = PlanDescriptor::new(
        shape.clone(),
        real_layout.clone(),
        complex_layout.clone(),
        kind,
    );
    descriptor.validate()?;
    debug!("[{}] planning {} for {}", device.name(), kind, shape);
    device.plan(&descriptor)
}
