#![cfg(test)]

use super::diagnostics::FftStatus;
use super::error::FftError;
use super::plan::{PlanDescriptor, TransformKind};
use super::shape::{LayoutDescriptor, TransformShape};

fn expect_status(descriptor: &PlanDescriptor, status: FftStatus) {
    match descriptor.validate() {
        Err(FftError::Plan { kind, code }) => {
            assert_eq!(kind, descriptor.kind);
            assert_eq!(code, status.code(), "expected {}", status.name());
        }
        other => panic!("expected plan error {status}, got {other:?}"),
    }
}

#[test]
fn forward_and_inverse_swap_layout_roles() {
    let shape = TransformShape::new_2d(5, 5, 1);
    let forward = PlanDescriptor::packed(shape.clone(), TransformKind::RealToComplex);
    let inverse = PlanDescriptor::packed(shape, TransformKind::ComplexToReal);

    assert_eq!(forward.input_layout(), &forward.real_layout);
    assert_eq!(forward.output_layout(), &forward.complex_layout);
    assert_eq!(inverse.input_layout(), &inverse.complex_layout);
    assert_eq!(inverse.output_layout(), &inverse.real_layout);

    assert_eq!(forward.input_dims(), vec![5, 5]);
    assert_eq!(forward.output_dims(), vec![5, 3]);
    assert_eq!(inverse.input_dims(), vec![5, 3]);
    assert_eq!(inverse.output_dims(), vec![5, 5]);

    assert_eq!(forward.input_required_len(), 25);
    assert_eq!(forward.output_required_len(), 15);
    assert_eq!(inverse.input_required_len(), 15);
    assert_eq!(inverse.output_required_len(), 25);
}

#[test]
fn supported_ranks_validate() {
    for dims in [vec![16], vec![5, 5], vec![4, 3, 6]] {
        for kind in [TransformKind::RealToComplex, TransformKind::ComplexToReal] {
            let descriptor = PlanDescriptor::packed(TransformShape::new(dims.clone(), 2), kind);
            assert!(descriptor.validate().is_ok(), "{dims:?} {kind}");
        }
    }
}

#[test]
fn unsupported_rank_is_an_invalid_size_plan_error() {
    let four_d = PlanDescriptor::packed(
        TransformShape::new(vec![2, 2, 2, 2], 1),
        TransformKind::RealToComplex,
    );
    expect_status(&four_d, FftStatus::InvalidSize);

    let scalar = PlanDescriptor::packed(TransformShape::new(Vec::new(), 1), TransformKind::ComplexToReal);
    expect_status(&scalar, FftStatus::InvalidSize);
}

#[test]
fn zero_extents_and_batches_are_rejected() {
    let zero_dim = PlanDescriptor::packed(TransformShape::new_2d(0, 5, 1), TransformKind::RealToComplex);
    expect_status(&zero_dim, FftStatus::InvalidSize);

    let zero_batch = PlanDescriptor::packed(TransformShape::new_2d(5, 5, 0), TransformKind::RealToComplex);
    expect_status(&zero_batch, FftStatus::InvalidValue);
}

#[test]
fn malformed_layouts_are_invalid_values() {
    let shape = TransformShape::new_2d(4, 6, 2);
    let complex = LayoutDescriptor::complex_packed(&shape);

    // Embed narrower than the logical row.
    let narrow = LayoutDescriptor::new(vec![4, 5], 1, 24);
    let descriptor = PlanDescriptor::new(shape.clone(), narrow, complex.clone(), TransformKind::RealToComplex);
    expect_status(&descriptor, FftStatus::InvalidValue);

    // Embed rank differs from transform rank.
    let flat = LayoutDescriptor::new(vec![24], 1, 24);
    let descriptor = PlanDescriptor::new(shape.clone(), flat, complex.clone(), TransformKind::ComplexToReal);
    expect_status(&descriptor, FftStatus::InvalidValue);

    // Zero stride.
    let zero_stride = LayoutDescriptor::new(vec![4, 6], 0, 24);
    let descriptor = PlanDescriptor::new(shape.clone(), zero_stride, complex.clone(), TransformKind::RealToComplex);
    expect_status(&descriptor, FftStatus::InvalidValue);

    // Overlapping batches.
    let overlapping = LayoutDescriptor::new(vec![4, 6], 1, 10);
    let descriptor = PlanDescriptor::new(shape, overlapping, complex, TransformKind::RealToComplex);
    expect_status(&descriptor, FftStatus::InvalidValue);
}

#[test]
fn padded_layouts_are_accepted() {
    let shape = TransformShape::new_2d(4, 6, 3);
    let real = LayoutDescriptor::new(vec![4, 8], 1, 40);
    let complex = LayoutDescriptor::new(vec![4, 5], 2, 48);
    let descriptor = PlanDescriptor::new(shape, real, complex, TransformKind::RealToComplex);
    assert!(descriptor.validate().is_ok());
    assert_eq!(descriptor.input_required_len(), 2 * 40 + (3 * 8 + 5) + 1);
    assert_eq!(descriptor.output_required_len(), 2 * 48 + 2 * (3 * 5 + 3) + 1);
}

#[test]
fn element_counts_overflowing_usize_are_invalid_size() {
    let max = i32::MAX as usize;
    let shapes = [
        TransformShape::new(vec![max; 3], 1),
        TransformShape::new(vec![max; 2], max),
    ];
    for shape in shapes {
        // Packed layouts saturate instead of overflowing.
        assert_eq!(LayoutDescriptor::real_packed(&shape).distance, shape.logical_len());
        for kind in [TransformKind::RealToComplex, TransformKind::ComplexToReal] {
            expect_status(&PlanDescriptor::packed(shape.clone(), kind), FftStatus::InvalidSize);
        }
    }

    let shape = TransformShape::new(vec![2, 2, 2], 1);
    let huge = usize::MAX / 2;
    let real = LayoutDescriptor::new(vec![2, huge, huge], 1, 8);
    let descriptor = PlanDescriptor::new(
        shape.clone(),
        real,
        LayoutDescriptor::complex_packed(&shape),
        TransformKind::RealToComplex,
    );
    expect_status(&descriptor, FftStatus::InvalidSize);
}
