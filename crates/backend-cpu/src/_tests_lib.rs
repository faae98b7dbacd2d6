//! Tests for the CPU backend.
//!
//! These tests verify that the host-emulated device honours the forward and
//! round-trip contracts of a GPU FFT library, including its status codes and
//! memory accounting.

#![cfg(test)]

use std::f64::consts::PI;

use num_complex::{Complex32, Complex64};

use crate::CpuBackend;
use rfft2_core::backend::{DeviceBuffer, FftDevice};
use rfft2_core::config::SignalSpec;
use rfft2_core::diagnostics::FftStatus;
use rfft2_core::driver::{PipelineFailure, RoundTrip, RoundTripOptions, Stage};
use rfft2_core::error::{DeviceError, FftError};
use rfft2_core::plan::{build_plan, PlanDescriptor, TransformKind};
use rfft2_core::report::NullSink;
use rfft2_core::shape::{for_each_index, LayoutDescriptor, TransformShape};

fn forward(backend: &CpuBackend, shape: &TransformShape, input: &[f32]) -> Vec<Complex32> {
    let plan = backend
        .plan(&PlanDescriptor::packed(shape.clone(), TransformKind::RealToComplex))
        .expect("forward plan");
    let mut real = backend.alloc_real(shape.input_len()).unwrap();
    let mut spectrum = backend.alloc_complex(shape.output_len()).unwrap();
    backend.upload_real(input, &mut real).unwrap();
    backend.exec_r2c(&plan, &real, &mut spectrum).unwrap();
    let mut host = vec![Complex32::default(); shape.output_len()];
    backend.download_complex(&spectrum, &mut host).unwrap();
    host
}

/// Reference DFT of one packed real transform, evaluated in f64.
fn naive_r2c(dims: &[usize], input: &[f32]) -> Vec<Complex64> {
    let mut spectrum_dims = dims.to_vec();
    let last = spectrum_dims.len() - 1;
    spectrum_dims[last] = dims[last] / 2 + 1;

    let mut out = Vec::new();
    for_each_index(&spectrum_dims, |k| {
        let mut acc = Complex64::new(0.0, 0.0);
        let mut sample = 0;
        for_each_index(dims, |n| {
            let phase: f64 = k
                .iter()
                .zip(n)
                .zip(dims)
                .map(|((&freq, &pos), &len)| (freq * pos) as f64 / len as f64)
                .sum();
            acc += Complex64::from_polar(f64::from(input[sample]), -2.0 * PI * phase);
            sample += 1;
        });
        out.push(acc);
    });
    out
}

fn wavy(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i as f32) * 0.7).sin() + 0.25 * ((i as f32) * 1.3).cos() + 0.5)
        .collect()
}

// ============================================================================
// Forward Transform
// ============================================================================

#[test]
fn reference_scenario_five_by_five_ones() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new_2d(5, 5, 1);
    let input = vec![1.0f32; 25];

    let mut driver = RoundTrip::new(&backend, shape);
    let report = driver.run(&input, &mut NullSink).expect("round trip");

    assert_eq!(report.frequency.len(), 15);
    let dc = report.frequency[0];
    assert!((dc.re - 25.0).abs() < 1e-4, "DC should be 25, got {dc}");
    assert!(dc.im.abs() < 1e-4, "DC should be real, got {dc}");
    for (idx, bin) in report.frequency.iter().enumerate().skip(1) {
        assert!(bin.norm() < 1e-4, "bin {idx} should vanish, got {bin}");
    }

    assert_eq!(report.reconstructed.len(), 25);
    for (idx, &value) in report.reconstructed.iter().enumerate() {
        assert!(
            (value - 25.0).abs() < 1e-4,
            "sample {idx} should be 25 (unnormalized), got {value}"
        );
    }
    assert!(report.verify(1e-4).passed());
}

#[test]
fn dc_bin_equals_sample_count_for_every_batch() {
    let backend = CpuBackend::new();
    for (rows, cols, batch) in [(4, 4, 1), (3, 7, 2), (8, 6, 4), (1, 9, 3)] {
        let shape = TransformShape::new_2d(rows, cols, batch);
        let spectrum = forward(&backend, &shape, &vec![1.0; shape.input_len()]);
        let n = (rows * cols) as f32;
        for b in 0..batch {
            let dc = spectrum[b * shape.spectrum_len()];
            assert!(
                (dc - Complex32::new(n, 0.0)).norm() < 1e-5 * n.max(1.0),
                "{rows}x{cols} batch {b}: DC {dc}"
            );
        }
    }
}

#[test]
fn forward_matches_reference_dft() {
    let backend = CpuBackend::new();
    for dims in [vec![3, 4], vec![5, 5], vec![2, 7], vec![6], vec![3, 2, 5]] {
        let shape = TransformShape::new(dims.clone(), 1);
        let input = wavy(shape.input_len());
        let spectrum = forward(&backend, &shape, &input);
        let expected = naive_r2c(&dims, &input);

        assert_eq!(spectrum.len(), expected.len());
        for (idx, (got, want)) in spectrum.iter().zip(&expected).enumerate() {
            let got = Complex64::new(f64::from(got.re), f64::from(got.im));
            assert!(
                (got - want).norm() < 1e-4 * want.norm().max(1.0),
                "{dims:?} bin {idx}: got {got}, want {want}"
            );
        }
    }
}

#[test]
fn cosine_along_columns_is_a_single_pair_of_peaks() {
    let backend = CpuBackend::new();
    let (rows, cols) = (4, 8);
    let shape = TransformShape::new_2d(rows, cols, 1);
    let input: Vec<f32> = (0..rows * cols)
        .map(|i| (2.0 * PI * (i % cols) as f64 / cols as f64).cos() as f32)
        .collect();

    let spectrum = forward(&backend, &shape, &input);
    let n = (rows * cols) as f32;
    for (idx, bin) in spectrum.iter().enumerate() {
        let expected = if idx == 1 { n / 2.0 } else { 0.0 };
        assert!(
            (bin.re - expected).abs() < 1e-3 && bin.im.abs() < 1e-3,
            "bin {idx}: {bin}"
        );
    }
}

#[test]
fn repeated_forward_transforms_are_bit_identical() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new_2d(6, 10, 2);
    let input = wavy(shape.input_len());
    let first = forward(&backend, &shape, &input);
    let second = forward(&backend, &shape, &input);
    assert_eq!(first, second);
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn round_trip_scales_input_by_sample_count() {
    let backend = CpuBackend::new();
    for dims in [vec![5, 5], vec![4, 6], vec![7, 3], vec![16], vec![15], vec![3, 4, 5]] {
        for batch in [1, 3] {
            let shape = TransformShape::new(dims.clone(), batch);
            let input = wavy(shape.input_len());
            let report = RoundTrip::new(&backend, shape.clone())
                .run(&input, &mut NullSink)
                .expect("round trip");

            let n = shape.logical_len() as f32;
            for (idx, (&got, &x)) in report.reconstructed.iter().zip(&input).enumerate() {
                assert!(
                    (got - x * n).abs() < 1e-4 * n,
                    "{shape} sample {idx}: got {got}, want {}",
                    x * n
                );
            }
            assert!(report.verify(1e-4).passed(), "{shape}: {:?}", report.verify(1e-4));
        }
    }
}

#[test]
fn normalized_round_trip_recovers_input() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new_2d(6, 9, 2);
    let input = SignalSpec::Ramp.generate(&shape, &LayoutDescriptor::real_packed(&shape));
    let options = RoundTripOptions {
        normalize: true,
        reupload_frequency: true,
    };
    let report = RoundTrip::new(&backend, shape)
        .with_options(options)
        .run(&input, &mut NullSink)
        .expect("round trip");

    for (&got, &x) in report.reconstructed.iter().zip(&input) {
        assert!((got - x).abs() < 1e-3 * x.abs().max(1.0), "got {got}, want {x}");
    }
}

#[test]
fn padded_and_strided_layouts_round_trip() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new_2d(4, 6, 2);
    let real = LayoutDescriptor::new(vec![4, 8], 1, 36);
    let complex = LayoutDescriptor::new(vec![4, 5], 2, 40);
    let input = SignalSpec::Ramp.generate(&shape, &real);

    let mut driver =
        RoundTrip::new(&backend, shape.clone()).with_layouts(real.clone(), complex.clone());
    let report = driver.run(&input, &mut NullSink).expect("round trip");

    assert_eq!(report.frequency.len(), driver.complex_len());
    let n = shape.logical_len() as f32;
    for batch in 0..shape.batch() {
        for_each_index(shape.dims(), |index| {
            let offset = real.offset(batch, index);
            let want = input[offset] * n;
            let got = report.reconstructed[offset];
            assert!((got - want).abs() < 1e-3 * want.max(1.0), "{index:?}: {got} vs {want}");
        });
    }

    // Padding of the real buffer is never written by C2R.
    assert_eq!(report.reconstructed[6], 0.0);
    assert_eq!(report.reconstructed[7], 0.0);

    let dense_input = SignalSpec::Ramp.generate(&shape, &LayoutDescriptor::real_packed(&shape));
    let packed = forward(&backend, &shape, &dense_input);
    for batch in 0..shape.batch() {
        for_each_index(&shape.spectrum_dims(), |index| {
            let strided = report.frequency[complex.offset(batch, index)];
            let dense = packed[LayoutDescriptor::complex_packed(&shape).offset(batch, index)];
            assert!((strided - dense).norm() < 1e-3, "{index:?}");
        });
    }
}

// ============================================================================
// Plans and Execution Errors
// ============================================================================

#[test]
fn rank_four_plan_is_rejected_with_invalid_size() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new(vec![2, 2, 2, 2], 1);
    let result = build_plan(
        &backend,
        &shape,
        &LayoutDescriptor::real_packed(&shape),
        &LayoutDescriptor::complex_packed(&shape),
        TransformKind::RealToComplex,
    );
    match result {
        Err(FftError::Plan { kind, code }) => {
            assert_eq!(kind, TransformKind::RealToComplex);
            assert_eq!(code, FftStatus::InvalidSize.code());
        }
        Err(other) => panic!("expected plan error, got {other:?}"),
        Ok(_) => panic!("rank 4 must not plan"),
    }

    let err = RoundTrip::new(&backend, shape.clone())
        .run(&vec![1.0; shape.input_len()], &mut NullSink)
        .expect_err("rank 4 round trip");
    assert_eq!(err.stage, Stage::PlanForward);
    assert!(err.is_transform_layer());
    assert_eq!(backend.ledger().allocations(), 0);
}

#[test]
fn executing_with_the_wrong_plan_kind_is_invalid_type() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new_2d(4, 4, 1);
    let inverse = backend
        .plan(&PlanDescriptor::packed(shape.clone(), TransformKind::ComplexToReal))
        .unwrap();
    let real = backend.alloc_real(shape.input_len()).unwrap();
    let mut spectrum = backend.alloc_complex(shape.output_len()).unwrap();

    let err = backend.exec_r2c(&inverse, &real, &mut spectrum).unwrap_err();
    assert_eq!(err, FftError::execution(TransformKind::RealToComplex, FftStatus::InvalidType));
}

#[test]
fn undersized_device_buffers_are_invalid_value() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new_2d(4, 4, 2);
    let plan = backend
        .plan(&PlanDescriptor::packed(shape.clone(), TransformKind::RealToComplex))
        .unwrap();
    let real = backend.alloc_real(shape.input_len()).unwrap();
    let mut short = backend.alloc_complex(shape.output_len() - 1).unwrap();

    let err = backend.exec_r2c(&plan, &real, &mut short).unwrap_err();
    assert_eq!(err.code(), FftStatus::InvalidValue.code());
}

// ============================================================================
// Memory
// ============================================================================

#[test]
fn buffers_are_zeroed_and_accounted() {
    let backend = CpuBackend::new();
    {
        let real = backend.alloc_real(25).unwrap();
        let complex = backend.alloc_complex(15).unwrap();
        assert_eq!(real.len(), 25);
        assert!(real.as_slice().iter().all(|&v| v == 0.0));
        assert!(complex.as_slice().iter().all(|v| *v == Complex32::default()));
        assert_eq!(backend.ledger().live_bytes(), 25 * 4 + 15 * 8);
    }
    assert_eq!(backend.ledger().live_bytes(), 0);
    assert_eq!(backend.ledger().allocations(), 2);
    assert_eq!(backend.ledger().releases(), 2);
    assert_eq!(backend.ledger().peak_bytes(), 220);
}

#[test]
fn round_trip_releases_every_buffer() {
    let backend = CpuBackend::new();
    let shape = TransformShape::new_2d(5, 5, 1);
    RoundTrip::new(&backend, shape)
        .run(&[1.0; 25], &mut NullSink)
        .expect("round trip");
    assert_eq!(backend.ledger().live_bytes(), 0);
    assert_eq!(backend.ledger().allocations(), backend.ledger().releases());
}

#[test]
fn exhausted_device_memory_fails_allocation() {
    // Room for the real buffer but not the spectrum.
    let backend = CpuBackend::with_capacity(25 * 4 + 10);
    let shape = TransformShape::new_2d(5, 5, 1);
    let err = RoundTrip::new(&backend, shape)
        .run(&[1.0; 25], &mut NullSink)
        .expect_err("out of memory");

    assert_eq!(err.stage, Stage::AllocateBuffers);
    match &err.failure {
        PipelineFailure::Device(DeviceError::Allocation { bytes, code, .. }) => {
            assert_eq!(*bytes, 15 * 8);
            assert_eq!(*code, DeviceError::MEMORY_ALLOCATION);
        }
        other => panic!("expected allocation failure, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 2);
    assert_eq!(backend.ledger().live_bytes(), 0, "real buffer released on the error path");
}

#[test]
fn transfers_reject_mismatched_lengths() {
    let backend = CpuBackend::new();
    let mut real = backend.alloc_real(8).unwrap();
    let err = backend.upload_real(&[1.0; 7], &mut real).unwrap_err();
    assert_eq!(err.code(), DeviceError::INVALID_VALUE);

    let mut host = vec![0.0f32; 9];
    let err = backend.download_real(&real, &mut host).unwrap_err();
    assert_eq!(err.code(), DeviceError::INVALID_VALUE);

    backend.upload_real(&[2.0; 8], &mut real).unwrap();
    let mut host = vec![0.0f32; 8];
    backend.download_real(&real, &mut host).unwrap();
    assert_eq!(host, vec![2.0; 8]);
}

#[test]
fn reset_is_counted_and_leaves_the_device_usable() {
    let backend = CpuBackend::new();
    assert_eq!(backend.resets(), 0);
    backend.reset();
    assert_eq!(backend.resets(), 1);

    let shape = TransformShape::new_2d(3, 3, 1);
    let report = RoundTrip::new(&backend, shape)
        .run(&[1.0; 9], &mut NullSink)
        .expect("round trip after reset");
    assert!(report.verify(1e-4).passed());
}
