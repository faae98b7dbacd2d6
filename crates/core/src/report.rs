//! Diagnostic record streams and the round-trip result.

use std::io::{self, Write};

use num_complex::Complex32;
use serde::Serialize;

use crate::shape::{for_each_index, LayoutDescriptor, TransformShape};

/// Receiver for the per-element records emitted by the report stages.
pub trait ReportSink {
    fn frequency(&mut self, index: usize, value: Complex32) -> io::Result<()>;
    fn reconstructed(&mut self, index: usize, value: f32) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes `Direct transform: <i> <re> <im>` and `Inverse transform: <i> <v>`
/// lines with six decimals.
pub struct TextSink<W: Write> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl TextSink<io::BufWriter<io::Stdout>> {
    pub fn stdout() -> Self {
        Self::new(io::BufWriter::new(io::stdout()))
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn frequency(&mut self, index: usize, value: Complex32) -> io::Result<()> {
        writeln!(
            self.writer,
            "Direct transform: {index} {:.6} {:.6}",
            value.re, value.im
        )
    }

    fn reconstructed(&mut self, index: usize, value: f32) -> io::Result<()> {
        writeln!(self.writer, "Inverse transform: {index} {value:.6}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn frequency(&mut self, _index: usize, _value: Complex32) -> io::Result<()> {
        Ok(())
    }

    fn reconstructed(&mut self, _index: usize, _value: f32) -> io::Result<()> {
        Ok(())
    }
}

/// Host-side buffers retrieved by a completed round trip.
#[derive(Debug, Clone)]
pub struct RoundTripReport {
    pub shape: TransformShape,
    pub real_layout: LayoutDescriptor,
    pub complex_layout: LayoutDescriptor,
    /// Host copy of the original real input.
    pub input: Vec<f32>,
    /// Forward transform output, laid out per `complex_layout`.
    pub frequency: Vec<Complex32>,
    /// Inverse transform output, laid out per `real_layout`.
    pub reconstructed: Vec<f32>,
    /// Whether `reconstructed` was divided by `prod(dims)`.
    pub normalized: bool,
}

/// Numerical fidelity of a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verification {
    /// Largest relative deviation of a DC bin from the sum of its batch.
    pub max_dc_error: f64,
    /// Largest imaginary magnitude of a DC bin.
    pub max_dc_imag: f64,
    /// Largest relative deviation of `reconstructed` from `input * scale`.
    pub max_roundtrip_error: f64,
    /// Factor the reconstruction is compared against (`prod(dims)` or 1).
    pub scale: f64,
    pub tolerance: f64,
}

impl Verification {
    pub fn passed(&self) -> bool {
        self.max_dc_error <= self.tolerance
            && self.max_dc_imag <= self.tolerance
            && self.max_roundtrip_error <= self.tolerance
    }
}

impl RoundTripReport {
    /// Factor relating `reconstructed` to `input`.
    pub fn expected_scale(&self) -> f64 {
        if self.normalized {
            1.0
        } else {
            self.shape.logical_len() as f64
        }
    }

    /// DC bin of transform `batch`.
    pub fn dc_bin(&self, batch: usize) -> Complex32 {
        let origin = vec![0; self.shape.rank()];
        self.frequency[self.complex_layout.offset(batch, &origin)]
    }

    /// Compare the retrieved buffers against the forward and round-trip
    /// contracts, with errors relative to `max(1, |expected|)`.
    pub fn verify(&self, tolerance: f64) -> Verification {
        let dims = self.shape.dims();
        let scale = self.expected_scale();
        let mut max_dc_error = 0.0f64;
        let mut max_dc_imag = 0.0f64;
        let mut max_roundtrip_error = 0.0f64;

        for batch in 0..self.shape.batch() {
            let mut sum = 0.0f64;
            for_each_index(dims, |index| {
                let offset = self.real_layout.offset(batch, index);
                let original = f64::from(self.input[offset]);
                sum += original;

                let expected = original * scale;
                let actual = f64::from(self.reconstructed[offset]);
                max_roundtrip_error = max_roundtrip_error.max(relative(actual, expected));
            });

            let dc = self.dc_bin(batch);
            max_dc_error = max_dc_error.max(relative(f64::from(dc.re), sum));
            max_dc_imag = max_dc_imag.max(f64::from(dc.im).abs() / sum.abs().max(1.0));
        }

        Verification {
            max_dc_error,
            max_dc_imag,
            max_roundtrip_error,
            scale,
            tolerance,
        }
    }
}

fn relative(actual: f64, expected: f64) -> f64 {
    (actual - expected).abs() / expected.abs().max(1.0)
}
