//! Round-trip driver: forward R2C, download, inverse C2R, download.
//!
//! The driver is a linear state machine:
//!
//! ```text
//! Init → PlanForward → AllocateBuffers → Upload → ExecuteForward
//!      → DownloadFrequency → ReportFrequency → [UploadFrequency]
//!      → PlanInverse → ExecuteInverse → DownloadReconstructed
//!      → [Normalize] → ReportReconstructed → Done
//! ```
//!
//! Any failing backend call stops the machine in the stage that issued it and
//! returns a [`RoundTripError`] carrying that stage and the call site. Plans
//! and device buffers are owned by `run` and are released on every exit path.

use std::borrow::Cow;
use std::panic::Location;

use log::{debug, info};
use num_complex::Complex32;

use crate::backend::FftDevice;
use crate::config::SignalSpec;
use crate::error::{DeviceError, FftError};
use crate::plan::{build_plan, TransformKind};
use crate::report::{ReportSink, RoundTripReport};
use crate::shape::{LayoutDescriptor, TransformShape};

// ============================================================================
// Stages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    PlanForward,
    AllocateBuffers,
    Upload,
    ExecuteForward,
    DownloadFrequency,
    ReportFrequency,
    UploadFrequency,
    PlanInverse,
    ExecuteInverse,
    DownloadReconstructed,
    Normalize,
    ReportReconstructed,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Init => "init",
            Stage::PlanForward => "plan-forward",
            Stage::AllocateBuffers => "allocate-buffers",
            Stage::Upload => "upload",
            Stage::ExecuteForward => "execute-forward",
            Stage::DownloadFrequency => "download-frequency",
            Stage::ReportFrequency => "report-frequency",
            Stage::UploadFrequency => "upload-frequency",
            Stage::PlanInverse => "plan-inverse",
            Stage::ExecuteInverse => "execute-inverse",
            Stage::DownloadReconstructed => "download-reconstructed",
            Stage::Normalize => "normalize",
            Stage::ReportReconstructed => "report-reconstructed",
            Stage::Done => "done",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Optional stages of the round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundTripOptions {
    /// Divide the reconstruction by `prod(dims)` after download.
    pub normalize: bool,
    /// Re-upload the downloaded spectrum before the inverse transform.
    pub reupload_frequency: bool,
}

pub struct RoundTrip<'a, D: FftDevice> {
    device: &'a D,
    shape: TransformShape,
    real_layout: LayoutDescriptor,
    complex_layout: LayoutDescriptor,
    options: RoundTripOptions,
    stage: Stage,
}

impl<'a, D: FftDevice> RoundTrip<'a, D> {
    /// Driver with packed layouts on both sides.
    pub fn new(device: &'a D, shape: TransformShape) -> Self {
        let real_layout = LayoutDescriptor::real_packed(&shape);
        let complex_layout = LayoutDescriptor::complex_packed(&shape);
        Self {
            device,
            shape,
            real_layout,
            complex_layout,
            options: RoundTripOptions::default(),
            stage: Stage::Init,
        }
    }

    pub fn with_layouts(mut self, real_layout: LayoutDescriptor, complex_layout: LayoutDescriptor) -> Self {
        self.real_layout = real_layout;
        self.complex_layout = complex_layout;
        self
    }

    pub fn with_options(mut self, options: RoundTripOptions) -> Self {
        self.options = options;
        self
    }

    pub fn shape(&self) -> &TransformShape {
        &self.shape
    }

    pub fn real_layout(&self) -> &LayoutDescriptor {
        &self.real_layout
    }

    /// Last stage entered (the failing stage after an error).
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Host buffer length the real side expects.
    pub fn real_len(&self) -> usize {
        self.real_layout
            .required_len(self.shape.dims(), self.shape.batch())
    }

    /// Host buffer length the complex side expects.
    pub fn complex_len(&self) -> usize {
        self.complex_layout
            .required_len(&self.shape.spectrum_dims(), self.shape.batch())
    }

    /// Execute the full round trip on `input`, streaming both report stages
    /// into `sink`.
    pub fn run<S: ReportSink>(
        &mut self,
        input: &[f32],
        sink: &mut S,
    ) -> Result<RoundTripReport, RoundTripError> {
        self.run_with(|_, _| Cow::Borrowed(input), sink)
    }

    /// Like [`run`](Self::run), with the input synthesized from `signal`.
    /// Nothing is generated until the forward plan has accepted the shape and
    /// layouts, so an oversized shape fails as a plan error.
    pub fn run_signal<S: ReportSink>(
        &mut self,
        signal: &SignalSpec,
        sink: &mut S,
    ) -> Result<RoundTripReport, RoundTripError> {
        self.run_with(|shape, layout| Cow::Owned(signal.generate(shape, layout)), sink)
    }

    fn run_with<'i, S, F>(&mut self, input: F, sink: &mut S) -> Result<RoundTripReport, RoundTripError>
    where
        S: ReportSink,
        F: FnOnce(&TransformShape, &LayoutDescriptor) -> Cow<'i, [f32]>,
    {
        let device = self.device;
        self.stage = Stage::Init;
        debug!("[{}] round trip for {}", device.name(), self.shape);

        self.enter(Stage::PlanForward);
        let forward = self.check(build_plan(
            device,
            &self.shape,
            &self.real_layout,
            &self.complex_layout,
            TransformKind::RealToComplex,
        ))?;

        self.enter(Stage::AllocateBuffers);
        let real_len = self.real_len();
        let complex_len = self.complex_len();
        let mut real_device = self.check(device.alloc_real(real_len))?;
        let mut complex_device = self.check(device.alloc_complex(complex_len))?;
        debug!(
            "[{}] allocated {} real and {} complex elements",
            device.name(),
            real_len,
            complex_len
        );

        self.enter(Stage::Upload);
        let input = input(&self.shape, &self.real_layout);
        self.check(device.upload_real(&input, &mut real_device))?;

        self.enter(Stage::ExecuteForward);
        self.check(device.exec_r2c(&forward, &real_device, &mut complex_device))?;

        self.enter(Stage::DownloadFrequency);
        let mut frequency = vec![Complex32::default(); complex_len];
        self.check(device.download_complex(&complex_device, &mut frequency))?;

        self.enter(Stage::ReportFrequency);
        for (index, value) in frequency.iter().enumerate() {
            self.check(sink.frequency(index, *value))?;
        }
        self.check(sink.flush())?;

        if self.options.reupload_frequency {
            self.enter(Stage::UploadFrequency);
            self.check(device.upload_complex(&frequency, &mut complex_device))?;
        }

        self.enter(Stage::PlanInverse);
        let inverse = self.check(build_plan(
            device,
            &self.shape,
            &self.real_layout,
            &self.complex_layout,
            TransformKind::ComplexToReal,
        ))?;

        self.enter(Stage::ExecuteInverse);
        self.check(device.exec_c2r(&inverse, &mut complex_device, &mut real_device))?;

        self.enter(Stage::DownloadReconstructed);
        let mut reconstructed = vec![0.0f32; real_len];
        self.check(device.download_real(&real_device, &mut reconstructed))?;

        if self.options.normalize {
            self.enter(Stage::Normalize);
            let scale = 1.0 / self.shape.logical_len() as f32;
            for value in &mut reconstructed {
                *value *= scale;
            }
        }

        self.enter(Stage::ReportReconstructed);
        for (index, value) in reconstructed.iter().enumerate() {
            self.check(sink.reconstructed(index, *value))?;
        }
        self.check(sink.flush())?;

        self.enter(Stage::Done);
        info!(
            "[{}] round trip complete: {} spectrum bins, {} samples",
            device.name(),
            frequency.len(),
            reconstructed.len()
        );

        Ok(RoundTripReport {
            shape: self.shape.clone(),
            real_layout: self.real_layout.clone(),
            complex_layout: self.complex_layout.clone(),
            input: input.into_owned(),
            frequency,
            reconstructed,
            normalized: self.options.normalize,
        })
    }

    fn enter(&mut self, stage: Stage) {
        debug!("[{}] {} → {}", self.device.name(), self.stage, stage);
        self.stage = stage;
    }

    #[track_caller]
    fn check<T, E: Into<PipelineFailure>>(&self, result: Result<T, E>) -> Result<T, RoundTripError> {
        let location = Location::caller();
        result.map_err(|err| RoundTripError {
            stage: self.stage,
            location,
            failure: err.into(),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// What went wrong inside a stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineFailure {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Fft(#[from] FftError),

    #[error("report output failed: {0}")]
    Report(#[from] std::io::Error),
}

/// A failed round trip: the stage, the call site and the underlying failure.
#[derive(Debug, thiserror::Error)]
#[error("{}:{} [{stage}] {failure}", .location.file(), .location.line())]
pub struct RoundTripError {
    pub stage: Stage,
    pub location: &'static Location<'static>,
    #[source]
    pub failure: PipelineFailure,
}

impl RoundTripError {
    /// Plan construction and execution failures leave the device in a state
    /// that must be reset before exiting.
    pub fn is_transform_layer(&self) -> bool {
        matches!(self.failure, PipelineFailure::Fft(_))
    }

    pub fn is_transfer_layer(&self) -> bool {
        matches!(self.failure, PipelineFailure::Device(_))
    }

    /// Process exit status: the raw backend code, clamped to `1..=255`.
    pub fn exit_code(&self) -> u8 {
        let code = match &self.failure {
            PipelineFailure::Device(err) => err.code(),
            PipelineFailure::Fft(err) => err.code(),
            PipelineFailure::Report(_) => 1,
        };
        u8::try_from(code.clamp(1, 255)).unwrap_or(1)
    }
}
