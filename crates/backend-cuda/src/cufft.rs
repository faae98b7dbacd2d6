//! Safe RAII wrapper around batched cuFFT real-transform plans.
//!
//! A [`CufftPlan`] is built from a validated [`PlanDescriptor`] with
//! `cufftPlanMany`, bound to one CUDA stream, and destroyed when dropped.
//!
//! # Example
//!
//! ```ignore
//! let plan = CufftPlan::new(&descriptor, &stream)?;
//! plan.exec_r2c(&real, &mut spectrum, &stream)?;
//! ```

use std::ffi::c_int;
use std::sync::Arc;

use cudarc::driver::{CudaSlice, CudaStream, DevicePtr, DevicePtrMut};
use log::debug;

use rfft2_core::diagnostics::FftStatus;
use rfft2_core::error::FftError;
use rfft2_core::plan::{PlanDescriptor, TransformKind};
use rfft2_core::shape::LayoutDescriptor;

use crate::cufft_sys::{
    cudaStream_t, cufftComplex, cufftDestroy, cufftExecC2R, cufftExecR2C, cufftHandle,
    cufftPlanMany, cufftReal, cufftResult, cufftSetStream, cufftType, CUFFT_SUCCESS,
};

/// One side of an advanced layout in the integer form cuFFT expects.
struct LayoutParams {
    embed: Vec<c_int>,
    stride: c_int,
    distance: c_int,
}

impl LayoutParams {
    fn from_layout(layout: &LayoutDescriptor) -> Option<Self> {
        let embed = layout
            .embed
            .iter()
            .map(|&extent| c_int::try_from(extent).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            embed,
            stride: c_int::try_from(layout.stride).ok()?,
            distance: c_int::try_from(layout.distance).ok()?,
        })
    }
}

/// A batched cuFFT plan for one real-transform direction.
///
/// # Thread Safety
///
/// cuFFT plans may be executed from any thread, but creation and destruction
/// should be serialized. This type is `Send` but not `Sync`.
pub struct CufftPlan {
    handle: cufftHandle,
    descriptor: PlanDescriptor,
}

unsafe impl Send for CufftPlan {}

impl CufftPlan {
    /// Creates a plan for `descriptor` and binds it to `stream`.
    ///
    /// The descriptor is validated first, so malformed shapes and layouts are
    /// rejected with the same status codes on every backend.
    pub fn new(descriptor: &PlanDescriptor, stream: &Arc<CudaStream>) -> Result<Self, FftError> {
        descriptor.validate()?;
        let kind = descriptor.kind;
        let invalid = || FftError::plan(kind, FftStatus::InvalidValue);

        let mut n = descriptor
            .shape
            .dims()
            .iter()
            .map(|&extent| c_int::try_from(extent).ok())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| FftError::plan(kind, FftStatus::InvalidSize))?;
        let rank = c_int::try_from(n.len()).map_err(|_| FftError::plan(kind, FftStatus::InvalidSize))?;
        let batch = c_int::try_from(descriptor.shape.batch()).map_err(|_| invalid())?;
        let mut input = LayoutParams::from_layout(descriptor.input_layout()).ok_or_else(invalid)?;
        let mut output = LayoutParams::from_layout(descriptor.output_layout()).ok_or_else(invalid)?;

        let fft_type = match kind {
            TransformKind::RealToComplex => cufftType::CUFFT_R2C,
            TransformKind::ComplexToReal => cufftType::CUFFT_C2R,
        };

        let mut handle: cufftHandle = 0;
        let status = unsafe {
            cufftPlanMany(
                &mut handle,
                rank,
                n.as_mut_ptr(),
                input.embed.as_mut_ptr(),
                input.stride,
                input.distance,
                output.embed.as_mut_ptr(),
                output.stride,
                output.distance,
                fft_type,
                batch,
            )
        };
        plan_status(kind, status)?;

        // From here on the handle is destroyed on drop, including on the
        // error path below.
        let plan = Self {
            handle,
            descriptor: descriptor.clone(),
        };

        let stream_ptr = stream.cu_stream() as cudaStream_t;
        let status = unsafe { cufftSetStream(plan.handle, stream_ptr) };
        plan_status(kind, status)?;

        debug!(
            "[cuda] {kind} plan {} for {}: input {:?}, output {:?}",
            plan.handle,
            descriptor.shape,
            descriptor.input_layout(),
            descriptor.output_layout()
        );
        Ok(plan)
    }

    pub fn descriptor(&self) -> &PlanDescriptor {
        &self.descriptor
    }

    /// Forward transform from `input` (real samples) into `output` (complex
    /// bins stored as `[re, im]` pairs).
    pub fn exec_r2c(
        &self,
        input: &CudaSlice<f32>,
        output: &mut CudaSlice<f32>,
        stream: &Arc<CudaStream>,
    ) -> Result<(), FftError> {
        self.check_kind(TransformKind::RealToComplex)?;
        self.check_lengths(input.len(), output.len() / 2)?;

        let (idata, _input_sync) = input.device_ptr(stream);
        let (odata, _output_sync) = output.device_ptr_mut(stream);
        let status = unsafe {
            cufftExecR2C(
                self.handle,
                idata as *mut cufftReal,
                odata as *mut cufftComplex,
            )
        };
        self.exec_status(status)
    }

    /// Unnormalized inverse transform from `input` (complex bins as `[re, im]`
    /// pairs, clobbered) into `output` (real samples).
    pub fn exec_c2r(
        &self,
        input: &mut CudaSlice<f32>,
        output: &mut CudaSlice<f32>,
        stream: &Arc<CudaStream>,
    ) -> Result<(), FftError> {
        self.check_kind(TransformKind::ComplexToReal)?;
        self.check_lengths(input.len() / 2, output.len())?;

        let (idata, _input_sync) = input.device_ptr_mut(stream);
        let (odata, _output_sync) = output.device_ptr_mut(stream);
        let status = unsafe {
            cufftExecC2R(
                self.handle,
                idata as *mut cufftComplex,
                odata as *mut cufftReal,
            )
        };
        self.exec_status(status)
    }

    fn check_kind(&self, kind: TransformKind) -> Result<(), FftError> {
        if self.descriptor.kind != kind {
            return Err(FftError::execution(kind, FftStatus::InvalidType));
        }
        Ok(())
    }

    /// Lengths are in elements of the respective side (reals or bins).
    fn check_lengths(&self, input_len: usize, output_len: usize) -> Result<(), FftError> {
        if input_len < self.descriptor.input_required_len()
            || output_len < self.descriptor.output_required_len()
        {
            return Err(FftError::execution(self.descriptor.kind, FftStatus::InvalidValue));
        }
        Ok(())
    }

    fn exec_status(&self, status: cufftResult) -> Result<(), FftError> {
        if status == CUFFT_SUCCESS {
            return Ok(());
        }
        Err(FftError::Execution {
            kind: self.descriptor.kind,
            code: status,
        })
    }
}

fn plan_status(kind: TransformKind, status: cufftResult) -> Result<(), FftError> {
    if status == CUFFT_SUCCESS {
        return Ok(());
    }
    Err(FftError::Plan { kind, code: status })
}

impl Drop for CufftPlan {
    fn drop(&mut self) {
        // Nothing useful can be done with a destroy failure.
        unsafe {
            let _ = cufftDestroy(self.handle);
        }
    }
}
