//! CUDA backend using cuFFT and cudarc when enabled.
//!
//! Device memory is owned by `cudarc` slices, plans are raw cuFFT handles
//! wrapped in [`CufftPlan`], and every plan runs on the context's default
//! stream. When the `cuda` feature is disabled, [`CudaBackend::try_new`]
//! always fails and no backend value can exist.
//!
//! # Data Layout
//!
//! Every buffer is a `CudaSlice<f32>`. Complex bins are stored as contiguous
//! `[re, im, re, im, ...]` pairs, which matches the memory layout of
//! `Complex32` (and cuFFT's `cufftComplex`) and allows direct reinterpret
//! casts on the host side.

use std::marker::PhantomData;

use num_complex::Complex32;

use rfft2_core::backend::{DeviceBuffer, FftDevice};
use rfft2_core::error::{DeviceError, FftError};
use rfft2_core::plan::PlanDescriptor;

#[cfg(feature = "cuda")]
mod cufft;
#[cfg(feature = "cuda")]
mod cufft_sys;

#[cfg(feature = "cuda")]
pub use cufft::CufftPlan;

#[cfg(feature = "cuda")]
use std::sync::Arc;

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaContext, CudaSlice, CudaStream, DriverError};
#[cfg(feature = "cuda")]
use log::{info, warn};
#[cfg(feature = "cuda")]
use rfft2_core::error::{ensure_transfer_len, TransferDirection};

/// Runtime code reported when the crate was built without CUDA support
/// (`cudaErrorNoDevice`).
pub const NO_DEVICE: i32 = 100;

// ============================================================================
// Element Types
// ============================================================================

/// Host element types that live on the device as `f32` words.
pub trait DeviceScalar: Copy {
    /// `f32` words per element.
    const WORDS: usize;

    fn as_words(data: &[Self]) -> &[f32];
    fn as_words_mut(data: &mut [Self]) -> &mut [f32];
}

impl DeviceScalar for f32 {
    const WORDS: usize = 1;

    fn as_words(data: &[Self]) -> &[f32] {
        data
    }

    fn as_words_mut(data: &mut [Self]) -> &mut [f32] {
        data
    }
}

impl DeviceScalar for Complex32 {
    const WORDS: usize = 2;

    /// `Complex32` is `repr(C)` with layout `[re: f32, im: f32]`.
    fn as_words(data: &[Self]) -> &[f32] {
        unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, data.len() * 2) }
    }

    fn as_words_mut(data: &mut [Self]) -> &mut [f32] {
        unsafe { std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut f32, data.len() * 2) }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// cuFFT backend bound to one CUDA device.
pub struct CudaBackend {
    ordinal: usize,
    #[cfg(feature = "cuda")]
    ctx: Arc<CudaContext>,
    #[cfg(feature = "cuda")]
    stream: Arc<CudaStream>,
    #[cfg(not(feature = "cuda"))]
    unavailable: std::convert::Infallible,
}

impl CudaBackend {
    /// Open device `ordinal` and its default stream.
    #[cfg(feature = "cuda")]
    pub fn try_new(ordinal: usize) -> Result<Self, DeviceError> {
        let ctx = CudaContext::new(ordinal).map_err(|err| DeviceError::Unavailable {
            ordinal,
            code: driver_code(&err),
            reason: err.to_string(),
        })?;
        let stream = ctx.default_stream();
        info!("[cuda] opened device {ordinal}");
        Ok(Self {
            ordinal,
            ctx,
            stream,
        })
    }

    #[cfg(not(feature = "cuda"))]
    pub fn try_new(ordinal: usize) -> Result<Self, DeviceError> {
        Err(DeviceError::Unavailable {
            ordinal,
            code: NO_DEVICE,
            reason: "compiled without the \"cuda\" feature".into(),
        })
    }

    /// Check if a CUDA device is usable at runtime.
    #[cfg(feature = "cuda")]
    pub fn is_available() -> bool {
        CudaContext::new(0).is_ok()
    }

    #[cfg(not(feature = "cuda"))]
    pub fn is_available() -> bool {
        false
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    #[cfg(feature = "cuda")]
    pub fn context(&self) -> &Arc<CudaContext> {
        &self.ctx
    }

    #[cfg(feature = "cuda")]
    pub fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }
}

// ============================================================================
// Device Buffers
// ============================================================================

/// Device allocation of `len` elements of `T`, freed when dropped.
pub struct CudaBuffer<T> {
    #[cfg(feature = "cuda")]
    data: CudaSlice<f32>,
    len: usize,
    _elem: PhantomData<T>,
}

impl<T> DeviceBuffer for CudaBuffer<T> {
    fn len(&self) -> usize {
        self.len
    }
}

// ============================================================================
// FftDevice Implementation (with CUDA feature)
// ============================================================================

#[cfg(feature = "cuda")]
fn driver_code(err: &DriverError) -> i32 {
    err.0 as i32
}

#[cfg(feature = "cuda")]
impl CudaBackend {
    fn alloc<T: DeviceScalar>(&self, len: usize) -> Result<CudaBuffer<T>, DeviceError> {
        let data = self
            .stream
            .alloc_zeros::<f32>(len * T::WORDS)
            .map_err(|err| DeviceError::Allocation {
                bytes: len * std::mem::size_of::<T>(),
                code: driver_code(&err),
                reason: err.to_string(),
            })?;
        Ok(CudaBuffer {
            data,
            len,
            _elem: PhantomData,
        })
    }

    fn upload<T: DeviceScalar>(&self, host: &[T], device: &mut CudaBuffer<T>) -> Result<(), DeviceError> {
        let direction = TransferDirection::HostToDevice;
        ensure_transfer_len(direction, host.len(), device.len, std::mem::size_of::<T>())?;
        self.stream
            .memcpy_htod(T::as_words(host), &mut device.data)
            .map_err(|err| transfer_error(direction, std::mem::size_of_val(host), &err))
    }

    /// Blocking copy back to the host; waits for every queued transform.
    fn download<T: DeviceScalar>(&self, device: &CudaBuffer<T>, host: &mut [T]) -> Result<(), DeviceError> {
        let direction = TransferDirection::DeviceToHost;
        let bytes = std::mem::size_of_val(host);
        ensure_transfer_len(direction, host.len(), device.len, std::mem::size_of::<T>())?;
        self.stream
            .memcpy_dtoh(&device.data, T::as_words_mut(host))
            .map_err(|err| transfer_error(direction, bytes, &err))?;
        self.stream
            .synchronize()
            .map_err(|err| transfer_error(direction, bytes, &err))
    }
}

#[cfg(feature = "cuda")]
fn transfer_error(direction: TransferDirection, bytes: usize, err: &DriverError) -> DeviceError {
    DeviceError::Transfer {
        direction,
        bytes,
        code: driver_code(err),
        reason: err.to_string(),
    }
}

#[cfg(feature = "cuda")]
impl FftDevice for CudaBackend {
    type RealBuffer = CudaBuffer<f32>;
    type ComplexBuffer = CudaBuffer<Complex32>;
    type Plan = CufftPlan;

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn alloc_real(&self, len: usize) -> Result<Self::RealBuffer, DeviceError> {
        self.alloc(len)
    }

    fn alloc_complex(&self, len: usize) -> Result<Self::ComplexBuffer, DeviceError> {
        self.alloc(len)
    }

    fn upload_real(&self, host: &[f32], device: &mut Self::RealBuffer) -> Result<(), DeviceError> {
        self.upload(host, device)
    }

    fn upload_complex(
        &self,
        host: &[Complex32],
        device: &mut Self::ComplexBuffer,
    ) -> Result<(), DeviceError> {
        self.upload(host, device)
    }

    fn download_real(&self, device: &Self::RealBuffer, host: &mut [f32]) -> Result<(), DeviceError> {
        self.download(device, host)
    }

    fn download_complex(
        &self,
        device: &Self::ComplexBuffer,
        host: &mut [Complex32],
    ) -> Result<(), DeviceError> {
        self.download(device, host)
    }

    fn plan(&self, descriptor: &PlanDescriptor) -> Result<Self::Plan, FftError> {
        CufftPlan::new(descriptor, &self.stream)
    }

    fn exec_r2c(
        &self,
        plan: &Self::Plan,
        input: &Self::RealBuffer,
        output: &mut Self::ComplexBuffer,
    ) -> Result<(), FftError> {
        plan.exec_r2c(&input.data, &mut output.data, &self.stream)
    }

    fn exec_c2r(
        &self,
        plan: &Self::Plan,
        input: &mut Self::ComplexBuffer,
        output: &mut Self::RealBuffer,
    ) -> Result<(), FftError> {
        plan.exec_c2r(&mut input.data, &mut output.data, &self.stream)
    }

    /// Must only be called once every buffer and plan has been dropped.
    fn reset(&self) {
        let status = unsafe { cufft_sys::cudaDeviceReset() };
        if status == 0 {
            info!("[cuda] device {} reset", self.ordinal);
        } else {
            warn!("[cuda] cudaDeviceReset on device {} returned {status}", self.ordinal);
        }
    }
}

// ============================================================================
// FftDevice Implementation (without CUDA feature)
// ============================================================================

/// No `CudaBackend` can be constructed without the feature, so every method
/// is statically unreachable.
#[cfg(not(feature = "cuda"))]
impl FftDevice for CudaBackend {
    type RealBuffer = CudaBuffer<f32>;
    type ComplexBuffer = CudaBuffer<Complex32>;
    type Plan = std::convert::Infallible;

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn alloc_real(&self, _len: usize) -> Result<Self::RealBuffer, DeviceError> {
        let never = self.unavailable;
        match never {}
    }

    fn alloc_complex(&self, _len: usize) -> Result<Self::ComplexBuffer, DeviceError> {
        let never = self.unavailable;
        match never {}
    }

    fn upload_real(&self, _host: &[f32], _device: &mut Self::RealBuffer) -> Result<(), DeviceError> {
        let never = self.unavailable;
        match never {}
    }

    fn upload_complex(
        &self,
        _host: &[Complex32],
        _device: &mut Self::ComplexBuffer,
    ) -> Result<(), DeviceError> {
        let never = self.unavailable;
        match never {}
    }

    fn download_real(&self, _device: &Self::RealBuffer, _host: &mut [f32]) -> Result<(), DeviceError> {
        let never = self.unavailable;
        match never {}
    }

    fn download_complex(
        &self,
        _device: &Self::ComplexBuffer,
        _host: &mut [Complex32],
    ) -> Result<(), DeviceError> {
        let never = self.unavailable;
        match never {}
    }

    fn plan(&self, _descriptor: &PlanDescriptor) -> Result<Self::Plan, FftError> {
        let never = self.unavailable;
        match never {}
    }

    fn exec_r2c(
        &self,
        plan: &Self::Plan,
        _input: &Self::RealBuffer,
        _output: &mut Self::ComplexBuffer,
    ) -> Result<(), FftError> {
        let never = *plan;
        match never {}
    }

    fn exec_c2r(
        &self,
        plan: &Self::Plan,
        _input: &mut Self::ComplexBuffer,
        _output: &mut Self::RealBuffer,
    ) -> Result<(), FftError> {
        let never = *plan;
        match never {}
    }

    fn reset(&self) {
        let never = self.unavailable;
        match never {}
    }
}
