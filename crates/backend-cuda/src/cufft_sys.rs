//! Raw FFI bindings to the cuFFT entry points used for single-precision real
//! transforms, plus the one CUDA runtime call needed for device reset.
//!
//! Every function returns its status as a plain `c_int` so that codes outside
//! the documented table can be reported instead of being undefined behavior.
//!
//! cuFFT documentation: https://docs.nvidia.com/cuda/cufft/

#![allow(non_camel_case_types)]

use std::ffi::c_int;

/// cuFFT plan handle.
pub type cufftHandle = c_int;

/// Status code returned by every cuFFT call (`CUFFT_SUCCESS` is 0).
pub type cufftResult = c_int;

/// CUDA runtime status code (`cudaSuccess` is 0).
pub type cudaError_t = c_int;

pub const CUFFT_SUCCESS: cufftResult = 0;

/// cuFFT transform types.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum cufftType {
    /// Real to Complex (interleaved) - single precision
    CUFFT_R2C = 0x2a,
    /// Complex (interleaved) to Real - single precision
    CUFFT_C2R = 0x2c,
}

/// Single-precision real sample.
pub type cufftReal = f32;

/// Single-precision complex number (matches `cuComplex` / `float2`).
///
/// Same memory layout as `num_complex::Complex32`: `[re: f32, im: f32]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct cufftComplex {
    pub x: f32,
    pub y: f32,
}

/// CUDA stream type (opaque pointer).
pub type cudaStream_t = *mut std::ffi::c_void;

#[link(name = "cufft")]
unsafe extern "C" {
    /// Creates a batched plan with advanced data layout.
    ///
    /// `inembed`/`onembed` give the storage extents of each axis (the first
    /// entry is ignored by cuFFT); element `i` of transform `b` lives at
    /// `b * dist + stride * flat(i; embed)`.
    pub fn cufftPlanMany(
        plan: *mut cufftHandle,
        rank: c_int,
        n: *mut c_int,
        inembed: *mut c_int,
        istride: c_int,
        idist: c_int,
        onembed: *mut c_int,
        ostride: c_int,
        odist: c_int,
        fft_type: cufftType,
        batch: c_int,
    ) -> cufftResult;

    /// Executes a single-precision real-to-complex (forward) transform.
    pub fn cufftExecR2C(
        plan: cufftHandle,
        idata: *mut cufftReal,
        odata: *mut cufftComplex,
    ) -> cufftResult;

    /// Executes a single-precision complex-to-real (inverse) transform.
    ///
    /// Unnormalized, and the input array may be overwritten.
    pub fn cufftExecC2R(
        plan: cufftHandle,
        idata: *mut cufftComplex,
        odata: *mut cufftReal,
    ) -> cufftResult;

    /// Associates a CUDA stream with a plan. All kernel launches of the plan
    /// are enqueued on this stream.
    pub fn cufftSetStream(plan: cufftHandle, stream: cudaStream_t) -> cufftResult;

    /// Destroys a plan and releases its GPU resources.
    pub fn cufftDestroy(plan: cufftHandle) -> cufftResult;
}

#[link(name = "cudart")]
unsafe extern "C" {
    /// Destroys all allocations and resets all state on the current device.
    pub fn cudaDeviceReset() -> cudaError_t;
}
