//! Backend traits for device memory and real transforms.
//!
//! # Protocol
//!
//! A backend exposes the plan/execute/transfer protocol of a GPU FFT library:
//! - **Memory**: zero-filled device buffers, released when dropped
//! - **Transfers**: synchronous copies of exactly `len * size_of::<T>()` bytes
//! - **Plans**: built once per direction from a [`PlanDescriptor`]
//! - **Execution**: unnormalized R2C / C2R over device buffers
//!
//! Single-precision throughout: real samples are `f32`, spectrum bins are
//! [`Complex32`].

use num_complex::Complex32;

use crate::error::{DeviceError, FftError};
use crate::plan::PlanDescriptor;

/// A device-resident array.
pub trait DeviceBuffer {
    /// Element count (not bytes).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait FftDevice {
    type RealBuffer: DeviceBuffer;
    type ComplexBuffer: DeviceBuffer;
    type Plan;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    fn alloc_real(&self, len: usize) -> Result<Self::RealBuffer, DeviceError>;
    fn alloc_complex(&self, len: usize) -> Result<Self::ComplexBuffer, DeviceError>;

    fn upload_real(&self, host: &[f32], device: &mut Self::RealBuffer) -> Result<(), DeviceError>;
    fn upload_complex(
        &self,
        host: &[Complex32],
        device: &mut Self::ComplexBuffer,
    ) -> Result<(), DeviceError>;

    /// Copy device data back to the host. Returns only once the data (and any
    /// transform queued before it) has completed.
    fn download_real(&self, device: &Self::RealBuffer, host: &mut [f32]) -> Result<(), DeviceError>;
    fn download_complex(
        &self,
        device: &Self::ComplexBuffer,
        host: &mut [Complex32],
    ) -> Result<(), DeviceError>;

    /// Build a plan. Implementations must reject every descriptor that
    /// [`PlanDescriptor::validate`] rejects.
    fn plan(&self, descriptor: &PlanDescriptor) -> Result<Self::Plan, FftError>;

    /// Forward real-to-complex transform.
    fn exec_r2c(
        &self,
        plan: &Self::Plan,
        input: &Self::RealBuffer,
        output: &mut Self::ComplexBuffer,
    ) -> Result<(), FftError>;

    /// Inverse complex-to-real transform. The input buffer may be overwritten.
    ///
    /// The result is **unnormalized**: `C2R(R2C(x)) = x * prod(dims)`.
    fn exec_c2r(
        &self,
        plan: &Self::Plan,
        input: &mut Self::ComplexBuffer,
        output: &mut Self::RealBuffer,
    ) -> Result<(), FftError>;

    /// Reset process-wide device state after an unrecoverable failure.
    fn reset(&self);
}
