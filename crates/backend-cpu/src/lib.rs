//! Host-emulated FFT device built on rustfft.
//!
//! `CpuBackend` follows the same protocol as the GPU backends: buffers are
//! explicitly allocated (and accounted for in a [`MemoryLedger`]), copies are
//! length-checked, plans are validated with the same status codes, and the
//! inverse transform is unnormalized.
//!
//! # Transform Strategy
//!
//! Each transform of a batch is gathered through its layout into a dense
//! complex scratch array, transformed axis by axis, and scattered back:
//! - **R2C**: full complex FFT of the real input, keep `n/2 + 1` bins of the
//!   last axis
//! - **C2R**: rebuild the full spectrum from Hermitian symmetry, inverse FFT,
//!   keep the real part

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use num_complex::Complex32;
use parking_lot::Mutex;
use rustfft::{Fft, FftDirection, FftPlanner};

use rfft2_core::backend::{DeviceBuffer, FftDevice};
use rfft2_core::diagnostics::FftStatus;
use rfft2_core::error::{ensure_transfer_len, DeviceError, FftError, TransferDirection};
use rfft2_core::plan::{PlanDescriptor, TransformKind};
use rfft2_core::shape::{for_each_index, row_major};

// ============================================================================
// Memory Ledger
// ============================================================================

/// Byte accounting for host-emulated device memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    capacity: Option<usize>,
    live: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
}

impl MemoryLedger {
    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn reserve(&self, bytes: usize) -> Result<(), DeviceError> {
        let capacity = self.capacity.unwrap_or(usize::MAX);
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                live.checked_add(bytes).filter(|&total| total <= capacity)
            })
            .map_err(|_| DeviceError::out_of_memory(bytes))?;
        self.peak
            .fetch_max(self.live.load(Ordering::Acquire), Ordering::AcqRel);
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        self.live.fetch_sub(bytes, Ordering::AcqRel);
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes currently held by live buffers.
    pub fn live_bytes(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

// ============================================================================
// Device Buffers
// ============================================================================

/// Host-resident stand-in for a device allocation. Releases its bytes from
/// the ledger when dropped.
pub struct CpuBuffer<T> {
    data: Vec<T>,
    ledger: Arc<MemoryLedger>,
}

impl<T: Clone + Default> CpuBuffer<T> {
    fn zeros(len: usize, ledger: &Arc<MemoryLedger>) -> Result<Self, DeviceError> {
        ledger.reserve(len * std::mem::size_of::<T>())?;
        Ok(Self {
            data: vec![T::default(); len],
            ledger: Arc::clone(ledger),
        })
    }
}

impl<T> CpuBuffer<T> {
    /// Direct view of the emulated device memory.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}

impl<T> DeviceBuffer for CpuBuffer<T> {
    fn len(&self) -> usize {
        self.data.len()
    }
}

impl<T> Drop for CpuBuffer<T> {
    fn drop(&mut self) {
        self.ledger.release(self.bytes());
    }
}

// ============================================================================
// Plans
// ============================================================================

/// Validated descriptor plus one rustfft kernel per axis.
pub struct CpuPlan {
    descriptor: PlanDescriptor,
    axes: Vec<Arc<dyn Fft<f32>>>,
}

impl CpuPlan {
    pub fn descriptor(&self) -> &PlanDescriptor {
        &self.descriptor
    }

    fn check_kind(&self, kind: TransformKind) -> Result<(), FftError> {
        if self.descriptor.kind != kind {
            return Err(FftError::execution(kind, FftStatus::InvalidType));
        }
        Ok(())
    }

    fn check_lengths(&self, input_len: usize, output_len: usize) -> Result<(), FftError> {
        if input_len < self.descriptor.input_required_len()
            || output_len < self.descriptor.output_required_len()
        {
            return Err(FftError::execution(self.descriptor.kind, FftStatus::InvalidValue));
        }
        Ok(())
    }
}

// ============================================================================
// Backend
// ============================================================================

pub struct CpuBackend {
    planner: Mutex<FftPlanner<f32>>,
    ledger: Arc<MemoryLedger>,
    resets: AtomicUsize,
}

impl CpuBackend {
    /// Backend with unbounded memory.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Backend whose allocations fail once `bytes` are live.
    pub fn with_capacity(bytes: usize) -> Self {
        Self::build(Some(bytes))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
            ledger: Arc::new(MemoryLedger::with_capacity(capacity)),
            resets: AtomicUsize::new(0),
        }
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    /// Number of times [`FftDevice::reset`] has been called.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FftDevice for CpuBackend {
    type RealBuffer = CpuBuffer<f32>;
    type ComplexBuffer = CpuBuffer<Complex32>;
    type Plan = CpuPlan;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn alloc_real(&self, len: usize) -> Result<Self::RealBuffer, DeviceError> {
        CpuBuffer::zeros(len, &self.ledger)
    }

    fn alloc_complex(&self, len: usize) -> Result<Self::ComplexBuffer, DeviceError> {
        CpuBuffer::zeros(len, &self.ledger)
    }

    fn upload_real(&self, host: &[f32], device: &mut Self::RealBuffer) -> Result<(), DeviceError> {
        copy_checked(TransferDirection::HostToDevice, host, &mut device.data)
    }

    fn upload_complex(
        &self,
        host: &[Complex32],
        device: &mut Self::ComplexBuffer,
    ) -> Result<(), DeviceError> {
        copy_checked(TransferDirection::HostToDevice, host, &mut device.data)
    }

    fn download_real(&self, device: &Self::RealBuffer, host: &mut [f32]) -> Result<(), DeviceError> {
        copy_checked(TransferDirection::DeviceToHost, &device.data, host)
    }

    fn download_complex(
        &self,
        device: &Self::ComplexBuffer,
        host: &mut [Complex32],
    ) -> Result<(), DeviceError> {
        copy_checked(TransferDirection::DeviceToHost, &device.data, host)
    }

    fn plan(&self, descriptor: &PlanDescriptor) -> Result<Self::Plan, FftError> {
        descriptor.validate()?;
        let direction = match descriptor.kind {
            TransformKind::RealToComplex => FftDirection::Forward,
            TransformKind::ComplexToReal => FftDirection::Inverse,
        };
        let mut planner = self.planner.lock();
        let axes = descriptor
            .shape
            .dims()
            .iter()
            .map(|&n| planner.plan_fft(n, direction))
            .collect();
        debug!(
            "[cpu] {} plan for {}: input {:?}, output {:?}",
            descriptor.kind,
            descriptor.shape,
            descriptor.input_layout(),
            descriptor.output_layout()
        );
        Ok(CpuPlan {
            descriptor: descriptor.clone(),
            axes,
        })
    }

    fn exec_r2c(
        &self,
        plan: &Self::Plan,
        input: &Self::RealBuffer,
        output: &mut Self::ComplexBuffer,
    ) -> Result<(), FftError> {
        plan.check_kind(TransformKind::RealToComplex)?;
        plan.check_lengths(input.len(), output.len())?;

        let desc = &plan.descriptor;
        let dims = desc.shape.dims();
        let spectrum_dims = desc.shape.spectrum_dims();
        let mut work = vec![Complex32::default(); desc.shape.logical_len()];

        for batch in 0..desc.shape.batch() {
            for_each_index(dims, |index| {
                let sample = input.data[desc.real_layout.offset(batch, index)];
                work[row_major(dims, index)] = Complex32::new(sample, 0.0);
            });

            transform_nd(&plan.axes, dims, &mut work);

            for_each_index(&spectrum_dims, |index| {
                output.data[desc.complex_layout.offset(batch, index)] = work[row_major(dims, index)];
            });
        }
        Ok(())
    }

    fn exec_c2r(
        &self,
        plan: &Self::Plan,
        input: &mut Self::ComplexBuffer,
        output: &mut Self::RealBuffer,
    ) -> Result<(), FftError> {
        plan.check_kind(TransformKind::ComplexToReal)?;
        plan.check_lengths(input.len(), output.len())?;

        let desc = &plan.descriptor;
        let dims = desc.shape.dims();
        let last = dims.len() - 1;
        let half = dims[last] / 2;
        let mut work = vec![Complex32::default(); desc.shape.logical_len()];
        let mut mirror = vec![0usize; dims.len()];

        for batch in 0..desc.shape.batch() {
            for_each_index(dims, |index| {
                let bin = if index[last] <= half {
                    input.data[desc.complex_layout.offset(batch, index)]
                } else {
                    // X[k] = conj(X[-k]) for real signals.
                    for (axis, (&k, &n)) in index.iter().zip(dims).enumerate() {
                        mirror[axis] = (n - k) % n;
                    }
                    input.data[desc.complex_layout.offset(batch, &mirror)].conj()
                };
                work[row_major(dims, index)] = bin;
            });

            transform_nd(&plan.axes, dims, &mut work);

            for_each_index(dims, |index| {
                output.data[desc.real_layout.offset(batch, index)] = work[row_major(dims, index)].re;
            });
        }
        Ok(())
    }

    fn reset(&self) {
        let live = self.ledger.live_bytes();
        if live > 0 {
            warn!("[cpu] device reset with {live} bytes still allocated");
        } else {
            info!("[cpu] device reset");
        }
        *self.planner.lock() = FftPlanner::new();
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

fn copy_checked<T: Copy>(
    direction: TransferDirection,
    src: &[T],
    dst: &mut [T],
) -> Result<(), DeviceError> {
    let (host_len, device_len) = match direction {
        TransferDirection::HostToDevice => (src.len(), dst.len()),
        TransferDirection::DeviceToHost => (dst.len(), src.len()),
    };
    ensure_transfer_len(direction, host_len, device_len, std::mem::size_of::<T>())?;
    dst.copy_from_slice(src);
    Ok(())
}

/// In-place unnormalized N-d FFT of a dense row-major array.
fn transform_nd(axes: &[Arc<dyn Fft<f32>>], dims: &[usize], data: &mut [Complex32]) {
    for (axis, fft) in axes.iter().enumerate() {
        let n = dims[axis];
        let inner: usize = dims[axis + 1..].iter().product();
        let outer: usize = dims[..axis].iter().product();

        if inner == 1 {
            // Last axis is contiguous: transform rows in place.
            fft.process(data);
            continue;
        }

        let mut line = vec![Complex32::default(); n];
        for o in 0..outer {
            for i in 0..inner {
                let base = o * n * inner + i;
                for (k, slot) in line.iter_mut().enumerate() {
                    *slot = data[base + k * inner];
                }
                fft.process(&mut line);
                for (k, value) in line.iter().enumerate() {
                    data[base + k * inner] = *value;
                }
            }
        }
    }
}

#[cfg(test)]
mod _tests_lib;
