//! Error types shared by every device backend.
//!
//! Two taxonomies exist: transfer-layer failures (allocation and host/device
//! copies, numbered like the CUDA runtime) and transform-layer failures (plan
//! construction and execution, numbered like cuFFT).

use crate::diagnostics::{describe, FftStatus};
use crate::plan::TransformKind;

/// Direction of a host/device copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::HostToDevice => write!(f, "host-to-device"),
            TransferDirection::DeviceToHost => write!(f, "device-to-host"),
        }
    }
}

/// Device bring-up, allocation and copy failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("device {ordinal} unavailable: {reason} (runtime error {code})")]
    Unavailable {
        ordinal: usize,
        code: i32,
        reason: String,
    },

    #[error("device allocation of {bytes} bytes failed: {reason} (runtime error {code})")]
    Allocation {
        bytes: usize,
        code: i32,
        reason: String,
    },

    #[error("{direction} copy of {bytes} bytes failed: {reason} (runtime error {code})")]
    Transfer {
        direction: TransferDirection,
        bytes: usize,
        code: i32,
        reason: String,
    },
}

impl DeviceError {
    /// Runtime code for an invalid argument (`cudaErrorInvalidValue`).
    pub const INVALID_VALUE: i32 = 1;
    /// Runtime code for an exhausted device heap (`cudaErrorMemoryAllocation`).
    pub const MEMORY_ALLOCATION: i32 = 2;

    /// Raw runtime status code.
    pub fn code(&self) -> i32 {
        match self {
            DeviceError::Unavailable { code, .. }
            | DeviceError::Allocation { code, .. }
            | DeviceError::Transfer { code, .. } => *code,
        }
    }

    pub fn out_of_memory(bytes: usize) -> Self {
        DeviceError::Allocation {
            bytes,
            code: Self::MEMORY_ALLOCATION,
            reason: "out of memory".into(),
        }
    }
}

/// Reject a copy whose host and device sides disagree on element count.
pub fn ensure_transfer_len(
    direction: TransferDirection,
    host_len: usize,
    device_len: usize,
    element_size: usize,
) -> Result<(), DeviceError> {
    if host_len == device_len {
        return Ok(());
    }
    Err(DeviceError::Transfer {
        direction,
        bytes: host_len * element_size,
        code: DeviceError::INVALID_VALUE,
        reason: format!("host buffer holds {host_len} elements, device buffer holds {device_len}"),
    })
}

/// Plan construction and execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FftError {
    #[error("{kind} plan construction failed: error {code}: {}", status_name(.code))]
    Plan { kind: TransformKind, code: i32 },

    #[error("{kind} execution failed: error {code}: {}", status_name(.code))]
    Execution { kind: TransformKind, code: i32 },
}

fn status_name(code: &i32) -> &'static str {
    describe(*code)
}

impl FftError {
    pub fn plan(kind: TransformKind, status: FftStatus) -> Self {
        FftError::Plan {
            kind,
            code: status.code(),
        }
    }

    pub fn execution(kind: TransformKind, status: FftStatus) -> Self {
        FftError::Execution {
            kind,
            code: status.code(),
        }
    }

    /// Raw backend status code.
    pub fn code(&self) -> i32 {
        match self {
            FftError::Plan { code, .. } | FftError::Execution { code, .. } => *code,
        }
    }

    /// Decoded status, if the code is in the known table.
    pub fn status(&self) -> Option<FftStatus> {
        FftStatus::from_code(self.code())
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            FftError::Plan { kind, .. } | FftError::Execution { kind, .. } => *kind,
        }
    }
}
