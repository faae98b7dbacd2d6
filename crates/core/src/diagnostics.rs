//! Backend status codes and their canonical names.
//!
//! The numbering is shared by cuFFT and hipFFT, so a raw code returned by
//! either library decodes through the same table.

/// Identifier returned for codes outside the known set.
pub const UNKNOWN_STATUS: &str = "<unknown>";

/// FFT library result codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FftStatus {
    Success = 0,
    InvalidPlan = 1,
    AllocFailed = 2,
    InvalidType = 3,
    InvalidValue = 4,
    InternalError = 5,
    ExecFailed = 6,
    SetupFailed = 7,
    InvalidSize = 8,
    UnalignedData = 9,
    IncompleteParameterList = 10,
    InvalidDevice = 11,
    ParseError = 12,
    NoWorkspace = 13,
    NotImplemented = 14,
    LicenseError = 15,
    NotSupported = 16,
}

impl FftStatus {
    pub const ALL: [FftStatus; 17] = [
        FftStatus::Success,
        FftStatus::InvalidPlan,
        FftStatus::AllocFailed,
        FftStatus::InvalidType,
        FftStatus::InvalidValue,
        FftStatus::InternalError,
        FftStatus::ExecFailed,
        FftStatus::SetupFailed,
        FftStatus::InvalidSize,
        FftStatus::UnalignedData,
        FftStatus::IncompleteParameterList,
        FftStatus::InvalidDevice,
        FftStatus::ParseError,
        FftStatus::NoWorkspace,
        FftStatus::NotImplemented,
        FftStatus::LicenseError,
        FftStatus::NotSupported,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == FftStatus::Success
    }

    pub fn name(self) -> &'static str {
        match self {
            FftStatus::Success => "CUFFT_SUCCESS",
            FftStatus::InvalidPlan => "CUFFT_INVALID_PLAN",
            FftStatus::AllocFailed => "CUFFT_ALLOC_FAILED",
            FftStatus::InvalidType => "CUFFT_INVALID_TYPE",
            FftStatus::InvalidValue => "CUFFT_INVALID_VALUE",
            FftStatus::InternalError => "CUFFT_INTERNAL_ERROR",
            FftStatus::ExecFailed => "CUFFT_EXEC_FAILED",
            FftStatus::SetupFailed => "CUFFT_SETUP_FAILED",
            FftStatus::InvalidSize => "CUFFT_INVALID_SIZE",
            FftStatus::UnalignedData => "CUFFT_UNALIGNED_DATA",
            FftStatus::IncompleteParameterList => "CUFFT_INCOMPLETE_PARAMETER_LIST",
            FftStatus::InvalidDevice => "CUFFT_INVALID_DEVICE",
            FftStatus::ParseError => "CUFFT_PARSE_ERROR",
            FftStatus::NoWorkspace => "CUFFT_NO_WORKSPACE",
            FftStatus::NotImplemented => "CUFFT_NOT_IMPLEMENTED",
            FftStatus::LicenseError => "CUFFT_LICENSE_ERROR",
            FftStatus::NotSupported => "CUFFT_NOT_SUPPORTED",
        }
    }
}

impl std::fmt::Display for FftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error {}: {}", self.code(), self.name())
    }
}

/// Decode a raw backend status code for reporting.
pub fn describe(code: i32) -> &'static str {
    FftStatus::from_code(code).map_or(UNKNOWN_STATUS, FftStatus::name)
}
