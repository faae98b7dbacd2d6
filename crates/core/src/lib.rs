//! Core model and driver for batched real-to-complex / complex-to-real FFT
//! round trips on an accelerator device.

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod plan;
pub mod report;
pub mod shape;

pub use backend::{DeviceBuffer, FftDevice};
pub use config::{BackendKind, ConfigError, RoundTripConfig, SignalSpec};
pub use diagnostics::{describe, FftStatus};
pub use driver::{PipelineFailure, RoundTrip, RoundTripError, RoundTripOptions, Stage};
pub use error::{DeviceError, FftError, TransferDirection};
pub use plan::{build_plan, PlanDescriptor, TransformKind};
pub use report::{NullSink, ReportSink, RoundTripReport, TextSink, Verification};
pub use shape::{LayoutDescriptor, TransformShape};

#[cfg(test)]
mod _tests_plan;
