use thiserror::Error;

/// Convenience alias for results using the scan error type.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors raised by the scan engine and the device gateways.
///
/// Timeouts are deliberately absent: a ramp or poll loop that runs out of
/// time reports a status value (`RampStatus::TimedOut`, `StepStatus::TimedOut`)
/// and the caller proceeds with whatever was collected.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot reach {device}: {reason}")]
    Connection { device: String, reason: String },

    #[error("device i/o failed during {op}: {reason}")]
    DeviceIo { op: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no events collected, nothing to assemble")]
    EmptyInput,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ScanError {
    pub fn connection(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub fn device_io(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceIo {
            op: op.into(),
            reason: reason.into(),
        }
    }
}
