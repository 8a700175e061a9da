//! The IEEE 1149.1 TAP state machine and the controller that drives a
//! scan chain through it.

pub mod controller;
pub mod state;

pub use controller::TapController;
pub use state::State;

/// A scan-chain detection or validation failure.
///
/// Grounded on probe-rs's `probe::common::ScanChainError`.
#[derive(Debug, thiserror::Error)]
pub enum ScanChainError {
    /// No devices responded during chain auto-detection (TDO stuck high
    /// or low, or no TAPs present).
    #[error("no devices detected on the scan chain")]
    NoDevicesDetected,
    /// A device's captured IDCODE did not match its expected pattern.
    #[error("IDCODE mismatch for device {index}")]
    IdcodeMismatch {
        /// Index of the mismatching device in chain order.
        index: usize,
    },
    /// The number of devices found during detection did not match what
    /// the caller expected.
    #[error("chain length mismatch: expected {expected} devices, detected {actual}")]
    ChainLengthMismatch {
        /// Devices the caller expected.
        expected: usize,
        /// Devices actually detected.
        actual: usize,
    },
    /// An operation was attempted against a device that does not support
    /// it.
    #[error(transparent)]
    Device(#[from] crate::device::UnsupportedOperationError),
}
