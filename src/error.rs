use crate::device::UnsupportedOperationError;
use crate::device::bsdl::BsdlError;
use crate::stapl::StaplError;
use crate::tap::ScanChainError;

/// The overarching error type returned by the public API of this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A chain-detection or validation error occurred (stuck TDO, length
    /// mismatch, IDCODE mismatch).
    #[error("scan chain error")]
    Chain(#[from] ScanChainError),

    /// An operation that a device or pin does not support was requested.
    #[error("unsupported operation")]
    Unsupported(#[from] UnsupportedOperationError),

    /// A BSDL attribute could not be parsed into a device model.
    #[error("BSDL parse error")]
    Bsdl(#[from] BsdlError),

    /// A STAPL parse or runtime error occurred.
    #[error("STAPL error")]
    Stapl(#[from] StaplError),
}
