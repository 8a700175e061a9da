//! Boundary-scan (IEEE 1149.1 / JTAG) control and STAPL (JESD71) playback.
//!
//! `bscan` builds an in-memory model of a device from a BSDL attribute bag,
//! drives that device's TAP through a bit-serial [`Transport`], and exposes
//! its boundary-register cells as ordinary I/O pins while the device sits in
//! `EXTEST`. The same TAP controller can also act as the host for a
//! tree-walking STAPL interpreter, so vendor-supplied `.stapl` programming
//! and test files can be played back against the same transport.
//!
//! ```no_run
//! use bscan::device::{Chain, Device, bsdl::BsdlAttributes};
//! use bscan::tap::TapController;
//!
//! # fn example(transport: impl bscan::Transport) -> Result<(), bscan::Error> {
//! let attrs = BsdlAttributes {
//!     instruction_length: "4".into(),
//!     instruction_opcode: "BYPASS (1111), EXTEST (0000)".into(),
//!     idcode_register: None,
//!     boundary_length: "0".into(),
//!     boundary_register: String::new(),
//!     tap_scan_clock: None,
//! };
//! let device = Device::from_bsdl(&attrs)?;
//! let mut chain = Chain::new();
//! chain.add_device(device);
//! let mut tap = TapController::new(transport);
//! tap.validate_chain(&mut chain)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod device;
mod error;
pub mod scan;
pub mod stapl;
pub mod tap;
#[cfg(any(test, feature = "test"))]
pub mod test_support;
mod transport;

pub use crate::error::Error;
pub use crate::tap::TapController;
pub use crate::transport::Transport;
