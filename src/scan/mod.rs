//! Fan-out tracing of TAP activity, independent of logging.
//!
//! Grounded on `ebyst/tap_controller.py`'s `trace()`/`export()` methods,
//! which record every state transition and shift for later inspection
//! (e.g. dumping a VCD-like trace of a session). `tracing` spans cover
//! ad hoc diagnostic logging elsewhere in this crate; [`TraceHub`] is for
//! callers that want a structured, programmatic record of the scan
//! traffic itself.

mod cycle;
mod trace;

pub use cycle::{cycle, YieldOnce};
pub use trace::{RegisterKind, TraceHub, TraceListener};
