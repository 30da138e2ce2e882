//! Distributed search procedures.
//!
//! Only the Search Continuation Reference (SCR) procedure lives here; the
//! search evaluation itself belongs to the operation-processing layer.

pub mod scr;

pub use scr::scr_procedure;
