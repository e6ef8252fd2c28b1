//! Report output.
//!
//! - [`json`]: writes an [`IntelReport`](crate::models::IntelReport) to a
//!   dated directory for later consumption

pub mod json;
