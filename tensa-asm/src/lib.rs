//! Pure AArch64/NEON instruction encoders.
//!
//! Every function in [`base`] and [`simd`] turns symbolic operands into a
//! single 32-bit instruction word. The encoders hold no state; operand
//! validation happens at the call and surfaces as [`EncodeError`]. Words
//! are emitted in program order by the consumer and written little-endian.

#![warn(missing_docs)]

pub mod base;
mod error;
pub mod fmt;
mod reg;
pub mod simd;

pub use error::EncodeError;
pub use reg::{ArrSpec, Gpr, NeonSize, VReg};

#[cfg(test)]
mod encoding_tests;
