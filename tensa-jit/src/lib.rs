//! JIT tensor-computation engine for 64-bit ARM with NEON.
//!
//! The pipeline: an einsum expression is parsed into a tree of
//! contraction nodes ([`einsum`]), each node's loop nest is rewritten by
//! the [`optimizer`], and the [`tensor_op`] driver JIT-compiles a
//! microkernel ([`kernels`], via [`buffer`]) for the primitive
//! dimensions and walks the outer loops, in parallel across the shared
//! ones.
//!
//! Setup, lowering and parsing are single-threaded; only
//! [`tensor_op::TensorOperation::execute`] forks.

#![warn(missing_docs)]

pub mod buffer;
mod error;
pub mod einsum;
pub mod ir;
pub mod kernels;
pub mod optimizer;
pub mod tensor_op;
mod types;

pub use error::JitError;
pub use types::{DType, DimKind, ExecKind, PrimKind};

/// Commonly used engine types.
pub mod prelude {
    pub use crate::buffer::{CompiledKernel, Kernel};
    pub use crate::einsum::EinsumTree;
    pub use crate::ir::Dimension;
    pub use crate::tensor_op::TensorOperation;
    pub use crate::{DType, DimKind, ExecKind, JitError, PrimKind};
}
