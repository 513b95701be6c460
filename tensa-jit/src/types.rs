use strum::{Display, EnumIter};

/// Element type of all tensors in an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum DType {
    /// IEEE-754 binary32.
    Fp32,
    /// IEEE-754 binary64 (reserved; not generated yet).
    Fp64,
}

impl DType {
    /// Element size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::Fp32 => 4,
            Self::Fp64 => 8,
        }
    }
}

/// Role of a loop dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum DimKind {
    /// Indexes output rows and the first input's rows.
    M,
    /// Indexes output columns and the second input's columns.
    N,
    /// Contracted (reduction) dimension; its output stride is zero.
    K,
    /// Copy dimension of unary and binary element-wise operations.
    C,
    /// Not yet classified.
    Undefined,
}

/// How a loop dimension is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ExecKind {
    /// Sequential outer loop, one iteration after another per worker.
    Seq,
    /// Outer loop whose iterations are distributed across worker threads.
    Shared,
    /// Executed inside the JIT-compiled microkernel.
    Prim,
    /// Not yet decided; the optimizer will assign one of the above.
    Undefined,
}

/// Primitive tag selecting a microkernel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum PrimKind {
    /// No kernel in this slot.
    None,
    /// Write zeros to the tile.
    Zero,
    /// Copy combined with ReLU (historical alias of [`PrimKind::Relu`]).
    CopyRelu,
    /// Matrix multiplication `C += A * B`.
    Gemm,
    /// Batch-reduce matrix multiplication.
    Brgemm,
    /// `0.5 * (x / (1 + |x|) + 1)`.
    FastSigmoid,
    /// `max(x, 0)`.
    Relu,
    /// `x * x`.
    Square,
    /// `1 / x` via FRECPE with one Newton-Raphson step.
    Reciprocal,
    /// Fifth-order Taylor sigmoid (inputs pre-clamped).
    SigmoidTaylor,
    /// Table-interpolated sigmoid, clamped to `[-8, 8]`.
    SigmoidInterp,
    /// Copy.
    Identity,
    /// `a + b`.
    Add,
    /// `a - b`.
    Sub,
    /// `a * b`.
    Mul,
    /// `a / b`.
    Div,
    /// `min(a, b)`.
    Min,
    /// `max(a, b)`.
    Max,
    /// `x + 1`.
    Increment,
    /// `x - 1`.
    Decrement,
}

impl PrimKind {
    /// Whether this tag names a unary element-wise kernel.
    pub const fn is_unary(self) -> bool {
        matches!(
            self,
            Self::Zero
                | Self::CopyRelu
                | Self::FastSigmoid
                | Self::Relu
                | Self::Square
                | Self::Reciprocal
                | Self::SigmoidTaylor
                | Self::SigmoidInterp
                | Self::Identity
                | Self::Increment
                | Self::Decrement
        )
    }

    /// Whether this tag names a binary element-wise kernel.
    pub const fn is_binary(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Min | Self::Max
        )
    }

    /// Whether this tag names a matmul-family kernel.
    pub const fn is_matmul(self) -> bool {
        matches!(self, Self::Gemm | Self::Brgemm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_primitive_tag_has_exactly_one_family() {
        for kind in PrimKind::iter() {
            let families =
                [kind.is_unary(), kind.is_binary(), kind.is_matmul()]
                    .iter()
                    .filter(|&&f| f)
                    .count();
            if kind == PrimKind::None {
                assert_eq!(families, 0);
            } else {
                assert_eq!(families, 1, "{kind} must belong to one family");
            }
        }
    }

    #[test]
    fn dtype_sizes() {
        assert_eq!(DType::Fp32.bytes(), 4);
        assert_eq!(DType::Fp64.bytes(), 8);
    }
}
