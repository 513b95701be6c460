use thiserror::Error;

/// Operand validation failures raised by the instruction encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Two or more general-purpose operands disagree on the 32/64-bit flag.
    #[error("operand width mismatch in {0}")]
    OperandWidthMismatch(&'static str),

    /// The immediate cannot be represented in this instruction form.
    #[error("unencodable immediate {imm} in {context}")]
    UnencodableImmediate {
        /// Instruction form that rejected the value.
        context: &'static str,
        /// The offending immediate.
        imm: i64,
    },

    /// The value does not fit a single MOVZ field at any shift.
    #[error("immediate {0:#x} does not fit a single movz")]
    ImmediateTooLarge(u64),

    /// Lane index outside the arrangement's lane count.
    #[error("lane index {lane} out of range (limit {limit})")]
    LaneIndexOutOfRange {
        /// Requested lane.
        lane: u32,
        /// First invalid lane index.
        limit: u32,
    },

    /// Shift amount not representable for the operand width.
    #[error("shift amount {amount} out of range for a {width}-bit register")]
    ShiftOutOfRange {
        /// Requested shift amount.
        amount: u32,
        /// Operand width in bits.
        width: u32,
    },

    /// Operand class (size or arrangement) not accepted by this form.
    #[error("invalid operand for {0}")]
    InvalidOperand(&'static str),
}
