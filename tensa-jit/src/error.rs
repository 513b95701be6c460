use std::io;

use thiserror::Error;

use crate::types::{DType, PrimKind};

/// Engine error variants surfaced at the public API boundary.
#[derive(Debug, Error)]
pub enum JitError {
    /// A label was defined twice in one kernel buffer.
    #[error("label already exists: {0}")]
    LabelRedefined(String),

    /// A label was referenced before its definition.
    #[error("label not found: {0}")]
    LabelMissing(String),

    /// `finalize` was called on a buffer with no instructions.
    #[error("cannot finalize an empty kernel")]
    EmptyKernel,

    /// Anonymous executable memory could not be allocated.
    #[error("failed to allocate kernel memory: {0}")]
    OutOfMemory(io::Error),

    /// The W^X transition to read+execute failed.
    #[error("failed to set kernel memory executable: {0}")]
    ProtectionChangeFailed(io::Error),

    /// Filesystem failure while persisting a kernel image.
    #[error("kernel i/o failed: {0}")]
    Io(#[from] io::Error),

    /// An instruction operand failed validation during generation.
    #[error(transparent)]
    Encode(#[from] tensa_asm::EncodeError),

    /// A kernel shape parameter is outside its supported range.
    #[error("{context} must be in 1..={limit}, got {value}")]
    WrongDimension {
        /// Which parameter was rejected.
        context: &'static str,
        /// The rejected value.
        value: i64,
        /// Upper bound of the supported range.
        limit: i64,
    },

    /// The requested primitive/transposition combination has no generator.
    #[error("operation not supported: {0}")]
    OperationNotSupported(&'static str),

    /// A primitive tag is not valid in the slot it was passed for.
    #[error("primitive {ptype} is not valid as {slot}")]
    WrongPtype {
        /// The offending tag.
        ptype: PrimKind,
        /// The kernel slot (first touch, main, last touch).
        slot: &'static str,
    },

    /// Only fp32 is generated at the moment.
    #[error("unsupported dtype {0}")]
    UnsupportedDtype(DType),

    /// The six configuration arrays disagree on length.
    #[error("configuration arrays must have equal lengths")]
    ConfigLengthMismatch,

    /// The optimizer finished with a primitive count outside {2, 3, 4}.
    #[error("expected 2, 3 or 4 primitive dimensions, found {0}")]
    CannotIdentifyPrimitives(usize),

    /// No dimension satisfied a primitive's stride requirements.
    #[error("no suitable primitive dimension {0} found")]
    NoPrimDimension(&'static str),

    /// Unary configurations must consist of copy dimensions only.
    #[error("all dimensions must be of type c for unary operations")]
    MixedUnaryDimensions,

    /// A partially pre-assigned primitive set cannot be completed.
    #[error("expected 0 or 2 pre-assigned primitive dimensions, found {0}")]
    PrimCountConflict(usize),

    /// The einsum expression is malformed.
    #[error("einsum parse error: {0}")]
    Parse(String),

    /// A leaf tensor was not supplied to `execute`.
    #[error("missing input tensor for [{0}]")]
    MissingInput(String),

    /// `execute` was called on a tree that was never lowered.
    #[error("einsum node [{0}] has not been lowered")]
    NotLowered(String),
}
