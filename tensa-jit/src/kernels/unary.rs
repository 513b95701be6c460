//! Unary element-wise microkernel generators.
//!
//! Calling convention: `x0` = input, `x1` = output, `x2`/`x3` = leading
//! dimensions of input/output in elements, `x4` = auxiliary constant
//! table (sigmoid kernels only). Leading dimensions are scaled to bytes
//! on entry; tiles are column-major fp32.

use tensa_asm::{
    base, simd,
    ArrSpec::{B16, S2, S4},
    Gpr::*,
    NeonSize::{D, Q, S},
    VReg::*,
};

use crate::buffer::Kernel;
use crate::kernels::trans::{self, PostOp};
use crate::JitError;

/// Vector width a hook application operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    /// Four lanes of a q register.
    V4,
    /// Two lanes of a d register.
    V2,
    /// One scalar lane.
    Sc,
}

/// Element-wise transfer functions with a shared loop skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Identity,
    Relu,
    Square,
    Increment,
    Decrement,
    Reciprocal,
    FastSigmoid,
    SigmoidTaylor,
}

/// Copy a tile, optionally transposed.
pub fn identity(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return trans::transpose(kernel, m, n, PostOp::None);
    }
    elementwise(kernel, m, n, Op::Identity)
}

/// `max(x, 0)`, optionally transposed.
pub fn relu(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return trans::transpose(kernel, m, n, PostOp::Relu);
    }
    elementwise(kernel, m, n, Op::Relu)
}

/// `x * x`, optionally transposed.
pub fn square(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return trans::transpose(kernel, m, n, PostOp::Square);
    }
    elementwise(kernel, m, n, Op::Square)
}

/// `x + 1`, optionally transposed.
pub fn increment(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return trans::transpose(kernel, m, n, PostOp::Increment);
    }
    elementwise(kernel, m, n, Op::Increment)
}

/// `x - 1`, optionally transposed.
pub fn decrement(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return trans::transpose(kernel, m, n, PostOp::Decrement);
    }
    elementwise(kernel, m, n, Op::Decrement)
}

/// `1 / x` via FRECPE refined by one FRECPS Newton-Raphson step.
pub fn reciprocal(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return Err(JitError::OperationNotSupported(
            "transposed reciprocal primitive",
        ));
    }
    elementwise(kernel, m, n, Op::Reciprocal)
}

/// `0.5 * (x / (1 + |x|) + 1)`.
pub fn fast_sigmoid(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return Err(JitError::OperationNotSupported(
            "transposed fast sigmoid primitive",
        ));
    }
    elementwise(kernel, m, n, Op::FastSigmoid)
}

/// Fifth-order Taylor sigmoid; coefficients come from the table in `x4`
/// (see [`taylor_table`]) and inputs must be pre-clamped.
pub fn sigmoid_taylor(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    if trans {
        return Err(JitError::OperationNotSupported(
            "transposed taylor sigmoid primitive",
        ));
    }
    elementwise(kernel, m, n, Op::SigmoidTaylor)
}

/// Broadcast constants loaded by the Taylor sigmoid kernel:
/// `0.5 + 0.25 x - x^3/48 + x^5/480`.
pub fn taylor_table() -> Box<[f32]> {
    let mut table = Vec::with_capacity(16);
    for c in [0.5f32, 0.25, -1.0 / 48.0, 1.0 / 480.0] {
        table.extend_from_slice(&[c; 4]);
    }
    table.into_boxed_slice()
}

/// Sigmoid values at 33 grid points over `[-8, 8]`, step `0.5`, for the
/// interpolation kernel.
pub fn sigmoid_table() -> Box<[f32]> {
    (0..33)
        .map(|i| {
            let x = -8.0 + 0.5 * i as f64;
            (1.0 / (1.0 + (-x).exp())) as f32
        })
        .collect()
}

fn check_range(context: &'static str, value: u32) -> Result<(), JitError> {
    if value == 0 || value > 2048 {
        return Err(JitError::WrongDimension {
            context,
            value: value as i64,
            limit: 2048,
        });
    }
    Ok(())
}

fn elementwise(kernel: &mut Kernel, m: u32, n: u32, op: Op) -> Result<(), JitError> {
    check_range("m", m)?;
    check_range("n", n)?;

    let m_iters = m / 8;
    let m_rem = m % 8;

    kernel.push(base::stp_pre(X29, X30, Sp, -16)?);
    kernel.push(base::mov_sp(X29, Sp)?);

    kernel.push(base::lsl(X2, X2, 2)?);
    kernel.push(base::lsl(X3, X3, 2)?);

    emit_setup(kernel, op)?;

    // Column base pointers.
    kernel.push(base::mov_reg(X5, X0));
    kernel.push(base::mov_reg(X6, X1));
    kernel.push(base::mov_imm(X7, n as u64)?);

    kernel.add_label("n_loop")?;
    if m_iters > 0 {
        kernel.push(base::mov_imm(X8, m_iters as u64)?);
    }
    kernel.push(base::mov_reg(X9, X5));
    kernel.push(base::mov_reg(X10, X6));

    if m_iters > 0 {
        kernel.add_label("m_loop")?;
        kernel.push(simd::ldp(V0, V1, X9, 0, Q)?);
        emit_apply(kernel, op, V0, Width::V4)?;
        emit_apply(kernel, op, V1, Width::V4)?;
        kernel.push(simd::stp(V0, V1, X10, 0, Q)?);
        kernel.push(base::add_imm(X9, X9, 8 * 4, 0)?);
        kernel.push(base::add_imm(X10, X10, 8 * 4, 0)?);
        kernel.push(base::sub_imm(X8, X8, 1, 0)?);
        let offset = kernel.loop_offset("m_loop")?;
        kernel.push(base::cbnz(X8, offset)?);
    }

    let mut offset = 0;
    if m_rem >= 4 {
        kernel.push(simd::ldr(V0, X9, offset, Q)?);
        emit_apply(kernel, op, V0, Width::V4)?;
        kernel.push(simd::str(V0, X10, offset, Q)?);
        offset += 16;
    }
    if m_rem % 4 >= 2 {
        kernel.push(simd::ldr(V0, X9, offset, D)?);
        emit_apply(kernel, op, V0, Width::V2)?;
        kernel.push(simd::str(V0, X10, offset, D)?);
        offset += 8;
    }
    if m_rem % 2 == 1 {
        kernel.push(simd::ldr(V0, X9, offset, S)?);
        emit_apply(kernel, op, V0, Width::Sc)?;
        kernel.push(simd::str(V0, X10, offset, S)?);
    }

    // Next column.
    kernel.push(base::add_shifted(X5, X5, X2, 0, 0)?);
    kernel.push(base::add_shifted(X6, X6, X3, 0, 0)?);
    kernel.push(base::sub_imm(X7, X7, 1, 0)?);
    let loop_back = kernel.loop_offset("n_loop")?;
    kernel.push(base::cbnz(X7, loop_back)?);

    kernel.push(base::ldp_post(X29, X30, Sp, 16)?);
    kernel.push(base::ret());
    Ok(())
}

/// Constants needed before the column loop. v28..v31 are reserved for
/// them; temporaries live in v16..v19.
fn emit_setup(kernel: &mut Kernel, op: Op) -> Result<(), JitError> {
    match op {
        Op::Relu => kernel.push(simd::zero(V31, B16)?),
        Op::Increment | Op::Decrement => kernel.push(simd::fmov_int_vec(V30, 1, S4)?),
        Op::FastSigmoid => {
            kernel.push(simd::fmov_int_vec(V30, 1, S4)?);
            // 0.5
            kernel.push(simd::fmov_vec(V29, 0b0110_0000, S4)?);
        }
        Op::SigmoidTaylor => {
            kernel.push(simd::ldp(V31, V30, X4, 0, Q)?);
            kernel.push(simd::ldp(V29, V28, X4, 32, Q)?);
        }
        Op::Identity | Op::Square | Op::Reciprocal => {}
    }
    Ok(())
}

fn emit_apply(kernel: &mut Kernel, op: Op, reg: tensa_asm::VReg, width: Width) -> Result<(), JitError> {
    // Three-operand emitters folded over the width.
    macro_rules! tri {
        ($vec:path, $scalar:path, $d:expr, $a:expr, $b:expr) => {
            match width {
                Width::V4 => kernel.push($vec($d, $a, $b, S4)?),
                Width::V2 => kernel.push($vec($d, $a, $b, S2)?),
                Width::Sc => kernel.push($scalar($d, $a, $b, S)?),
            }
        };
    }

    match op {
        Op::Identity => {}
        Op::Relu => tri!(simd::fmax_vec, simd::fmax_scalar, reg, reg, V31),
        Op::Square => tri!(simd::fmul_vec, simd::fmul_scalar, reg, reg, reg),
        Op::Increment => tri!(simd::fadd_vec, simd::fadd_scalar, reg, reg, V30),
        Op::Decrement => tri!(simd::fsub_vec, simd::fsub_scalar, reg, reg, V30),
        Op::Reciprocal => {
            match width {
                Width::V4 => {
                    kernel.push(simd::frecpe_vec(V16, reg, S4)?);
                    kernel.push(simd::frecps_vec(V17, reg, V16, S4)?);
                }
                Width::V2 => {
                    kernel.push(simd::frecpe_vec(V16, reg, S2)?);
                    kernel.push(simd::frecps_vec(V17, reg, V16, S2)?);
                }
                Width::Sc => {
                    kernel.push(simd::frecpe_scalar(V16, reg, S)?);
                    kernel.push(simd::frecps_scalar(V17, reg, V16, S)?);
                }
            }
            tri!(simd::fmul_vec, simd::fmul_scalar, reg, V16, V17);
        }
        Op::FastSigmoid => {
            match width {
                Width::V4 => kernel.push(simd::fabs_vec(V16, reg, S4)?),
                Width::V2 => kernel.push(simd::fabs_vec(V16, reg, S2)?),
                Width::Sc => kernel.push(simd::fabs_scalar(V16, reg, S)?),
            }
            // 1 + |x|
            tri!(simd::fadd_vec, simd::fadd_scalar, V16, V16, V30);
            // x / (1 + |x|)
            tri!(simd::fdiv_vec, simd::fdiv_scalar, V16, reg, V16);
            // + 1
            tri!(simd::fadd_vec, simd::fadd_scalar, V16, V16, V30);
            // * 0.5
            tri!(simd::fmul_vec, simd::fmul_scalar, reg, V16, V29);
        }
        Op::SigmoidTaylor => {
            // Powers: v16 = x^2, v17 = x^3, v18 = x^5.
            tri!(simd::fmul_vec, simd::fmul_scalar, V16, reg, reg);
            tri!(simd::fmul_vec, simd::fmul_scalar, V17, V16, reg);
            tri!(simd::fmul_vec, simd::fmul_scalar, V18, V17, V16);
            // 0.5 + 0.25 x
            tri!(simd::fmul_vec, simd::fmul_scalar, V19, reg, V30);
            tri!(simd::fadd_vec, simd::fadd_scalar, V19, V19, V31);
            // - x^3 / 48
            tri!(simd::fmul_vec, simd::fmul_scalar, V17, V17, V29);
            tri!(simd::fadd_vec, simd::fadd_scalar, V19, V19, V17);
            // + x^5 / 480
            tri!(simd::fmul_vec, simd::fmul_scalar, V18, V18, V28);
            tri!(simd::fadd_vec, simd::fadd_scalar, reg, V19, V18);
        }
    }
    Ok(())
}

/// Write zeros to the output tile through XZR/WZR stores; the input
/// pointer and its leading dimension are ignored. Transposition just
/// swaps the extents.
pub fn zero(kernel: &mut Kernel, m: u32, n: u32, trans: bool) -> Result<(), JitError> {
    check_range("m", m)?;
    check_range("n", n)?;
    let (m, n) = if trans { (n, m) } else { (m, n) };

    let m_iters = m / 8;
    let m_rem = m % 8;

    kernel.push(base::stp_pre(X29, X30, Sp, -16)?);
    kernel.push(base::mov_sp(X29, Sp)?);

    kernel.push(base::lsl(X3, X3, 2)?);
    kernel.push(base::mov_reg(X5, X1));
    kernel.push(base::mov_imm(X6, n as u64)?);

    kernel.add_label("n_loop")?;
    if m_iters > 0 {
        kernel.push(base::mov_imm(X7, m_iters as u64)?);
    }
    kernel.push(base::mov_reg(X8, X5));

    if m_iters > 0 {
        kernel.add_label("m_loop")?;
        kernel.push(base::mov_reg(X9, X8));
        kernel.push(base::str_post(Xzr, X9, 8)?);
        kernel.push(base::str_post(Xzr, X9, 8)?);
        kernel.push(base::str_post(Xzr, X9, 8)?);
        kernel.push(base::str_uoff(Xzr, X9, 0)?);
        kernel.push(base::add_imm(X8, X8, 8 * 4, 0)?);
        kernel.push(base::sub_imm(X7, X7, 1, 0)?);
        let offset = kernel.loop_offset("m_loop")?;
        kernel.push(base::cbnz(X7, offset)?);
    }

    let mut rem = m_rem;
    let mut offset = 0;
    while rem >= 2 {
        kernel.push(base::str_uoff(Xzr, X8, offset)?);
        offset += 8;
        rem -= 2;
    }
    if rem == 1 {
        kernel.push(base::str_uoff(Wzr, X8, offset)?);
    }

    kernel.push(base::add_shifted(X5, X5, X3, 0, 0)?);
    kernel.push(base::sub_imm(X6, X6, 1, 0)?);
    let loop_back = kernel.loop_offset("n_loop")?;
    kernel.push(base::cbnz(X6, loop_back)?);

    kernel.push(base::ldp_post(X29, X30, Sp, 16)?);
    kernel.push(base::ret());
    Ok(())
}

/// Sigmoid via a 33-entry lookup table (step 0.5 over `[-8, 8]`) with
/// linear interpolation between neighbouring entries. `x4` points at
/// the table (see [`sigmoid_table`]).
pub fn sigmoid_interpolation(
    kernel: &mut Kernel,
    m: u32,
    n: u32,
    trans: bool,
) -> Result<(), JitError> {
    if trans {
        return Err(JitError::OperationNotSupported(
            "transposed interpolation sigmoid primitive",
        ));
    }
    check_range("m", m)?;
    check_range("n", n)?;

    let m_iters = m / 4;
    let m_rem = m % 4;

    kernel.push(base::stp_pre(X29, X30, Sp, -16)?);
    kernel.push(base::mov_sp(X29, Sp)?);

    kernel.push(base::lsl(X2, X2, 2)?);
    kernel.push(base::lsl(X3, X3, 2)?);

    kernel.push(base::mov_reg(X5, X0));
    kernel.push(base::mov_reg(X6, X1));

    // Clamp bounds, index scale, and the last safe base index.
    kernel.push(simd::fmov_int_vec(V31, -8, S4)?);
    kernel.push(simd::fmov_int_vec(V30, 8, S4)?);
    kernel.push(simd::fmov_int_vec(V29, 2, S4)?);
    kernel.push(simd::fmov_int_vec(V28, 31, S4)?);

    kernel.push(base::mov_imm(X7, n as u64)?);
    kernel.add_label("n_loop")?;

    if m_iters > 0 {
        kernel.push(base::mov_imm(X8, m_iters as u64)?);
    }
    kernel.push(base::mov_reg(X16, X5));
    kernel.push(base::mov_reg(X17, X6));

    if m_iters > 0 {
        kernel.add_label("m_loop")?;
        kernel.push(simd::ldr(V0, X16, 0, Q)?);

        // Clamp to [-8, 8] and map to table coordinates 2 * (x + 8).
        kernel.push(simd::fmax_vec(V0, V0, V31, S4)?);
        kernel.push(simd::fmin_vec(V0, V0, V30, S4)?);
        kernel.push(simd::fadd_vec(V1, V0, V30, S4)?);
        kernel.push(simd::fmul_vec(V2, V1, V29, S4)?);
        kernel.push(simd::fmin_vec(V2, V2, V28, S4)?);

        // Split into base index and fraction.
        kernel.push(simd::frintm_vec(V3, V2, S4)?);
        kernel.push(simd::fsub_vec(V5, V2, V3, S4)?);
        kernel.push(simd::fcvtms_vec(V4, V3, S4)?);

        // Byte offsets of t[i].
        kernel.push(simd::umov(W10, V4, 0, S)?);
        kernel.push(simd::umov(W11, V4, 1, S)?);
        kernel.push(simd::umov(W12, V4, 2, S)?);
        kernel.push(simd::umov(W13, V4, 3, S)?);
        kernel.push(base::lsl(W10, W10, 2)?);
        kernel.push(base::lsl(W11, W11, 2)?);
        kernel.push(base::lsl(W12, W12, 2)?);
        kernel.push(base::lsl(W13, W13, 2)?);

        // Gather t[i].
        kernel.push(simd::ldr_reg(V6, X4, W10, S)?);
        kernel.push(simd::ldr_reg(V7, X4, W11, S)?);
        kernel.push(simd::ldr_reg(V16, X4, W12, S)?);
        kernel.push(simd::ldr_reg(V17, X4, W13, S)?);
        kernel.push(simd::ins_elem(V18, V6, 0, 0, S)?);
        kernel.push(simd::ins_elem(V18, V7, 1, 0, S)?);
        kernel.push(simd::ins_elem(V18, V16, 2, 0, S)?);
        kernel.push(simd::ins_elem(V18, V17, 3, 0, S)?);

        // Gather t[i + 1].
        kernel.push(base::add_imm(W10, W10, 4, 0)?);
        kernel.push(base::add_imm(W11, W11, 4, 0)?);
        kernel.push(base::add_imm(W12, W12, 4, 0)?);
        kernel.push(base::add_imm(W13, W13, 4, 0)?);
        kernel.push(simd::ldr_reg(V19, X4, W10, S)?);
        kernel.push(simd::ldr_reg(V20, X4, W11, S)?);
        kernel.push(simd::ldr_reg(V21, X4, W12, S)?);
        kernel.push(simd::ldr_reg(V22, X4, W13, S)?);
        kernel.push(simd::ins_elem(V23, V19, 0, 0, S)?);
        kernel.push(simd::ins_elem(V23, V20, 1, 0, S)?);
        kernel.push(simd::ins_elem(V23, V21, 2, 0, S)?);
        kernel.push(simd::ins_elem(V23, V22, 3, 0, S)?);

        // t[i] + frac * (t[i+1] - t[i])
        kernel.push(simd::fsub_vec(V24, V23, V18, S4)?);
        kernel.push(simd::fmla_vec(V18, V5, V24, S4)?);
        kernel.push(simd::str(V18, X17, 0, Q)?);

        kernel.push(base::add_imm(X16, X16, 16, 0)?);
        kernel.push(base::add_imm(X17, X17, 16, 0)?);
        kernel.push(base::sub_imm(X8, X8, 1, 0)?);
        let offset = kernel.loop_offset("m_loop")?;
        kernel.push(base::cbnz(X8, offset)?);
    }

    for idx in 0..m_rem {
        let byte = idx * 4;
        kernel.push(simd::ldr(V0, X16, byte, S)?);
        kernel.push(simd::fmax_scalar(V0, V0, V31, S)?);
        kernel.push(simd::fmin_scalar(V0, V0, V30, S)?);
        kernel.push(simd::fadd_scalar(V1, V0, V30, S)?);
        kernel.push(simd::fmul_scalar(V2, V1, V29, S)?);
        kernel.push(simd::fmin_scalar(V2, V2, V28, S)?);
        kernel.push(simd::frintm_scalar(V3, V2, S)?);
        kernel.push(simd::fsub_scalar(V5, V2, V3, S)?);
        kernel.push(simd::fcvtms_scalar(V4, V3, S)?);
        kernel.push(simd::umov(W10, V4, 0, S)?);
        kernel.push(base::lsl(W10, W10, 2)?);
        kernel.push(simd::ldr_reg(V6, X4, W10, S)?);
        kernel.push(base::add_imm(W10, W10, 4, 0)?);
        kernel.push(simd::ldr_reg(V7, X4, W10, S)?);
        kernel.push(simd::fsub_scalar(V16, V7, V6, S)?);
        kernel.push(simd::fmadd(V6, V5, V16, V6, S)?);
        kernel.push(simd::str(V6, X17, byte, S)?);
    }

    kernel.push(base::add_shifted(X5, X5, X2, 0, 0)?);
    kernel.push(base::add_shifted(X6, X6, X3, 0, 0)?);
    kernel.push(base::sub_imm(X7, X7, 1, 0)?);
    let loop_back = kernel.loop_offset("n_loop")?;
    kernel.push(base::cbnz(X7, loop_back)?);

    kernel.push(base::ldp_post(X29, X30, Sp, 16)?);
    kernel.push(base::ret());
    Ok(())
}
