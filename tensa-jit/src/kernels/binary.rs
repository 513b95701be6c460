//! Binary element-wise microkernel generators.
//!
//! Calling convention: `x0` = A, `x1` = B, `x2` = C, `x3`/`x4`/`x5` =
//! leading dimensions of A/B/C in elements, scaled to bytes on entry.

use tensa_asm::{
    base, simd,
    ArrSpec::{S2, S4},
    Gpr::*,
    NeonSize::{D, Q, S},
    VReg::*,
};

use crate::buffer::Kernel;
use crate::JitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

/// `C = A + B`.
pub fn add(kernel: &mut Kernel, m: u32, n: u32) -> Result<(), JitError> {
    elementwise(kernel, m, n, Op::Add)
}

/// `C = A - B`.
pub fn sub(kernel: &mut Kernel, m: u32, n: u32) -> Result<(), JitError> {
    elementwise(kernel, m, n, Op::Sub)
}

/// `C = A * B`.
pub fn mul(kernel: &mut Kernel, m: u32, n: u32) -> Result<(), JitError> {
    elementwise(kernel, m, n, Op::Mul)
}

/// `C = A / B`.
pub fn div(kernel: &mut Kernel, m: u32, n: u32) -> Result<(), JitError> {
    elementwise(kernel, m, n, Op::Div)
}

/// `C = min(A, B)`.
pub fn min(kernel: &mut Kernel, m: u32, n: u32) -> Result<(), JitError> {
    elementwise(kernel, m, n, Op::Min)
}

/// `C = max(A, B)`.
pub fn max(kernel: &mut Kernel, m: u32, n: u32) -> Result<(), JitError> {
    elementwise(kernel, m, n, Op::Max)
}

fn elementwise(kernel: &mut Kernel, m: u32, n: u32, op: Op) -> Result<(), JitError> {
    for (context, value) in [("m", m), ("n", n)] {
        if value == 0 || value > 2048 {
            return Err(JitError::WrongDimension {
                context,
                value: value as i64,
                limit: 2048,
            });
        }
    }

    let m_iters = m / 8;
    let m_rem = m % 8;

    kernel.push(base::stp_pre(X29, X30, Sp, -16)?);
    kernel.push(base::mov_sp(X29, Sp)?);

    kernel.push(base::lsl(X3, X3, 2)?);
    kernel.push(base::lsl(X4, X4, 2)?);
    kernel.push(base::lsl(X5, X5, 2)?);

    kernel.push(base::mov_reg(X6, X0));
    kernel.push(base::mov_reg(X7, X1));
    kernel.push(base::mov_reg(X8, X2));
    kernel.push(base::mov_imm(X9, n as u64)?);

    kernel.add_label("n_loop")?;
    if m_iters > 0 {
        kernel.push(base::mov_imm(X10, m_iters as u64)?);
    }
    kernel.push(base::mov_reg(X11, X6));
    kernel.push(base::mov_reg(X12, X7));
    kernel.push(base::mov_reg(X13, X8));

    if m_iters > 0 {
        kernel.add_label("m_loop")?;
        kernel.push(simd::ldp(V0, V1, X11, 0, Q)?);
        kernel.push(simd::ldp(V2, V3, X12, 0, Q)?);
        emit_op(kernel, op, V0, V0, V2, Width::V4)?;
        emit_op(kernel, op, V1, V1, V3, Width::V4)?;
        kernel.push(simd::stp(V0, V1, X13, 0, Q)?);
        kernel.push(base::add_imm(X11, X11, 8 * 4, 0)?);
        kernel.push(base::add_imm(X12, X12, 8 * 4, 0)?);
        kernel.push(base::add_imm(X13, X13, 8 * 4, 0)?);
        kernel.push(base::sub_imm(X10, X10, 1, 0)?);
        let offset = kernel.loop_offset("m_loop")?;
        kernel.push(base::cbnz(X10, offset)?);
    }

    let mut offset = 0;
    if m_rem >= 4 {
        kernel.push(simd::ldr(V0, X11, offset, Q)?);
        kernel.push(simd::ldr(V2, X12, offset, Q)?);
        emit_op(kernel, op, V0, V0, V2, Width::V4)?;
        kernel.push(simd::str(V0, X13, offset, Q)?);
        offset += 16;
    }
    if m_rem % 4 >= 2 {
        kernel.push(simd::ldr(V0, X11, offset, D)?);
        kernel.push(simd::ldr(V2, X12, offset, D)?);
        emit_op(kernel, op, V0, V0, V2, Width::V2)?;
        kernel.push(simd::str(V0, X13, offset, D)?);
        offset += 8;
    }
    if m_rem % 2 == 1 {
        kernel.push(simd::ldr(V0, X11, offset, S)?);
        kernel.push(simd::ldr(V2, X12, offset, S)?);
        emit_op(kernel, op, V0, V0, V2, Width::Sc)?;
        kernel.push(simd::str(V0, X13, offset, S)?);
    }

    kernel.push(base::add_shifted(X6, X6, X3, 0, 0)?);
    kernel.push(base::add_shifted(X7, X7, X4, 0, 0)?);
    kernel.push(base::add_shifted(X8, X8, X5, 0, 0)?);
    kernel.push(base::sub_imm(X9, X9, 1, 0)?);
    let loop_back = kernel.loop_offset("n_loop")?;
    kernel.push(base::cbnz(X9, loop_back)?);

    kernel.push(base::ldp_post(X29, X30, Sp, 16)?);
    kernel.push(base::ret());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    V4,
    V2,
    Sc,
}

fn emit_op(
    kernel: &mut Kernel,
    op: Op,
    dst: tensa_asm::VReg,
    a: tensa_asm::VReg,
    b: tensa_asm::VReg,
    width: Width,
) -> Result<(), JitError> {
    let word = match (op, width) {
        (Op::Add, Width::V4) => simd::fadd_vec(dst, a, b, S4)?,
        (Op::Add, Width::V2) => simd::fadd_vec(dst, a, b, S2)?,
        (Op::Add, Width::Sc) => simd::fadd_scalar(dst, a, b, S)?,
        (Op::Sub, Width::V4) => simd::fsub_vec(dst, a, b, S4)?,
        (Op::Sub, Width::V2) => simd::fsub_vec(dst, a, b, S2)?,
        (Op::Sub, Width::Sc) => simd::fsub_scalar(dst, a, b, S)?,
        (Op::Mul, Width::V4) => simd::fmul_vec(dst, a, b, S4)?,
        (Op::Mul, Width::V2) => simd::fmul_vec(dst, a, b, S2)?,
        (Op::Mul, Width::Sc) => simd::fmul_scalar(dst, a, b, S)?,
        (Op::Div, Width::V4) => simd::fdiv_vec(dst, a, b, S4)?,
        (Op::Div, Width::V2) => simd::fdiv_vec(dst, a, b, S2)?,
        (Op::Div, Width::Sc) => simd::fdiv_scalar(dst, a, b, S)?,
        (Op::Min, Width::V4) => simd::fmin_vec(dst, a, b, S4)?,
        (Op::Min, Width::V2) => simd::fmin_vec(dst, a, b, S2)?,
        (Op::Min, Width::Sc) => simd::fmin_scalar(dst, a, b, S)?,
        (Op::Max, Width::V4) => simd::fmax_vec(dst, a, b, S4)?,
        (Op::Max, Width::V2) => simd::fmax_vec(dst, a, b, S2)?,
        (Op::Max, Width::Sc) => simd::fmax_scalar(dst, a, b, S)?,
    };
    kernel.push(word);
    Ok(())
}
