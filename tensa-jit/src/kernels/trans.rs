//! Transposed unary kernels: 4x4 register transposes via TRN/ZIP with
//! an optional element-wise post-operation, plus scalar edge handling.
//!
//! Same calling convention as the straight unary kernels; the output
//! tile is n x m.

use tensa_asm::{
    base, simd,
    ArrSpec::{B16, D2, S4},
    Gpr::*,
    NeonSize::{Q, S},
    VReg::*,
};

use crate::buffer::Kernel;
use crate::JitError;

/// Element-wise operation applied after the transpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PostOp {
    None,
    Relu,
    Square,
    Increment,
    Decrement,
}

pub(crate) fn transpose(kernel: &mut Kernel, m: u32, n: u32, post: PostOp) -> Result<(), JitError> {
    if m == 0 || m > 2048 || n == 0 || n > 2048 {
        return Err(JitError::WrongDimension {
            context: "transpose extent",
            value: m.max(n) as i64,
            limit: 2048,
        });
    }

    let m_blocks = m / 4;
    let n_blocks = n / 4;
    let m_rem = m % 4;
    let n_rem = n % 4;

    kernel.push(base::stp_pre(X29, X30, Sp, -16)?);
    kernel.push(base::mov_sp(X29, Sp)?);

    kernel.push(base::lsl(X2, X2, 2)?);
    kernel.push(base::lsl(X3, X3, 2)?);

    match post {
        PostOp::Relu => kernel.push(simd::zero(V31, B16)?),
        PostOp::Increment | PostOp::Decrement => kernel.push(simd::fmov_int_vec(V30, 1, S4)?),
        _ => {}
    }

    // Four-column strides of input and output.
    kernel.push(base::lsl(X12, X2, 2)?);
    kernel.push(base::lsl(X13, X3, 2)?);

    if m_blocks > 0 && n_blocks > 0 {
        kernel.push(base::mov_reg(X5, X0));
        kernel.push(base::mov_reg(X6, X1));
        kernel.push(base::mov_imm(X7, n_blocks as u64)?);

        kernel.add_label("col_loop")?;
        kernel.push(base::mov_reg(X8, X5));
        kernel.push(base::mov_reg(X9, X6));
        kernel.push(base::mov_imm(X11, m_blocks as u64)?);

        kernel.add_label("row_loop")?;
        // Load a 4x4 block, one input column per register.
        kernel.push(base::mov_reg(X15, X8));
        kernel.push(simd::ldr(V0, X15, 0, Q)?);
        kernel.push(base::add_shifted(X15, X15, X2, 0, 0)?);
        kernel.push(simd::ldr(V1, X15, 0, Q)?);
        kernel.push(base::add_shifted(X15, X15, X2, 0, 0)?);
        kernel.push(simd::ldr(V2, X15, 0, Q)?);
        kernel.push(base::add_shifted(X15, X15, X2, 0, 0)?);
        kernel.push(simd::ldr(V3, X15, 0, Q)?);

        // In-register 4x4 transpose.
        kernel.push(simd::trn1(V4, V0, V1, S4));
        kernel.push(simd::trn2(V5, V0, V1, S4));
        kernel.push(simd::trn1(V6, V2, V3, S4));
        kernel.push(simd::trn2(V7, V2, V3, S4));
        kernel.push(simd::zip1(V0, V4, V6, D2));
        kernel.push(simd::zip2(V2, V4, V6, D2));
        kernel.push(simd::zip1(V1, V5, V7, D2));
        kernel.push(simd::zip2(V3, V5, V7, D2));

        for reg in [V0, V1, V2, V3] {
            apply_vec(kernel, post, reg)?;
        }

        // Store the block, one output column per register.
        kernel.push(base::mov_reg(X16, X9));
        kernel.push(simd::str(V0, X16, 0, Q)?);
        kernel.push(base::add_shifted(X16, X16, X3, 0, 0)?);
        kernel.push(simd::str(V1, X16, 0, Q)?);
        kernel.push(base::add_shifted(X16, X16, X3, 0, 0)?);
        kernel.push(simd::str(V2, X16, 0, Q)?);
        kernel.push(base::add_shifted(X16, X16, X3, 0, 0)?);
        kernel.push(simd::str(V3, X16, 0, Q)?);

        kernel.push(base::add_imm(X8, X8, 16, 0)?);
        kernel.push(base::add_shifted(X9, X9, X13, 0, 0)?);
        kernel.push(base::sub_imm(X11, X11, 1, 0)?);
        let offset = kernel.loop_offset("row_loop")?;
        kernel.push(base::cbnz(X11, offset)?);

        kernel.push(base::add_shifted(X5, X5, X12, 0, 0)?);
        kernel.push(base::add_imm(X6, X6, 16, 0)?);
        kernel.push(base::sub_imm(X7, X7, 1, 0)?);
        let offset = kernel.loop_offset("col_loop")?;
        kernel.push(base::cbnz(X7, offset)?);
    }

    // Bottom edge: leftover input rows, all columns. Each input row is a
    // contiguous output column.
    for r in 0..m_rem {
        let row = m_blocks * 4 + r;
        kernel.push(base::mov_imm(X17, (row * 4) as u64)?);
        kernel.push(base::add_shifted(X15, X0, X17, 0, 0)?);
        kernel.push(base::mov_imm(X17, row as u64)?);
        kernel.push(base::mul(X17, X17, X3)?);
        kernel.push(base::add_shifted(X16, X1, X17, 0, 0)?);
        kernel.push(base::mov_imm(X7, n as u64)?);

        let label = format!("bottom_{r}");
        kernel.add_label(&label)?;
        kernel.push(simd::ldr(V0, X15, 0, S)?);
        apply_scalar(kernel, post, V0)?;
        kernel.push(simd::str(V0, X16, 0, S)?);
        kernel.push(base::add_shifted(X15, X15, X2, 0, 0)?);
        kernel.push(base::add_imm(X16, X16, 4, 0)?);
        kernel.push(base::sub_imm(X7, X7, 1, 0)?);
        let offset = kernel.loop_offset(&label)?;
        kernel.push(base::cbnz(X7, offset)?);
    }

    // Right edge: leftover input columns over the rows the 4x4 blocks
    // covered. Each input column is a contiguous strip of output rows.
    if m_blocks > 0 {
        for c in 0..n_rem {
            let col = n_blocks * 4 + c;
            kernel.push(base::mov_imm(X17, col as u64)?);
            kernel.push(base::mul(X17, X17, X2)?);
            kernel.push(base::add_shifted(X15, X0, X17, 0, 0)?);
            kernel.push(base::mov_imm(X17, (col * 4) as u64)?);
            kernel.push(base::add_shifted(X16, X1, X17, 0, 0)?);
            kernel.push(base::mov_imm(X7, (m_blocks * 4) as u64)?);

            let label = format!("right_{c}");
            kernel.add_label(&label)?;
            kernel.push(simd::ldr(V0, X15, 0, S)?);
            apply_scalar(kernel, post, V0)?;
            kernel.push(simd::str(V0, X16, 0, S)?);
            kernel.push(base::add_imm(X15, X15, 4, 0)?);
            kernel.push(base::add_shifted(X16, X16, X3, 0, 0)?);
            kernel.push(base::sub_imm(X7, X7, 1, 0)?);
            let offset = kernel.loop_offset(&label)?;
            kernel.push(base::cbnz(X7, offset)?);
        }
    }

    kernel.push(base::ldp_post(X29, X30, Sp, 16)?);
    kernel.push(base::ret());
    Ok(())
}

fn apply_vec(kernel: &mut Kernel, post: PostOp, reg: tensa_asm::VReg) -> Result<(), JitError> {
    match post {
        PostOp::None => {}
        PostOp::Relu => kernel.push(simd::fmax_vec(reg, reg, V31, S4)?),
        PostOp::Square => kernel.push(simd::fmul_vec(reg, reg, reg, S4)?),
        PostOp::Increment => kernel.push(simd::fadd_vec(reg, reg, V30, S4)?),
        PostOp::Decrement => kernel.push(simd::fsub_vec(reg, reg, V30, S4)?),
    }
    Ok(())
}

fn apply_scalar(kernel: &mut Kernel, post: PostOp, reg: tensa_asm::VReg) -> Result<(), JitError> {
    match post {
        PostOp::None => {}
        PostOp::Relu => kernel.push(simd::fmax_scalar(reg, reg, V31, S)?),
        PostOp::Square => kernel.push(simd::fmul_scalar(reg, reg, reg, S)?),
        PostOp::Increment => kernel.push(simd::fadd_scalar(reg, reg, V30, S)?),
        PostOp::Decrement => kernel.push(simd::fsub_scalar(reg, reg, V30, S)?),
    }
    Ok(())
}
