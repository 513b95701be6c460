//! GEMM and batch-reduce GEMM microkernel generators.
//!
//! One parametric generator covers the whole tile family: N is blocked
//! by 6 when it divides evenly (24 accumulators resident in v4..v27)
//! and by 4 otherwise, M is blocked by 16 with 8/4/2/1 remainder
//! blocks, and K is a counted loop down to 1.
//!
//! Calling convention: `x0` = A, `x1` = B, `x2` = C, `x3`/`x4`/`x5` =
//! leading dimensions of A/B/C in elements. BRGEMM appends `x6`/`x7` =
//! batch strides of A/B in elements. All leading dimensions are scaled
//! to bytes on entry; matrices are column-major fp32.

use tensa_asm::{
    base, simd,
    ArrSpec::{S2, S4},
    Gpr::*,
    NeonSize::{D, Q, S},
    VReg,
};

use crate::buffer::Kernel;
use crate::JitError;

/// Accumulator registers start at v4; v0..v3 hold the A column and
/// v28..v31 the broadcast B elements.
const ACC_BASE: u32 = 4;

/// Emit a GEMM body computing `C += A * B` for an m x n x k tile.
pub fn matmul(kernel: &mut Kernel, m: u32, n: u32, k: u32) -> Result<(), JitError> {
    generate(kernel, m, n, k, None)
}

/// Emit a batch-reduce GEMM body accumulating `br` slice products.
pub fn brgemm(kernel: &mut Kernel, m: u32, n: u32, k: u32, br: u32) -> Result<(), JitError> {
    generate(kernel, m, n, k, Some(br))
}

fn generate(kernel: &mut Kernel, m: u32, n: u32, k: u32, br: Option<u32>) -> Result<(), JitError> {
    check_range("m", m, 2048)?;
    check_range("n", n, 2048)?;
    check_range("k", k, 65535)?;
    if let Some(br) = br {
        check_range("br", br, 65535)?;
    }

    prologue(kernel)?;

    // Leading dimensions to bytes.
    kernel.push(base::lsl(X3, X3, 2)?);
    kernel.push(base::lsl(X4, X4, 2)?);
    kernel.push(base::lsl(X5, X5, 2)?);
    if br.is_some() {
        kernel.push(base::lsl(X6, X6, 2)?);
        kernel.push(base::lsl(X7, X7, 2)?);
    }

    let n_tile = if n % 6 == 0 { 6 } else { 4 };
    let n_iters = n / n_tile;
    let n_rem = n % n_tile;

    // Column-block advance of B and C.
    if n_tile == 6 {
        kernel.push(base::lsl(X22, X4, 1)?);
        kernel.push(base::add_shifted(X22, X22, X4, 2, 0)?);
        kernel.push(base::lsl(X23, X5, 1)?);
        kernel.push(base::add_shifted(X23, X23, X5, 2, 0)?);
    } else {
        kernel.push(base::lsl(X22, X4, 2)?);
        kernel.push(base::lsl(X23, X5, 2)?);
    }

    // Column-block base pointers of B and C.
    kernel.push(base::mov_reg(X20, X1));
    kernel.push(base::mov_reg(X21, X2));

    if n_iters > 0 {
        kernel.push(base::mov_imm(X19, n_iters as u64)?);
        kernel.add_label("n_loop")?;

        kernel.push(base::mov_reg(X8, X0));
        kernel.push(base::mov_reg(X9, X20));
        kernel.push(base::mov_reg(X10, X21));
        emit_m_blocks(kernel, m, n_tile, k, br, "n")?;

        kernel.push(base::add_shifted(X20, X20, X22, 0, 0)?);
        kernel.push(base::add_shifted(X21, X21, X23, 0, 0)?);
        kernel.push(base::sub_imm(X19, X19, 1, 0)?);
        let offset = kernel.loop_offset("n_loop")?;
        kernel.push(base::cbnz(X19, offset)?);
    }

    if n_rem > 0 {
        kernel.push(base::mov_reg(X8, X0));
        kernel.push(base::mov_reg(X9, X20));
        kernel.push(base::mov_reg(X10, X21));
        emit_m_blocks(kernel, m, n_rem, k, br, "r")?;
    }

    epilogue(kernel)?;
    Ok(())
}

fn check_range(context: &'static str, value: u32, limit: i64) -> Result<(), JitError> {
    if value == 0 || value as i64 > limit {
        return Err(JitError::WrongDimension {
            context,
            value: value as i64,
            limit,
        });
    }
    Ok(())
}

fn prologue(kernel: &mut Kernel) -> Result<(), JitError> {
    kernel.push(base::stp_pre(X29, X30, Sp, -16)?);
    kernel.push(base::mov_sp(X29, Sp)?);

    kernel.push(base::stp_pre(X19, X20, Sp, -16)?);
    kernel.push(base::stp_pre(X21, X22, Sp, -16)?);
    kernel.push(base::stp_pre(X23, X24, Sp, -16)?);
    kernel.push(base::stp_pre(X25, X26, Sp, -16)?);

    kernel.push(simd::stp_pre(VReg::V8, VReg::V9, Sp, -16, D)?);
    kernel.push(simd::stp_pre(VReg::V10, VReg::V11, Sp, -16, D)?);
    kernel.push(simd::stp_pre(VReg::V12, VReg::V13, Sp, -16, D)?);
    kernel.push(simd::stp_pre(VReg::V14, VReg::V15, Sp, -16, D)?);
    Ok(())
}

fn epilogue(kernel: &mut Kernel) -> Result<(), JitError> {
    kernel.push(simd::ldp_post(VReg::V14, VReg::V15, Sp, 16, D)?);
    kernel.push(simd::ldp_post(VReg::V12, VReg::V13, Sp, 16, D)?);
    kernel.push(simd::ldp_post(VReg::V10, VReg::V11, Sp, 16, D)?);
    kernel.push(simd::ldp_post(VReg::V8, VReg::V9, Sp, 16, D)?);

    kernel.push(base::ldp_post(X25, X26, Sp, 16)?);
    kernel.push(base::ldp_post(X23, X24, Sp, 16)?);
    kernel.push(base::ldp_post(X21, X22, Sp, 16)?);
    kernel.push(base::ldp_post(X19, X20, Sp, 16)?);

    kernel.push(base::ldp_post(X29, X30, Sp, 16)?);
    kernel.push(base::ret());
    Ok(())
}

/// 16-row main loop followed by 8/4/2/1 single-pass remainder blocks.
fn emit_m_blocks(
    kernel: &mut Kernel,
    m: u32,
    n_tile: u32,
    k: u32,
    br: Option<u32>,
    tag: &str,
) -> Result<(), JitError> {
    let m_iters = m / 16;
    let m_rem = m % 16;

    if m_iters > 0 {
        emit_block(kernel, 16, Some(m_iters), n_tile, k, br, tag)?;
    }
    for m_tile in [8, 4, 2, 1] {
        if m_rem & m_tile != 0 {
            emit_block(kernel, m_tile, None, n_tile, k, br, tag)?;
        }
    }
    Ok(())
}

/// One register row of an A column or C tile: lane arrangement plus the
/// byte offset of the rows it covers.
#[derive(Debug, Clone, Copy)]
struct RowLane {
    size: tensa_asm::NeonSize,
    offset: u32,
}

fn row_lanes(m_tile: u32) -> Vec<RowLane> {
    let mut lanes = Vec::new();
    let mut offset = 0;
    for _ in 0..m_tile / 4 {
        lanes.push(RowLane { size: Q, offset });
        offset += 16;
    }
    if m_tile % 4 >= 2 {
        lanes.push(RowLane { size: D, offset });
        offset += 8;
    }
    if m_tile % 2 == 1 {
        lanes.push(RowLane { size: S, offset });
    }
    lanes
}

fn acc_reg(col: u32, lane: u32, lane_count: u32) -> VReg {
    VReg::from_index(ACC_BASE + col * lane_count + lane)
}

fn b_reg(col: u32) -> VReg {
    VReg::from_index(28 + (col & 3))
}

/// Emit one accumulator block: load the C tile, run the (batch and) K
/// loop with the 24-lane FMLA schedule, store the C tile, and advance
/// the A/C row pointers.
#[allow(clippy::too_many_arguments)]
fn emit_block(
    kernel: &mut Kernel,
    m_tile: u32,
    loop_iters: Option<u32>,
    n_tile: u32,
    k: u32,
    br: Option<u32>,
    tag: &str,
) -> Result<(), JitError> {
    let lanes = row_lanes(m_tile);
    let lane_count = lanes.len() as u32;
    debug_assert!(ACC_BASE + n_tile * lane_count <= 28);

    let m_label = format!("m{m_tile}_{tag}{n_tile}");
    let k_label = format!("k{m_tile}_{tag}{n_tile}");
    let br_label = format!("br{m_tile}_{tag}{n_tile}");

    if let Some(iters) = loop_iters {
        kernel.push(base::mov_imm(X11, iters as u64)?);
        kernel.add_label(&m_label)?;
    }

    // Load the C tile into the accumulators, walking columns by ldc.
    kernel.push(base::mov_reg(X13, X10));
    for col in 0..n_tile {
        emit_tile_transfer(kernel, true, col, &lanes, m_tile)?;
        kernel.push(base::add_shifted(X13, X13, X5, 0, 0)?);
    }

    if let Some(br_count) = br {
        kernel.push(base::mov_reg(X24, X8));
        kernel.push(base::mov_reg(X25, X9));
        kernel.push(base::mov_imm(X12, br_count as u64)?);
        kernel.add_label(&br_label)?;
        kernel.push(base::mov_reg(X15, X24));
        kernel.push(base::mov_reg(X16, X25));
    } else {
        kernel.push(base::mov_reg(X15, X8));
        kernel.push(base::mov_reg(X16, X9));
    }

    kernel.push(base::mov_imm(X14, k as u64)?);
    kernel.add_label(&k_label)?;

    // One column of A.
    if m_tile == 16 {
        kernel.push(simd::ldp(VReg::V0, VReg::V1, X15, 0, Q)?);
        kernel.push(simd::ldp(VReg::V2, VReg::V3, X15, 32, Q)?);
    } else {
        for (i, lane) in lanes.iter().enumerate() {
            kernel.push(simd::ldr(VReg::from_index(i as u32), X15, lane.offset, lane.size)?);
        }
    }
    kernel.push(base::add_shifted(X15, X15, X3, 0, 0)?);

    // Broadcast one element of each B column and accumulate.
    kernel.push(base::mov_reg(X17, X16));
    for col in 0..n_tile {
        kernel.push(simd::ldr(b_reg(col), X17, 0, S)?);
        kernel.push(base::add_shifted(X17, X17, X4, 0, 0)?);
        for (i, lane) in lanes.iter().enumerate() {
            let acc = acc_reg(col, i as u32, lane_count);
            let a = VReg::from_index(i as u32);
            match lane.size {
                Q => kernel.push(simd::fmla_elem(acc, a, b_reg(col), S4)?),
                D => kernel.push(simd::fmla_elem(acc, a, b_reg(col), S2)?),
                S => kernel.push(simd::fmadd(acc, a, b_reg(col), acc, S)?),
            }
        }
    }

    // Next row of B.
    kernel.push(base::add_imm(X16, X16, 4, 0)?);
    kernel.push(base::sub_imm(X14, X14, 1, 0)?);
    let offset = kernel.loop_offset(&k_label)?;
    kernel.push(base::cbnz(X14, offset)?);

    if br.is_some() {
        kernel.push(base::add_shifted(X24, X24, X6, 0, 0)?);
        kernel.push(base::add_shifted(X25, X25, X7, 0, 0)?);
        kernel.push(base::sub_imm(X12, X12, 1, 0)?);
        let offset = kernel.loop_offset(&br_label)?;
        kernel.push(base::cbnz(X12, offset)?);
    }

    // Store the C tile.
    kernel.push(base::mov_reg(X13, X10));
    for col in 0..n_tile {
        emit_tile_transfer(kernel, false, col, &lanes, m_tile)?;
        kernel.push(base::add_shifted(X13, X13, X5, 0, 0)?);
    }

    // Advance A and C past this row block.
    kernel.push(base::add_imm(X8, X8, m_tile * 4, 0)?);
    kernel.push(base::add_imm(X10, X10, m_tile * 4, 0)?);

    if loop_iters.is_some() {
        kernel.push(base::sub_imm(X11, X11, 1, 0)?);
        let offset = kernel.loop_offset(&m_label)?;
        kernel.push(base::cbnz(X11, offset)?);
    }
    Ok(())
}

fn emit_tile_transfer(
    kernel: &mut Kernel,
    load: bool,
    col: u32,
    lanes: &[RowLane],
    m_tile: u32,
) -> Result<(), JitError> {
    let lane_count = lanes.len() as u32;
    if m_tile == 16 {
        let r = |lane| acc_reg(col, lane, lane_count);
        if load {
            kernel.push(simd::ldp(r(0), r(1), X13, 0, Q)?);
            kernel.push(simd::ldp(r(2), r(3), X13, 32, Q)?);
        } else {
            kernel.push(simd::stp(r(0), r(1), X13, 0, Q)?);
            kernel.push(simd::stp(r(2), r(3), X13, 32, Q)?);
        }
        return Ok(());
    }

    for (i, lane) in lanes.iter().enumerate() {
        let reg = acc_reg(col, i as u32, lane_count);
        let word = if load {
            simd::ldr(reg, X13, lane.offset, lane.size)?
        } else {
            simd::str(reg, X13, lane.offset, lane.size)?
        };
        kernel.push(word);
    }
    Ok(())
}
