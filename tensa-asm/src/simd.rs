//! Encoders for the SIMD & floating-point instruction set.

use crate::{ArrSpec, EncodeError, Gpr, NeonSize, VReg};

/// LDR (SIMD&FP, unsigned offset). Byte offset scaled by the transfer size.
pub fn ldr(vt: VReg, rn: Gpr, offset: u32, size: NeonSize) -> Result<u32, EncodeError> {
    ldr_str_uoff(0x3d40_0000, "ldr (simd, unsigned offset)", vt, rn, offset, size)
}

/// STR (SIMD&FP, unsigned offset). Byte offset scaled by the transfer size.
pub fn str(vt: VReg, rn: Gpr, offset: u32, size: NeonSize) -> Result<u32, EncodeError> {
    ldr_str_uoff(0x3d00_0000, "str (simd, unsigned offset)", vt, rn, offset, size)
}

fn ldr_str_uoff(
    base: u32,
    context: &'static str,
    vt: VReg,
    rn: Gpr,
    offset: u32,
    size: NeonSize,
) -> Result<u32, EncodeError> {
    let scale = size.bytes();
    if offset % scale != 0 || offset / scale > 0xfff {
        return Err(EncodeError::UnencodableImmediate {
            context,
            imm: offset as i64,
        });
    }

    let mut ins = base;
    ins |= size_bits(size) << 30;
    if size == NeonSize::Q {
        // opc<1> selects the 128-bit form.
        ins |= 1 << 23;
    }
    ins |= (offset / scale) << 10;
    ins |= rn.field() << 5;
    ins |= vt.field();
    Ok(ins)
}

/// LDR (SIMD&FP, post-index). The 9-bit byte offset is unscaled in the
/// encoding but must be a multiple of the transfer size.
pub fn ldr_post(vt: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    ldr_str_post(0x3c40_0400, "ldr (simd, post-index)", vt, rn, offset, size)
}

/// STR (SIMD&FP, post-index). The 9-bit byte offset is unscaled in the
/// encoding but must be a multiple of the transfer size.
pub fn str_post(vt: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    ldr_str_post(0x3c00_0400, "str (simd, post-index)", vt, rn, offset, size)
}

fn ldr_str_post(
    base: u32,
    context: &'static str,
    vt: VReg,
    rn: Gpr,
    offset: i32,
    size: NeonSize,
) -> Result<u32, EncodeError> {
    if offset % size.bytes() as i32 != 0 || !(-256..=255).contains(&offset) {
        return Err(EncodeError::UnencodableImmediate {
            context,
            imm: offset as i64,
        });
    }

    let mut ins = base;
    ins |= size_bits(size) << 30;
    if size == NeonSize::Q {
        ins |= 1 << 23;
    }
    ins |= ((offset as u32) & 0x1ff) << 12;
    ins |= rn.field() << 5;
    ins |= vt.field();
    Ok(ins)
}

/// LDR (SIMD&FP, register offset), UXTW-extended 32-bit index.
pub fn ldr_reg(vt: VReg, rn: Gpr, rm: Gpr, size: NeonSize) -> Result<u32, EncodeError> {
    if rm.is_wide() {
        return Err(EncodeError::OperandWidthMismatch("ldr (simd, register offset)"));
    }

    let mut ins = 0x3c60_0800;
    ins |= size_bits(size) << 30;
    if size == NeonSize::Q {
        ins |= 1 << 23;
    }
    ins |= rm.field() << 16;
    // option = UXTW
    ins |= 1 << 14;
    ins |= rn.field() << 5;
    ins |= vt.field();
    Ok(ins)
}

const fn size_bits(size: NeonSize) -> u32 {
    match size {
        NeonSize::S => 2,
        NeonSize::D => 3,
        NeonSize::Q => 0,
    }
}

/// LDP (SIMD&FP, signed offset).
pub fn ldp(vt1: VReg, vt2: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    vpair(true, 0xa, vt1, vt2, rn, offset, size)
}

/// LDP (SIMD&FP, post-index).
pub fn ldp_post(vt1: VReg, vt2: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    vpair(true, 0x9, vt1, vt2, rn, offset, size)
}

/// LDP (SIMD&FP, pre-index).
pub fn ldp_pre(vt1: VReg, vt2: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    vpair(true, 0xb, vt1, vt2, rn, offset, size)
}

/// STP (SIMD&FP, signed offset).
pub fn stp(vt1: VReg, vt2: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    vpair(false, 0xa, vt1, vt2, rn, offset, size)
}

/// STP (SIMD&FP, post-index).
pub fn stp_post(vt1: VReg, vt2: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    vpair(false, 0x9, vt1, vt2, rn, offset, size)
}

/// STP (SIMD&FP, pre-index).
pub fn stp_pre(vt1: VReg, vt2: VReg, rn: Gpr, offset: i32, size: NeonSize) -> Result<u32, EncodeError> {
    vpair(false, 0xb, vt1, vt2, rn, offset, size)
}

fn vpair(
    load: bool,
    encoding: u32,
    vt1: VReg,
    vt2: VReg,
    rn: Gpr,
    offset: i32,
    size: NeonSize,
) -> Result<u32, EncodeError> {
    let scale = size.bytes() as i32;
    if offset % scale != 0 || !(-64..=63).contains(&(offset / scale)) {
        return Err(EncodeError::UnencodableImmediate {
            context: "ldp/stp (simd)",
            imm: offset as i64,
        });
    }

    let mut ins = if load { 0x2840_0000 } else { 0x2800_0000 };
    ins |= size.field() << 30;
    ins |= encoding << 23;
    ins |= (((offset / scale) as u32) & 0x7f) << 15;
    ins |= vt2.field() << 10;
    ins |= rn.field() << 5;
    ins |= vt1.field();
    Ok(ins)
}

/// Post-index rule for LD1/ST1 (single structure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanePost {
    /// No writeback.
    None,
    /// Post-index by an immediate; must equal the lane size in bytes.
    Imm(u32),
    /// Post-index by a general-purpose register.
    Reg(Gpr),
}

/// LD1 (single structure) of a 32- or 64-bit lane.
pub fn ld1(vt: VReg, rn: Gpr, lane: u32, size: NeonSize, post: LanePost) -> Result<u32, EncodeError> {
    lane_single(0x0d40_0000, vt, rn, lane, size, post)
}

/// ST1 (single structure) of a 32- or 64-bit lane.
pub fn st1(vt: VReg, rn: Gpr, lane: u32, size: NeonSize, post: LanePost) -> Result<u32, EncodeError> {
    lane_single(0x0d00_0000, vt, rn, lane, size, post)
}

fn lane_single(
    base: u32,
    vt: VReg,
    rn: Gpr,
    lane: u32,
    size: NeonSize,
    post: LanePost,
) -> Result<u32, EncodeError> {
    let limit = match size {
        NeonSize::S => 4,
        NeonSize::D => 2,
        NeonSize::Q => return Err(EncodeError::InvalidOperand("ld1/st1 (single structure)")),
    };
    if lane >= limit {
        return Err(EncodeError::LaneIndexOutOfRange { lane, limit });
    }

    let mut ins = base;
    // opcode<15:13> = 0b100; lane index spread over Q (bit 30), S (bit 12)
    // and, for 64-bit lanes, size<1:0> = 0b01.
    ins |= 0b100 << 13;
    match size {
        NeonSize::S => {
            ins |= (lane >> 1) << 30;
            ins |= (lane & 1) << 12;
        }
        NeonSize::D => {
            ins |= lane << 30;
            ins |= 0b01 << 10;
        }
        NeonSize::Q => unreachable!(),
    }
    match post {
        LanePost::None => {}
        LanePost::Imm(imm) => {
            if imm != size.bytes() {
                return Err(EncodeError::UnencodableImmediate {
                    context: "ld1/st1 post-index",
                    imm: imm as i64,
                });
            }
            ins |= 1 << 23;
            ins |= 0x1f << 16;
        }
        LanePost::Reg(rm) => {
            if !rm.is_wide() {
                return Err(EncodeError::OperandWidthMismatch("ld1/st1 post-index"));
            }
            ins |= 1 << 23;
            ins |= rm.field() << 16;
        }
    }
    ins |= rn.field() << 5;
    ins |= vt.field();
    Ok(ins)
}

/// INS (element): move one lane of `vn` into one lane of `vd`.
pub fn ins_elem(vd: VReg, vn: VReg, dst_lane: u32, src_lane: u32, size: NeonSize) -> Result<u32, EncodeError> {
    let limit = match size {
        NeonSize::S => 4,
        NeonSize::D => 2,
        NeonSize::Q => return Err(EncodeError::InvalidOperand("ins (element)")),
    };
    if dst_lane >= limit || src_lane >= limit {
        return Err(EncodeError::LaneIndexOutOfRange {
            lane: dst_lane.max(src_lane),
            limit,
        });
    }

    let (imm5, imm4) = match size {
        NeonSize::S => ((dst_lane << 3) | 0b100, src_lane << 2),
        NeonSize::D => ((dst_lane << 4) | 0b1000, src_lane << 3),
        NeonSize::Q => unreachable!(),
    };
    let mut ins = 0x6e00_0400;
    ins |= imm5 << 16;
    ins |= imm4 << 11;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

/// INS (general): move a general-purpose register into one lane.
pub fn ins_gpr(vd: VReg, rn: Gpr, lane: u32, size: NeonSize) -> Result<u32, EncodeError> {
    let limit = match size {
        NeonSize::S => 4,
        NeonSize::D => 2,
        NeonSize::Q => return Err(EncodeError::InvalidOperand("ins (general)")),
    };
    if lane >= limit {
        return Err(EncodeError::LaneIndexOutOfRange { lane, limit });
    }
    if rn.is_wide() != (size == NeonSize::D) {
        return Err(EncodeError::OperandWidthMismatch("ins (general)"));
    }

    let imm5 = match size {
        NeonSize::S => (lane << 3) | 0b100,
        NeonSize::D => (lane << 4) | 0b1000,
        NeonSize::Q => unreachable!(),
    };
    let mut ins = 0x4e00_1c00;
    ins |= imm5 << 16;
    ins |= rn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

/// UMOV: move one lane into a general-purpose register.
pub fn umov(rd: Gpr, vn: VReg, lane: u32, size: NeonSize) -> Result<u32, EncodeError> {
    let limit = match size {
        NeonSize::S => 4,
        NeonSize::D => 2,
        NeonSize::Q => return Err(EncodeError::InvalidOperand("umov")),
    };
    if lane >= limit {
        return Err(EncodeError::LaneIndexOutOfRange { lane, limit });
    }
    if rd.is_wide() != (size == NeonSize::D) {
        return Err(EncodeError::OperandWidthMismatch("umov"));
    }

    let (q, imm5) = match size {
        NeonSize::S => (0, (lane << 3) | 0b100),
        NeonSize::D => (1, (lane << 4) | 0b1000),
        NeonSize::Q => unreachable!(),
    };
    let mut ins = 0x0e00_3c00;
    ins |= q << 30;
    ins |= imm5 << 16;
    ins |= vn.field() << 5;
    ins |= rd.field();
    Ok(ins)
}

/// FMOV (vector, immediate) with a raw 8-bit FP immediate.
pub fn fmov_vec(vd: VReg, imm8: u8, arr: ArrSpec) -> Result<u32, EncodeError> {
    if !arr.is_float() {
        return Err(EncodeError::InvalidOperand("fmov (vector, immediate)"));
    }

    let mut ins = 0x0f00_f400;
    ins |= ((imm8 as u32) & 0x1f) << 5;
    ins |= ((imm8 as u32) & 0xe0) << 11;
    match arr {
        ArrSpec::S4 => ins |= 1 << 30,
        ArrSpec::D2 => ins |= (1 << 30) | (1 << 29),
        _ => {}
    }
    ins |= vd.field();
    Ok(ins)
}

/// FMOV (scalar, immediate) with a raw 8-bit FP immediate.
pub fn fmov_scalar(vd: VReg, imm8: u8, size: NeonSize) -> Result<u32, EncodeError> {
    if size == NeonSize::Q {
        return Err(EncodeError::InvalidOperand("fmov (scalar, immediate)"));
    }

    let mut ins = 0x1e20_1000;
    ins |= (imm8 as u32) << 13;
    ins |= size.field() << 22;
    ins |= vd.field();
    Ok(ins)
}

/// FMOV (vector, immediate) of a small integer value in `[-31, 31]`,
/// excluding zero (FMOV cannot encode 0.0; use [`zero`]).
pub fn fmov_int_vec(vd: VReg, value: i32, arr: ArrSpec) -> Result<u32, EncodeError> {
    fmov_vec(vd, fp8_from_int(value)?, arr)
}

/// FMOV (scalar, immediate) of a small integer value in `[-31, 31]`,
/// excluding zero.
pub fn fmov_int_scalar(vd: VReg, value: i32, size: NeonSize) -> Result<u32, EncodeError> {
    fmov_scalar(vd, fp8_from_int(value)?, size)
}

/// 8-bit FP immediate (a:b:c:d:efgh) for an integer value.
fn fp8_from_int(value: i32) -> Result<u8, EncodeError> {
    let err = EncodeError::UnencodableImmediate {
        context: "fmov (integer immediate)",
        imm: value as i64,
    };
    if value == 0 || value.abs() > 31 {
        return Err(err);
    }

    let sign = (value < 0) as u32;
    let mag = value.unsigned_abs();
    // mag = (1 + frac/16) * 2^exp with exp in 0..=4 and frac in 0..=15.
    let exp = 31 - mag.leading_zeros();
    let scaled = (mag << 4) >> exp;
    if scaled << exp != mag << 4 || scaled - 16 > 15 {
        return Err(err);
    }
    let frac = scaled - 16;
    // Exponent bits b:c:d; b marks the low exponent bank.
    let (b, cd) = if exp == 0 { (1, 3) } else { (0, exp - 1) };
    let imm8 = (sign << 7) | (b << 6) | (cd << 4) | frac;
    Ok(imm8 as u8)
}

/// FMLA (vector).
pub fn fmla_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x0e20_cc00, "fmla (vector)", vd, vn, vm, arr)
}

/// FMLA (by element) against lane 0 of `vm`.
pub fn fmla_elem(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    if !matches!(arr, ArrSpec::S2 | ArrSpec::S4) {
        return Err(EncodeError::InvalidOperand("fmla (by element)"));
    }

    let mut ins = 0x0f80_1000;
    ins |= arr.pattern();
    ins |= vm.field() << 16;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

/// FMUL (vector).
pub fn fmul_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x2e20_dc00, "fmul (vector)", vd, vn, vm, arr)
}

/// FMUL (scalar).
pub fn fmul_scalar(vd: VReg, vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar3(0x1e20_0800, "fmul (scalar)", vd, vn, vm, size)
}

/// FADD (vector).
pub fn fadd_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x0e20_d400, "fadd (vector)", vd, vn, vm, arr)
}

/// FADD (scalar).
pub fn fadd_scalar(vd: VReg, vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar3(0x1e20_2800, "fadd (scalar)", vd, vn, vm, size)
}

/// FSUB (vector).
pub fn fsub_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x0ea0_d400, "fsub (vector)", vd, vn, vm, arr)
}

/// FSUB (scalar).
pub fn fsub_scalar(vd: VReg, vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar3(0x1e20_3800, "fsub (scalar)", vd, vn, vm, size)
}

/// FDIV (vector).
pub fn fdiv_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x2e20_fc00, "fdiv (vector)", vd, vn, vm, arr)
}

/// FDIV (scalar).
pub fn fdiv_scalar(vd: VReg, vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar3(0x1e20_1800, "fdiv (scalar)", vd, vn, vm, size)
}

/// FMAX (vector).
pub fn fmax_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x0e20_f400, "fmax (vector)", vd, vn, vm, arr)
}

/// FMAX (scalar).
pub fn fmax_scalar(vd: VReg, vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar3(0x1e20_4800, "fmax (scalar)", vd, vn, vm, size)
}

/// FMIN (vector).
pub fn fmin_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x0ea0_f400, "fmin (vector)", vd, vn, vm, arr)
}

/// FMIN (scalar).
pub fn fmin_scalar(vd: VReg, vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar3(0x1e20_5800, "fmin (scalar)", vd, vn, vm, size)
}

/// FRECPS (vector): Newton-Raphson reciprocal step.
pub fn frecps_vec(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec3(0x0e20_fc00, "frecps (vector)", vd, vn, vm, arr)
}

/// FRECPS (scalar).
pub fn frecps_scalar(vd: VReg, vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    if size == NeonSize::Q {
        return Err(EncodeError::InvalidOperand("frecps (scalar)"));
    }
    let mut ins = 0x5e20_fc00;
    ins |= size.field() << 22;
    ins |= vm.field() << 16;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

/// FMADD (scalar): `vd = va + vn * vm`.
pub fn fmadd(vd: VReg, vn: VReg, vm: VReg, va: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    if size == NeonSize::Q {
        return Err(EncodeError::InvalidOperand("fmadd"));
    }
    let mut ins = 0x1f00_0000;
    ins |= size.field() << 22;
    ins |= vm.field() << 16;
    ins |= va.field() << 10;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

/// FCMP (scalar).
pub fn fcmp(vn: VReg, vm: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    if size == NeonSize::Q {
        return Err(EncodeError::InvalidOperand("fcmp"));
    }
    let mut ins = 0x1e20_2000;
    ins |= size.field() << 22;
    ins |= vm.field() << 16;
    ins |= vn.field() << 5;
    Ok(ins)
}

/// FABS (vector).
pub fn fabs_vec(vd: VReg, vn: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec2(0x0ea0_f800, "fabs (vector)", vd, vn, arr)
}

/// FABS (scalar).
pub fn fabs_scalar(vd: VReg, vn: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar2(0x1e20_c000, "fabs (scalar)", vd, vn, size)
}

/// FRECPE (vector): reciprocal estimate.
pub fn frecpe_vec(vd: VReg, vn: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec2(0x0ea1_d800, "frecpe (vector)", vd, vn, arr)
}

/// FRECPE (scalar).
pub fn frecpe_scalar(vd: VReg, vn: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar2(0x5ea1_d800, "frecpe (scalar)", vd, vn, size)
}

/// FRINTM (vector): round toward minus infinity.
pub fn frintm_vec(vd: VReg, vn: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec2(0x0e21_9800, "frintm (vector)", vd, vn, arr)
}

/// FRINTM (scalar).
pub fn frintm_scalar(vd: VReg, vn: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar2(0x1e25_4000, "frintm (scalar)", vd, vn, size)
}

/// FRINTN (vector): round to nearest, ties to even.
pub fn frintn_vec(vd: VReg, vn: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec2(0x0e21_8800, "frintn (vector)", vd, vn, arr)
}

/// FRINTN (scalar).
pub fn frintn_scalar(vd: VReg, vn: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar2(0x1e24_4000, "frintn (scalar)", vd, vn, size)
}

/// FCVTMS (vector): float to signed integer, rounding toward minus infinity.
pub fn fcvtms_vec(vd: VReg, vn: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec2(0x0e21_b800, "fcvtms (vector)", vd, vn, arr)
}

/// FCVTMS (scalar).
pub fn fcvtms_scalar(vd: VReg, vn: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar2(0x5e21_b800, "fcvtms (scalar)", vd, vn, size)
}

/// SCVTF (vector): signed integer to float.
pub fn scvtf_vec(vd: VReg, vn: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    vec2(0x0e21_d800, "scvtf (vector)", vd, vn, arr)
}

/// SCVTF (scalar).
pub fn scvtf_scalar(vd: VReg, vn: VReg, size: NeonSize) -> Result<u32, EncodeError> {
    scalar2(0x5e21_d800, "scvtf (scalar)", vd, vn, size)
}

/// EOR (vector); byte arrangements only.
pub fn eor(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    if arr.is_float() {
        return Err(EncodeError::InvalidOperand("eor (vector)"));
    }

    let mut ins = 0x2e20_1c00;
    ins |= arr.pattern();
    ins |= vm.field() << 16;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

/// Clear a vector register (EOR with itself).
pub fn zero(vd: VReg, arr: ArrSpec) -> Result<u32, EncodeError> {
    eor(vd, vd, vd, arr)
}

/// TRN1 (vector permute).
pub fn trn1(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> u32 {
    permute(0x0e00_2800, vd, vn, vm, arr)
}

/// TRN2 (vector permute).
pub fn trn2(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> u32 {
    permute(0x0e00_6800, vd, vn, vm, arr)
}

/// ZIP1 (vector permute).
pub fn zip1(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> u32 {
    permute(0x0e00_3800, vd, vn, vm, arr)
}

/// ZIP2 (vector permute).
pub fn zip2(vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> u32 {
    permute(0x0e00_7800, vd, vn, vm, arr)
}

fn permute(base: u32, vd: VReg, vn: VReg, vm: VReg, arr: ArrSpec) -> u32 {
    let (size, q) = arr.size_q();
    let mut ins = base;
    ins |= q << 30;
    ins |= size << 22;
    ins |= vm.field() << 16;
    ins |= vn.field() << 5;
    ins |= vd.field();
    ins
}

fn vec3(
    base: u32,
    context: &'static str,
    vd: VReg,
    vn: VReg,
    vm: VReg,
    arr: ArrSpec,
) -> Result<u32, EncodeError> {
    if !arr.is_float() {
        return Err(EncodeError::InvalidOperand(context));
    }

    let mut ins = base;
    ins |= arr.pattern();
    ins |= vm.field() << 16;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

fn scalar3(
    base: u32,
    context: &'static str,
    vd: VReg,
    vn: VReg,
    vm: VReg,
    size: NeonSize,
) -> Result<u32, EncodeError> {
    if size == NeonSize::Q {
        return Err(EncodeError::InvalidOperand(context));
    }

    let mut ins = base;
    ins |= size.field() << 22;
    ins |= vm.field() << 16;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

fn vec2(
    base: u32,
    context: &'static str,
    vd: VReg,
    vn: VReg,
    arr: ArrSpec,
) -> Result<u32, EncodeError> {
    if !arr.is_float() {
        return Err(EncodeError::InvalidOperand(context));
    }

    let mut ins = base;
    ins |= arr.pattern();
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}

fn scalar2(
    base: u32,
    context: &'static str,
    vd: VReg,
    vn: VReg,
    size: NeonSize,
) -> Result<u32, EncodeError> {
    if size == NeonSize::Q {
        return Err(EncodeError::InvalidOperand(context));
    }

    let mut ins = base;
    ins |= size.field() << 22;
    ins |= vn.field() << 5;
    ins |= vd.field();
    Ok(ins)
}
