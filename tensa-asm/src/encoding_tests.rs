//! Golden-word tests for every encoder, cross-checked against an
//! independent disassembler.

use crate::base;
use crate::fmt::to_hex;
use crate::simd;
use crate::simd::LanePost;
use crate::{ArrSpec::*, EncodeError, Gpr::*, NeonSize, NeonSize::*, VReg::*};

use rstest::rstest;

#[test]
fn ret() {
    assert_eq!(to_hex(base::ret()), "0xd65f03c0");
}

#[test]
fn cbnz() {
    assert_eq!(base::cbnz(X0, 0).unwrap(), 0xb5000000);
    // Backward displacement of five words.
    assert_eq!(base::cbnz(X19, -20).unwrap(), 0xb5ffff73);
    assert!(base::cbnz(X0, 2).is_err());
    assert!(base::cbnz(X0, 1 << 20).is_err());
    assert!(base::cbnz(X0, -(1 << 20) - 4).is_err());
}

#[test]
fn orr_and_mov_aliases() {
    assert_eq!(base::orr_shifted(X1, X0, X0, 0, 0), 0xaa000001);
    assert_eq!(base::mov_reg(X2, X1), 0xaa0103e2);
    assert_eq!(base::mov_sp(X0, Sp).unwrap(), 0x910003e0);
}

#[test]
fn mov_imm_single_movz() {
    assert_eq!(base::mov_imm(X0, 15).unwrap(), 0xd28001e0);
    // One field at shift 16.
    assert_eq!(base::mov_imm(X0, 1 << 16).unwrap(), 0xd2a00020);
    assert_eq!(
        base::mov_imm(X0, 0x1_0001),
        Err(EncodeError::ImmediateTooLarge(0x1_0001))
    );
}

#[test]
fn movz_shift_domain() {
    assert_eq!(base::movz(X0, 1, 48).unwrap(), 0xd2e00020);
    assert!(base::movz(W0, 1, 32).is_err());
    assert!(base::movz(X0, 1, 8).is_err());
}

#[test]
fn movk() {
    assert_eq!(base::movk(X0, 0xbeef, 16).unwrap(), 0xf2b7dde0);
}

#[test]
fn base_loads() {
    assert_eq!(base::ldr_uoff(X1, X0, 16).unwrap(), 0xf9400801);
    assert_eq!(base::ldp(X2, X3, X0, -16).unwrap(), 0xa97f0c02);
    assert_eq!(base::ldp_post(X2, X3, X0, 16).unwrap(), 0xa8c10c02);
    assert_eq!(base::ldp_pre(X2, X3, X0, 16).unwrap(), 0xa9c10c02);
}

#[test]
fn base_stores() {
    assert_eq!(base::str_uoff(X1, X0, 16).unwrap(), 0xf9000801);
    assert_eq!(base::str_post(X1, X0, 16).unwrap(), 0xf8010401);
    assert_eq!(base::stp(X2, X3, X0, -16).unwrap(), 0xa93f0c02);
    assert_eq!(base::stp_post(X2, X3, X0, 16).unwrap(), 0xa8810c02);
    assert_eq!(base::stp_pre(X2, X3, X0, 16).unwrap(), 0xa9810c02);
}

#[test]
fn base_mem_validation() {
    assert!(base::ldr_uoff(X1, X0, 12).is_err());
    assert!(base::ldr_uoff(W1, X0, 2).is_err());
    assert_eq!(
        base::ldp(X2, W3, X0, 16),
        Err(EncodeError::OperandWidthMismatch("ldp/stp"))
    );
    assert!(base::stp(X2, X3, X0, 8 * 64).is_err());
    assert!(base::str_post(X1, X0, 256).is_err());
}

#[test]
fn arithmetic() {
    assert_eq!(base::mul(X2, X0, X1).unwrap(), 0x9b017c02);
    assert_eq!(base::add_shifted(X2, X0, X1, 4, 0).unwrap(), 0x8b011002);
    assert_eq!(base::add_imm(X2, X0, 16, 0).unwrap(), 0x91004002);
    assert_eq!(
        base::mul(X2, X0, W1),
        Err(EncodeError::OperandWidthMismatch("mul"))
    );
    assert_eq!(
        base::add_shifted(W2, X0, X1, 0, 0),
        Err(EncodeError::OperandWidthMismatch("add (shifted register)"))
    );
    assert!(base::add_imm(X2, X0, 0x1000, 0).is_err());
}

#[test]
fn lsl_ubfm_alias() {
    assert_eq!(base::lsl(X3, X3, 2).unwrap(), 0xd37ef463);
    assert_eq!(base::lsl(W10, W10, 2).unwrap(), 0x531e754a);
    assert_eq!(
        base::lsl(W1, W1, 32),
        Err(EncodeError::ShiftOutOfRange {
            amount: 32,
            width: 32
        })
    );
}

#[test]
fn neon_ldr() {
    assert_eq!(simd::ldr(V28, X6, 0, S).unwrap(), 0xbd4000dc);
    assert_eq!(simd::ldr_post(V28, X6, 16, S).unwrap(), 0xbc4104dc);
    assert_eq!(simd::ldr_post(V12, X9, 24, D).unwrap(), 0xfc41852c);
    assert_eq!(simd::ldr_post(V0, X20, 8, D).unwrap(), 0xfc408680);
    assert_eq!(simd::ldr_post(V7, X11, 32, Q).unwrap(), 0x3cc20567);
    assert_eq!(simd::ldr_reg(V10, X5, W10, S).unwrap(), 0xbc6a48aa);
    assert!(simd::ldr(V0, X0, 2, S).is_err());
    assert!(simd::ldr_reg(V0, X0, X1, S).is_err());
}

#[test]
fn neon_str() {
    assert_eq!(simd::str(V0, X12, 0, S).unwrap(), 0xbd000180);
    assert_eq!(simd::str_post(V28, X6, 16, S).unwrap(), 0xbc0104dc);
    assert_eq!(simd::str_post(V12, X9, 24, D).unwrap(), 0xfc01852c);
    assert_eq!(simd::str_post(V0, X20, 8, D).unwrap(), 0xfc008680);
    assert_eq!(simd::str_post(V7, X11, 32, Q).unwrap(), 0x3c820567);
}

#[test]
fn neon_pairs() {
    assert_eq!(simd::ldp(V1, V2, X0, -16, D).unwrap(), 0x6d7f0801);
    assert_eq!(simd::ldp_post(V1, V2, X0, 16, D).unwrap(), 0x6cc10801);
    assert_eq!(simd::ldp_pre(V1, V2, X0, 16, D).unwrap(), 0x6dc10801);
    assert_eq!(simd::stp(V1, V2, X0, -16, D).unwrap(), 0x6d3f0801);
    assert_eq!(simd::stp_post(V1, V2, X0, 16, D).unwrap(), 0x6c810801);
    assert_eq!(simd::stp_pre(V1, V2, X0, 16, D).unwrap(), 0x6d810801);
    assert!(simd::ldp(V1, V2, X0, 12, Q).is_err());
}

#[test]
fn fadd() {
    assert_eq!(simd::fadd_scalar(V0, V1, V2, S).unwrap(), 0x1e222820);
    assert_eq!(simd::fadd_scalar(V2, V3, V4, D).unwrap(), 0x1e642862);
    assert_eq!(simd::fadd_vec(V0, V1, V2, S2).unwrap(), 0x0e22d420);
    assert_eq!(simd::fadd_vec(V4, V7, V6, S4).unwrap(), 0x4e26d4e4);
    assert_eq!(simd::fadd_vec(V9, V6, V8, D2).unwrap(), 0x4e68d4c9);
}

#[test]
fn fsub() {
    assert_eq!(simd::fsub_scalar(V0, V1, V2, S).unwrap(), 0x1e223820);
    assert_eq!(simd::fsub_scalar(V2, V3, V4, D).unwrap(), 0x1e643862);
    assert_eq!(simd::fsub_vec(V0, V1, V2, S2).unwrap(), 0x0ea2d420);
    assert_eq!(simd::fsub_vec(V4, V7, V6, S4).unwrap(), 0x4ea6d4e4);
    assert_eq!(simd::fsub_vec(V9, V6, V8, D2).unwrap(), 0x4ee8d4c9);
}

#[test]
fn fmul() {
    assert_eq!(simd::fmul_vec(V2, V1, V1, S4).unwrap(), 0x6e21dc22);
    assert_eq!(simd::fmul_scalar(V0, V0, V1, S).unwrap(), 0x1e210800);
    assert_eq!(simd::fmul_scalar(V2, V3, V4, D).unwrap(), 0x1e640862);
}

#[test]
fn fdiv() {
    assert_eq!(simd::fdiv_scalar(V0, V1, V2, S).unwrap(), 0x1e221820);
    assert_eq!(simd::fdiv_scalar(V2, V3, V4, D).unwrap(), 0x1e641862);
    assert_eq!(simd::fdiv_vec(V0, V1, V2, S2).unwrap(), 0x2e22fc20);
    assert_eq!(simd::fdiv_vec(V4, V7, V6, S4).unwrap(), 0x6e26fce4);
    assert_eq!(simd::fdiv_vec(V9, V6, V8, D2).unwrap(), 0x6e68fcc9);
}

#[test]
fn fmax_fmin() {
    assert_eq!(simd::fmax_vec(V3, V0, V1, S4).unwrap(), 0x4e21f403);
    assert_eq!(simd::fmax_vec(V24, V31, V13, S2).unwrap(), 0x0e2df7f8);
    assert_eq!(simd::fmax_scalar(V3, V0, V1, S).unwrap(), 0x1e214803);
    assert_eq!(simd::fmax_scalar(V24, V31, V13, D).unwrap(), 0x1e6d4bf8);
    assert_eq!(simd::fmin_vec(V3, V0, V1, S4).unwrap(), 0x4ea1f403);
    assert_eq!(simd::fmin_vec(V24, V31, V13, S2).unwrap(), 0x0eadf7f8);
    assert_eq!(simd::fmin_scalar(V3, V0, V1, S).unwrap(), 0x1e215803);
    assert_eq!(simd::fmin_scalar(V24, V31, V13, D).unwrap(), 0x1e6d5bf8);
    assert!(simd::fmax_vec(V24, V31, V13, B8).is_err());
    assert!(simd::fmax_vec(V24, V31, V13, B16).is_err());
    assert!(simd::fmax_scalar(V24, V31, V13, Q).is_err());
}

#[test]
fn fmla() {
    assert_eq!(simd::fmla_elem(V4, V0, V28, S4).unwrap(), 0x4f9c1004);
    // The vector form keeps the accumulate opcode in the same family.
    assert_eq!(simd::fmla_vec(V18, V5, V24, S4).unwrap(), 0x4e38ccb2);
    assert!(simd::fmla_elem(V4, V0, V28, D2).is_err());
}

#[test]
fn fmadd() {
    assert_eq!(simd::fmadd(V1, V25, V29, V1, S).unwrap(), 0x1f1d0721);
    assert_eq!(simd::fmadd(V1, V25, V29, V1, D).unwrap(), 0x1f5d0721);
}

#[test]
fn fabs() {
    assert_eq!(simd::fabs_vec(V5, V4, S2).unwrap(), 0x0ea0f885);
    assert_eq!(simd::fabs_vec(V7, V6, S4).unwrap(), 0x4ea0f8c7);
    assert_eq!(simd::fabs_vec(V9, V8, D2).unwrap(), 0x4ee0f909);
    assert_eq!(simd::fabs_scalar(V11, V10, S).unwrap(), 0x1e20c14b);
    assert_eq!(simd::fabs_scalar(V13, V12, D).unwrap(), 0x1e60c18d);
}

#[test]
fn reciprocal_family() {
    assert_eq!(simd::frecpe_vec(V0, V1, S4).unwrap(), 0x4ea1d820);
    assert_eq!(simd::frecpe_scalar(V0, V2, S).unwrap(), 0x5ea1d840);
    assert_eq!(simd::frecps_vec(V2, V1, V0, S4).unwrap(), 0x4e20fc22);
    assert_eq!(simd::frecps_scalar(V3, V2, V0, S).unwrap(), 0x5e20fc43);
}

#[test]
fn rounding_and_conversion() {
    assert_eq!(simd::frintm_vec(V5, V4, S2).unwrap(), 0x0e219885);
    assert_eq!(simd::frintm_vec(V7, V6, S4).unwrap(), 0x4e2198c7);
    assert_eq!(simd::frintm_vec(V9, V8, D2).unwrap(), 0x4e619909);
    assert_eq!(simd::frintm_scalar(V11, V10, S).unwrap(), 0x1e25414b);
    assert_eq!(simd::frintm_scalar(V13, V12, D).unwrap(), 0x1e65418d);
    assert_eq!(simd::frintn_vec(V5, V4, S2).unwrap(), 0x0e218885);
    assert_eq!(simd::frintn_scalar(V11, V10, S).unwrap(), 0x1e24414b);
    assert_eq!(simd::fcvtms_vec(V5, V4, S2).unwrap(), 0x0e21b885);
    assert_eq!(simd::fcvtms_vec(V7, V6, S4).unwrap(), 0x4e21b8c7);
    assert_eq!(simd::fcvtms_vec(V9, V8, D2).unwrap(), 0x4e61b909);
    assert_eq!(simd::fcvtms_scalar(V11, V10, S).unwrap(), 0x5e21b94b);
    assert_eq!(simd::fcvtms_scalar(V13, V12, D).unwrap(), 0x5e61b98d);
    assert_eq!(simd::scvtf_vec(V5, V4, S2).unwrap(), 0x0e21d885);
    assert_eq!(simd::scvtf_vec(V7, V6, S4).unwrap(), 0x4e21d8c7);
    assert_eq!(simd::scvtf_scalar(V11, V10, S).unwrap(), 0x5e21d94b);
}

#[rstest]
#[case(V0, 1, NeonSize::S, 0x1e2e1000)]
#[case(V3, 7, NeonSize::S, 0x1e239003)]
#[case(V5, 13, NeonSize::D, 0x1e655005)]
#[case(V7, 21, NeonSize::D, 0x1e66b007)]
fn fmov_int_scalar(
    #[case] vd: crate::VReg,
    #[case] value: i32,
    #[case] size: NeonSize,
    #[case] expected: u32,
) {
    assert_eq!(simd::fmov_int_scalar(vd, value, size).unwrap(), expected);
}

#[test]
fn fmov_int_vec() {
    assert_eq!(simd::fmov_int_vec(V0, 1, S2).unwrap(), 0x0f03f600);
    assert_eq!(simd::fmov_int_vec(V0, 2, S2).unwrap(), 0x0f00f400);
    assert_eq!(simd::fmov_int_vec(V7, 9, S4).unwrap(), 0x4f01f447);
    assert_eq!(simd::fmov_int_vec(V11, 13, D2).unwrap(), 0x6f01f54b);
    assert!(simd::fmov_int_vec(V0, 0, S4).is_err());
    assert!(simd::fmov_int_vec(V0, 32, S4).is_err());
    assert!(simd::fmov_int_vec(V0, -32, S4).is_err());
}

#[test]
fn fmov_raw_imm8() {
    assert_eq!(simd::fmov_vec(V0, 0b0111_0000, S4).unwrap(), 0x4f03f600);
    assert_eq!(simd::fmov_vec(V1, 0b0110_0000, S4).unwrap(), 0x4f03f401);
    assert!(simd::fmov_vec(V0, 0, B16).is_err());
}

#[test]
fn umov() {
    assert_eq!(simd::umov(W0, V1, 1, S).unwrap(), 0x0e0c3c20);
    assert_eq!(simd::umov(W3, V7, 2, S).unwrap(), 0x0e143ce3);
    assert_eq!(simd::umov(W3, V7, 3, S).unwrap(), 0x0e1c3ce3);
    assert_eq!(simd::umov(X3, V7, 0, D).unwrap(), 0x4e083ce3);
    assert_eq!(simd::umov(X3, V7, 1, D).unwrap(), 0x4e183ce3);
    assert!(simd::umov(X0, V1, 0, S).is_err());
    assert!(simd::umov(W0, V1, 4, S).is_err());
}

#[test]
fn ins_element() {
    assert_eq!(simd::ins_elem(V0, V1, 0, 1, S).unwrap(), 0x6e042420);
    assert_eq!(simd::ins_elem(V3, V2, 1, 0, S).unwrap(), 0x6e0c0443);
    assert_eq!(simd::ins_elem(V3, V2, 2, 3, S).unwrap(), 0x6e146443);
    assert_eq!(simd::ins_elem(V4, V1, 1, 0, D).unwrap(), 0x6e180424);
    assert_eq!(simd::ins_elem(V4, V1, 0, 1, D).unwrap(), 0x6e084424);
}

#[test]
fn ins_general() {
    assert_eq!(simd::ins_gpr(V0, Wzr, 3, S).unwrap(), 0x4e1c1fe0);
    assert_eq!(simd::ins_gpr(V2, Wzr, 3, S).unwrap(), 0x4e1c1fe2);
    assert_eq!(simd::ins_gpr(V0, W1, 3, S).unwrap(), 0x4e1c1c20);
    assert_eq!(simd::ins_gpr(V8, X2, 0, D).unwrap(), 0x4e081c48);
    assert!(simd::ins_gpr(V0, Wzr, 3, Q).is_err());
}

#[test]
fn ld1_st1_lane() {
    assert_eq!(simd::ld1(V0, X0, 3, S, LanePost::None).unwrap(), 0x4d409000);
    assert_eq!(simd::ld1(V5, X1, 1, D, LanePost::None).unwrap(), 0x4d408425);
    assert_eq!(
        simd::ld1(V0, X0, 3, S, LanePost::Reg(X1)).unwrap(),
        0x4dc19000
    );
    assert_eq!(
        simd::ld1(V0, X0, 3, S, LanePost::Imm(4)).unwrap(),
        0x4ddf9000
    );
    assert_eq!(
        simd::ld1(V0, X0, 1, D, LanePost::Imm(8)).unwrap(),
        0x4ddf8400
    );
    assert_eq!(simd::st1(V0, X0, 3, S, LanePost::None).unwrap(), 0x4d009000);
    assert_eq!(simd::st1(V5, X1, 1, D, LanePost::None).unwrap(), 0x4d008425);
    assert_eq!(
        simd::st1(V0, X0, 3, S, LanePost::Reg(X1)).unwrap(),
        0x4d819000
    );
    assert_eq!(
        simd::st1(V0, X0, 3, S, LanePost::Imm(4)).unwrap(),
        0x4d9f9000
    );
    assert_eq!(
        simd::st1(V0, X0, 1, D, LanePost::Imm(8)).unwrap(),
        0x4d9f8400
    );

    assert!(simd::ld1(V0, X0, 4, S, LanePost::None).is_err());
    assert!(simd::ld1(V0, X0, 2, D, LanePost::None).is_err());
    assert!(simd::ld1(V0, X1, 1, D, LanePost::Imm(4)).is_err());
    assert!(simd::ld1(V0, X1, 1, S, LanePost::Imm(8)).is_err());
    assert!(simd::st1(V0, X0, 4, S, LanePost::None).is_err());
    assert!(simd::st1(V0, X1, 1, S, LanePost::Imm(8)).is_err());
}

#[test]
fn eor_and_zero() {
    assert_eq!(simd::eor(V2, V0, V1, B8).unwrap(), 0x2e211c02);
    assert_eq!(simd::eor(V2, V0, V1, B16).unwrap(), 0x6e211c02);
    assert!(simd::eor(V2, V0, V1, S2).is_err());
    assert!(simd::eor(V2, V0, V1, S4).is_err());
    assert!(simd::eor(V2, V0, V1, D2).is_err());
    assert_eq!(simd::zero(V31, B16).unwrap(), 0x6e3f1fff);
}

#[test]
fn permutes() {
    assert_eq!(simd::trn1(V17, V11, V29, S2), 0x0e9d2971);
    assert_eq!(simd::trn2(V12, V7, V0, D2), 0x4ec068ec);
    assert_eq!(simd::zip1(V4, V9, V23, S4), 0x4e973924);
    assert_eq!(simd::zip2(V6, V4, V11, D2), 0x4ecb7886);
    assert_eq!(simd::zip2(V11, V6, V7, S4), 0x4e8778cb);
}
