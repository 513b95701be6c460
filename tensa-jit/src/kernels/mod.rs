//! Microkernel generators.
//!
//! Each generator appends a complete, self-contained function body to a
//! [`Kernel`](crate::buffer::Kernel): callee-saved registers are
//! preserved, leading dimensions arrive in elements and are scaled to
//! bytes on entry, and the body ends with RET. Backward branches use
//! CBNZ with displacements computed from buffer labels.

pub mod binary;
pub mod matmul;
mod trans;
pub mod unary;

#[cfg(test)]
mod generator_tests {
    use crate::buffer::Kernel;
    use crate::kernels::{binary, matmul, unary};
    use crate::JitError;

    use rstest::rstest;
    use tensa_asm::base;

    fn assert_well_formed(kernel: &Kernel) {
        let words = kernel.words();
        assert!(!words.is_empty());
        // Frame setup first, RET last.
        assert_eq!(words[0], base::stp_pre(
            tensa_asm::Gpr::X29,
            tensa_asm::Gpr::X30,
            tensa_asm::Gpr::Sp,
            -16
        )
        .unwrap());
        assert_eq!(*words.last().unwrap(), base::ret());
        // Every CBNZ displacement must stay in the encodable window; the
        // encoder rejects others, so finding one here proves emission
        // went through validation.
        for &word in words {
            if word & 0x7f00_0000 == 0x3500_0000 {
                let imm19 = ((word >> 5) & 0x7_ffff) as i32;
                let imm19 = (imm19 << 13) >> 13;
                assert!(imm19 < 0, "loop branches must be backward");
            }
        }
    }

    #[rstest]
    #[case(1, 1, 1)]
    #[case(4, 4, 4)]
    #[case(7, 3, 5)]
    #[case(15, 5, 9)]
    #[case(16, 6, 1)]
    #[case(16, 6, 64)]
    #[case(64, 48, 64)]
    #[case(33, 7, 17)]
    fn matmul_bodies_are_well_formed(#[case] m: u32, #[case] n: u32, #[case] k: u32) {
        let mut kernel = Kernel::new();
        matmul::matmul(&mut kernel, m, n, k).unwrap();
        assert_well_formed(&kernel);
    }

    #[rstest]
    #[case(16, 6, 64, 16)]
    #[case(9, 5, 3, 2)]
    fn brgemm_bodies_are_well_formed(
        #[case] m: u32,
        #[case] n: u32,
        #[case] k: u32,
        #[case] br: u32,
    ) {
        let mut kernel = Kernel::new();
        matmul::brgemm(&mut kernel, m, n, k, br).unwrap();
        assert_well_formed(&kernel);
    }

    #[test]
    fn matmul_rejects_out_of_range_shapes() {
        let mut kernel = Kernel::new();
        assert!(matches!(
            matmul::matmul(&mut kernel, 0, 4, 4),
            Err(JitError::WrongDimension { context: "m", .. })
        ));
        let mut kernel = Kernel::new();
        assert!(matches!(
            matmul::matmul(&mut kernel, 4, 2049, 4),
            Err(JitError::WrongDimension { context: "n", .. })
        ));
    }

    #[rstest]
    #[case(1, 1)]
    #[case(8, 1)]
    #[case(8, 65)]
    #[case(13, 9)]
    #[case(64, 48)]
    fn unary_bodies_are_well_formed(#[case] m: u32, #[case] n: u32) {
        type Gen = fn(&mut Kernel, u32, u32, bool) -> Result<(), JitError>;
        let gens: &[Gen] = &[
            unary::identity,
            unary::relu,
            unary::square,
            unary::increment,
            unary::decrement,
            unary::reciprocal,
            unary::fast_sigmoid,
            unary::sigmoid_taylor,
            unary::sigmoid_interpolation,
            unary::zero,
        ];
        for gen in gens {
            let mut kernel = Kernel::new();
            gen(&mut kernel, m, n, false).unwrap();
            assert_well_formed(&kernel);
        }
    }

    #[rstest]
    #[case(4, 4)]
    #[case(7, 5)]
    #[case(12, 3)]
    #[case(2, 9)]
    fn transposed_bodies_are_well_formed(#[case] m: u32, #[case] n: u32) {
        type Gen = fn(&mut Kernel, u32, u32, bool) -> Result<(), JitError>;
        let gens: &[Gen] = &[
            unary::identity,
            unary::relu,
            unary::square,
            unary::increment,
            unary::decrement,
            unary::zero,
        ];
        for gen in gens {
            let mut kernel = Kernel::new();
            gen(&mut kernel, m, n, true).unwrap();
            assert_well_formed(&kernel);
        }
    }

    #[test]
    fn transposed_sigmoids_are_rejected() {
        let mut kernel = Kernel::new();
        assert!(matches!(
            unary::fast_sigmoid(&mut kernel, 4, 4, true),
            Err(JitError::OperationNotSupported(_))
        ));
    }

    #[rstest]
    #[case(1, 1)]
    #[case(7, 3)]
    #[case(16, 4)]
    #[case(64, 65)]
    fn binary_bodies_are_well_formed(#[case] m: u32, #[case] n: u32) {
        type Gen = fn(&mut Kernel, u32, u32) -> Result<(), JitError>;
        let gens: &[Gen] = &[
            binary::add,
            binary::sub,
            binary::mul,
            binary::div,
            binary::min,
            binary::max,
        ];
        for gen in gens {
            let mut kernel = Kernel::new();
            gen(&mut kernel, m, n).unwrap();
            assert_well_formed(&kernel);
        }
    }

    #[test]
    fn aux_tables_have_expected_shape() {
        let taylor = unary::taylor_table();
        assert_eq!(taylor.len(), 16);
        assert_eq!(taylor[0], 0.5);
        assert_eq!(taylor[4], 0.25);

        let table = unary::sigmoid_table();
        assert_eq!(table.len(), 33);
        assert!((table[16] - 0.5).abs() < 1e-6);
        assert!(table[0] < 0.001 && table[32] > 0.999);
    }
}
