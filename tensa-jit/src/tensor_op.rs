//! Tensor-operation driver: plans a loop nest, JIT-compiles its
//! microkernels, and executes the outer loops around them.

use rayon::prelude::*;
use tracing::debug;

use crate::buffer::{CompiledKernel, Kernel};
use crate::ir::{self, Dimension};
use crate::kernels::{binary, matmul, unary};
use crate::optimizer;
use crate::{DType, DimKind, ExecKind, JitError, PrimKind};

/// GEMM entry point: A, B, C, lda, ldb, ldc (leading dims in elements).
pub type GemmFn = unsafe extern "C" fn(*const f32, *const f32, *mut f32, i64, i64, i64);
/// BRGEMM entry point: GEMM arguments plus the two batch strides.
pub type BrgemmFn =
    unsafe extern "C" fn(*const f32, *const f32, *mut f32, i64, i64, i64, i64, i64);
/// Unary entry point: input, output, leading dims, auxiliary table.
pub type UnaryFn = unsafe extern "C" fn(*const f32, *mut f32, i64, i64, *const f32);
/// Binary entry point: A, B, C and their leading dims.
pub type BinaryFn = unsafe extern "C" fn(*const f32, *const f32, *mut f32, i64, i64, i64);

/// Defaults used when `setup` receives a nest without primitive
/// assignments and has to run the optimizer itself.
const THREAD_TARGET: i64 = 64;
const MAX_KERNEL_SIZE: i64 = 1024;
const MIN_KERNEL_SIZE: i64 = 16;

/// A compiled unary kernel together with the constant table it reads.
#[derive(Debug)]
struct UnaryKernel {
    compiled: CompiledKernel,
    table: Option<Box<[f32]>>,
}

impl UnaryKernel {
    unsafe fn call(&self, input: *const f32, output: *mut f32, ld_in: i64, ld_out: i64) {
        let table = self
            .table
            .as_ref()
            .map_or(std::ptr::null(), |t| t.as_ptr());
        let f: UnaryFn = std::mem::transmute(self.compiled.as_ptr());
        f(input, output, ld_in, ld_out, table);
    }
}

#[derive(Debug)]
enum MainKernel {
    Gemm(CompiledKernel),
    Brgemm(CompiledKernel),
    Unary(UnaryKernel),
    Binary(CompiledKernel),
}

/// Leading dimensions and batch strides the leaf call sites need, all
/// in element units.
#[derive(Debug, Default, Clone, Copy)]
struct LeafStrides {
    lda: i64,
    ldb: i64,
    ldc: i64,
    br_a: i64,
    br_b: i64,
    ld_touch: i64,
}

/// A planned and compiled tensor operation.
///
/// `setup` is single-threaded; `execute` may fork across the shared
/// loops but touches no shared mutable state.
#[derive(Debug)]
pub struct TensorOperation {
    dims: Vec<Dimension>,
    shared_count: usize,
    prim_start: usize,
    first_touch: Option<UnaryKernel>,
    main: MainKernel,
    last_touch: Option<UnaryKernel>,
    strides: LeafStrides,
}

impl TensorOperation {
    /// Plan and compile a tensor operation from the six parallel
    /// configuration arrays.
    #[allow(clippy::too_many_arguments)]
    pub fn setup(
        dtype: DType,
        first_touch: PrimKind,
        main: PrimKind,
        last_touch: PrimKind,
        dim_kinds: &[DimKind],
        exec_kinds: &[ExecKind],
        sizes: &[i64],
        strides_in0: &[i64],
        strides_in1: &[i64],
        strides_out: &[i64],
    ) -> Result<Self, JitError> {
        let dims = ir::config_to_dimensions(
            dim_kinds,
            exec_kinds,
            sizes,
            strides_in0,
            strides_in1,
            strides_out,
        )?;
        Self::from_dimensions(dtype, first_touch, main, last_touch, dims)
    }

    /// Plan and compile a tensor operation from dimension records.
    pub fn from_dimensions(
        dtype: DType,
        first_touch: PrimKind,
        main: PrimKind,
        last_touch: PrimKind,
        mut dims: Vec<Dimension>,
    ) -> Result<Self, JitError> {
        if dtype != DType::Fp32 {
            return Err(JitError::UnsupportedDtype(dtype));
        }
        if !(main.is_matmul() || main.is_unary() || main.is_binary()) {
            return Err(JitError::WrongPtype {
                ptype: main,
                slot: "main kernel",
            });
        }
        for (slot, ptype) in [("first touch", first_touch), ("last touch", last_touch)] {
            if ptype != PrimKind::None && !ptype.is_unary() {
                return Err(JitError::WrongPtype { ptype, slot });
            }
        }
        for dim in &dims {
            if dim.size <= 0 {
                return Err(JitError::WrongDimension {
                    context: "dimension size",
                    value: dim.size,
                    limit: i64::MAX,
                });
            }
        }

        // A nest without primitive assignments goes through the
        // optimizer; a pre-planned nest is only reordered.
        if dims.iter().all(|d| d.exec != ExecKind::Prim) {
            optimizer::optimize(&mut dims, THREAD_TARGET, MAX_KERNEL_SIZE, MIN_KERNEL_SIZE)?;
        } else {
            for dim in dims.iter_mut() {
                if dim.exec == ExecKind::Undefined {
                    dim.exec = ExecKind::Seq;
                }
            }
            dims.sort_by_key(|d| match d.exec {
                ExecKind::Shared => 0,
                ExecKind::Seq | ExecKind::Undefined => 1,
                ExecKind::Prim => 2,
            });
        }

        let prim_count = dims.iter().filter(|d| d.exec == ExecKind::Prim).count();
        if !(2..=4).contains(&prim_count) {
            return Err(JitError::CannotIdentifyPrimitives(prim_count));
        }
        let prim_start = dims.len() - prim_count;
        let shared_count = dims
            .iter()
            .take_while(|d| d.exec == ExecKind::Shared)
            .count();

        let prims = &dims[prim_start..];
        let mut strides = LeafStrides::default();
        let main_kernel = build_main(main, prims, prim_count, &mut strides)?;

        // First/last touch work on the output tile of the primitive
        // dimensions.
        let (touch_m, touch_n, ld_touch) = touch_extents(main, prims)?;
        strides.ld_touch = ld_touch;
        let first = build_touch(first_touch, touch_m, touch_n)?;
        let last = build_touch(last_touch, touch_m, touch_n)?;

        debug!(
            loops = dims.len(),
            prims = prim_count,
            shared = shared_count,
            "tensor operation ready"
        );

        Ok(Self {
            dims,
            shared_count,
            prim_start,
            first_touch: first,
            main: main_kernel,
            last_touch: last,
            strides,
        })
    }

    /// The final, reordered loop nest (shared loops first, primitive
    /// dimensions at the tail).
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    /// Run the operation over raw tensor base pointers.
    ///
    /// # Safety
    ///
    /// The pointers must cover every element addressed by the
    /// configured sizes and strides; `in1` may dangle for unary mains
    /// (it is never read).
    pub unsafe fn execute(&self, in0: *const f32, in1: *const f32, out: *mut f32) {
        let ptrs = Ptrs { in0, in1, out };
        let shared = &self.dims[..self.shared_count];
        let total: i64 = shared.iter().map(|d| d.size).product();

        if total > 1 {
            (0..total).into_par_iter().for_each(|task| {
                let p = ptrs;
                let cursor = decompose(task, shared);
                self.run_seq(self.shared_count, cursor, p);
            });
        } else {
            self.run_seq(self.shared_count, Cursor::default(), ptrs);
        }
    }

    fn run_seq(&self, depth: usize, cursor: Cursor, ptrs: Ptrs) {
        if depth == self.prim_start {
            // SAFETY: offsets stay inside the caller-promised extents.
            unsafe { self.run_leaf(cursor, ptrs) };
            return;
        }

        let dim = self.dims[depth];
        for i in 0..dim.size {
            self.run_seq(depth + 1, cursor.step(&dim, i), ptrs);
        }
    }

    unsafe fn run_leaf(&self, cursor: Cursor, ptrs: Ptrs) {
        let a = ptrs.in0.offset(cursor.off0 as isize);
        let b = ptrs.in1.wrapping_offset(cursor.off1 as isize);
        let c = ptrs.out.offset(cursor.off_out as isize);
        let s = self.strides;

        if cursor.first_k {
            if let Some(touch) = &self.first_touch {
                touch.call(c, c, s.ld_touch, s.ld_touch);
            }
        }

        match &self.main {
            MainKernel::Gemm(kernel) => {
                let f: GemmFn = std::mem::transmute(kernel.as_ptr());
                f(a, b, c, s.lda, s.ldb, s.ldc);
            }
            MainKernel::Brgemm(kernel) => {
                let f: BrgemmFn = std::mem::transmute(kernel.as_ptr());
                f(a, b, c, s.lda, s.ldb, s.ldc, s.br_a, s.br_b);
            }
            MainKernel::Unary(kernel) => kernel.call(a, c, s.lda, s.ldc),
            MainKernel::Binary(kernel) => {
                let f: BinaryFn = std::mem::transmute(kernel.as_ptr());
                f(a, b, c, s.lda, s.ldb, s.ldc);
            }
        }

        if cursor.last_k {
            if let Some(touch) = &self.last_touch {
                touch.call(c, c, s.ld_touch, s.ld_touch);
            }
        }
    }
}

/// Per-iteration state of the outer loop walk: element offsets into the
/// three tensors, plus whether this is the first/last visit of the
/// current C tile. Outer contraction loops revisit a tile with
/// `stride_out == 0`; first touch must only initialize the tile on the
/// first visit and last touch only finish it on the last.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    off0: i64,
    off1: i64,
    off_out: i64,
    first_k: bool,
    last_k: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            off0: 0,
            off1: 0,
            off_out: 0,
            first_k: true,
            last_k: true,
        }
    }
}

impl Cursor {
    fn step(self, dim: &Dimension, index: i64) -> Self {
        let revisits = dim.kind == DimKind::K;
        Self {
            off0: self.off0 + index * dim.stride_in0,
            off1: self.off1 + index * dim.stride_in1,
            off_out: self.off_out + index * dim.stride_out,
            first_k: self.first_k && (!revisits || index == 0),
            last_k: self.last_k && (!revisits || index == dim.size - 1),
        }
    }
}

/// Raw tensor bases shared with the worker pool. The workers write to
/// disjoint C tiles, so concurrent use is safe.
#[derive(Clone, Copy)]
struct Ptrs {
    in0: *const f32,
    in1: *const f32,
    out: *mut f32,
}

unsafe impl Send for Ptrs {}
unsafe impl Sync for Ptrs {}

/// Split a flat shared-loop task index into a walk cursor.
fn decompose(task: i64, shared: &[Dimension]) -> Cursor {
    let mut rest = task;
    let mut cursor = Cursor::default();
    for dim in shared.iter().rev() {
        let idx = rest % dim.size;
        rest /= dim.size;
        cursor = cursor.step(dim, idx);
    }
    cursor
}

fn prim_size(context: &'static str, size: i64) -> Result<u32, JitError> {
    u32::try_from(size).map_err(|_| JitError::WrongDimension {
        context,
        value: size,
        limit: u32::MAX as i64,
    })
}

fn find_prim(prims: &[Dimension], kind: DimKind) -> Option<&Dimension> {
    prims.iter().find(|d| d.kind == kind)
}

fn build_main(
    main: PrimKind,
    prims: &[Dimension],
    prim_count: usize,
    strides: &mut LeafStrides,
) -> Result<MainKernel, JitError> {
    if main.is_matmul() {
        if !(3..=4).contains(&prim_count) {
            return Err(JitError::CannotIdentifyPrimitives(prim_count));
        }
        let m = find_prim(prims, DimKind::M).ok_or(JitError::NoPrimDimension("M"))?;
        let n = find_prim(prims, DimKind::N).ok_or(JitError::NoPrimDimension("N"))?;
        let k = prims
            .iter()
            .find(|d| d.kind == DimKind::K && d.stride_in1 == 1)
            .ok_or(JitError::NoPrimDimension("K"))?;
        let br = prims
            .iter()
            .find(|d| d.kind == DimKind::K && d.stride_in1 != 1);

        strides.lda = k.stride_in0;
        strides.ldb = n.stride_in1;
        strides.ldc = n.stride_out;

        let (m, n, k) = (
            prim_size("prim m", m.size)?,
            prim_size("prim n", n.size)?,
            prim_size("prim k", k.size)?,
        );

        let mut kernel = Kernel::new();
        return match br {
            Some(batch) => {
                strides.br_a = batch.stride_in0;
                strides.br_b = batch.stride_in1;
                matmul::brgemm(&mut kernel, m, n, k, prim_size("prim br", batch.size)?)?;
                Ok(MainKernel::Brgemm(kernel.finalize()?))
            }
            None if prim_count == 4 => Err(JitError::NoPrimDimension("BR")),
            None if main == PrimKind::Brgemm => Err(JitError::NoPrimDimension("BR")),
            None => {
                matmul::matmul(&mut kernel, m, n, k)?;
                Ok(MainKernel::Gemm(kernel.finalize()?))
            }
        };
    }

    if prim_count != 2 {
        return Err(JitError::CannotIdentifyPrimitives(prim_count));
    }

    if main.is_binary() {
        let m = find_prim(prims, DimKind::M).ok_or(JitError::NoPrimDimension("M"))?;
        let n = find_prim(prims, DimKind::N).ok_or(JitError::NoPrimDimension("N"))?;
        strides.lda = n.stride_in0;
        strides.ldb = n.stride_in1;
        strides.ldc = n.stride_out;

        let mut kernel = Kernel::new();
        let (m, n) = (prim_size("prim m", m.size)?, prim_size("prim n", n.size)?);
        match main {
            PrimKind::Add => binary::add(&mut kernel, m, n)?,
            PrimKind::Sub => binary::sub(&mut kernel, m, n)?,
            PrimKind::Mul => binary::mul(&mut kernel, m, n)?,
            PrimKind::Div => binary::div(&mut kernel, m, n)?,
            PrimKind::Min => binary::min(&mut kernel, m, n)?,
            PrimKind::Max => binary::max(&mut kernel, m, n)?,
            _ => unreachable!("is_binary covers the arms above"),
        }
        return Ok(MainKernel::Binary(kernel.finalize()?));
    }

    // Unary main: prim M is the unit-stride input dimension.
    let (prim_m, prim_n) = unary_prims(prims)?;
    let trans = prim_m.stride_out != 1;
    strides.lda = prim_n.stride_in0;
    strides.ldc = if trans {
        prim_m.stride_out
    } else {
        prim_n.stride_out
    };

    let kernel = build_unary(
        main,
        prim_size("prim m", prim_m.size)?,
        prim_size("prim n", prim_n.size)?,
        trans,
    )?;
    Ok(MainKernel::Unary(kernel))
}

fn unary_prims(prims: &[Dimension]) -> Result<(&Dimension, &Dimension), JitError> {
    let m = prims
        .iter()
        .position(|d| d.stride_in0 == 1)
        .ok_or(JitError::NoPrimDimension("M"))?;
    let n = 1 - m;
    Ok((&prims[m], &prims[n]))
}

/// Output-tile extents and leading dimension the touch kernels use.
fn touch_extents(main: PrimKind, prims: &[Dimension]) -> Result<(u32, u32, i64), JitError> {
    if main.is_matmul() || main.is_binary() {
        let m = find_prim(prims, DimKind::M).ok_or(JitError::NoPrimDimension("M"))?;
        let n = find_prim(prims, DimKind::N).ok_or(JitError::NoPrimDimension("N"))?;
        return Ok((
            prim_size("prim m", m.size)?,
            prim_size("prim n", n.size)?,
            n.stride_out,
        ));
    }

    let (prim_m, prim_n) = unary_prims(prims)?;
    let m = prim_size("prim m", prim_m.size)?;
    let n = prim_size("prim n", prim_n.size)?;
    if prim_m.stride_out != 1 {
        // Transposing main: the output tile is n x m.
        Ok((n, m, prim_m.stride_out))
    } else {
        Ok((m, n, prim_n.stride_out))
    }
}

fn build_touch(kind: PrimKind, m: u32, n: u32) -> Result<Option<UnaryKernel>, JitError> {
    if kind == PrimKind::None {
        return Ok(None);
    }
    Ok(Some(build_unary(kind, m, n, false)?))
}

fn build_unary(kind: PrimKind, m: u32, n: u32, trans: bool) -> Result<UnaryKernel, JitError> {
    let mut kernel = Kernel::new();
    let table = match kind {
        PrimKind::SigmoidTaylor => Some(unary::taylor_table()),
        PrimKind::SigmoidInterp => Some(unary::sigmoid_table()),
        _ => None,
    };

    match kind {
        PrimKind::Zero => unary::zero(&mut kernel, m, n, trans)?,
        PrimKind::Identity => unary::identity(&mut kernel, m, n, trans)?,
        PrimKind::Relu | PrimKind::CopyRelu => unary::relu(&mut kernel, m, n, trans)?,
        PrimKind::Square => unary::square(&mut kernel, m, n, trans)?,
        PrimKind::Reciprocal => unary::reciprocal(&mut kernel, m, n, trans)?,
        PrimKind::FastSigmoid => unary::fast_sigmoid(&mut kernel, m, n, trans)?,
        PrimKind::SigmoidTaylor => unary::sigmoid_taylor(&mut kernel, m, n, trans)?,
        PrimKind::SigmoidInterp => unary::sigmoid_interpolation(&mut kernel, m, n, trans)?,
        PrimKind::Increment => unary::increment(&mut kernel, m, n, trans)?,
        PrimKind::Decrement => unary::decrement(&mut kernel, m, n, trans)?,
        other => {
            return Err(JitError::WrongPtype {
                ptype: other,
                slot: "unary kernel",
            })
        }
    }

    Ok(UnaryKernel {
        compiled: kernel.finalize()?,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemm_config() -> (
        Vec<DimKind>,
        Vec<ExecKind>,
        Vec<i64>,
        Vec<i64>,
        Vec<i64>,
        Vec<i64>,
    ) {
        (
            vec![DimKind::M, DimKind::N, DimKind::K],
            vec![ExecKind::Prim; 3],
            vec![16, 6, 32],
            vec![1, 0, 16],
            vec![0, 32, 1],
            vec![1, 16, 0],
        )
    }

    #[test]
    fn setup_compiles_a_preplanned_gemm() {
        let (kinds, execs, sizes, s0, s1, so) = gemm_config();
        let op = TensorOperation::setup(
            DType::Fp32,
            PrimKind::None,
            PrimKind::Gemm,
            PrimKind::None,
            &kinds,
            &execs,
            &sizes,
            &s0,
            &s1,
            &so,
        )
        .unwrap();
        assert!(matches!(op.main, MainKernel::Gemm(_)));
        assert_eq!(op.strides.lda, 16);
        assert_eq!(op.strides.ldb, 32);
        assert_eq!(op.strides.ldc, 16);
    }

    #[test]
    fn fp64_is_rejected() {
        let (kinds, execs, sizes, s0, s1, so) = gemm_config();
        let err = TensorOperation::setup(
            DType::Fp64,
            PrimKind::None,
            PrimKind::Gemm,
            PrimKind::None,
            &kinds,
            &execs,
            &sizes,
            &s0,
            &s1,
            &so,
        )
        .unwrap_err();
        assert!(matches!(err, JitError::UnsupportedDtype(DType::Fp64)));
    }

    #[test]
    fn binary_first_touch_is_rejected() {
        let (kinds, execs, sizes, s0, s1, so) = gemm_config();
        let err = TensorOperation::setup(
            DType::Fp32,
            PrimKind::Add,
            PrimKind::Gemm,
            PrimKind::None,
            &kinds,
            &execs,
            &sizes,
            &s0,
            &s1,
            &so,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            JitError::WrongPtype {
                slot: "first touch",
                ..
            }
        ));
    }

    #[test]
    fn gemm_with_batch_prim_lowers_to_brgemm() {
        let op = TensorOperation::setup(
            DType::Fp32,
            PrimKind::Zero,
            PrimKind::Gemm,
            PrimKind::None,
            &[DimKind::K, DimKind::M, DimKind::N, DimKind::K],
            &[ExecKind::Prim; 4],
            &[4, 16, 6, 8],
            &[128, 1, 0, 16],
            &[64, 0, 8, 1],
            &[0, 1, 16, 0],
        )
        .unwrap();
        assert!(matches!(op.main, MainKernel::Brgemm(_)));
        assert_eq!(op.strides.br_a, 128);
        assert_eq!(op.strides.br_b, 64);
    }

    #[test]
    fn unplanned_nest_is_optimized_by_setup() {
        let op = TensorOperation::setup(
            DType::Fp32,
            PrimKind::None,
            PrimKind::Gemm,
            PrimKind::None,
            &[DimKind::M, DimKind::N, DimKind::K],
            &[ExecKind::Seq; 3],
            &[64, 64, 64],
            &[1, 0, 64],
            &[0, 64, 1],
            &[1, 64, 0],
        )
        .unwrap();
        let prims = op
            .dimensions()
            .iter()
            .filter(|d| d.exec == ExecKind::Prim)
            .count();
        assert_eq!(prims, 3);
    }

    #[test]
    fn shared_loops_lead_the_nest() {
        let op = TensorOperation::setup(
            DType::Fp32,
            PrimKind::None,
            PrimKind::Gemm,
            PrimKind::None,
            &[DimKind::N, DimKind::M, DimKind::N, DimKind::K],
            &[
                ExecKind::Seq,
                ExecKind::Prim,
                ExecKind::Prim,
                ExecKind::Prim,
            ],
            &[8, 16, 4, 16],
            &[0, 1, 0, 16],
            &[256, 0, 64, 1],
            &[64, 1, 16, 0],
        )
        .unwrap();
        // Pre-planned nests keep seq loops between shared and prim.
        assert_eq!(op.shared_count, 0);
        assert_eq!(op.prim_start, 1);
    }
}
