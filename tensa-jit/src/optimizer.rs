//! Loop-nest optimizer: fuse small dimensions, split oversized ones,
//! identify the primitive (microkernel) dimensions, and create shared
//! loops for parallel execution.

use itertools::Itertools;
use tracing::{debug, trace};

use crate::ir::Dimension;
use crate::{DimKind, ExecKind, JitError};

/// Rewrite `dims` in place so that its primitive dimensions match the
/// microkernel contract and its shared loops cover up to
/// `thread_target` iterations.
pub fn optimize(
    dims: &mut Vec<Dimension>,
    thread_target: i64,
    max_kernel_size: i64,
    min_kernel_size: i64,
) -> Result<(), JitError> {
    fuse_dimensions(dims, min_kernel_size);
    split_dimensions(dims, max_kernel_size, min_kernel_size);
    identify_primitives(dims)?;

    let prim_count = dims.iter().filter(|d| d.exec == ExecKind::Prim).count();
    if !(2..=4).contains(&prim_count) {
        return Err(JitError::CannotIdentifyPrimitives(prim_count));
    }

    create_shared_loops(dims, thread_target);
    debug!(
        loops = dims.len(),
        prims = prim_count,
        "loop nest optimized"
    );
    Ok(())
}

/// Fuse pairs of dimensions X (inner) and Y (outer) with the same kind,
/// compatible execution types, and `stride(Y) = |X| * stride(X)` in all
/// three tensors, while X is smaller than `min_kernel_size`. The fused
/// dimension keeps X's strides and execution type.
fn fuse_dimensions(dims: &mut Vec<Dimension>, min_kernel_size: i64) {
    let mut i = 0;
    while i < dims.len() {
        if dims[i].size < min_kernel_size {
            let mut j = 0;
            while j < dims.len() {
                if i != j && can_fuse(&dims[i], &dims[j]) {
                    trace!(inner = i, outer = j, "fusing dimensions");
                    dims[i].size *= dims[j].size;
                    dims.remove(j);
                    if j < i {
                        i -= 1;
                    }
                    continue;
                }
                j += 1;
            }
        }
        i += 1;
    }
}

fn can_fuse(inner: &Dimension, outer: &Dimension) -> bool {
    inner.kind == outer.kind
        && (inner.exec == outer.exec
            || inner.exec == ExecKind::Undefined
            || outer.exec == ExecKind::Undefined)
        && outer.stride_in0 == inner.size * inner.stride_in0
        && outer.stride_in1 == inner.size * inner.stride_in1
        && outer.stride_out == inner.size * inner.stride_out
}

/// Split every dimension larger than `max_kernel_size` into an inner
/// part that stays in place and a new sequential outer part appended to
/// the list (so it is itself considered for further splits).
fn split_dimensions(dims: &mut Vec<Dimension>, max_kernel_size: i64, min_kernel_size: i64) {
    let mut i = 0;
    while i < dims.len() {
        if dims[i].size > max_kernel_size {
            let (outer, inner) = find_best_split(
                dims[i].size,
                max_kernel_size,
                min_kernel_size,
                dims[i].kind,
            );
            if outer > 1 {
                trace!(index = i, outer, inner, "splitting dimension");
                let outer_dim = Dimension::new(
                    dims[i].kind,
                    ExecKind::Seq,
                    outer,
                    dims[i].stride_in0 * inner,
                    dims[i].stride_in1 * inner,
                    dims[i].stride_out * inner,
                );
                dims[i].size = inner;
                dims.push(outer_dim);
            }
        }
        i += 1;
    }
}

/// Choose `(outer, inner)` with `outer * inner == size` and `inner` a
/// preferred multiple for the dimension kind. Returns `(1, size)` when
/// no legal split exists; the caller leaves the dimension unchanged.
pub(crate) fn find_best_split(
    size: i64,
    max_kernel_size: i64,
    min_kernel_size: i64,
    kind: DimKind,
) -> (i64, i64) {
    let divisors: &[i64] = match kind {
        DimKind::M => &[16, 8, 4, 2],
        DimKind::N => &[4, 2],
        DimKind::K => &[2],
        DimKind::C => &[8, 4, 2],
        DimKind::Undefined => &[],
    };

    for &divisor in divisors {
        if let Some(split) =
            largest_multiple_of_divisor(divisor, size, max_kernel_size, min_kernel_size)
        {
            return split;
        }
    }
    (1, size)
}

/// Largest multiple of `divisor` not exceeding `max_size` that divides
/// `size` with both parts at least `min_size`.
fn largest_multiple_of_divisor(
    divisor: i64,
    size: i64,
    max_size: i64,
    min_size: i64,
) -> Option<(i64, i64)> {
    if divisor <= 0 || size <= 0 || max_size <= 0 || min_size <= 0 {
        return None;
    }
    if divisor > max_size || size < min_size {
        return None;
    }

    let max_divisible = (max_size / divisor) * divisor;
    let mut inner = max_divisible;
    while inner >= divisor {
        if size % inner == 0 {
            let outer = size / inner;
            if outer >= min_size && inner >= min_size {
                return Some((outer, inner));
            }
        }
        inner -= divisor;
    }
    None
}

/// Classify the primitive dimensions and rotate them to the tail of the
/// list in kernel order.
fn identify_primitives(dims: &mut Vec<Dimension>) -> Result<(), JitError> {
    let has_c = dims.iter().any(|d| d.kind == DimKind::C);
    let has_k = dims.iter().any(|d| d.kind == DimKind::K);

    if has_c {
        identify_unary(dims)
    } else if !has_k {
        identify_binary(dims)
    } else {
        identify_ternary(dims)
    }?;

    for dim in dims.iter_mut() {
        if dim.exec == ExecKind::Undefined {
            dim.exec = ExecKind::Seq;
        }
    }
    Ok(())
}

fn identify_unary(dims: &mut Vec<Dimension>) -> Result<(), JitError> {
    if dims.iter().any(|d| d.kind != DimKind::C) {
        return Err(JitError::MixedUnaryDimensions);
    }
    match dims.iter().filter(|d| d.exec == ExecKind::Prim).count() {
        2 => return Ok(()),
        0 => {}
        n => return Err(JitError::PrimCountConflict(n)),
    }

    // Prim M: the unique unit-stride input row. A non-unit output stride
    // means the kernel transposes.
    let m = dims
        .iter()
        .position(|d| d.stride_in0 == 1 && d.stride_in1 == 0)
        .ok_or(JitError::NoPrimDimension("M"))?;
    let transpose = dims[m].stride_out != 1;
    dims[m].exec = ExecKind::Prim;
    rotate_to_back(dims, m);

    let n = if transpose {
        dims.iter()
            .position(|d| d.stride_out == 1 && d.stride_in1 == 0)
    } else {
        dims.iter()
            .enumerate()
            .filter(|(_, d)| {
                d.stride_in1 == 0
                    && matches!(d.exec, ExecKind::Undefined | ExecKind::Seq)
            })
            .min_by_key(|(_, d)| d.stride_in0)
            .map(|(i, _)| i)
    }
    .ok_or(JitError::NoPrimDimension("N"))?;
    dims[n].exec = ExecKind::Prim;
    rotate_to_back(dims, n);
    Ok(())
}

fn identify_binary(dims: &mut Vec<Dimension>) -> Result<(), JitError> {
    match dims.iter().filter(|d| d.exec == ExecKind::Prim).count() {
        2 => return Ok(()),
        0 => {}
        n => return Err(JitError::PrimCountConflict(n)),
    }

    let m = dims
        .iter()
        .position(|d| {
            d.kind == DimKind::M && d.stride_in0 == 1 && d.stride_in1 == 1 && d.stride_out == 1
        })
        .ok_or(JitError::NoPrimDimension("M"))?;
    dims[m].exec = ExecKind::Prim;
    rotate_to_back(dims, m);

    let n = dims
        .iter()
        .enumerate()
        .filter(|(_, d)| d.kind == DimKind::N && d.stride_in0 == d.stride_in1)
        .min_by_key(|(_, d)| d.stride_in0)
        .map(|(i, _)| i)
        .ok_or(JitError::NoPrimDimension("N"))?;
    dims[n].exec = ExecKind::Prim;
    rotate_to_back(dims, n);
    Ok(())
}

fn identify_ternary(dims: &mut Vec<Dimension>) -> Result<(), JitError> {
    // Optional batch-reduce K: strided in the second input, absent in the
    // output.
    if let Some(br) = dims
        .iter()
        .position(|d| d.kind == DimKind::K && d.stride_in1 != 1 && d.stride_out == 0)
    {
        dims[br].exec = ExecKind::Prim;
        rotate_to_back(dims, br);
    }

    let m = dims
        .iter()
        .position(|d| {
            d.kind == DimKind::M && d.stride_in0 == 1 && d.stride_in1 == 0 && d.stride_out == 1
        })
        .ok_or(JitError::NoPrimDimension("M"))?;
    dims[m].exec = ExecKind::Prim;
    rotate_to_back(dims, m);

    let n = dims
        .iter()
        .enumerate()
        .filter(|(_, d)| d.kind == DimKind::N && d.stride_in0 == 0)
        .min_by_key(|(_, d)| d.stride_in1 + d.stride_out)
        .map(|(i, _)| i)
        .ok_or(JitError::NoPrimDimension("N"))?;
    dims[n].exec = ExecKind::Prim;
    rotate_to_back(dims, n);

    let k = dims
        .iter()
        .position(|d| d.kind == DimKind::K && d.stride_in1 == 1 && d.stride_out == 0)
        .ok_or(JitError::NoPrimDimension("K"))?;
    dims[k].exec = ExecKind::Prim;
    rotate_to_back(dims, k);
    Ok(())
}

fn rotate_to_back(dims: &mut Vec<Dimension>, index: usize) {
    let dim = dims.remove(index);
    dims.push(dim);
}

/// Convert leading sequential loops into shared ones until their
/// combined iteration count reaches `thread_target`, then move all
/// shared loops to the front (stable). K is never parallelized.
fn create_shared_loops(dims: &mut [Dimension], thread_target: i64) {
    let mut num_threads: i64 = dims
        .iter()
        .filter(|d| d.exec == ExecKind::Shared)
        .map(|d| d.size)
        .product();

    if num_threads < thread_target {
        for dim in dims.iter_mut() {
            if matches!(dim.exec, ExecKind::Seq | ExecKind::Undefined)
                && dim.kind != DimKind::K
                && num_threads * dim.size <= thread_target
            {
                dim.exec = ExecKind::Shared;
                num_threads *= dim.size;
            }
        }
    }

    // Stable partition: shared loops first, everything else keeps order.
    let (shared, rest): (Vec<_>, Vec<_>) = dims
        .iter()
        .copied()
        .partition(|d| d.exec == ExecKind::Shared);
    for (slot, dim) in dims
        .iter_mut()
        .zip(shared.iter().chain(rest.iter()).copied().collect_vec())
    {
        *slot = dim;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::config_to_dimensions;

    fn prim_summary(dims: &[Dimension]) -> (usize, i64, i64, i64) {
        let mut count = 0;
        let (mut m, mut n, mut k) = (0, 0, 0);
        for dim in dims {
            if dim.exec == ExecKind::Prim {
                count += 1;
                match dim.kind {
                    DimKind::M => m += 1,
                    DimKind::N => n += 1,
                    DimKind::K => k += 1,
                    _ => {}
                }
            }
        }
        (count, m, n, k)
    }

    fn shared_product(dims: &[Dimension]) -> i64 {
        dims.iter()
            .filter(|d| d.exec == ExecKind::Shared)
            .map(|d| d.size)
            .product()
    }

    #[test]
    fn brgemm_nest_yields_four_prims() {
        let mut dims = config_to_dimensions(
            &[
                DimKind::M,
                DimKind::M,
                DimKind::N,
                DimKind::N,
                DimKind::K,
                DimKind::K,
            ],
            &[ExecKind::Seq; 6],
            &[64, 25, 64, 25, 64, 25],
            &[25, 1, 0, 0, 40000, 1600],
            &[0, 0, 40000, 1600, 25, 1],
            &[25, 1, 40000, 1600, 0, 0],
        )
        .unwrap();

        optimize(&mut dims, 64, 1024, 1).unwrap();

        let (count, m, n, k) = prim_summary(&dims);
        assert_eq!(count, 4);
        assert_eq!((m, n, k), (1, 1, 2));
        assert!(shared_product(&dims) <= 64);
        for dim in &dims {
            assert!(dim.size <= 1024);
        }
        // Shared loops sit at the front, prims at the tail.
        let first_non_shared = dims
            .iter()
            .position(|d| d.exec != ExecKind::Shared)
            .unwrap_or(dims.len());
        assert!(dims[first_non_shared..]
            .iter()
            .all(|d| d.exec != ExecKind::Shared));
        assert!(dims[dims.len() - 4..]
            .iter()
            .all(|d| d.exec == ExecKind::Prim));
    }

    #[test]
    fn large_gemm_nest_is_split_and_parallelized() {
        let mut dims = config_to_dimensions(
            &[DimKind::M, DimKind::N, DimKind::K],
            &[ExecKind::Seq; 3],
            &[1600, 1600, 512],
            &[1, 0, 1600],
            &[0, 512, 1],
            &[1, 1600, 0],
        )
        .unwrap();

        optimize(&mut dims, 16, 512, 1).unwrap();

        let (count, m, n, k) = prim_summary(&dims);
        assert_eq!(count, 3);
        assert_eq!((m, n, k), (1, 1, 1));
        assert!(shared_product(&dims) <= 16);
        for dim in &dims {
            assert!(dim.size <= 512, "dimension of size {} not split", dim.size);
        }
    }

    #[test]
    fn fused_dimension_keeps_inner_stride() {
        // Inner M of size 2 (stride 1) fuses with outer M of size 8
        // (stride 2) into one M of size 16 with stride 1.
        let mut dims = config_to_dimensions(
            &[DimKind::M, DimKind::M, DimKind::N, DimKind::K],
            &[ExecKind::Undefined; 4],
            &[2, 8, 4, 4],
            &[1, 2, 0, 16],
            &[0, 0, 4, 1],
            &[1, 2, 16, 0],
        )
        .unwrap();

        optimize(&mut dims, 1, 64, 4).unwrap();

        let m_dims: Vec<_> = dims.iter().filter(|d| d.kind == DimKind::M).collect();
        assert_eq!(m_dims.len(), 1);
        assert_eq!(m_dims[0].size, 16);
        assert_eq!(m_dims[0].stride_in0, 1);
        assert_eq!(m_dims[0].stride_out, 1);
    }

    #[test]
    fn unsplittable_dimension_is_left_unchanged() {
        // 1031 is prime: no divisor-based split exists.
        assert_eq!(find_best_split(1031, 1024, 1, DimKind::M), (1, 1031));
        // 2048 splits into 2 x 1024 for M.
        assert_eq!(find_best_split(2048, 1024, 1, DimKind::M), (2, 1024));
        // N prefers multiples of 4.
        let (outer, inner) = find_best_split(96, 48, 1, DimKind::N);
        assert_eq!(outer * inner, 96);
        assert_eq!(inner % 4, 0);
    }

    #[test]
    fn unary_nest_identifies_copy_prims() {
        let mut dims = config_to_dimensions(
            &[DimKind::C, DimKind::C, DimKind::C],
            &[ExecKind::Undefined; 3],
            &[8, 16, 3],
            &[1, 8, 128],
            &[0, 0, 0],
            &[1, 8, 128],
        )
        .unwrap();

        optimize(&mut dims, 1, 64, 1).unwrap();

        let (count, ..) = prim_summary(&dims);
        assert_eq!(count, 2);
        // M prim (unit stride) sits second-to-last, N prim last.
        assert_eq!(dims[dims.len() - 2].stride_in0, 1);
        assert_eq!(dims[dims.len() - 1].stride_in0, 8);
    }

    #[test]
    fn mixed_unary_kinds_are_rejected() {
        let mut dims = config_to_dimensions(
            &[DimKind::C, DimKind::M],
            &[ExecKind::Undefined; 2],
            &[8, 8],
            &[1, 8],
            &[0, 0],
            &[1, 8],
        )
        .unwrap();
        assert!(matches!(
            optimize(&mut dims, 1, 64, 1),
            Err(JitError::MixedUnaryDimensions)
        ));
    }

    #[test]
    fn k_is_never_shared() {
        // One outer M and one outer K stay sequential candidates; only
        // the M may be promoted to a shared loop.
        let mut dims = config_to_dimensions(
            &[
                DimKind::K,
                DimKind::M,
                DimKind::N,
                DimKind::K,
                DimKind::M,
                DimKind::K,
            ],
            &[ExecKind::Seq; 6],
            &[32, 16, 16, 16, 4, 2],
            &[512, 1, 0, 16, 256, 8192],
            &[16, 0, 512, 1, 0, 8],
            &[0, 1, 16, 0, 256, 0],
        )
        .unwrap();

        optimize(&mut dims, 32, 64, 1).unwrap();

        assert!(dims
            .iter()
            .filter(|d| d.exec == ExecKind::Shared)
            .all(|d| d.kind != DimKind::K));
        assert_eq!(shared_product(&dims), 4);
        assert!(dims
            .iter()
            .any(|d| d.kind == DimKind::K && d.exec == ExecKind::Seq));
    }
}
