//! Loop-nest intermediate representation.

use crate::{DimKind, ExecKind, JitError};

/// One loop of a tensor operation's nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    /// Role of the dimension.
    pub kind: DimKind,
    /// How the loop is executed.
    pub exec: ExecKind,
    /// Trip count.
    pub size: i64,
    /// Stride in the first input tensor, in elements.
    pub stride_in0: i64,
    /// Stride in the second input tensor, in elements.
    pub stride_in1: i64,
    /// Stride in the output tensor, in elements.
    pub stride_out: i64,
}

impl Dimension {
    /// Build a dimension record.
    pub fn new(
        kind: DimKind,
        exec: ExecKind,
        size: i64,
        stride_in0: i64,
        stride_in1: i64,
        stride_out: i64,
    ) -> Self {
        Self {
            kind,
            exec,
            size,
            stride_in0,
            stride_in1,
            stride_out,
        }
    }
}

/// Convert the six parallel configuration arrays into dimension records.
/// All slices must have the same length.
pub fn config_to_dimensions(
    dim_kinds: &[DimKind],
    exec_kinds: &[ExecKind],
    sizes: &[i64],
    strides_in0: &[i64],
    strides_in1: &[i64],
    strides_out: &[i64],
) -> Result<Vec<Dimension>, JitError> {
    let n = dim_kinds.len();
    if [
        exec_kinds.len(),
        sizes.len(),
        strides_in0.len(),
        strides_in1.len(),
        strides_out.len(),
    ]
    .iter()
    .any(|&len| len != n)
    {
        return Err(JitError::ConfigLengthMismatch);
    }

    Ok((0..n)
        .map(|i| {
            Dimension::new(
                dim_kinds[i],
                exec_kinds[i],
                sizes[i],
                strides_in0[i],
                strides_in1[i],
                strides_out[i],
            )
        })
        .collect())
}

/// Columnar view of a dimension list, the inverse of
/// [`config_to_dimensions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopConfig {
    /// Dimension roles.
    pub dim_kinds: Vec<DimKind>,
    /// Execution assignments.
    pub exec_kinds: Vec<ExecKind>,
    /// Trip counts.
    pub sizes: Vec<i64>,
    /// First-input strides.
    pub strides_in0: Vec<i64>,
    /// Second-input strides.
    pub strides_in1: Vec<i64>,
    /// Output strides.
    pub strides_out: Vec<i64>,
}

/// Flatten dimension records back into parallel arrays.
pub fn dimensions_to_config(dims: &[Dimension]) -> LoopConfig {
    let mut config = LoopConfig::default();
    for dim in dims {
        config.dim_kinds.push(dim.kind);
        config.exec_kinds.push(dim.exec);
        config.sizes.push(dim.size);
        config.strides_in0.push(dim.stride_in0);
        config.strides_in1.push(dim.stride_in1);
        config.strides_out.push(dim.stride_out);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips() {
        let dims = config_to_dimensions(
            &[DimKind::M, DimKind::K],
            &[ExecKind::Seq, ExecKind::Prim],
            &[4, 8],
            &[1, 4],
            &[0, 1],
            &[1, 0],
        )
        .unwrap();
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[1].stride_in0, 4);

        let config = dimensions_to_config(&dims);
        assert_eq!(config.sizes, vec![4, 8]);
        assert_eq!(config.exec_kinds[1], ExecKind::Prim);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let res = config_to_dimensions(
            &[DimKind::M],
            &[ExecKind::Seq],
            &[4, 8],
            &[1],
            &[0],
            &[1],
        );
        assert!(matches!(res, Err(JitError::ConfigLengthMismatch)));
    }
}
