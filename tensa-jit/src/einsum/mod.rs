//! Einsum tree planner: parse an expression, order contractions,
//! materialize intermediate tensors, and drive one tensor operation per
//! node.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::ir::Dimension;
use crate::optimizer;
use crate::tensor_op::TensorOperation;
use crate::{DType, DimKind, ExecKind, JitError, PrimKind};

mod parse;

use parse::{ids_key, parse_descriptions, NodeDesc};

/// One node of the contraction tree.
///
/// Internal nodes own their children, their compiled operation, and the
/// output buffer materialized at execution time; leaves borrow user
/// tensors at `execute`.
pub struct EinsumNode {
    /// Ordered dimension ids of this node's output tensor.
    pub output_ids: Vec<i64>,
    key: String,
    left: Option<Box<EinsumNode>>,
    right: Option<Box<EinsumNode>>,
    is_leaf: bool,
    dims: Option<Vec<Dimension>>,
    first_touch: PrimKind,
    main: PrimKind,
    operation: Option<TensorOperation>,
    tensor: Vec<f32>,
    /// Floating-point operations one evaluation of this node performs.
    pub computational_operations: f64,
}

impl EinsumNode {
    fn leaf(ids: Vec<i64>) -> Self {
        Self {
            key: ids_key(&ids),
            output_ids: ids,
            left: None,
            right: None,
            is_leaf: true,
            dims: None,
            first_touch: PrimKind::None,
            main: PrimKind::None,
            operation: None,
            tensor: Vec::new(),
            computational_operations: 0.0,
        }
    }

    /// The id-list key identifying this subtree's output.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The materialized output tensor, empty before the first execute.
    pub fn tensor(&self) -> &[f32] {
        &self.tensor
    }

    fn render(&self, out: &mut String) {
        if self.is_leaf {
            out.push('[');
            out.push_str(&self.key);
            out.push(']');
            return;
        }
        if let Some(left) = &self.left {
            left.render(out);
        }
        if let Some(right) = &self.right {
            out.push(',');
            right.render(out);
        }
        out.push_str("->[");
        out.push_str(&self.key);
        out.push(']');
    }
}

/// A parsed einsum expression with per-dimension sizes.
pub struct EinsumTree {
    root: EinsumNode,
    dim_sizes: Vec<i64>,
}

impl EinsumTree {
    /// Parse `expr` (one node description per line) into a tree whose
    /// leaves are the user input tensors. `dim_sizes` is indexed by
    /// dimension id.
    pub fn parse(expr: &str, dim_sizes: Vec<i64>) -> Result<Self, JitError> {
        let descs = parse_descriptions(expr)?;

        for desc in &descs {
            for id in desc
                .left
                .iter()
                .chain(desc.right.iter().flatten())
                .chain(desc.out.iter())
            {
                if *id as usize >= dim_sizes.len() {
                    return Err(JitError::Parse(format!(
                        "dimension id {id} has no size (got {} sizes)",
                        dim_sizes.len()
                    )));
                }
            }
        }

        let by_output: HashMap<String, usize> = descs
            .iter()
            .enumerate()
            .map(|(i, d)| (ids_key(&d.out), i))
            .collect();
        if by_output.len() != descs.len() {
            return Err(JitError::Parse("duplicate node output".into()));
        }

        // The root is the only node whose output feeds no other node.
        let consumed: Vec<String> = descs
            .iter()
            .flat_map(|d| {
                d.right
                    .iter()
                    .map(|ids| ids_key(ids))
                    .chain(std::iter::once(ids_key(&d.left)))
            })
            .collect();
        let roots: Vec<usize> = descs
            .iter()
            .enumerate()
            .filter(|(_, d)| !consumed.contains(&ids_key(&d.out)))
            .map(|(i, _)| i)
            .collect();
        let root_index = match roots.as_slice() {
            [root] => *root,
            [] => return Err(JitError::Parse("expression has no root node".into())),
            _ => return Err(JitError::Parse("expression has multiple roots".into())),
        };

        let mut visited = vec![false; descs.len()];
        let root = build_node(root_index, &descs, &by_output, &mut visited)?;
        Ok(Self { root, dim_sizes })
    }

    /// Rewrite every node's loop nest through the optimizer.
    pub fn optimize(
        &mut self,
        thread_target: i64,
        max_kernel_size: i64,
        min_kernel_size: i64,
    ) -> Result<(), JitError> {
        optimize_node(
            &mut self.root,
            &self.dim_sizes,
            thread_target,
            max_kernel_size,
            min_kernel_size,
        )
    }

    /// Compile a tensor operation for every node.
    pub fn lower(&mut self) -> Result<(), JitError> {
        lower_node(&mut self.root, &self.dim_sizes)
    }

    /// Evaluate the tree bottom-up. `inputs` maps leaf id-list keys
    /// (e.g. `"2,0"`) to tensors; the returned slice is the root's
    /// output buffer and stays valid until the next call.
    pub fn execute(&mut self, inputs: &HashMap<String, &[f32]>) -> Result<&[f32], JitError> {
        execute_node(&mut self.root, &self.dim_sizes, inputs)?;
        Ok(&self.root.tensor)
    }

    /// The root node.
    pub fn root(&self) -> &EinsumNode {
        &self.root
    }

    /// Total floating-point work of one evaluation.
    pub fn computational_operations(&self) -> f64 {
        fn sum(node: &EinsumNode) -> f64 {
            let children: f64 = node
                .left
                .iter()
                .chain(node.right.iter())
                .map(|c| sum(c))
                .sum();
            node.computational_operations + children
        }
        sum(&self.root)
    }
}

impl fmt::Display for EinsumTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.root.render(&mut out);
        f.write_str(&out)
    }
}

fn build_node(
    index: usize,
    descs: &[NodeDesc],
    by_output: &HashMap<String, usize>,
    visited: &mut [bool],
) -> Result<EinsumNode, JitError> {
    if visited[index] {
        return Err(JitError::Parse("expression contains a cycle".into()));
    }
    visited[index] = true;

    let desc = &descs[index];
    let child = |ids: &[i64], visited: &mut [bool]| -> Result<Box<EinsumNode>, JitError> {
        match by_output.get(&ids_key(ids)) {
            Some(&i) => Ok(Box::new(build_node(i, descs, by_output, visited)?)),
            None => Ok(Box::new(EinsumNode::leaf(ids.to_vec()))),
        }
    };

    let left = Some(child(&desc.left, visited)?);
    let right = match &desc.right {
        Some(ids) => Some(child(ids, visited)?),
        None => None,
    };

    Ok(EinsumNode {
        key: ids_key(&desc.out),
        output_ids: desc.out.clone(),
        left,
        right,
        is_leaf: false,
        dims: None,
        first_touch: PrimKind::None,
        main: PrimKind::None,
        operation: None,
        tensor: Vec::new(),
        computational_operations: 0.0,
    })
}

/// Contiguous right-to-left stride of `id` within an id list, or zero
/// when the tensor does not carry the dimension.
fn stride_of(ids: &[i64], sizes: &[i64], id: i64) -> i64 {
    match ids.iter().position(|&i| i == id) {
        Some(pos) => ids[pos + 1..]
            .iter()
            .map(|&i| sizes[i as usize])
            .product(),
        None => 0,
    }
}

/// Build the loop-nest configuration of one node: dimension roles from
/// the id sets, strides from each tensor's id order.
fn node_config(
    node: &EinsumNode,
    sizes: &[i64],
) -> Result<(Vec<Dimension>, PrimKind, PrimKind), JitError> {
    let left_ids = &node
        .left
        .as_ref()
        .expect("internal nodes always have a left child")
        .output_ids;
    let right_ids = node.right.as_ref().map(|r| &r.output_ids);
    let out_ids = &node.output_ids;

    let mut dims = Vec::new();
    let mut push = |id: i64, kind: DimKind| {
        dims.push(Dimension::new(
            kind,
            ExecKind::Undefined,
            sizes[id as usize],
            stride_of(left_ids, sizes, id),
            right_ids.map_or(0, |ids| stride_of(ids, sizes, id)),
            stride_of(out_ids, sizes, id),
        ));
    };

    let Some(right_ids_inner) = right_ids else {
        // Unary permutation: every output id is a copy dimension.
        for &id in out_ids {
            push(id, DimKind::C);
        }
        return Ok((dims, PrimKind::None, PrimKind::Identity));
    };

    for &id in out_ids {
        let in_left = left_ids.contains(&id);
        let in_right = right_ids_inner.contains(&id);
        let kind = match (in_left, in_right) {
            (true, false) => DimKind::M,
            (false, true) => DimKind::N,
            (true, true) => {
                return Err(JitError::Parse(format!(
                    "dimension {id} appears in both inputs and the output"
                )))
            }
            (false, false) => {
                return Err(JitError::Parse(format!(
                    "output dimension {id} appears in no input"
                )))
            }
        };
        push(id, kind);
    }
    for &id in left_ids {
        if right_ids_inner.contains(&id) && !out_ids.contains(&id) {
            push(id, DimKind::K);
        }
    }
    for &id in left_ids.iter().chain(right_ids_inner.iter()) {
        if !out_ids.contains(&id)
            && !(left_ids.contains(&id) && right_ids_inner.contains(&id))
        {
            return Err(JitError::Parse(format!(
                "input dimension {id} is neither kept nor contracted"
            )));
        }
    }

    let has_k = dims.iter().any(|d| d.kind == DimKind::K);
    let first = if has_k { PrimKind::Zero } else { PrimKind::None };
    Ok((dims, first, PrimKind::Gemm))
}

fn node_flops(dims: &[Dimension], main: PrimKind) -> f64 {
    let volume: f64 = dims.iter().map(|d| d.size as f64).product();
    if main == PrimKind::Gemm {
        2.0 * volume
    } else {
        volume
    }
}

fn optimize_node(
    node: &mut EinsumNode,
    sizes: &[i64],
    thread_target: i64,
    max_kernel_size: i64,
    min_kernel_size: i64,
) -> Result<(), JitError> {
    if node.is_leaf {
        return Ok(());
    }
    if let Some(left) = node.left.as_deref_mut() {
        optimize_node(left, sizes, thread_target, max_kernel_size, min_kernel_size)?;
    }
    if let Some(right) = node.right.as_deref_mut() {
        optimize_node(right, sizes, thread_target, max_kernel_size, min_kernel_size)?;
    }

    let (mut dims, first, main) = node_config(node, sizes)?;
    optimizer::optimize(&mut dims, thread_target, max_kernel_size, min_kernel_size)?;
    node.computational_operations = node_flops(&dims, main);
    node.first_touch = first;
    node.main = main;
    node.dims = Some(dims);
    Ok(())
}

fn lower_node(node: &mut EinsumNode, sizes: &[i64]) -> Result<(), JitError> {
    if node.is_leaf {
        return Ok(());
    }
    if let Some(left) = node.left.as_deref_mut() {
        lower_node(left, sizes)?;
    }
    if let Some(right) = node.right.as_deref_mut() {
        lower_node(right, sizes)?;
    }

    // A tree that skipped `optimize` still lowers; the driver plans the
    // nest with its defaults.
    let (dims, first, main) = match node.dims.take() {
        Some(dims) => (dims, node.first_touch, node.main),
        None => {
            let (dims, first, main) = node_config(node, sizes)?;
            node.computational_operations = node_flops(&dims, main);
            (dims, first, main)
        }
    };
    node.first_touch = first;
    node.main = main;

    debug!(node = %node.key, ?main, "lowering einsum node");
    node.operation = Some(TensorOperation::from_dimensions(
        DType::Fp32,
        first,
        main,
        PrimKind::None,
        dims,
    )?);
    Ok(())
}

fn execute_node(
    node: &mut EinsumNode,
    sizes: &[i64],
    inputs: &HashMap<String, &[f32]>,
) -> Result<(), JitError> {
    if node.is_leaf {
        return Ok(());
    }
    if let Some(left) = node.left.as_deref_mut() {
        execute_node(left, sizes, inputs)?;
    }
    if let Some(right) = node.right.as_deref_mut() {
        execute_node(right, sizes, inputs)?;
    }

    let resolve = |child: &EinsumNode| -> Result<*const f32, JitError> {
        if child.is_leaf {
            inputs
                .get(&child.key)
                .map(|t| t.as_ptr())
                .ok_or_else(|| JitError::MissingInput(child.key.clone()))
        } else {
            Ok(child.tensor.as_ptr())
        }
    };

    let in0 = resolve(
        node.left
            .as_deref()
            .expect("internal nodes always have a left child"),
    )?;
    let in1 = match node.right.as_deref() {
        Some(right) => resolve(right)?,
        None => std::ptr::null(),
    };

    let len = node
        .output_ids
        .iter()
        .map(|&id| sizes[id as usize] as usize)
        .product();
    node.tensor.clear();
    node.tensor.resize(len, 0.0);

    let operation = node
        .operation
        .as_ref()
        .ok_or_else(|| JitError::NotLowered(node.key.clone()))?;
    // SAFETY: buffers cover the full extents derived from the same size
    // array the strides were built from.
    unsafe { operation.execute(in0, in1, node.tensor.as_mut_ptr()) };
    Ok(())
}
