//! Parser for einsum node descriptions.
//!
//! One node per line: `[i0,i1,...],[j0,j1,...]->[k0,k1,...]` for a
//! binary contraction or `[i0,...]->[k0,...]` for a unary permutation.
//! Whitespace is insignificant; dimension ids are non-negative integers
//! indexing the caller's size array.

use crate::JitError;

/// One parsed node description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeDesc {
    pub left: Vec<i64>,
    pub right: Option<Vec<i64>>,
    pub out: Vec<i64>,
}

/// Canonical key of an id list, used to connect nodes and to look up
/// leaf tensors.
pub(crate) fn ids_key(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse every non-empty line of `expr` into a node description.
pub(crate) fn parse_descriptions(expr: &str) -> Result<Vec<NodeDesc>, JitError> {
    let mut descs = Vec::new();
    for line in expr.split(['\n', ';']) {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            continue;
        }
        descs.push(parse_line(&compact)?);
    }
    if descs.is_empty() {
        return Err(JitError::Parse("empty expression".into()));
    }
    Ok(descs)
}

fn parse_line(line: &str) -> Result<NodeDesc, JitError> {
    let (lhs, rhs) = line
        .split_once("->")
        .ok_or_else(|| JitError::Parse(format!("missing '->' in '{line}'")))?;

    let out = parse_id_list(rhs)?;
    let mut inputs = lhs;
    let left = take_id_list(&mut inputs)?;
    let right = if inputs.is_empty() {
        None
    } else {
        let rest = inputs
            .strip_prefix(',')
            .ok_or_else(|| JitError::Parse(format!("expected ',' between inputs in '{line}'")))?;
        let mut rest = rest;
        let ids = take_id_list(&mut rest)?;
        if !rest.is_empty() {
            return Err(JitError::Parse(format!(
                "trailing input '{rest}' in '{line}'"
            )));
        }
        Some(ids)
    };

    Ok(NodeDesc { left, right, out })
}

/// Consume one leading `[...]` group from `input`.
fn take_id_list(input: &mut &str) -> Result<Vec<i64>, JitError> {
    let rest = input
        .strip_prefix('[')
        .ok_or_else(|| JitError::Parse(format!("expected '[' at '{input}'")))?;
    let end = rest
        .find(']')
        .ok_or_else(|| JitError::Parse(format!("unterminated '[' at '{input}'")))?;
    let ids = parse_ids(&rest[..end])?;
    *input = &rest[end + 1..];
    Ok(ids)
}

/// Parse a complete `[...]` group.
fn parse_id_list(text: &str) -> Result<Vec<i64>, JitError> {
    let mut cursor = text;
    let ids = take_id_list(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(JitError::Parse(format!("trailing text '{cursor}'")));
    }
    Ok(ids)
}

fn parse_ids(body: &str) -> Result<Vec<i64>, JitError> {
    if body.is_empty() {
        return Err(JitError::Parse("empty dimension list".into()));
    }
    body.split(',')
        .map(|part| {
            part.parse::<i64>()
                .ok()
                .filter(|id| *id >= 0)
                .ok_or_else(|| JitError::Parse(format!("invalid dimension id '{part}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_binary_contraction() {
        let descs = parse_descriptions("[2,0],[1,2]->[1,0]").unwrap();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].left, vec![2, 0]);
        assert_eq!(descs[0].right, Some(vec![1, 2]));
        assert_eq!(descs[0].out, vec![1, 0]);
    }

    #[test]
    fn parses_a_unary_permutation() {
        let descs = parse_descriptions("[0,1]->[1,0]").unwrap();
        assert_eq!(descs[0].right, None);
        assert_eq!(descs[0].out, vec![1, 0]);
    }

    #[test]
    fn whitespace_is_insignificant() {
        let descs = parse_descriptions(" [ 0 , 1 ] , [ 1 , 2 ] -> [ 0 , 2 ] ").unwrap();
        assert_eq!(descs[0].left, vec![0, 1]);
    }

    #[test]
    fn parses_multiple_lines() {
        let descs = parse_descriptions("[0,1],[1,2]->[0,2]\n[0,2],[2,3]->[0,3]").unwrap();
        assert_eq!(descs.len(), 2);
        assert_eq!(ids_key(&descs[1].out), "0,3");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_descriptions("[0,1][1,2]->[0,2]").is_err());
        assert!(parse_descriptions("[0,1],[1,2]").is_err());
        assert!(parse_descriptions("[0,a]->[0]").is_err());
        assert!(parse_descriptions("[-1]->[0]").is_err());
        assert!(parse_descriptions("[]->[0]").is_err());
        assert!(parse_descriptions("").is_err());
    }
}
