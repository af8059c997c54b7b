//! Decomposition of join conditions into equi-join keys and a residual.

use alloc::vec::Vec;
use zsql_core::DataType;
use zsql_ir::{Type, TypeRef};
use zsql_plan::{RexNode, RexOp, SqlType};

/// One `left.column = right.column` conjunct.
#[derive(Clone, Debug, PartialEq)]
pub struct EquiPair {
    /// Field of the left input.
    pub left_column: usize,
    /// Field of the right input, relative to the right input.
    pub right_column: usize,
    /// The type both sides are compared in; nullable if either side is.
    pub common_type: TypeRef,
}

/// A join condition split into key comparisons and whatever is left.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JoinDecomposition {
    pub comparisons: Vec<EquiPair>,
    /// Remaining conjuncts over the concatenated row, or None.
    pub residual: Option<RexNode>,
}

impl JoinDecomposition {
    pub fn left_columns(&self) -> Vec<usize> {
        self.comparisons.iter().map(|c| c.left_column).collect()
    }

    pub fn right_columns(&self) -> Vec<usize> {
        self.comparisons.iter().map(|c| c.right_column).collect()
    }
}

/// Splits a join predicate over `left ++ right` rows.
pub struct JoinConditionAnalyzer {
    left_arity: usize,
}

impl JoinConditionAnalyzer {
    pub fn new(left_arity: usize) -> Self {
        Self { left_arity }
    }

    pub fn analyze(&self, condition: &RexNode) -> JoinDecomposition {
        let mut conjuncts = Vec::new();
        flatten_and(condition, &mut conjuncts);
        let mut result = JoinDecomposition::default();
        for conjunct in conjuncts {
            if conjunct.is_true_literal() {
                continue;
            }
            match self.equi_pair(conjunct) {
                Some(pair) => result.comparisons.push(pair),
                None => {
                    result.residual = Some(match result.residual.take() {
                        Some(residual) => RexNode::and(residual, conjunct.clone()),
                        None => conjunct.clone(),
                    })
                }
            }
        }
        result
    }

    fn equi_pair(&self, conjunct: &RexNode) -> Option<EquiPair> {
        let (op, operands) = conjunct.as_call()?;
        if op != RexOp::Eq {
            return None;
        }
        let [l, r] = operands else {
            return None;
        };
        let (li, lt) = column(l)?;
        let (ri, rt) = column(r)?;
        let ((left, left_type), (right, right_type)) = if li < self.left_arity && ri >= self.left_arity {
            ((li, lt), (ri, rt))
        } else if ri < self.left_arity && li >= self.left_arity {
            ((ri, rt), (li, lt))
        } else {
            return None;
        };
        let common = DataType::common_type(left_type.data_type()?, right_type.data_type()?)?;
        Some(EquiPair {
            left_column: left,
            right_column: right - self.left_arity,
            common_type: Type::primitive(common, left_type.nullable || right_type.nullable),
        })
    }
}

fn flatten_and<'a>(rex: &'a RexNode, out: &mut Vec<&'a RexNode>) {
    match rex.as_call() {
        Some((RexOp::And, operands)) => operands.iter().for_each(|o| flatten_and(o, out)),
        _ => out.push(rex),
    }
}

/// The field referenced by `rex`, looking through casts.
fn column(rex: &RexNode) -> Option<(usize, &SqlType)> {
    match rex {
        RexNode::InputRef { index, ty } => Some((*index, ty)),
        RexNode::Call {
            op: RexOp::Cast,
            operands,
            ..
        } if operands.len() == 1 => column(&operands[0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: usize) -> RexNode {
        RexNode::input_ref(i, SqlType::scalar(DataType::Int32))
    }

    #[test]
    fn test_equi_pairs_in_order() {
        // l has two fields, r has two: $0 = $3 AND $2 = $1
        let cond = RexNode::and(RexNode::eq(int(0), int(3)), RexNode::eq(int(2), int(1)));
        let d = JoinConditionAnalyzer::new(2).analyze(&cond);
        assert_eq!(d.left_columns(), [0, 1]);
        assert_eq!(d.right_columns(), [1, 0]);
        assert!(d.residual.is_none());
    }

    #[test]
    fn test_residual_keeps_other_conjuncts() {
        let cond = RexNode::and(
            RexNode::and(RexNode::eq(int(0), int(2)), RexNode::lt(int(1), int(3))),
            RexNode::eq(int(0), int(1)),
        );
        let d = JoinConditionAnalyzer::new(2).analyze(&cond);
        assert_eq!(d.comparisons.len(), 1);
        let residual = d.residual.expect("residual");
        assert_eq!(residual.as_call().map(|(op, args)| (op, args.len())), Some((RexOp::And, 2)));
    }

    #[test]
    fn test_common_type_and_casts() {
        let wide = RexNode::input_ref(2, SqlType::scalar(DataType::Int64).nullable());
        let cast = RexNode::cast(int(0), SqlType::scalar(DataType::Int64));
        let d = JoinConditionAnalyzer::new(2).analyze(&RexNode::eq(cast, wide));
        assert_eq!(d.comparisons[0].common_type, Type::primitive(DataType::Int64, true));
    }

    #[test]
    fn test_true_condition_has_no_keys() {
        let d = JoinConditionAnalyzer::new(1).analyze(&RexNode::boolean(true));
        assert!(d.comparisons.is_empty());
        assert!(d.residual.is_none());
        let incompatible = RexNode::eq(
            int(0),
            RexNode::input_ref(1, SqlType::scalar(DataType::String)),
        );
        assert!(JoinConditionAnalyzer::new(1).analyze(&incompatible).residual.is_some());
    }
}
