//! Query-node trees.
//!
//! A filter expression is an immutable tree of [`Q`] leaves (condition maps,
//! `field__operator` key syntax) combined with `&`, `|`, and `!`. Combining
//! with an empty node is absorbing: the other node is returned unchanged.

use docmodel_core::{Document, Value};

/// Logical connective of a [`QCombination`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    And,
    Or,
}

/// Conditions carried by one leaf: either `field__op` pairs or a raw native
/// filter passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditions {
    Pairs(Vec<(String, Value)>),
    Raw(Document),
}

/// A leaf condition set.
#[derive(Debug, Clone, PartialEq)]
pub struct Q {
    pub(crate) conditions: Conditions,
}

impl Q {
    /// An empty leaf; absorbed by any combination.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            conditions: Conditions::Pairs(Vec::new()),
        }
    }

    /// Single condition, `key` in `field` or `field__operator` form.
    #[must_use]
    pub fn with(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            conditions: Conditions::Pairs(vec![(key.into(), value.into())]),
        }
    }

    /// Several conditions, merged as one conjunction leaf.
    #[must_use]
    pub fn pairs<K: Into<String>, V: Into<Value>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            conditions: Conditions::Pairs(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// A raw native filter, bypassing compilation.
    #[must_use]
    pub fn raw(filter: Document) -> Self {
        Self {
            conditions: Conditions::Raw(filter),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.conditions {
            Conditions::Pairs(pairs) => pairs.is_empty(),
            Conditions::Raw(doc) => doc.is_empty(),
        }
    }
}

/// Combination of several nodes under one logical operator.
#[derive(Debug, Clone, PartialEq)]
pub struct QCombination {
    pub operation: CombineOp,
    pub children: Vec<QNode>,
}

impl QCombination {
    /// Build a combination, splicing in the children of same-operation child
    /// combinations rather than nesting them.
    #[must_use]
    pub fn new(operation: CombineOp, nodes: impl IntoIterator<Item = QNode>) -> Self {
        let mut children = Vec::new();
        for node in nodes {
            match node {
                QNode::Combination(inner) if inner.operation == operation => {
                    children.extend(inner.children);
                }
                other => children.push(other),
            }
        }
        Self {
            operation,
            children,
        }
    }
}

/// A node in a query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QNode {
    Leaf(Q),
    Combination(QCombination),
    Not(Box<QNode>),
}

impl QNode {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            QNode::Leaf(q) => q.is_empty(),
            QNode::Combination(c) => c.children.is_empty(),
            QNode::Not(_) => false,
        }
    }

    fn combine(self, other: QNode, operation: CombineOp) -> QNode {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        QNode::Combination(QCombination::new(operation, [self, other]))
    }
}

impl From<Q> for QNode {
    fn from(q: Q) -> Self {
        QNode::Leaf(q)
    }
}

impl<R: Into<QNode>> std::ops::BitAnd<R> for QNode {
    type Output = QNode;

    fn bitand(self, rhs: R) -> QNode {
        self.combine(rhs.into(), CombineOp::And)
    }
}

impl<R: Into<QNode>> std::ops::BitOr<R> for QNode {
    type Output = QNode;

    fn bitor(self, rhs: R) -> QNode {
        self.combine(rhs.into(), CombineOp::Or)
    }
}

impl std::ops::Not for QNode {
    type Output = QNode;

    fn not(self) -> QNode {
        QNode::Not(Box::new(self))
    }
}

impl<R: Into<QNode>> std::ops::BitAnd<R> for Q {
    type Output = QNode;

    fn bitand(self, rhs: R) -> QNode {
        QNode::from(self).combine(rhs.into(), CombineOp::And)
    }
}

impl<R: Into<QNode>> std::ops::BitOr<R> for Q {
    type Output = QNode;

    fn bitor(self, rhs: R) -> QNode {
        QNode::from(self).combine(rhs.into(), CombineOp::Or)
    }
}

impl std::ops::Not for Q {
    type Output = QNode;

    fn not(self) -> QNode {
        QNode::Not(Box::new(QNode::from(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_absorbed_by_and() {
        let node = Q::with("age", 20) & Q::empty();
        assert_eq!(node, QNode::Leaf(Q::with("age", 20)));

        let node = Q::empty() | Q::with("age", 20);
        assert_eq!(node, QNode::Leaf(Q::with("age", 20)));
    }

    #[test]
    fn test_combination_keeps_operation() {
        let node = Q::with("age", 20) | Q::with("username", "Ivan");
        let QNode::Combination(comb) = node else {
            panic!("expected a combination");
        };
        assert_eq!(comb.operation, CombineOp::Or);
        assert_eq!(comb.children.len(), 2);
    }

    #[test]
    fn test_same_op_children_are_flattened() {
        let node = (Q::with("a", 1) & Q::with("b", 2)) & Q::with("c", 3);
        let QNode::Combination(comb) = node else {
            panic!("expected a combination");
        };
        assert_eq!(comb.operation, CombineOp::And);
        assert_eq!(comb.children.len(), 3);
    }

    #[test]
    fn test_mixed_ops_nest() {
        let node = (Q::with("a", 1) | Q::with("b", 2)) & Q::with("c", 3);
        let QNode::Combination(comb) = node else {
            panic!("expected a combination");
        };
        assert_eq!(comb.operation, CombineOp::And);
        assert_eq!(comb.children.len(), 2);
        assert!(matches!(comb.children[0], QNode::Combination(_)));
    }

    #[test]
    fn test_not_wraps() {
        let node = !Q::with("age", 20);
        assert!(matches!(node, QNode::Not(_)));
    }
}
