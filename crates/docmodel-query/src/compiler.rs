//! Lowering query-node trees into native filter documents.
//!
//! Compilation runs in two passes over an immutable tree: a simplification
//! pass that merges all-leaf AND combinations into a single leaf, and the
//! compile pass proper. Compiling is pure: the same tree always yields the
//! same filter.

use docmodel_core::{Document, Error, ID_FIELD, ModelSchema, Result, Value};

use crate::node::{CombineOp, Conditions, Q, QCombination, QNode};
use crate::operators;

/// Separator between field name and operator suffix in condition keys.
pub const DELIMITER: &str = "__";

/// Compile a query-node tree into a native filter against `schema`.
pub fn compile(node: &QNode, schema: &ModelSchema) -> Result<Document> {
    let simplified = simplify(node.clone());
    let filter = compile_node(&simplified, schema)?;
    tracing::trace!(model = schema.name(), ?filter, "Compiled query node");
    Ok(filter)
}

/// Merge AND combinations whose children are all plain leaves into one leaf.
///
/// Two children specifying the same condition key abort the merge and the
/// combination is left as-is: over-specializing here would silently drop a
/// condition.
fn simplify(node: QNode) -> QNode {
    match node {
        QNode::Combination(comb) => {
            let children: Vec<QNode> = comb.children.into_iter().map(simplify).collect();

            if comb.operation == CombineOp::And {
                if let Some(merged) = merge_leaves(&children) {
                    return QNode::Leaf(merged);
                }
            }

            QNode::Combination(QCombination {
                operation: comb.operation,
                children,
            })
        }
        other => other,
    }
}

fn merge_leaves(children: &[QNode]) -> Option<Q> {
    let mut seen_keys: Vec<&str> = Vec::new();
    let mut merged: Vec<(String, Value)> = Vec::new();

    for child in children {
        let QNode::Leaf(q) = child else {
            return None;
        };
        let Conditions::Pairs(pairs) = &q.conditions else {
            return None;
        };
        for (key, value) in pairs {
            if seen_keys.contains(&key.as_str()) {
                // Same condition applied twice to one field: cannot be
                // simplified without losing one of them.
                return None;
            }
            seen_keys.push(key.as_str());
            merged.push((key.clone(), value.clone()));
        }
    }

    Some(Q::pairs(merged))
}

fn compile_node(node: &QNode, schema: &ModelSchema) -> Result<Document> {
    match node {
        QNode::Leaf(q) => compile_leaf(q, schema),
        QNode::Combination(comb) => {
            let mut children = Vec::with_capacity(comb.children.len());
            for child in &comb.children {
                children.push(Value::Document(compile_node(child, schema)?));
            }
            let operator = match comb.operation {
                CombineOp::And => "$and",
                CombineOp::Or => "$or",
            };
            Ok(Document::from([(operator, Value::List(children))]))
        }
        QNode::Not(inner) => Ok(invert_filter(&compile_node(inner, schema)?)),
    }
}

fn compile_leaf(q: &Q, schema: &ModelSchema) -> Result<Document> {
    let pairs = match &q.conditions {
        Conditions::Raw(raw) => return Ok(raw.clone()),
        Conditions::Pairs(pairs) => pairs,
    };

    let mut filter = Document::new();
    for (key, value) in pairs {
        let (field_name, mut operator) = match key.split_once(DELIMITER) {
            Some((field, op)) => (field, op),
            None => (key.as_str(), "base"),
        };

        // The identifier pseudo-field is always filterable; everything else
        // must be declared on the model.
        let base = field_name.split('.').next().unwrap_or(field_name);
        if base != ID_FIELD {
            let Some(descriptor) = schema.field(base) else {
                return Err(Error::queryset(format!(
                    "Unknown field `{field_name}` of model `{}`",
                    schema.name()
                )));
            };
            if descriptor.is_relation() {
                operator = "rel";
            }
        }

        let condition = operators::process(operator, field_name, value)?;
        filter.merge(&condition);
    }
    Ok(filter)
}

/// Invert a compiled native filter, leaf condition by leaf condition:
/// a document becomes `$not` of it, a list becomes `$nin`, any scalar
/// becomes `$ne`.
#[must_use]
pub fn invert_filter(filter: &Document) -> Document {
    let mut result = Document::new();
    for (key, value) in filter.iter() {
        let inverted = match value {
            Value::Document(doc) => {
                Value::Document(Document::from([("$not", Value::Document(doc.clone()))]))
            }
            Value::List(list) => {
                Value::Document(Document::from([("$nin", Value::List(list.clone()))]))
            }
            scalar => Value::Document(Document::from([("$ne", scalar.clone())])),
        };
        result.insert(key.clone(), inverted);
    }
    result
}

/// Negate a query-node argument for `exclude`.
///
/// NOT does not distribute through the tree automatically, so each shape is
/// special-cased: a leaf is wrapped, an already-negated node unwraps
/// (double negation collapses), and a combination negates each child
/// recursively while keeping its own operation.
#[must_use]
pub fn invert_node(node: &QNode) -> QNode {
    match node {
        QNode::Leaf(q) => QNode::Not(Box::new(QNode::Leaf(q.clone()))),
        QNode::Not(inner) => (**inner).clone(),
        QNode::Combination(comb) => QNode::Combination(QCombination {
            operation: comb.operation,
            children: comb.children.iter().map(invert_node).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::{FieldDescriptor, ModelDef, ModelRegistry};

    fn profile_schema() -> ModelSchema {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                ModelDef::new("Profile")
                    .field("username", FieldDescriptor::string())
                    .field("age", FieldDescriptor::integer())
                    .field("docs", FieldDescriptor::list()),
            )
            .unwrap();
        registry
            .register(
                ModelDef::new("Post").field("author", FieldDescriptor::foreign_key("Profile")),
            )
            .unwrap();
        registry.resolve_relations().unwrap();
        registry.schema("Profile").unwrap().clone()
    }

    fn post_schema() -> ModelSchema {
        let mut registry = ModelRegistry::new();
        registry.register(ModelDef::new("Profile")).unwrap();
        registry
            .register(
                ModelDef::new("Post").field("author", FieldDescriptor::foreign_key("Profile")),
            )
            .unwrap();
        registry.resolve_relations().unwrap();
        registry.schema("Post").unwrap().clone()
    }

    #[test]
    fn test_bare_equality() {
        let schema = profile_schema();
        let filter = compile(&Q::with("age", 20).into(), &schema).unwrap();
        assert_eq!(filter, Document::from([("age", Value::Int(20))]));
    }

    #[test]
    fn test_operator_suffix() {
        let schema = profile_schema();
        let filter = compile(&Q::with("age__gt", 18).into(), &schema).unwrap();
        let inner = filter.get("age").and_then(Value::as_document).unwrap();
        assert_eq!(inner.get("$gt"), Some(&Value::Int(18)));
    }

    #[test]
    fn test_conditions_on_one_field_merge_deeply() {
        let schema = profile_schema();
        let node: QNode = Q::pairs([("age__gt", 18), ("age__lt", 30)]).into();
        let filter = compile(&node, &schema).unwrap();
        let inner = filter.get("age").and_then(Value::as_document).unwrap();
        assert_eq!(inner.get("$gt"), Some(&Value::Int(18)));
        assert_eq!(inner.get("$lt"), Some(&Value::Int(30)));
    }

    #[test]
    fn test_unknown_field_fails() {
        let schema = profile_schema();
        let err = compile(&Q::with("missing", 1).into(), &schema).unwrap_err();
        assert!(err.to_string().contains("Unknown field `missing`"));
    }

    #[test]
    fn test_unknown_operator_fails() {
        let schema = profile_schema();
        let err = compile(&Q::with("age__within", 1).into(), &schema).unwrap_err();
        assert_eq!(err.to_string(), "Unknown condition `within`");
    }

    #[test]
    fn test_identifier_pseudo_field_is_always_known() {
        let schema = profile_schema();
        let filter = compile(&Q::with("_id", 5).into(), &schema).unwrap();
        assert_eq!(filter, Document::from([("_id", Value::Int(5))]));
    }

    #[test]
    fn test_relation_field_rewrites_to_id_subpath() {
        let schema = post_schema();
        let filter = compile(&Q::with("author", 3).into(), &schema).unwrap();
        assert_eq!(filter, Document::from([("author.$id", Value::Int(3))]));
    }

    #[test]
    fn test_and_of_leaves_simplifies_to_one_leaf() {
        let schema = profile_schema();
        let node = Q::with("age", 30) & Q::with("username", "Ivan");
        let filter = compile(&node, &schema).unwrap();
        // No $and wrapper: the conjunction merged into a flat document.
        assert!(filter.get("$and").is_none());
        assert_eq!(filter.get("age"), Some(&Value::Int(30)));
        assert_eq!(filter.get("username"), Some(&Value::from("Ivan")));
    }

    #[test]
    fn test_duplicate_keys_abort_simplification() {
        let schema = profile_schema();
        let node = Q::with("age__gt", 18) & Q::with("age__gt", 20);
        let filter = compile(&node, &schema).unwrap();
        // Kept as an explicit $and, both conditions preserved.
        let children = filter.get("$and").and_then(Value::as_list).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_or_compiles_to_or_wrapper() {
        let schema = profile_schema();
        let node = Q::with("age", 20) | Q::with("username", "Ivan");
        let filter = compile(&node, &schema).unwrap();
        let children = filter.get("$or").and_then(Value::as_list).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_not_leaf_inverts_scalar_to_ne() {
        let schema = profile_schema();
        let filter = compile(&!Q::with("age", 20), &schema).unwrap();
        let inner = filter.get("age").and_then(Value::as_document).unwrap();
        assert_eq!(inner.get("$ne"), Some(&Value::Int(20)));
    }

    #[test]
    fn test_not_leaf_inverts_document_to_not() {
        let schema = profile_schema();
        let filter = compile(&!Q::with("age__gt", 20), &schema).unwrap();
        let inner = filter.get("age").and_then(Value::as_document).unwrap();
        assert!(inner.get("$not").is_some());
    }

    #[test]
    fn test_not_leaf_inverts_list_to_nin() {
        let schema = profile_schema();
        let value = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let filter = compile(&!Q::with("docs", value), &schema).unwrap();
        let inner = filter.get("docs").and_then(Value::as_document).unwrap();
        assert!(inner.get("$nin").is_some());
    }

    #[test]
    fn test_invert_node_collapses_double_negation() {
        let node = !Q::with("age", 20);
        let inverted = invert_node(&node);
        assert_eq!(inverted, QNode::Leaf(Q::with("age", 20)));
    }

    #[test]
    fn test_invert_node_negates_combination_children_in_place() {
        let node = Q::with("age", 20) | Q::with("username", "Ivan");
        let inverted = invert_node(&node);
        let QNode::Combination(comb) = inverted else {
            panic!("expected a combination");
        };
        // The operation is kept; only children are negated.
        assert_eq!(comb.operation, CombineOp::Or);
        assert!(comb.children.iter().all(|c| matches!(c, QNode::Not(_))));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let schema = profile_schema();
        let node = (Q::with("age__gt", 18) | Q::with("username", "Ivan")) & !Q::with("age", 40);
        let first = compile(&node, &schema).unwrap();
        let second = compile(&node, &schema).unwrap();
        assert_eq!(first, second);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_leaf() -> impl Strategy<Value = QNode> {
            let key = prop_oneof![
                Just("age"),
                Just("age__gt"),
                Just("age__lte"),
                Just("username"),
                Just("username__ne"),
            ];
            (key, any::<i64>()).prop_map(|(k, v)| QNode::Leaf(Q::with(k, v)))
        }

        fn arb_tree() -> impl Strategy<Value = QNode> {
            arb_leaf().prop_recursive(4, 16, 3, |inner| {
                prop_oneof![
                    (inner.clone(), inner.clone())
                        .prop_map(|(a, b)| QNode::Combination(QCombination::new(
                            CombineOp::And,
                            [a, b]
                        ))),
                    (inner.clone(), inner.clone())
                        .prop_map(|(a, b)| QNode::Combination(QCombination::new(
                            CombineOp::Or,
                            [a, b]
                        ))),
                    inner.prop_map(|n| QNode::Not(Box::new(n))),
                ]
            })
        }

        proptest! {
            #[test]
            fn compiling_twice_yields_identical_filters(node in arb_tree()) {
                let schema = profile_schema();
                let first = compile(&node, &schema);
                let second = compile(&node, &schema);
                prop_assert_eq!(first, second);
            }
        }
    }
}
