//! Native-filter evaluation over in-memory documents.

use std::cmp::Ordering;

use docmodel_core::{Document, Value};

/// Check whether `doc` matches a compiled native filter.
pub fn matches(filter: &Document, doc: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => match condition.as_list() {
            Some(children) => children.iter().all(|child| {
                child.as_document().is_some_and(|f| matches(f, doc))
            }),
            None => false,
        },
        "$or" => match condition.as_list() {
            Some(children) => children.iter().any(|child| {
                child.as_document().is_some_and(|f| matches(f, doc))
            }),
            None => false,
        },
        path => matches_condition(path, condition, doc),
    })
}

fn matches_condition(path: &str, condition: &Value, doc: &Document) -> bool {
    let actual = doc.get_path(path);

    match condition {
        Value::Document(ops) if is_operator_document(ops) => apply_operators(ops, actual),
        expected => values_equal(actual, expected),
    }
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

fn apply_operators(ops: &Document, actual: Option<&Value>) -> bool {
    ops.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => values_equal(actual, operand),
        "$ne" => !values_equal(actual, operand),
        "$gt" => compare(actual, operand).is_some_and(|o| o == Ordering::Greater),
        "$gte" => compare(actual, operand).is_some_and(|o| o != Ordering::Less),
        "$lt" => compare(actual, operand).is_some_and(|o| o == Ordering::Less),
        "$lte" => compare(actual, operand).is_some_and(|o| o != Ordering::Greater),
        "$in" => operand
            .as_list()
            .is_some_and(|candidates| in_candidates(actual, candidates)),
        "$nin" => !operand
            .as_list()
            .is_some_and(|candidates| in_candidates(actual, candidates)),
        "$all" => match (actual, operand.as_list()) {
            (Some(Value::List(items)), Some(required)) => {
                required.iter().all(|value| items.contains(value))
            }
            _ => false,
        },
        "$exists" => operand
            .as_bool()
            .is_some_and(|expected| actual.is_some() == expected),
        "$not" => operand
            .as_document()
            .is_some_and(|inner| !apply_operators(inner, actual)),
        _ => false,
    })
}

fn in_candidates(actual: Option<&Value>, candidates: &[Value]) -> bool {
    match actual {
        // A list field is in the candidate set when any element is.
        Some(Value::List(items)) => items.iter().any(|item| candidates.contains(item)),
        Some(value) => candidates.contains(value),
        None => candidates.contains(&Value::Null),
    }
}

fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(value) => value == expected || compare(Some(value), expected) == Some(Ordering::Equal),
        // An absent field equals null, nothing else.
        None => expected.is_null(),
    }
}

/// Comparison for filter operators: only like-typed (or numeric) values
/// compare; everything else is a non-match.
fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    let actual = actual?;
    match (actual, operand) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            actual.as_f64()?.partial_cmp(&operand.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order used for sorting found documents: values group by type rank,
/// then compare within the type.
pub fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Int(_) | Value::Float(_) | Value::DateTime(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::List(_)) => 4,
            Some(Value::Document(_)) => 5,
            Some(Value::Reference { .. }) => 6,
        }
    }

    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => match (a, b) {
            (Some(left), Some(right)) => {
                compare(Some(left), right).unwrap_or(Ordering::Equal)
            }
            _ => Ordering::Equal,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_equality_and_operators() {
        let candidate = doc(&[("age", Value::Int(20)), ("name", Value::from("Peter"))]);

        assert!(matches(&doc(&[("age", Value::Int(20))]), &candidate));
        assert!(!matches(&doc(&[("age", Value::Int(21))]), &candidate));

        let gt = doc(&[(
            "age",
            Value::Document(doc(&[("$gt", Value::Int(18))])),
        )]);
        assert!(matches(&gt, &candidate));

        let between = doc(&[(
            "age",
            Value::Document(doc(&[("$gt", Value::Int(18)), ("$lt", Value::Int(30))])),
        )]);
        assert!(matches(&between, &candidate));
    }

    #[test]
    fn test_or_combination() {
        let filter = doc(&[(
            "$or",
            Value::List(vec![
                Value::Document(doc(&[("age", Value::Int(20))])),
                Value::Document(doc(&[("name", Value::from("Ivan"))])),
            ]),
        )]);

        assert!(matches(&filter, &doc(&[("age", Value::Int(20))])));
        assert!(matches(&filter, &doc(&[("name", Value::from("Ivan"))])));
        assert!(!matches(&filter, &doc(&[("age", Value::Int(18))])));
    }

    #[test]
    fn test_in_and_all() {
        let candidate = doc(&[("docs", Value::List(vec![Value::Int(1), Value::Int(2)]))]);

        let all = doc(&[(
            "docs",
            Value::Document(doc(&[(
                "$all",
                Value::List(vec![Value::Int(1), Value::Int(2)]),
            )])),
        )]);
        assert!(matches(&all, &candidate));

        let scalar = doc(&[("age", Value::Int(20))]);
        let is_in = doc(&[(
            "age",
            Value::Document(doc(&[(
                "$in",
                Value::List(vec![Value::Int(18), Value::Int(20)]),
            )])),
        )]);
        assert!(matches(&is_in, &scalar));
    }

    #[test]
    fn test_not_inverts_operator_document() {
        let candidate = doc(&[("age", Value::Int(25))]);
        let not_between = doc(&[(
            "age",
            Value::Document(doc(&[(
                "$not",
                Value::Document(doc(&[("$lt", Value::Int(30)), ("$gt", Value::Int(18))])),
            )])),
        )]);
        assert!(!matches(&not_between, &candidate));
        assert!(matches(&not_between, &doc(&[("age", Value::Int(30))])));
    }

    #[test]
    fn test_absent_field_equals_null() {
        let candidate = doc(&[("age", Value::Int(20))]);
        assert!(matches(&doc(&[("nickname", Value::Null)]), &candidate));
        assert!(!matches(&doc(&[("nickname", Value::from("x"))]), &candidate));
    }

    #[test]
    fn test_reference_id_path() {
        let candidate = doc(&[(
            "author",
            Value::Reference {
                collection: "user".to_string(),
                id: Box::new(Value::Int(5)),
            },
        )]);
        assert!(matches(&doc(&[("author.$id", Value::Int(5))]), &candidate));
        assert!(!matches(&doc(&[("author.$id", Value::Int(6))]), &candidate));
    }

    #[test]
    fn test_exists() {
        let candidate = doc(&[("age", Value::Int(20))]);
        let exists = doc(&[(
            "age",
            Value::Document(doc(&[("$exists", Value::Bool(true))])),
        )]);
        assert!(matches(&exists, &candidate));
        let missing = doc(&[(
            "nickname",
            Value::Document(doc(&[("$exists", Value::Bool(true))])),
        )]);
        assert!(!matches(&missing, &candidate));
    }

    #[test]
    fn test_order_values() {
        assert_eq!(
            order_values(Some(&Value::Int(1)), Some(&Value::Int(2))),
            Ordering::Less
        );
        assert_eq!(order_values(None, Some(&Value::Int(0))), Ordering::Less);
        assert_eq!(
            order_values(Some(&Value::from("b")), Some(&Value::from("a"))),
            Ordering::Greater
        );
    }
}
