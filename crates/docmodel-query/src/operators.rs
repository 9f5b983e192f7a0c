//! Operator lowering: one native comparison wrapper per operator.

use docmodel_core::{Document, Error, Result, Value};

/// Lower a `field__operator` condition into its native filter form.
///
/// `base` is bare equality, `rel` the relation rewrite (stored-identifier
/// sub-path, reference values unwrapped to their identifier). Unknown
/// operators are a queryset error naming the condition.
pub(crate) fn process(operator: &str, field_name: &str, value: &Value) -> Result<Document> {
    let condition = match operator {
        "base" => Document::from([(field_name, value.clone())]),
        "rel" => Document::from([(
            format!("{field_name}.$id").as_str(),
            value.reference_id().clone(),
        )]),
        "exists" => wrap(field_name, "$exists", value.clone()),
        "gt" => wrap(field_name, "$gt", value.clone()),
        "gte" => wrap(field_name, "$gte", value.clone()),
        "lt" => wrap(field_name, "$lt", value.clone()),
        "lte" => wrap(field_name, "$lte", value.clone()),
        "in" => wrap(field_name, "$in", value.clone()),
        "all" => wrap(field_name, "$all", value.clone()),
        "ne" => wrap(field_name, "$ne", value.clone()),
        "isnull" => {
            let inner = Document::from([
                ("$exists", Value::Bool(true)),
                ("$ne", Value::Null),
            ]);
            Document::from([(field_name, Value::Document(inner))])
        }
        unknown => {
            return Err(Error::queryset(format!("Unknown condition `{unknown}`")));
        }
    };
    Ok(condition)
}

fn wrap(field_name: &str, native_op: &str, value: Value) -> Document {
    let inner = Document::from([(native_op, value)]);
    Document::from([(field_name, Value::Document(inner))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_is_plain_equality() {
        let doc = process("base", "age", &Value::Int(20)).unwrap();
        assert_eq!(doc, Document::from([("age", Value::Int(20))]));
    }

    #[test]
    fn test_comparison_wrappers() {
        for (op, native) in [
            ("gt", "$gt"),
            ("gte", "$gte"),
            ("lt", "$lt"),
            ("lte", "$lte"),
            ("ne", "$ne"),
        ] {
            let doc = process(op, "age", &Value::Int(20)).unwrap();
            let inner = doc.get("age").and_then(Value::as_document).unwrap();
            assert_eq!(inner.get(native), Some(&Value::Int(20)), "operator {op}");
            assert_eq!(inner.len(), 1);
        }
    }

    #[test]
    fn test_rel_targets_stored_identifier_subpath() {
        let doc = process("rel", "author", &Value::Int(7)).unwrap();
        assert_eq!(doc, Document::from([("author.$id", Value::Int(7))]));
    }

    #[test]
    fn test_rel_unwraps_reference_values() {
        let reference = Value::Reference {
            collection: "user".to_string(),
            id: Box::new(Value::Int(9)),
        };
        let doc = process("rel", "author", &reference).unwrap();
        assert_eq!(doc, Document::from([("author.$id", Value::Int(9))]));
    }

    #[test]
    fn test_unknown_operator_fails() {
        let err = process("near", "age", &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown condition `near`");
    }
}
