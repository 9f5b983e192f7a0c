//! The field validation pipeline.
//!
//! Every value headed for the store passes through the same two stages,
//! whether it comes from a create or a partial update:
//!
//! 1. [`resolve_value`] fills in defaults (invoking producers, awaiting
//!    asynchronous ones), maps choice labels to stored keys, and stamps
//!    auto-now datetimes.
//! 2. [`validate`] runs type, blank, null, and length checks, recursing into
//!    list elements with subfield provenance.

use crate::error::{Error, Result};
use crate::field::{FieldDescriptor, FieldKind, SaveAction};
use crate::value::Value;

/// Resolve a raw value through defaults and choices.
///
/// An absent (`None` or null) value is replaced by the field default, if any.
/// A present value on a choices-configured field is mapped from display label
/// to stored key; a value matching neither label nor stored key fails with an
/// unknown-choice validation error.
pub async fn resolve_value(
    field: &FieldDescriptor,
    raw: Option<Value>,
    action: SaveAction,
) -> Result<Value> {
    let value = raw.unwrap_or(Value::Null);

    // Auto-now datetimes replace the whole default/choices pipeline: empty on
    // create, or unconditionally on update, the current time wins. Whole
    // seconds only, the store rounds anything finer.
    if let FieldKind::DateTime {
        auto_now_create,
        auto_now_update,
    } = field.kind
    {
        let stamp = match action {
            SaveAction::Create => auto_now_create && value.is_null(),
            SaveAction::Update => auto_now_update,
        };
        return Ok(if stamp { Value::now() } else { value });
    }

    let value = if value.is_null() {
        match &field.default {
            Some(default) => default.resolve().await,
            None => Value::Null,
        }
    } else {
        value
    };

    if !value.is_null() {
        if let Some(choices) = &field.choices {
            return choices.stored_key(&value);
        }
    }

    Ok(value)
}

/// Validate a resolved value against the field declaration.
///
/// Checks run in order: type, blank, null, length. List fields with a child
/// descriptor additionally validate each element, marking failures as
/// subfield errors so the message carries provenance.
pub fn validate(field: &FieldDescriptor, name: &str, value: &Value) -> Result<()> {
    validate_with_provenance(field, name, value, false)
}

fn validate_with_provenance(
    field: &FieldDescriptor,
    name: &str,
    value: &Value,
    is_subfield: bool,
) -> Result<()> {
    check_type(field, name, value, is_subfield)?;
    check_blank(field, name, value, is_subfield)?;
    check_null(field, name, value, is_subfield)?;
    check_length(field, name, value, is_subfield)?;

    if let FieldKind::List { child: Some(child) } = &field.kind {
        if let Value::List(items) = value {
            for item in items {
                validate_with_provenance(child, name, item, true)?;
            }
        }
    }

    Ok(())
}

/// Type check alone, reused for custom-validator return values.
pub fn check_type(
    field: &FieldDescriptor,
    name: &str,
    value: &Value,
    is_subfield: bool,
) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }

    let ok = match &field.kind {
        FieldKind::Bool => matches!(value, Value::Bool(_)),
        FieldKind::String => matches!(value, Value::String(_)),
        FieldKind::Integer => matches!(value, Value::Int(_)),
        FieldKind::Float => matches!(value, Value::Float(_)),
        FieldKind::List { .. } => matches!(value, Value::List(_)),
        FieldKind::Dict => matches!(value, Value::Document(_)),
        FieldKind::DateTime { .. } => matches!(value, Value::DateTime(_)),
        // Relation values are identifiers (or reference wrappers); their
        // consistency check is the existence query, not a type check.
        FieldKind::Relation(_) => true,
    };

    if ok {
        Ok(())
    } else {
        Err(Error::validation(
            format!(
                "Field `{name}` has wrong type! Expected {}",
                field.kind.name()
            ),
            is_subfield,
        ))
    }
}

fn check_blank(
    field: &FieldDescriptor,
    name: &str,
    value: &Value,
    is_subfield: bool,
) -> Result<()> {
    if !field.blank && value.as_str() == Some("") {
        return Err(Error::validation(
            format!("Field `{name}` can not be blank"),
            is_subfield,
        ));
    }
    Ok(())
}

fn check_null(
    field: &FieldDescriptor,
    name: &str,
    value: &Value,
    is_subfield: bool,
) -> Result<()> {
    if !field.null && value.is_null() {
        return Err(Error::validation(
            format!("Field `{name}` can not be null"),
            is_subfield,
        ));
    }
    Ok(())
}

fn check_length(
    field: &FieldDescriptor,
    name: &str,
    value: &Value,
    is_subfield: bool,
) -> Result<()> {
    let Some(length) = value.length() else {
        return Ok(());
    };

    if let Some(max) = field.max_length {
        if length > max {
            return Err(Error::validation(
                format!("Field `{name}` exceeds the max length {max}"),
                is_subfield,
            ));
        }
    }

    if let Some(min) = field.min_length {
        if length < min {
            return Err(Error::validation(
                format!("Field `{name}` exceeds the min length {min}"),
                is_subfield,
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;

    fn block_on<T>(fut: impl std::future::Future<Output = T>) -> T {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(fut)
    }

    #[test]
    fn test_resolve_literal_default() {
        let field = FieldDescriptor::integer().default_value(7);
        let value = block_on(resolve_value(&field, None, SaveAction::Create)).unwrap();
        assert_eq!(value, Value::Int(7));
    }

    #[test]
    fn test_resolve_producer_default() {
        let field = FieldDescriptor::integer().default_with(|| Value::Int(41 + 1));
        let value = block_on(resolve_value(&field, None, SaveAction::Create)).unwrap();
        assert_eq!(value, Value::Int(42));
    }

    #[test]
    fn test_resolve_async_producer_default() {
        let field = FieldDescriptor::string().default_async(|| async { Value::from("gen") });
        let value = block_on(resolve_value(&field, None, SaveAction::Create)).unwrap();
        assert_eq!(value, Value::from("gen"));
    }

    #[test]
    fn test_resolve_present_value_wins_over_default() {
        let field = FieldDescriptor::integer().default_value(7);
        let value =
            block_on(resolve_value(&field, Some(Value::Int(1)), SaveAction::Create)).unwrap();
        assert_eq!(value, Value::Int(1));
    }

    #[test]
    fn test_resolve_choice_label_to_key() {
        let field =
            FieldDescriptor::integer().choices([(Value::Int(1), "a"), (Value::Int(2), "b")]);
        let value =
            block_on(resolve_value(&field, Some(Value::from("b")), SaveAction::Create)).unwrap();
        assert_eq!(value, Value::Int(2));
    }

    #[test]
    fn test_resolve_unknown_choice_fails() {
        let field =
            FieldDescriptor::integer().choices([(Value::Int(1), "a"), (Value::Int(2), "b")]);
        let err = block_on(resolve_value(&field, Some(Value::Int(3)), SaveAction::Create))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_auto_now_create_stamps_empty_value() {
        let field = FieldDescriptor::datetime().auto_now_create();
        let value = block_on(resolve_value(&field, None, SaveAction::Create)).unwrap();
        assert!(matches!(value, Value::DateTime(_)));

        // A caller-provided value is kept.
        let provided = Value::DateTime(1);
        let value = block_on(resolve_value(
            &field,
            Some(provided.clone()),
            SaveAction::Create,
        ))
        .unwrap();
        assert_eq!(value, provided);
    }

    #[test]
    fn test_auto_now_update_overwrites_unconditionally() {
        let field = FieldDescriptor::datetime().auto_now_update();
        let value = block_on(resolve_value(
            &field,
            Some(Value::DateTime(1)),
            SaveAction::Update,
        ))
        .unwrap();
        assert_ne!(value, Value::DateTime(1));
    }

    #[test]
    fn test_validate_type_mismatch() {
        let field = FieldDescriptor::integer();
        let err = validate(&field, "age", &Value::from("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Field `age` has wrong type! Expected int"
        );
    }

    #[test]
    fn test_validate_blank() {
        let field = FieldDescriptor::string().blank(false);
        assert!(validate(&field, "username", &Value::from("")).is_err());
        assert!(validate(&field, "username", &Value::from("x")).is_ok());
    }

    #[test]
    fn test_validate_null() {
        let field = FieldDescriptor::string().null(false);
        assert!(validate(&field, "username", &Value::Null).is_err());
        let nullable = FieldDescriptor::string();
        assert!(validate(&nullable, "username", &Value::Null).is_ok());
    }

    #[test]
    fn test_validate_length_bounds() {
        let field = FieldDescriptor::string().max_length(3);
        let err = validate(&field, "username", &Value::from("test")).unwrap_err();
        assert_eq!(err.to_string(), "Field `username` exceeds the max length 3");

        let field = FieldDescriptor::string().min_length(3);
        let err = validate(&field, "username", &Value::from("ab")).unwrap_err();
        assert_eq!(err.to_string(), "Field `username` exceeds the min length 3");
    }

    #[test]
    fn test_list_child_failures_are_subfield_errors() {
        let field = FieldDescriptor::list_of(FieldDescriptor::integer());
        let value = Value::List(vec![Value::Int(1), Value::from("oops")]);
        let err = validate(&field, "docs", &value).unwrap_err();
        assert!(err.to_string().contains("(Sub-field exception)"));
    }

    #[test]
    fn test_resolve_then_validate_null_property() {
        // validate(resolve_value(None)) raises iff the field is non-nullable
        // and no default resolves a value.
        let required = FieldDescriptor::string().null(false);
        let resolved = block_on(resolve_value(&required, None, SaveAction::Create)).unwrap();
        assert!(validate(&required, "f", &resolved).is_err());

        let defaulted = FieldDescriptor::string().null(false).default_value("x");
        let resolved = block_on(resolve_value(&defaulted, None, SaveAction::Create)).unwrap();
        assert!(validate(&defaulted, "f", &resolved).is_ok());

        let nullable = FieldDescriptor::string();
        let resolved = block_on(resolve_value(&nullable, None, SaveAction::Create)).unwrap();
        assert!(validate(&nullable, "f", &resolved).is_ok());
    }
}
