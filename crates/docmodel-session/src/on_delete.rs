//! The on-delete cascade engine.
//!
//! Deleting an instance whose model has inbound relations walks the backward
//! relation graph and builds a typed action tree, one node per backward
//! relation carrying a configured policy. Execution is depth-first (children
//! before the parent action) so a doubly-nested cascade removes grandchildren
//! before children. A `Protected` policy anywhere in the tree refuses the
//! whole delete before any document is touched.
//!
//! Relations with *no* on-delete policy configured never appear in the tree:
//! deleting the parent leaves those referencing documents untouched.

use asupersync::{Cx, Outcome};
use docmodel_core::{
    BackwardDescriptor, BoxFuture, Document, Error, OnDelete, ProtectedError, Value,
};

use crate::instance::Instance;
use crate::odm::Odm;

/// One action of the cascade tree: a backward relation with a policy, the
/// filter selecting the referencing documents, and the actions those
/// documents require in turn.
struct CascadeNode {
    policy: OnDelete,
    backward: BackwardDescriptor,
    /// Selects the referencing documents of one deleted parent
    filter: Document,
    children: Vec<CascadeNode>,
}

/// Analyze and execute the cascade tree for `instances`.
pub(crate) async fn handle_backwards(
    cx: &Cx,
    odm: &Odm,
    instances: &[Instance],
) -> Outcome<(), Error> {
    let mut forest = Vec::new();
    for instance in instances {
        match analyze(cx, odm, instance).await {
            Outcome::Ok(nodes) => forest.extend(nodes),
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }

    // Policy pre-scan: a protected relation anywhere refuses the delete
    // before a single document is touched.
    if let Some(node) = find_protected(&forest) {
        return Outcome::Err(Error::Protected(ProtectedError {
            model: node.backward.model.clone(),
            field: node.backward.field_name.clone(),
        }));
    }

    for node in &forest {
        match execute(cx, odm, node).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }
    Outcome::Ok(())
}

/// Build the action nodes for one instance's backward relations.
fn analyze<'a>(
    cx: &'a Cx,
    odm: &'a Odm,
    instance: &'a Instance,
) -> BoxFuture<'a, Outcome<Vec<CascadeNode>, Error>> {
    Box::pin(async move {
        let Some(parent_id) = instance.id().cloned() else {
            return Outcome::Ok(Vec::new());
        };

        let backwards: Vec<BackwardDescriptor> = match odm.schema(instance.model()) {
            Ok(schema) => schema.backwards().map(|(_, b)| b.clone()).collect(),
            Err(e) => return Outcome::Err(e),
        };

        let mut nodes = Vec::new();
        for backward in backwards {
            let policy = match relation_policy(odm, &backward) {
                Ok(Some(policy)) => policy,
                // Unset policy: the relation takes no part in the cascade.
                Ok(None) => continue,
                Err(e) => return Outcome::Err(e),
            };

            let filter = backward_filter(&backward, &parent_id);

            // A fresh queryset per fetch; analyze may visit the same relation
            // for sibling parents and must never share cursor state.
            let related = {
                let queryset = match odm.objects(&backward.model) {
                    Ok(queryset) => queryset,
                    Err(e) => return Outcome::Err(e),
                };
                match queryset.raw_filter(filter.clone()).fetch(cx).await {
                    Outcome::Ok(related) => related,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            };

            let mut children = Vec::new();
            for related_instance in &related {
                match analyze(cx, odm, related_instance).await {
                    Outcome::Ok(nested) => children.extend(nested),
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }

            nodes.push(CascadeNode {
                policy,
                backward,
                filter,
                children,
            });
        }

        Outcome::Ok(nodes)
    })
}

/// The on-delete policy configured on the forward relation field behind a
/// backward descriptor.
fn relation_policy(odm: &Odm, backward: &BackwardDescriptor) -> Result<Option<OnDelete>, Error> {
    let schema = odm.schema(&backward.model)?;
    let field = schema.field(&backward.field_name).ok_or_else(|| {
        Error::queryset(format!(
            "Backward relation points at missing field `{}` of model `{}`",
            backward.field_name, backward.model
        ))
    })?;
    Ok(field.relation().and_then(|rel| rel.on_delete))
}

fn backward_filter(backward: &BackwardDescriptor, parent_id: &Value) -> Document {
    Document::from([(
        format!("{}.$id", backward.field_name).as_str(),
        parent_id.clone(),
    )])
}

fn find_protected(nodes: &[CascadeNode]) -> Option<&CascadeNode> {
    for node in nodes {
        if node.policy == OnDelete::Protected {
            return Some(node);
        }
        if let Some(nested) = find_protected(&node.children) {
            return Some(nested);
        }
    }
    None
}

/// Execute one node: children first, then this node's action.
fn execute<'a>(
    cx: &'a Cx,
    odm: &'a Odm,
    node: &'a CascadeNode,
) -> BoxFuture<'a, Outcome<(), Error>> {
    Box::pin(async move {
        for child in &node.children {
            match execute(cx, odm, child).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        tracing::debug!(
            model = node.backward.model.as_str(),
            field = node.backward.field_name.as_str(),
            policy = ?node.policy,
            "Applying on-delete action"
        );

        match node.policy {
            OnDelete::Cascade => {
                let mut queryset = match odm.objects(&node.backward.model) {
                    Ok(queryset) => queryset.raw_filter(node.filter.clone()),
                    Err(e) => return Outcome::Err(e),
                };
                match queryset.delete(cx).await {
                    Outcome::Ok(_) => Outcome::Ok(()),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
            OnDelete::Protected => {
                // Unreachable in practice: the pre-scan refuses first.
                Outcome::Err(Error::Protected(ProtectedError {
                    model: node.backward.model.clone(),
                    field: node.backward.field_name.clone(),
                }))
            }
            OnDelete::SetNull => {
                apply_update(cx, odm, node, Value::Null).await
            }
            OnDelete::SetDefault => {
                let default = match resolve_default(odm, node).await {
                    Outcome::Ok(default) => default,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                apply_update(cx, odm, node, default).await
            }
        }
    })
}

/// Resolve the forward field's configured default at cascade time, encoding
/// it the way the field stores values.
async fn resolve_default(odm: &Odm, node: &CascadeNode) -> Outcome<Value, Error> {
    let (default, target_collection) = {
        let schema = match odm.schema(&node.backward.model) {
            Ok(schema) => schema,
            Err(e) => return Outcome::Err(e),
        };
        let Some(field) = schema.field(&node.backward.field_name) else {
            return Outcome::Ok(Value::Null);
        };
        let target_collection = field
            .relation()
            .and_then(|rel| odm.schema(rel.target.name()).ok())
            .map(|target| target.collection().to_string());
        (field.default.clone(), target_collection)
    };

    let Some(default) = default else {
        return Outcome::Ok(Value::Null);
    };
    let value = default.resolve().await;
    if value.is_null() {
        return Outcome::Ok(Value::Null);
    }
    match target_collection {
        Some(collection) => Outcome::Ok(Value::Reference {
            collection,
            id: Box::new(value.reference_id().clone()),
        }),
        None => Outcome::Ok(value),
    }
}

async fn apply_update(
    cx: &Cx,
    odm: &Odm,
    node: &CascadeNode,
    value: Value,
) -> Outcome<(), Error> {
    let queryset = match odm.objects(&node.backward.model) {
        Ok(queryset) => queryset.raw_filter(node.filter.clone()),
        Err(e) => return Outcome::Err(e),
    };
    let fields = Document::from([(node.backward.field_name.as_str(), value)]);
    match queryset.update(cx, fields).await {
        Outcome::Ok(_) => Outcome::Ok(()),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}
