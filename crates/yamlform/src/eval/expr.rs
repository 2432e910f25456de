//! reduction of expressions to values
use super::{Evaluator, Symbol};
use crate::ast::{Accessor, Expr, ExprKind, Interpolation, ObjectProperty, PropertyAccess};
use crate::diagnostics::Range;
use crate::output::OutputError;
use crate::value::Value;
use indexmap::IndexMap;

impl Evaluator {
    /// Value of `expr`, `None` when evaluation failed and was reported
    pub(super) fn evaluate(&self, expr: &Expr) -> Option<Value> {
        match &expr.kind {
            ExprKind::Null => Some(Value::Null),
            ExprKind::Bool(value) => Some(Value::Bool(*value)),
            ExprKind::Number(value) => Some(Value::Number(*value)),
            ExprKind::String(value) => Some(Value::String(value.clone())),
            ExprKind::Interpolate(parts) => self.evaluate_interpolation(expr, parts),
            ExprKind::Symbol(access) => self.evaluate_access(expr.range.as_ref(), access),
            ExprKind::List(items) => {
                // every item is evaluated to report as many problems as possible
                let items: Vec<Option<Value>> = items.iter().map(|item| self.evaluate(item)).collect();
                items.into_iter().collect::<Option<Vec<_>>>().map(Value::List)
            }
            ExprKind::Object(entries) => self.evaluate_object(entries, IndexMap::new()),
            ExprKind::Builtin(builtin) => self.evaluate_builtin(expr, builtin),
        }
    }

    /// Evaluates entries in order into `object`
    ///
    /// A deferred key defers the rest of the entries until it is known.
    pub(super) fn evaluate_object(
        &self,
        entries: &[ObjectProperty],
        mut object: IndexMap<String, Value>,
    ) -> Option<Value> {
        let mut remaining = entries;
        while let Some((entry, rest)) = remaining.split_first() {
            match self.evaluate(&entry.key)? {
                Value::Output(key) => {
                    tracing::trace!("object key is deferred");
                    let this = self.deferred();
                    let (entry, rest) = (entry.clone(), rest.to_vec());
                    let output = key.apply(move |key| {
                        let object = this.insert_entry(&entry, key, object).ok_or_else(reported)?;
                        this.evaluate_object(&rest, object).ok_or_else(reported)
                    });
                    return Some(Value::Output(output));
                }
                key => object = self.insert_entry(entry, key, object)?,
            }
            remaining = rest;
        }
        Some(Value::Object(object))
    }

    fn insert_entry(
        &self,
        entry: &ObjectProperty,
        key: Value,
        mut object: IndexMap<String, Value>,
    ) -> Option<IndexMap<String, Value>> {
        let Value::String(key) = key else {
            self.error(
                entry.key.range.as_ref(),
                format!("object key must evaluate to a string, not {}", key.type_string()),
            );
            return None;
        };

        let value = self.evaluate(&entry.value)?;
        object.insert(key, value);
        Some(object)
    }

    fn evaluate_interpolation(&self, expr: &Expr, parts: &[Interpolation]) -> Option<Value> {
        let mut texts = Vec::with_capacity(parts.len());
        let mut values = Vec::with_capacity(parts.len());
        for part in parts {
            texts.push(part.text.clone());
            let value = match &part.value {
                Some(access) => match self.evaluate_access(expr.range.as_ref(), access)? {
                    // resources are interpolated as their urn
                    Value::Resource(handle) => Value::Output(handle.urn().clone()),
                    value => value,
                },
                None => Value::Null,
            };
            values.push(value);
        }

        self.lift(expr.range.as_ref(), values, move |values| {
            let mut result = String::new();
            for (text, value) in texts.iter().zip(values) {
                result.push_str(text);
                match value.to_interpolated() {
                    Some(text) => result.push_str(&text),
                    None => result.push_str(&super::builtins::to_json(&value)?),
                }
            }
            Ok(Value::String(result))
        })
    }

    pub(super) fn evaluate_access(&self, range: Option<&Range>, access: &PropertyAccess) -> Option<Value> {
        let root = access.root_name();
        let receiver = match self.lookup(root) {
            Symbol::Found(value) => value,
            Symbol::Failed => return None,
            Symbol::Missing => {
                self.error(
                    range,
                    format!("resource, variable, or config value {root:?} not found"),
                );
                return None;
            }
        };

        match self.access(range.cloned(), receiver, access.rest()) {
            Ok(value) => Some(value),
            Err(message) => {
                self.error(range, message);
                None
            }
        }
    }

    /// Applies `accessors` to `receiver`
    ///
    /// Reaching a deferred value continues the rest of the chain once it is known. Unknown values end the
    /// chain as unknown, secrets stay secret.
    fn access(
        &self,
        range: Option<Range>,
        mut receiver: Value,
        accessors: &[Accessor],
    ) -> Result<Value, String> {
        let mut remaining = accessors;
        while let Some((accessor, rest)) = remaining.split_first() {
            receiver = match receiver {
                Value::Output(output) => {
                    let this = self.deferred();
                    let remaining = remaining.to_vec();
                    return Ok(Value::Output(output.apply(move |value| {
                        this.access(range.clone(), value, &remaining)
                            .map_err(|message| this.error(range.as_ref(), message))
                    })));
                }
                Value::Resource(handle) => {
                    let Some(key) = accessor.as_key() else {
                        return Err("cannot index into a resource, use a property name".to_string());
                    };
                    Value::Output(match (key, handle.id()) {
                        ("urn", _) => handle.urn().clone(),
                        ("id", Some(id)) => id.clone(),
                        _ => handle.output(key),
                    })
                }
                Value::List(mut items) => {
                    let Accessor::Index(index) = accessor else {
                        return Err("cannot access a list element using a property name".to_string());
                    };
                    let length = items.len();
                    match usize::try_from(*index).ok().filter(|index| *index < length) {
                        Some(index) => items.swap_remove(index),
                        None => {
                            return Err(format!(
                                "list index {index} out-of-bounds for list of length {length}"
                            ))
                        }
                    }
                }
                Value::Object(mut entries) => {
                    let Some(key) = accessor.as_key() else {
                        return Err(
                            "cannot access an object property using an integer index".to_string()
                        );
                    };
                    entries.swap_remove(key).unwrap_or(Value::Null)
                }
                other => {
                    return Err(format!(
                        "receiver must be a list or object, not {}",
                        other.type_string()
                    ))
                }
            };
            remaining = rest;
        }
        Ok(receiver)
    }
}

/// Fails a continuation whose problem was reported already
pub(super) fn reported() -> OutputError {
    OutputError::Reported("evaluation failed".to_string())
}
