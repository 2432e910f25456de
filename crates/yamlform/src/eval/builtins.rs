//! builtin functions
//!
//! The operators themselves are plain functions over known values. [Evaluator::evaluate_builtin] evaluates
//! the operands and hands them to [Evaluator::lift].
use super::Evaluator;
use crate::ast::{AssetKind, Builtin, Expr, Invoke};
use crate::diagnostics::{FieldFormatter, Range};
use crate::engine::{InvokeRequest, RegisterOptions, RegisterRequest, ResourceHandle, ResourceKind};
use crate::output::{Output, Settled};
use crate::packages::{package_name, resolve_function, ResolveError};
use crate::schema::FunctionType;
use crate::value::{format_number, Archive, Asset, Value};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;

pub const STACK_REFERENCE: &str = "pulumi:pulumi:StackReference";

pub fn join(delimiter: &Value, values: &Value) -> Result<Value, String> {
    let Value::String(delimiter) = delimiter else {
        return Err(format!("delimiter must be a string, not {}", delimiter.type_string()));
    };
    let Value::List(values) = values else {
        return Err(format!(
            "the second argument to fn::join must be a list, not {}",
            values.type_string()
        ));
    };

    let mut parts = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        match value {
            Value::String(part) => parts.push(part.as_str()),
            other => {
                return Err(format!(
                    "the second argument to fn::join must be a list of strings, found {} at index {index}",
                    other.type_string()
                ))
            }
        }
    }
    Ok(Value::String(parts.join(delimiter)))
}

pub fn split(delimiter: &Value, source: &Value) -> Result<Value, String> {
    let Value::String(delimiter) = delimiter else {
        return Err(format!("delimiter must be a string, not {}", delimiter.type_string()));
    };
    let Value::String(source) = source else {
        return Err(format!(
            "the second argument to fn::split must be a string, not {}",
            source.type_string()
        ));
    };
    Ok(Value::List(
        source.split(delimiter.as_str()).map(Value::from).collect(),
    ))
}

pub fn select(index: &Value, values: &Value) -> Result<Value, String> {
    let Value::Number(index) = *index else {
        return Err(format!("index must be a number, not {}", index.type_string()));
    };
    if index.fract() != 0.0 || index < 0.0 {
        return Err(format!(
            "index must be a positive integral, not {}",
            format_number(index)
        ));
    }
    let Value::List(values) = values else {
        return Err(format!(
            "the second argument to fn::select must be a list, not {}",
            values.type_string()
        ));
    };

    values.get(index as usize).cloned().ok_or_else(|| {
        format!(
            "list index {} out-of-bounds for list of length {}",
            format_number(index),
            values.len()
        )
    })
}

/// JSON text with object keys in sorted order
pub fn to_json(value: &Value) -> Result<String, String> {
    // serde_json's own map is ordered by key
    let json = serde_json::to_value(value).map_err(|err| err.to_string())?;
    serde_json::to_string(&json).map_err(|err| err.to_string())
}

pub fn to_base64(value: &Value) -> Result<Value, String> {
    let Value::String(text) = value else {
        return Err(format!(
            "the argument to fn::toBase64 must be a string, not {}",
            value.type_string()
        ));
    };
    Ok(Value::String(BASE64_STANDARD.encode(text)))
}

pub fn from_base64(value: &Value) -> Result<Value, String> {
    let Value::String(encoded) = value else {
        return Err(format!(
            "the argument to fn::fromBase64 must be a string, not {}",
            value.type_string()
        ));
    };
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|err| format!("fn::fromBase64 unable to decode {encoded:?}: {err}"))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| "fn::fromBase64 output is not a valid UTF-8 string".to_string())
}

/// Seconds since the unix epoch
pub fn rfc3339_to_unix(value: &Value) -> Result<Value, String> {
    let Value::String(timestamp) = value else {
        return Err(format!(
            "the argument to fn::rfc3339ToUnix must be a string, not {}",
            value.type_string()
        ));
    };
    let parsed = chrono::DateTime::parse_from_rfc3339(timestamp)
        .map_err(|err| format!("failed to parse {timestamp:?} as an RFC 3339 timestamp: {err}"))?;
    Ok(Value::Number(parsed.timestamp() as f64))
}

/// Contents of the file at `value`, relative paths start at `root`
pub fn read_file(root: &Path, value: &Value) -> Result<Value, String> {
    let Value::String(path) = value else {
        return Err(format!(
            "the argument to fn::readFile must be a string, not {}",
            value.type_string()
        ));
    };
    let full_path = root.join(path);
    tracing::debug!(path = ?full_path, "reading file");
    std::fs::read_to_string(&full_path)
        .map(Value::String)
        .map_err(|err| format!("error reading file at path {path:?}: {err}"))
}

fn asset(kind: AssetKind, value: &Value) -> Result<Value, String> {
    let Value::String(source) = value else {
        return Err(format!(
            "the argument to {} must be a string, not {}",
            kind.function_name(),
            value.type_string()
        ));
    };
    let source = source.clone();
    Ok(match kind {
        AssetKind::StringAsset => Value::Asset(Asset::String(source)),
        AssetKind::FileAsset => Value::Asset(Asset::File(source)),
        AssetKind::RemoteAsset => Value::Asset(Asset::Remote(source)),
        AssetKind::FileArchive => Value::Archive(Archive::File(source)),
        AssetKind::RemoteArchive => Value::Archive(Archive::Remote(source)),
    })
}

impl Evaluator {
    pub(super) fn evaluate_builtin(&self, expr: &Expr, builtin: &Builtin) -> Option<Value> {
        let range = expr.range.as_ref();
        match builtin {
            Builtin::Invoke(invoke) => self.evaluate_invoke(expr, invoke),
            Builtin::Join { delimiter, values } => self.binary(range, delimiter, values, join),
            Builtin::Split { delimiter, source } => self.binary(range, delimiter, source, split),
            Builtin::Select { index, values } => self.binary(range, index, values, select),
            Builtin::ToJson(value) => {
                self.unary(range, value, |value| to_json(value).map(Value::String))
            }
            Builtin::ToBase64(value) => self.unary(range, value, to_base64),
            Builtin::FromBase64(value) => self.unary(range, value, from_base64),
            Builtin::Rfc3339ToUnix(value) => self.unary(range, value, rfc3339_to_unix),
            Builtin::ReadFile(path) => {
                let root = self.ctx.settings.root_directory.clone();
                self.unary(range, path, move |path| read_file(&root, path))
            }
            Builtin::Secret(value) => {
                let value = self.evaluate(value)?;
                Some(Value::Output(Output::from_value(value).into_secret()))
            }
            Builtin::Asset { kind, source } => {
                let kind = *kind;
                self.unary(range, source, move |source| asset(kind, source))
            }
            Builtin::AssetArchive(entries) => self.evaluate_asset_archive(range, entries),
            Builtin::StackReference { stack, property } => {
                let reference = self.stack_reference(range, stack)?;
                let property = self.evaluate(property)?;
                self.lift(
                    range,
                    vec![property, Value::Output(reference.output("outputs"))],
                    |operands| {
                        let mut operands = operands.into_iter();
                        let (property, outputs) = (operands.next(), operands.next());
                        let property = match property {
                            Some(Value::String(property)) => property,
                            other => {
                                return Err(format!(
                                    "expected property name argument to fn::stackReference to be a string, got {}",
                                    other.as_ref().map_or("null", Value::type_string)
                                ))
                            }
                        };
                        Ok(match outputs {
                            Some(Value::Object(mut outputs)) => {
                                outputs.swap_remove(&property).unwrap_or(Value::Null)
                            }
                            _ => Value::Null,
                        })
                    },
                )
            }
        }
    }

    fn unary(
        &self,
        range: Option<&Range>,
        operand: &Expr,
        operator: impl FnOnce(&Value) -> Result<Value, String> + Send + 'static,
    ) -> Option<Value> {
        let operand = self.evaluate(operand)?;
        self.lift(range, vec![operand], move |operands| match operands.first() {
            Some(operand) => operator(operand),
            None => operator(&Value::Null),
        })
    }

    fn binary(
        &self,
        range: Option<&Range>,
        left: &Expr,
        right: &Expr,
        operator: fn(&Value, &Value) -> Result<Value, String>,
    ) -> Option<Value> {
        // both sides are evaluated to report problems in either
        let (left, right) = (self.evaluate(left), self.evaluate(right));
        self.lift(range, vec![left?, right?], move |operands| match operands.as_slice() {
            [left, right] => operator(left, right),
            _ => Err("expected two operands".to_string()),
        })
    }

    /// Entries are evaluated in key order
    fn evaluate_asset_archive(&self, range: Option<&Range>, entries: &[(String, Expr)]) -> Option<Value> {
        let mut sorted: Vec<&(String, Expr)> = entries.iter().collect();
        sorted.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut keys = Vec::with_capacity(sorted.len());
        let mut values = Vec::with_capacity(sorted.len());
        let mut ok = true;
        for (key, entry) in sorted {
            tracing::trace!(%key, "evaluating archive entry");
            match self.evaluate(entry) {
                Some(value) => {
                    keys.push(key.clone());
                    values.push(value);
                }
                None => ok = false,
            }
        }
        if !ok {
            return None;
        }

        self.lift(range, values, move |values| {
            let mut assets = IndexMap::with_capacity(values.len());
            for (key, value) in keys.into_iter().zip(values) {
                match value {
                    Value::Asset(_) | Value::Archive(_) => {
                        assets.insert(key, value);
                    }
                    other => {
                        return Err(format!(
                            "the value of '{key}' in fn::assetArchive must be an asset or an archive, not {}",
                            other.type_string()
                        ))
                    }
                }
            }
            Ok(Value::Archive(Archive::Assets(assets)))
        })
    }

    /// The stack reference resource of `stack`, registered on first use
    fn stack_reference(&self, range: Option<&Range>, stack: &str) -> Option<ResourceHandle> {
        if let Some(handle) = self.ctx.stack_references.lock().get(stack) {
            return Some(handle.clone());
        }

        tracing::debug!(%stack, "registering stack reference");
        let request = RegisterRequest {
            name: stack.to_string(),
            token: STACK_REFERENCE.to_string(),
            kind: ResourceKind::Custom,
            properties: [("name".to_string(), Value::from(stack))].into(),
            options: RegisterOptions::default(),
        };
        match self.ctx.engine.register_resource(request) {
            Ok(handle) => {
                self.watch(range, handle.outputs());
                let mut references = self.ctx.stack_references.lock();
                Some(references.entry(stack.to_string()).or_insert(handle).clone())
            }
            Err(err) => {
                self.error(range, err.to_string());
                None
            }
        }
    }

    fn resolve_function(
        &self,
        token: &str,
        version: Option<&str>,
    ) -> Result<Arc<FunctionType>, ResolveError> {
        let package = self.ctx.packages.load(package_name(token)?, version)?;
        resolve_function(package.as_ref(), token)
    }

    /// Schema name of the field `invoke` returns, `None` for the whole result
    ///
    /// Fields missing from the schema are reported here, before anything is called.
    fn return_field(
        &self,
        range: Option<&Range>,
        invoke: &Invoke,
        function: &FunctionType,
    ) -> Result<Option<String>, ()> {
        let Some((field, field_range)) = &invoke.return_field else {
            return Ok(None);
        };
        let field_range = field_range.as_ref().or(range);

        match &function.outputs {
            Some(outputs) => match outputs
                .properties
                .iter()
                .find(|property| property.name.eq_ignore_ascii_case(field))
            {
                Some(property) => Ok(Some(property.name.clone())),
                None => {
                    self.report(
                        FieldFormatter::new(invoke.token.clone(), outputs.property_names())
                            .error(field, field, field_range),
                    );
                    Err(())
                }
            },
            None if function.return_type.is_some() => {
                self.error(
                    field_range,
                    format!("fn::invoke of {} has a non-object return value, cannot select '{field}'", invoke.token),
                );
                Err(())
            }
            // nothing is known about the result
            None => Ok(Some(field.clone())),
        }
    }

    fn evaluate_invoke(&self, expr: &Expr, invoke: &Invoke) -> Option<Value> {
        let range = expr.range.as_ref();
        let token_range = invoke.token_range.as_ref().or(range);

        let options = self.invoke_options(&invoke.options)?;
        let function = match self.resolve_function(&invoke.token, options.version.as_deref()) {
            Ok(function) => function,
            Err(err) => {
                self.error(token_range, err.to_string());
                return None;
            }
        };
        let return_field = self.return_field(range, invoke, &function).ok()?;

        let arguments = match &invoke.arguments {
            Some(arguments) => self.evaluate(arguments)?,
            None => Value::object(),
        };

        let request = InvokeRequest {
            token: function.token.clone(),
            ..options
        };
        let this = self.clone();
        let range = range.cloned();
        let call = move |arguments: Value| -> Result<Value, String> {
            let Value::Object(arguments) = arguments else {
                return Err(format!(
                    "the arguments of fn::invoke must be an object, not {}",
                    arguments.type_string()
                ));
            };
            tracing::debug!(token = %request.token, "invoking function");
            let token = request.token.clone();
            let result = this
                .ctx
                .engine
                .invoke(InvokeRequest {
                    arguments,
                    ..request
                })
                .map_err(|err| err.to_string())?;
            this.watch(range.as_ref(), &result);

            let Some(field) = return_field else {
                return Ok(Value::Output(result));
            };
            let selector = this.deferred();
            Ok(Value::Output(result.apply(move |result| match result {
                Value::Object(mut result) => result.swap_remove(&field).ok_or_else(|| {
                    selector.error(
                        range.as_ref(),
                        format!("fn::invoke of {token} did not contain a property '{field}' in the returned value"),
                    )
                }),
                other => Err(selector.error(
                    range.as_ref(),
                    format!("fn::invoke of {token} returned {}, not an object", other.type_string()),
                )),
            })))
        };

        match arguments {
            // a deferred key makes the whole argument object deferred
            Value::Output(arguments) => {
                let this = self.deferred();
                let range = expr.range.clone();
                Some(Value::Output(arguments.apply(move |arguments| {
                    call(arguments).map_err(|message| this.error(range.as_ref(), message))
                })))
            }
            arguments => match call(arguments) {
                Ok(value) => Some(value),
                Err(message) => {
                    self.error(expr.range.as_ref(), message);
                    None
                }
            },
        }
    }

    /// Reports engine failures of `output` once it settles
    pub(super) fn watch(&self, range: Option<&Range>, output: &Output) {
        let this = self.deferred();
        let range = range.cloned();
        output.on_settled(move |settled| {
            if let Settled::Failed(crate::output::OutputError::Engine(message)) = settled {
                this.error(range.as_ref(), message.clone());
            }
        });
    }
}
