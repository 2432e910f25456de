//! type checker
//!
//! Walks the scheduled nodes in order and assigns a [Type] to every expression (children before parents),
//! config entry, variable, resource and output. Assignments that cannot succeed are reported with the chain of
//! reasons that led to the failure.
//!
//! Everything that fails to type becomes [Type::Invalid]. Invalid types are accepted everywhere, so a single
//! mistake is reported once instead of at every use.
mod access;
mod assignable;

pub use access::{type_property_access, AccessError};
pub use assignable::NotAssignable;

use crate::ast::{
    Builtin, ConfigParam, Expr, ExprId, ExprKind, Invoke, ObjectProperty, PropertyAccess,
    PropertyEntry, Resource, ResourceOptions, Template,
};
use crate::config::{ConfigType, StackConfig};
use crate::diagnostics::{Diagnostic, Diagnostics, FieldFormatter, Range};
use crate::graph::{Node, PULUMI};
use crate::packages::{package_name, resolve_function, resolve_resource, PackageLoader, ResolveError};
use crate::schema::{FunctionType, ObjectType, Property, ResourceType, Type};
use crate::visit::WalkExpressions;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const ALIAS_FIELDS: &[&str] = &["name", "type", "stack", "project", "parentUrn", "noParent"];

/// Types found by [type_check]
#[derive(Debug, Clone, Default)]
pub struct Typing {
    exprs: HashMap<ExprId, Type>,
    resources: HashMap<String, Type>,
    configuration: HashMap<String, Type>,
    variables: HashMap<String, Type>,
    outputs: HashMap<String, Type>,
    /// nodes and outputs whose checks reported errors
    failed: HashSet<String>,
    failed_outputs: HashSet<String>,
}

impl Typing {
    /// True if checking the node with this key reported an error
    pub fn is_failed(&self, key: &str) -> bool {
        self.failed.contains(key)
    }

    pub fn output_failed(&self, name: &str) -> bool {
        self.failed_outputs.contains(name)
    }

    pub fn resource(&self, name: &str) -> Option<&Type> {
        self.resources.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Type> {
        self.variables.get(name)
    }

    pub fn config(&self, name: &str) -> Option<&Type> {
        self.configuration.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&Type> {
        self.outputs.get(name)
    }

    /// Only expressions that were visited have a type
    pub fn expr(&self, expr: &Expr) -> Option<&Type> {
        self.exprs.get(&expr.id)
    }
}

/// Type of the built-in `pulumi` object
pub fn pulumi_object() -> Type {
    Type::object(
        "pulumi:builtin:pulumi",
        ["cwd", "project", "stack", "organization", "rootDirectory"]
            .into_iter()
            .map(|name| Property::required(name, Type::String))
            .collect(),
    )
}

/// Types every node of `order` and then the outputs of `template`
///
/// `stack` supplies the values of config entries, their shape types undeclared entries and is checked against
/// declared ones.
#[tracing::instrument(level = "trace", skip_all)]
pub fn type_check(
    template: &Template,
    order: &[Node],
    packages: &dyn PackageLoader,
    stack: &StackConfig,
) -> (Typing, Diagnostics) {
    let mut checker = Checker {
        template,
        packages,
        stack,
        typing: Typing::default(),
        missing: HashSet::new(),
        diags: Diagnostics::new(),
    };

    for node in order {
        tracing::trace!(kind = node.kind(), key = node.key(), "typing node");
        let errors = checker.diags.errors().count();
        match node {
            Node::Config(param) => {
                if let Some(default) = &param.default {
                    checker.walk(default);
                }
                checker.type_config(param);
            }
            Node::ExternalConfig(key) => checker.type_external_config(key),
            Node::Variable(variable) => {
                checker.walk(&variable.value);
                let type_ = checker.type_of(&variable.value);
                checker.typing.variables.insert(variable.name.clone(), type_);
            }
            Node::Resource(resource) => checker.type_resource(resource),
            Node::Pulumi(settings) => {
                if let Some(version) = &settings.required_version {
                    checker.walk(version);
                    checker.assert_assignable(version, &Type::String);
                }
            }
            Node::Missing(name) => checker.report_missing(name, None),
        }
        if checker.diags.errors().count() > errors {
            checker.typing.failed.insert(node.key().to_string());
        }
    }

    for output in &template.outputs {
        let errors = checker.diags.errors().count();
        checker.walk(&output.value);
        let type_ = checker.type_of(&output.value);
        checker.typing.outputs.insert(output.name.clone(), type_);
        if checker.diags.errors().count() > errors {
            checker.typing.failed_outputs.insert(output.name.clone());
        }
    }

    tracing::debug!(diagnostics = checker.diags.len(), "type check finished");
    (checker.typing, checker.diags)
}

struct Checker<'a> {
    template: &'a Template,
    packages: &'a dyn PackageLoader,
    stack: &'a StackConfig,
    typing: Typing,
    /// undeclared names that were already reported
    missing: HashSet<String>,
    diags: Diagnostics,
}

impl<'a> Checker<'a> {
    fn walk(&mut self, expr: &Expr) {
        expr.walk_post_order(&mut |expr: &Expr| self.type_expr(expr));
    }

    fn type_of(&self, expr: &Expr) -> Type {
        self.typing.expr(expr).cloned().unwrap_or(Type::Invalid)
    }

    fn set(&mut self, expr: &Expr, type_: Type) {
        self.typing.exprs.insert(expr.id, type_);
    }

    fn error(&mut self, range: Option<&Range>, summary: impl Into<String>, detail: impl Into<String>) {
        self.diags.push(
            Diagnostic::error(summary)
                .with_detail(detail)
                .with_range(range),
        );
    }

    fn assert_assignable(&mut self, expr: &Expr, to: &Type) {
        let Some(from) = self.typing.expr(expr).cloned() else {
            self.diags.push(
                Diagnostic::warning("internal error: unable to discover type")
                    .with_detail(format!("expected type '{to}'"))
                    .with_range(expr.range.as_ref()),
            );
            return;
        };
        self.assert_assignable_from(expr, &from, to);
    }

    fn assert_assignable_from(&mut self, expr: &Expr, from: &Type, to: &Type) {
        if let Err(reason) = self.typing.is_assignable(Some(expr), from, to) {
            let summary = format!("{to} is not assignable from {from}");
            self.diags
                .extend(reason.diagnostics(&summary, expr.range.as_ref()));
        }
    }

    fn type_expr(&mut self, expr: &Expr) {
        let type_ = match &expr.kind {
            ExprKind::Null => Type::Invalid,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Number(_) => Type::Number,
            ExprKind::String(_) => Type::String,
            ExprKind::Interpolate(parts) => {
                for access in parts.iter().filter_map(|part| part.value.as_ref()) {
                    self.type_access(access, expr.range.as_ref());
                }
                Type::String
            }
            ExprKind::Symbol(access) => self.type_access(access, expr.range.as_ref()),
            ExprKind::List(items) => {
                Type::array(Type::union(items.iter().map(|item| self.type_of(item))))
            }
            ExprKind::Object(entries) => self.type_object(entries),
            ExprKind::Builtin(builtin) => self.type_builtin(expr, builtin),
        };
        self.set(expr, type_);
    }

    /// Structural type of an object literal, invalid when a key is computed
    fn type_object(&mut self, entries: &[ObjectProperty]) -> Type {
        let mut properties = vec![];
        for entry in entries {
            let Some(key) = entry.key.as_str() else {
                return Type::Invalid;
            };
            properties.push(
                Property::required(key, self.type_of(&entry.value)).at(entry.key.range.clone()),
            );
        }
        Type::Object(Arc::new(ObjectType::adhoc(properties)))
    }

    fn type_builtin(&mut self, expr: &Expr, builtin: &Builtin) -> Type {
        match builtin {
            Builtin::Invoke(invoke) => self.type_invoke(expr, invoke),
            Builtin::Join { delimiter, values } => {
                self.assert_assignable(delimiter, &Type::String);
                self.assert_assignable(values, &Type::array(Type::String));
                Type::String
            }
            Builtin::Split { delimiter, source } => {
                self.assert_assignable(delimiter, &Type::String);
                self.assert_assignable(source, &Type::String);
                Type::array(Type::String)
            }
            Builtin::Select { index, values } => {
                self.assert_assignable(index, &Type::Int);
                self.assert_assignable(values, &Type::array(Type::Any));
                match self.type_of(values).unwrap_input() {
                    Type::Array(element) => element.as_ref().clone(),
                    _ => Type::Invalid,
                }
            }
            Builtin::ToJson(_) => Type::String,
            Builtin::ToBase64(inner) | Builtin::FromBase64(inner) | Builtin::ReadFile(inner) => {
                self.assert_assignable(inner, &Type::String);
                Type::String
            }
            Builtin::Rfc3339ToUnix(inner) => {
                self.assert_assignable(inner, &Type::String);
                Type::Int
            }
            Builtin::Secret(inner) => self.type_of(inner),
            Builtin::StackReference { property, .. } => {
                self.assert_assignable(property, &Type::String);
                Type::Any
            }
            Builtin::Asset { kind, source } => {
                self.assert_assignable(source, &Type::String);
                if kind.is_archive() {
                    Type::Archive
                } else {
                    Type::Asset
                }
            }
            Builtin::AssetArchive(entries) => {
                for (_, entry) in entries {
                    self.assert_assignable(entry, &Type::Asset);
                }
                Type::Archive
            }
        }
    }

    /// Resolves a root name the way the evaluator does: resources, then config, then variables
    fn root_type(&self, name: &str) -> Option<Type> {
        let project_prefix = format!("{}:", self.template.project_name());
        let unprefixed = name.strip_prefix(project_prefix.as_str()).unwrap_or(name);

        self.typing
            .resources
            .get(name)
            .or_else(|| self.typing.configuration.get(name))
            .or_else(|| self.typing.configuration.get(unprefixed))
            .or_else(|| self.typing.variables.get(name))
            .cloned()
            .or_else(|| (name == PULUMI).then(pulumi_object))
    }

    fn report_missing(&mut self, name: &str, range: Option<&Range>) {
        if self.missing.insert(name.to_string()) {
            self.diags.push(
                Diagnostic::error(format!(
                    "resource, variable, or config value {name:?} not found"
                ))
                .with_range(range),
            );
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        let project_prefix = format!("{}:", self.template.project_name());
        let unprefixed = name.strip_prefix(project_prefix.as_str()).unwrap_or(name);
        self.template.resource(name).is_some()
            || self.template.variable(name).is_some()
            || self.template.config_param(unprefixed).is_some()
            || self.stack.get(unprefixed, self.template.project_name()).is_some()
    }

    fn type_access(&mut self, access: &PropertyAccess, range: Option<&Range>) -> Type {
        let root = access.root_name();
        let Some(root_type) = self.root_type(root) else {
            // declarations that failed to type were reported already
            if !self.is_declared(root) {
                self.report_missing(root, range);
            }
            return Type::Invalid;
        };

        match type_property_access(&root_type, root, access.rest()) {
            Ok(type_) => type_,
            Err(AccessError { summary, detail }) => {
                self.error(range, summary, detail);
                Type::Invalid
            }
        }
    }

    fn type_invoke(&mut self, expr: &Expr, invoke: &Invoke) -> Type {
        for (name, option) in invoke.options.iter() {
            let expected = match name {
                "dependsOn" => Type::array(Type::Resource(ResourceType::any())),
                "parent" | "provider" => Type::Resource(ResourceType::any()),
                _ => Type::String,
            };
            self.assert_assignable(option, &expected);
        }

        let version = invoke.options.version.as_ref().and_then(Expr::as_str);
        let function = match self.resolve_function(&invoke.token, version) {
            Ok(function) => function,
            Err(error) => {
                self.error(
                    invoke.token_range.as_ref().or(expr.range.as_ref()),
                    error.to_string(),
                    "",
                );
                return Type::Invalid;
            }
        };

        if let Some(arguments) = invoke.arguments.as_ref() {
            self.type_invoke_arguments(&function, arguments);
        }

        if let Some(return_type) = function.return_type.as_ref().filter(|_| function.outputs.is_none()) {
            if let Some((field, range)) = &invoke.return_field {
                self.error(
                    range.as_ref(),
                    "fn::invoke has a non-object return value",
                    format!("cannot specify property '{field}' for function {}", function.token),
                );
            }
            return return_type.clone();
        }

        match (&invoke.return_field, &function.outputs) {
            (None, Some(outputs)) => Type::Object(outputs.clone()),
            (None, None) => Type::Any,
            (Some((field, range)), outputs) => {
                let fields = outputs.as_ref().map(|o| o.property_names()).unwrap_or_default();
                let found = outputs.as_ref().and_then(|outputs| {
                    outputs
                        .properties
                        .iter()
                        .find(|p| p.name.eq_ignore_ascii_case(field))
                });
                match found {
                    Some(property) => property.type_.clone(),
                    None => {
                        let error = FieldFormatter::new(invoke.token.clone(), fields).error(
                            field,
                            field,
                            range.as_ref().or(expr.range.as_ref()),
                        );
                        self.diags.push(error);
                        Type::Invalid
                    }
                }
            }
        }
    }

    fn type_invoke_arguments(&mut self, function: &FunctionType, arguments: &Expr) {
        let inputs = function.inputs.as_ref().map(|i| i.properties.as_slice()).unwrap_or_default();
        let Some(entries) = arguments.as_object() else {
            self.assert_assignable(arguments, &Type::map(Type::Any));
            return;
        };

        let formatter = FieldFormatter::new(
            format!("Invoke {}", function.token),
            inputs.iter().map(|p| p.name.clone()).collect(),
        )
        .fields();
        for entry in entries {
            let Some(key) = entry.key.as_str() else {
                continue;
            };
            match inputs.iter().find(|p| p.name == key) {
                Some(input) => self.assert_assignable(&entry.value, &input.type_),
                None => {
                    let (summary, detail) = formatter.message(key, key);
                    self.diags.push(
                        Diagnostic::warning(summary)
                            .with_detail(detail)
                            .with_range(entry.key.range.as_ref()),
                    );
                }
            }
        }

        for input in inputs.iter().filter(|input| input.required) {
            if !entries.iter().any(|entry| entry.key.as_str() == Some(input.name.as_str())) {
                self.error(
                    arguments.range.as_ref(),
                    format!("Missing required property '{}'", input.name),
                    format!("Invoke {} requires '{}'", function.token, input.name),
                );
            }
        }
    }

    fn resolve_function(
        &self,
        token: &str,
        version: Option<&str>,
    ) -> Result<Arc<FunctionType>, ResolveError> {
        let package = self.packages.load(package_name(token)?, version)?;
        resolve_function(package.as_ref(), token)
    }

    fn resolve_resource(
        &self,
        token: &str,
        version: Option<&str>,
    ) -> Result<Arc<ResourceType>, ResolveError> {
        let package = self.packages.load(package_name(token)?, version)?;
        resolve_resource(package.as_ref(), token)
    }

    fn type_resource(&mut self, resource: &Resource) {
        let decl = &resource.decl;
        for entry in &decl.properties {
            self.walk(&entry.value);
        }
        for (_, option) in decl.options.iter() {
            self.walk(option);
        }
        if let Some(get) = &decl.get {
            self.walk(&get.id);
            for entry in &get.state {
                self.walk(&entry.value);
            }
        }

        self.type_options(&decl.options);

        let version = decl.options.version.as_ref().and_then(Expr::as_str);
        let resource_type = match self.resolve_resource(&decl.type_token, version) {
            Ok(resource_type) => resource_type,
            Err(error) => {
                self.error(
                    decl.type_range.as_ref().or(resource.range.as_ref()),
                    format!("error resolving type of resource {}: {error}", resource.name),
                    "",
                );
                self.typing
                    .resources
                    .insert(resource.name.clone(), Type::Invalid);
                return;
            }
        };

        // missing required inputs are only reported for resources that are created
        if !decl.properties.is_empty() || decl.get.is_none() {
            let to = ObjectType::new(resource_type.token.clone(), resource_type.inputs.clone());
            self.type_property_entries(&decl.properties, &to, resource.range.as_ref());
        }

        if let Some(get) = &decl.get {
            self.assert_assignable(&get.id, &Type::String);
            let state = resource_type
                .outputs
                .iter()
                .cloned()
                .map(|property| Property {
                    required: false,
                    ..property
                })
                .collect();
            let to = ObjectType::new(resource_type.token.clone(), state);
            self.type_property_entries(&get.state, &to, resource.range.as_ref());
        }

        self.typing
            .resources
            .insert(resource.name.clone(), Type::Resource(resource_type));
    }

    /// Checks a property map against `to` as if it were an object literal
    fn type_property_entries(&mut self, entries: &[PropertyEntry], to: &ObjectType, range: Option<&Range>) {
        let object = Expr {
            range: range.cloned(),
            ..Expr::new(ExprKind::Object(
                entries
                    .iter()
                    .map(|entry| ObjectProperty {
                        key: Expr {
                            range: entry.key_range.clone(),
                            ..Expr::string(&entry.key)
                        },
                        value: entry.value.clone(),
                    })
                    .collect(),
            ))
        };
        let from = ObjectType::adhoc(
            entries
                .iter()
                .map(|entry| {
                    Property::required(&entry.key, self.type_of(&entry.value))
                        .at(entry.key_range.clone())
                })
                .collect(),
        );

        self.assert_assignable_from(
            &object,
            &Type::Object(Arc::new(from)),
            &Type::Object(Arc::new(to.clone())),
        );
    }

    fn type_options(&mut self, options: &ResourceOptions) {
        let any_resource = || Type::Resource(ResourceType::any());
        let strings = || Type::array(Type::String);

        for (name, option) in options.iter() {
            let expected = match name {
                "additionalSecretOutputs" | "ignoreChanges" | "replaceOnChanges" => strings(),
                "deleteBeforeReplace" | "protect" | "retainOnDelete" => Type::Bool,
                "dependsOn" => Type::array(any_resource()),
                "parent" | "provider" | "deletedWith" => any_resource(),
                "providers" => Type::union([Type::array(any_resource()), Type::map(any_resource())]),
                "customTimeouts" => Type::object(
                    "customTimeouts",
                    ["create", "update", "delete"]
                        .into_iter()
                        .map(|name| Property::optional(name, Type::String))
                        .collect(),
                ),
                "aliases" => {
                    self.check_aliases(option);
                    continue;
                }
                _ => Type::String,
            };
            self.assert_assignable(option, &expected);
        }
    }

    /// Aliases are URN strings or objects naming parts of a previous identity
    fn check_aliases(&mut self, aliases: &Expr) {
        let ExprKind::List(items) = &aliases.kind else {
            self.error(
                aliases.range.as_ref(),
                "aliases must be a list",
                "Expected an array of strings (URNs) or objects with alias properties",
            );
            return;
        };

        for (index, item) in items.iter().enumerate() {
            match &item.kind {
                ExprKind::String(_) | ExprKind::Interpolate(_) | ExprKind::Symbol(_) => {}
                ExprKind::Object(entries) => {
                    for entry in entries {
                        let Some(key) = entry.key.as_str() else {
                            self.error(entry.key.range.as_ref(), "alias object keys must be strings", "");
                            return;
                        };
                        if !ALIAS_FIELDS.contains(&key) {
                            let formatter = FieldFormatter::new(
                                "alias".to_string(),
                                ALIAS_FIELDS.iter().map(|f| f.to_string()).collect(),
                            )
                            .fields();
                            self.diags.push(formatter.error(key, key, entry.key.range.as_ref()));
                            return;
                        }

                        let expected = if key == "noParent" { Type::Bool } else { Type::String };
                        let found = self.type_of(&entry.value);
                        if self.typing.is_assignable(Some(&entry.value), &found, &expected).is_err() {
                            let kind = if key == "noParent" { "a boolean" } else { "a string" };
                            self.error(
                                entry.value.range.as_ref(),
                                format!("alias field '{key}' must be {kind}"),
                                "",
                            );
                            return;
                        }
                    }
                }
                _ => {
                    self.error(
                        item.range.as_ref(),
                        format!("aliases[{index}] must be a string or object"),
                        "Each alias must be either a string URN or an object with alias properties",
                    );
                    return;
                }
            }
        }
    }

    fn type_config(&mut self, param: &ConfigParam) {
        let declared = match &param.type_name {
            Some((name, range)) => match ConfigType::parse(name) {
                Some(declared) => Some(declared),
                None => {
                    self.error(
                        range.as_ref().or(param.range.as_ref()),
                        crate::config::ConfigError::UnexpectedType(name.clone()).to_string(),
                        "",
                    );
                    self.typing
                        .configuration
                        .insert(param.name.clone(), Type::Invalid);
                    return;
                }
            },
            None => None,
        };

        let mut type_ = match (&declared, &param.default) {
            (Some(declared), Some(default)) => {
                self.assert_assignable(default, &declared.schema_type());
                declared.schema_type()
            }
            (None, Some(default)) => self.type_of(default),
            (Some(declared), None) => declared.schema_type(),
            (None, None) => Type::Invalid,
        };

        if let Some((value, _)) = self.stack.get(&param.name, self.template.project_name()) {
            let supplied = ConfigType::of_value(value);
            let conflict = match (&declared, &supplied) {
                (Some(declared), _) => declared.coerce(value).is_err(),
                (None, Ok(supplied)) if param.default.is_some() => self
                    .typing
                    .is_assignable(None, &supplied.schema_type(), &type_)
                    .is_err(),
                _ => false,
            };
            if conflict {
                let expected = match &declared {
                    Some(declared) => declared.to_string(),
                    None => type_.to_string(),
                };
                let supplied = match supplied {
                    Ok(supplied) => supplied.to_string(),
                    Err(error) => error.to_string(),
                };
                self.error(
                    param.range.as_ref(),
                    format!(
                        "config key {:?} cannot have conflicting types {expected}, {supplied}",
                        param.name
                    ),
                    "",
                );
                type_ = Type::Invalid;
            } else if type_.is_invalid() {
                type_ = supplied.map(|t| t.schema_type()).unwrap_or(Type::Any);
            }
        }

        let type_ = Type::input(type_);
        let type_ = if param.default.is_some() {
            Type::optional(type_)
        } else {
            type_
        };
        self.typing.configuration.insert(param.name.clone(), type_);
    }

    fn type_external_config(&mut self, key: &str) {
        let type_ = self
            .stack
            .get(key, self.template.project_name())
            .and_then(|(value, _)| ConfigType::of_value(value).ok())
            .map(|config_type| config_type.schema_type())
            .unwrap_or(Type::Any);
        self.typing
            .configuration
            .insert(key.to_string(), Type::input(type_));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::{topological_sort, SortOptions};
    use crate::packages::test::cloud_packages;
    use crate::template;
    use pretty_assertions::assert_eq;

    fn check_with(template: &Template, stack: &StackConfig) -> (Typing, Diagnostics) {
        let external: Vec<String> = stack
            .keys(template.project_name())
            .map(str::to_string)
            .collect();
        let (order, diags) = topological_sort(template, &external, SortOptions::default());
        assert!(!diags.has_errors(), "{diags}");
        type_check(template, &order, &cloud_packages(), stack)
    }

    fn check(template: &Template) -> (Typing, Diagnostics) {
        check_with(template, &StackConfig::default())
    }

    fn summaries(template: &Template) -> Vec<String> {
        check(template).1.summaries()
    }

    #[test]
    fn well_typed_program() {
        let template = template!(
            r#"
name: site
config:
  prefix:
    type: String
  replicas:
    default: 3
variables:
  region:
    fn::invoke:
      function: cloud:getRegion
      arguments:
        name: eu-north
      return: zones
resources:
  bucket:
    type: cloud:storage:Bucket
    properties:
      name: ${prefix}-bucket
      acl: private
      size: ${replicas}
      tags:
        zone: ${region[0]}
      website:
        indexDocument: index.html
  net:
    type: cloud:Network
    properties:
      cidrBlocks: ["10.0.0.0/16"]
    options:
      dependsOn: ["${bucket}"]
      protect: true
outputs:
  arn: ${bucket.arn}
  endpoint: http://${bucket.websiteEndpoint}
  subnet: ${net.subnetIds[0]}
"#
        );

        let (typing, diags) = check(&template);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(
            typing.resource("bucket").map(ToString::to_string).as_deref(),
            Some("cloud:storage/bucket:Bucket")
        );
        assert_eq!(typing.variable("region"), Some(&Type::array(Type::String)));
        assert_eq!(typing.config("replicas").map(Type::unwrap_input), Some(&Type::Number));
        assert_eq!(typing.output("arn"), Some(&Type::String));
        assert_eq!(typing.output("subnet"), Some(&Type::String));
    }

    #[test]
    fn unknown_property_suggests() {
        let template = template!(
            r#"
resources:
  bucket:
    type: cloud:storage:Bucket
    properties:
      nme: site
"#
        );

        let (_, diags) = check(&template);
        let diagnostic = diags.iter().next().unwrap();
        assert_eq!(
            diagnostic.summary,
            "Property nme does not exist on 'cloud:storage/bucket:Bucket', did you mean 'name'?"
        );
        assert!(diagnostic.detail.starts_with("Existing properties are: name"));
        assert_eq!(
            diagnostic.range.as_ref().map(ToString::to_string).as_deref(),
            Some("6:7")
        );
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn property_type_mismatches() {
        let template = template!(
            r#"
resources:
  bucket:
    type: cloud:storage:Bucket
    properties:
      size: large
      acl: public
      versioned: [true]
  object:
    type: cloud:storage:Object
    properties:
      bucket: ${bucket}
"#
        );

        let (_, diags) = check(&template);
        assert_eq!(
            diags.summaries(),
            vec![
                "acl: Cannot assign type 'string' to type 'cloud:storage/Acl:Acl'",
                "versioned: Cannot assign 'List<boolean>' to 'boolean'",
                "size: Cannot assign type 'string' to type 'integer'",
                "Missing required property 'key'",
            ]
        );
        assert!(diags
            .iter()
            .next()
            .unwrap()
            .detail
            .contains(r#"Allowed values are Private ("private"), PublicRead ("public-read")"#));
    }

    #[test]
    fn nested_object_properties() {
        let template = template!(
            r#"
resources:
  bucket:
    type: cloud:storage:Bucket
    properties:
      website:
        errorDocument: 404.html
"#
        );

        assert_eq!(
            summaries(&template),
            vec!["Missing required property 'indexDocument'"]
        );
    }

    #[test]
    fn access_errors() {
        let template = template!(
            r#"
resources:
  net:
    type: cloud:Network
  cluster:
    type: cloud:compute:Cluster
    properties:
      network: ${net}
outputs:
  a: ${net.subnetId}
  b: ${cluster.id}
  c: ${net.cidrBlocks["first"]}
"#
        );

        let (typing, _) = check(&template);
        assert!(!typing.is_failed("net"));
        assert!(typing.output_failed("a"));
        assert_eq!(
            summaries(&template),
            vec![
                "subnetId does not exist on net, did you mean 'subnetIds'?",
                "id does not exist on cluster",
                "Cannot index via string into 'net.cidrBlocks' (type List<string>)",
            ]
        );
    }

    #[test]
    fn invoke_checks() {
        let template = template!(
            r#"
variables:
  zone:
    fn::invoke:
      function: cloud:getRegion
      arguments:
        name: eu
        zone: a
      return: zone
  quota:
    fn::invoke:
      function: cloud:getQuota
      return: limit
  bucket:
    fn::invoke:
      function: cloud:storage:getBucket
      arguments: {}
  missing:
    fn::invoke:
      function: cloud:getNothing
"#
        );

        let (typing, diags) = check(&template);
        assert_eq!(
            diags
                .iter()
                .map(|d| (d.severity, d.summary.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (
                    crate::diagnostics::Severity::Warning,
                    "zone does not exist on Invoke cloud:index:getRegion"
                ),
                (
                    crate::diagnostics::Severity::Error,
                    "zone does not exist on cloud:getRegion, did you mean 'zones'?"
                ),
                (
                    crate::diagnostics::Severity::Error,
                    "fn::invoke has a non-object return value"
                ),
                (
                    crate::diagnostics::Severity::Error,
                    "Missing required property 'name'"
                ),
                (
                    crate::diagnostics::Severity::Error,
                    r#"unable to find function "cloud:getNothing" in resource provider "cloud""#
                ),
            ]
        );
        assert_eq!(typing.variable("quota"), Some(&Type::Number));
        assert_eq!(
            typing.variable("bucket").map(ToString::to_string).as_deref(),
            Some("cloud:storage/getBucket:getBucketResult")
        );
    }

    #[test]
    fn missing_references_are_reported() {
        let template = template!(
            r#"
outputs:
  value: ${nothere.field}
"#
        );

        assert_eq!(
            summaries(&template),
            vec![r#"resource, variable, or config value "nothere" not found"#]
        );
    }

    #[test]
    fn builtin_arguments() {
        let template = template!(
            r#"
variables:
  picked:
    fn::select:
      - 1
      - [a, b]
  joined:
    fn::join:
      - 3
      - [a, b]
  parts:
    fn::split: [",", "a,b"]
"#
        );

        let (typing, diags) = check(&template);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(typing.variable("picked"), Some(&Type::String));
        assert_eq!(typing.variable("joined"), Some(&Type::String));
        assert_eq!(typing.variable("parts"), Some(&Type::array(Type::String)));
    }

    #[test]
    fn config_types() {
        let template = template!(
            r#"
name: app
config:
  zones:
    type: Lst<String>
  port:
    type: Number
    default: eighty
  count:
    type: Int
  tags:
    type: List<String>
"#
        );

        let mut stack = StackConfig::default();
        stack.set("app:count", serde_yaml::Value::String("4.5".to_string()));
        stack.set("tags", serde_yaml::from_str("[a, b]").unwrap());
        stack.set("extra", serde_yaml::from_str("[1, 2]").unwrap());

        let (typing, diags) = check_with(&template, &stack);
        assert_eq!(
            diags.summaries(),
            vec![
                "unexpected configuration type 'Lst<String>': valid types are String, List<String>, \
                 Number, List<Number>, Int, List<Int>, Boolean, List<Boolean>",
                "number is not assignable from string",
                r#"config key "count" cannot have conflicting types Int, String"#,
            ]
        );
        assert_eq!(typing.config("tags").map(Type::unwrap_input), Some(&Type::array(Type::String)));
        assert_eq!(typing.config("extra").map(Type::unwrap_input), Some(&Type::array(Type::Int)));
    }

    #[test]
    fn resource_options() {
        let template = template!(
            r#"
resources:
  net:
    type: cloud:Network
    options:
      protect: "yes"
      ignoreChanges: [cidrBlocks]
      aliases:
        - urn:old
        - name: old-net
          noParent: "no"
  other:
    type: cloud:Network
    options:
      aliases: [3]
      parent: ${net}
"#
        );

        assert_eq!(
            summaries(&template),
            vec![
                "alias field 'noParent' must be a boolean",
                "boolean is not assignable from string",
                "aliases[0] must be a string or object",
            ]
        );
    }

    #[test]
    fn unresolved_resource_types() {
        let template = template!(
            r#"
resources:
  thing:
    type: cloud:storage:Missing
  other:
    type: elsewhere:index:Thing
outputs:
  id: ${thing.whatever}
"#
        );

        assert_eq!(
            summaries(&template),
            vec![
                r#"error resolving type of resource thing: unable to find resource type "cloud:storage:Missing" in resource provider "cloud""#,
                r#"error resolving type of resource other: resource provider "elsewhere" not found"#,
            ]
        );
    }
}
