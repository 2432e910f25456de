//! loading templates from YAML (or JSON) documents
//!
//! Each declaration kind lists the field names it accepts. Unknown fields are reported as warnings with a
//! suggestion, fields that only differ in letter case are accepted with a warning.
use super::access::{parse_string, ParsedString};
use super::expr::{AssetKind, Builtin, Expr, ExprKind, Invoke, InvokeOptions, ObjectProperty};
use super::marks::Marks;
use super::template::{
    ConfigParam, GetResource, OutputDecl, ProjectSettings, PropertyEntry, Resource, ResourceDecl,
    ResourceOptions, Template, Variable,
};
use crate::diagnostics::{unexpected_casing, Diagnostic, Diagnostics, FieldFormatter, Range};
use indexmap::IndexMap;
use serde_yaml::Value;
use std::path::Path;
use std::sync::Arc;

const TEMPLATE_FIELDS: &[&str] = &[
    "name",
    "runtime",
    "description",
    "pulumi",
    "config",
    "configuration",
    "variables",
    "resources",
    "outputs",
];
const CONFIG_FIELDS: &[&str] = &["type", "default", "secret"];
const RESOURCE_FIELDS: &[&str] = &["type", "defaultProvider", "properties", "options", "get"];
const GET_FIELDS: &[&str] = &["id", "state"];
const INVOKE_FIELDS: &[&str] = &["function", "arguments", "options", "return"];
const INVOKE_OPTION_FIELDS: &[&str] = &[
    "parent",
    "provider",
    "dependsOn",
    "version",
    "pluginDownloadURL",
];

const BUILTINS: &[&str] = &[
    "fn::invoke",
    "fn::join",
    "fn::split",
    "fn::select",
    "fn::toJSON",
    "fn::toBase64",
    "fn::fromBase64",
    "fn::secret",
    "fn::readFile",
    "fn::rfc3339ToUnix",
    "fn::stackReference",
    "fn::stringAsset",
    "fn::fileAsset",
    "fn::remoteAsset",
    "fn::fileArchive",
    "fn::remoteArchive",
    "fn::assetArchive",
];

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse yaml document")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("A template must be a mapping at the top level")]
    NotAMapping,
}

/// Loads a template file, diagnostics name the file as it was given
pub fn load_file(path: &Path) -> Result<(Template, Diagnostics), LoadError> {
    let filename: Arc<str> = Arc::from(path.display().to_string());
    let path = path.canonicalize()?;
    tracing::info!(path=%path.display(), "loading template");

    let contents = std::fs::read_to_string(&path)?;
    load_source(&contents, Some(filename))
}

pub fn load_str(source: &str) -> Result<(Template, Diagnostics), LoadError> {
    load_source(source, None)
}

fn load_source(
    source: &str,
    filename: Option<Arc<str>>,
) -> Result<(Template, Diagnostics), LoadError> {
    let value: Value = serde_yaml::from_str(source)?;
    let marks = Marks::parse(source, filename).unwrap_or_else(|error| {
        tracing::debug!(%error, "source positions unavailable");
        Marks::default()
    });
    template_from_node(Node {
        value: &value,
        marks: &marks,
    })
}

/// Reads a template from an already parsed document, without source ranges
pub fn template_from_value(value: &Value) -> Result<(Template, Diagnostics), LoadError> {
    template_from_node(Node::unmarked(value))
}

fn template_from_node(node: Node) -> Result<(Template, Diagnostics), LoadError> {
    if !matches!(node.value, Value::Mapping(_)) {
        return Err(LoadError::NotAMapping);
    }

    let mut loader = Loader::default();
    let template = loader.template(node);
    Ok((template, loader.diags))
}

/// Reads a single expression
pub fn expr_from_value(value: &Value) -> (Expr, Diagnostics) {
    let mut loader = Loader::default();
    let expr = loader.expr(Node::unmarked(value));
    (expr, loader.diags)
}

/// Utility macro to create a [Template] from YAML source
///
/// ```
/// # use yamlform::template;
/// let template = template!("
/// resources:
///   bucket:
///     type: aws:s3:Bucket
/// ");
/// assert_eq!(template.resources[0].name, "bucket");
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use yamlform::template;
/// template!("- not a mapping");
/// ```
#[macro_export]
macro_rules! template {
    { $source:expr } => {{
        let (template, diags) = $crate::ast::load_str($source).expect("template must load");
        assert!(!diags.has_errors(), "template has errors: {diags}");
        template
    }};
}

/// A YAML value with the marks of where it was written
#[derive(Clone, Copy)]
struct Node<'a> {
    value: &'a Value,
    marks: &'a Marks,
}

impl<'a> Node<'a> {
    fn unmarked(value: &'a Value) -> Self {
        Node {
            value,
            marks: Marks::unmarked(),
        }
    }

    fn range(&self) -> Option<&'a Range> {
        self.marks.range.as_ref()
    }

    /// Keys and values, `None` unless this is a mapping
    fn entries(&self) -> Option<Vec<(Node<'a>, Node<'a>)>> {
        let Value::Mapping(mapping) = self.value else {
            return None;
        };
        let marks = self.marks;
        Some(
            mapping
                .iter()
                .enumerate()
                .map(|(index, (key, value))| {
                    let (key_marks, value_marks) = marks.entry(index);
                    (
                        Node {
                            value: key,
                            marks: key_marks,
                        },
                        Node {
                            value,
                            marks: value_marks,
                        },
                    )
                })
                .collect(),
        )
    }

    fn items(&self) -> Option<Vec<Node<'a>>> {
        let Value::Sequence(items) = self.value else {
            return None;
        };
        let marks = self.marks;
        Some(
            items
                .iter()
                .enumerate()
                .map(|(index, value)| Node {
                    value,
                    marks: marks.item(index),
                })
                .collect(),
        )
    }

    fn located(&self, expr: Expr) -> Expr {
        match self.range() {
            Some(range) => expr.at(range.clone()),
            None => expr,
        }
    }
}

#[derive(Default)]
struct Loader {
    diags: Diagnostics,
}

impl Loader {
    fn error(&mut self, summary: impl Into<String>, range: Option<&Range>) {
        self.diags.push(Diagnostic::error(summary).with_range(range));
    }

    /// Picks the known `fields` out of a mapping
    fn record<'a>(
        &mut self,
        object: &str,
        node: Node<'a>,
        fields: &[&'static str],
    ) -> IndexMap<&'static str, Node<'a>> {
        let mut record = IndexMap::new();

        for (key_node, value) in node.entries().unwrap_or_default() {
            let Some(key) = key_node.value.as_str() else {
                self.error(format!("keys of '{object}' must be strings"), key_node.range());
                continue;
            };

            if let Some(field) = fields.iter().find(|field| **field == key) {
                record.insert(*field, value);
            } else if let Some(field) = fields.iter().find(|field| field.eq_ignore_ascii_case(key)) {
                self.diags
                    .push(unexpected_casing(key_node.range(), field, key));
                record.insert(*field, value);
            } else {
                let formatter = FieldFormatter::new(
                    format!("'{object}'"),
                    fields.iter().map(|field| field.to_string()).collect(),
                );
                let mut summary = format!("Object '{object}' has no field named '{key}'");
                if let Some(suggestion) = formatter.suggestion(key) {
                    summary.push_str(&format!(", did you mean '{suggestion}'?"));
                }
                self.diags.push(
                    Diagnostic::warning(summary)
                        .with_detail(format!("available fields are: {}", fields.join(", ")))
                        .with_range(key_node.range()),
                );
            }
        }

        record
    }

    fn template(&mut self, node: Node) -> Template {
        let mut template = Template::default();

        for (field, value) in self.record("template", node, TEMPLATE_FIELDS) {
            match field {
                "name" => template.name = self.string(value, "name"),
                "runtime" => template.runtime = self.string(value, "runtime"),
                "description" => template.description = self.string(value, "description"),
                "pulumi" => template.settings = self.settings(value),
                "config" | "configuration" => {
                    for (name, range, value) in self.named_entries(value, field) {
                        template.config.push(self.config_param(name, range, value));
                    }
                }
                "variables" => {
                    for (name, range, value) in self.named_entries(value, field) {
                        let value = self.expr(value);
                        template.variables.push(Variable { name, range, value });
                    }
                }
                "resources" => {
                    for (name, range, value) in self.named_entries(value, field) {
                        if let Some(resource) = self.resource(name, range, value) {
                            template.resources.push(resource);
                        }
                    }
                }
                "outputs" => {
                    for (name, range, value) in self.named_entries(value, field) {
                        let value = self.expr(value);
                        template.outputs.push(OutputDecl { name, range, value });
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(
            config = template.config.len(),
            variables = template.variables.len(),
            resources = template.resources.len(),
            outputs = template.outputs.len(),
            "template loaded"
        );
        template
    }

    /// Entries of a section with their names and the range of each name
    fn named_entries<'a>(
        &mut self,
        node: Node<'a>,
        section: &str,
    ) -> Vec<(String, Option<Range>, Node<'a>)> {
        let Some(entries) = node.entries() else {
            if !node.value.is_null() {
                self.error(format!("{section} must be an object"), node.range());
            }
            return vec![];
        };

        let mut named = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match key.value.as_str() {
                Some(name) => named.push((name.to_string(), key.range().cloned(), value)),
                None => self.error(format!("keys in {section} must be strings"), key.range()),
            }
        }
        named
    }

    fn string(&mut self, node: Node, what: &str) -> Option<String> {
        match node.value {
            Value::String(s) => Some(s.clone()),
            _ => {
                self.error(format!("{what} must be a string"), node.range());
                None
            }
        }
    }

    fn boolean(&mut self, node: Node, what: &str) -> bool {
        match node.value {
            Value::Bool(b) => *b,
            _ => {
                self.error(format!("{what} must be a boolean"), node.range());
                false
            }
        }
    }

    fn settings(&mut self, node: Node) -> Option<ProjectSettings> {
        if !matches!(node.value, Value::Mapping(_)) {
            self.error("pulumi must be an object", node.range());
            return None;
        }

        let record = self.record("pulumi", node, &["requiredVersion"]);
        Some(ProjectSettings {
            required_version: record.get("requiredVersion").map(|value| self.expr(*value)),
        })
    }

    fn config_param(&mut self, name: String, range: Option<Range>, node: Node) -> ConfigParam {
        let mut param = ConfigParam {
            name,
            range,
            type_name: None,
            default: None,
            secret: false,
        };

        if !matches!(node.value, Value::Mapping(_)) {
            // shorthand: a bare value is the default
            param.default = Some(self.expr(node));
            return param;
        }

        for (field, value) in self.record("config", node, CONFIG_FIELDS) {
            match field {
                "type" => {
                    param.type_name = self
                        .string(value, &format!("the type of config {}", param.name))
                        .map(|type_name| (type_name, value.range().cloned()))
                }
                "default" => param.default = Some(self.expr(value)),
                "secret" => param.secret = self.boolean(value, "secret"),
                _ => {}
            }
        }

        param
    }

    fn resource(&mut self, name: String, range: Option<Range>, node: Node) -> Option<Resource> {
        if !matches!(node.value, Value::Mapping(_)) {
            self.error(format!("resource {name} must be an object"), node.range());
            return None;
        }

        let record = self.record("resource", node, RESOURCE_FIELDS);
        let mut decl = ResourceDecl::default();

        match record.get("type") {
            Some(value) => {
                decl.type_token = self
                    .string(*value, &format!("the type of resource {name}"))
                    .unwrap_or_default();
                decl.type_range = value.range().cloned();
            }
            None => self.error(
                format!("resource {name} is missing required field 'type'"),
                range.as_ref(),
            ),
        }

        if let Some(value) = record.get("defaultProvider") {
            decl.default_provider = self.boolean(*value, "defaultProvider");
        }
        if let Some(value) = record.get("properties") {
            decl.properties = self.property_entries(*value, "properties");
        }
        if let Some(value) = record.get("options") {
            decl.options = self.resource_options(*value);
        }
        if let Some(value) = record.get("get") {
            decl.get = self.get_resource(*value);
        }

        if record.contains_key("properties") && record.contains_key("get") {
            self.error(
                "Resource fields properties and get are mutually exclusive",
                range.as_ref(),
            );
        }

        Some(Resource { name, range, decl })
    }

    fn property_entries(&mut self, node: Node, section: &str) -> Vec<PropertyEntry> {
        self.named_entries(node, section)
            .into_iter()
            .map(|(key, key_range, value)| PropertyEntry {
                key,
                key_range,
                value: self.expr(value),
            })
            .collect()
    }

    fn resource_options(&mut self, node: Node) -> ResourceOptions {
        let mut options = ResourceOptions::default();
        if !matches!(node.value, Value::Mapping(_)) {
            self.error("options must be an object", node.range());
            return options;
        }

        for (field, value) in self.record("options", node, ResourceOptions::FIELDS) {
            let expr = self.expr(value);
            if let Some(slot) = options.slot_mut(field) {
                *slot = Some(expr);
            }
        }
        options
    }

    fn get_resource(&mut self, node: Node) -> Option<GetResource> {
        if !matches!(node.value, Value::Mapping(_)) {
            self.error("get must be an object", node.range());
            return None;
        }

        let record = self.record("get", node, GET_FIELDS);
        let Some(id) = record.get("id") else {
            self.error("get is missing required field 'id'", node.range());
            return None;
        };

        Some(GetResource {
            id: self.expr(*id),
            state: record
                .get("state")
                .map(|state| self.property_entries(*state, "state"))
                .unwrap_or_default(),
        })
    }

    fn expr(&mut self, node: Node) -> Expr {
        let expr = match node.value {
            Value::Null => Expr::null(),
            Value::Bool(b) => Expr::bool(*b),
            Value::Number(n) => Expr::number(n.as_f64().unwrap_or_default()),
            Value::String(s) => self.string_expr(s, node.range()),
            Value::Sequence(_) => Expr::list(
                node.items()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|item| self.expr(item))
                    .collect(),
            ),
            Value::Mapping(_) => self.mapping_expr(node),
            Value::Tagged(tagged) => {
                self.error(
                    format!("YAML tags are not supported ({})", tagged.tag),
                    node.range(),
                );
                Expr::null()
            }
        };
        node.located(expr)
    }

    fn string_expr(&mut self, source: &str, range: Option<&Range>) -> Expr {
        match parse_string(source) {
            Ok(ParsedString::Literal(text)) => Expr::string(text),
            Ok(ParsedString::Symbol(access)) => Expr::symbol(access),
            Ok(ParsedString::Interpolate(parts)) => Expr::new(ExprKind::Interpolate(parts)),
            Err(message) => {
                self.diags.push(
                    Diagnostic::error(message)
                        .with_detail(format!("in {source:?}"))
                        .with_range(range),
                );
                Expr::string(source)
            }
        }
    }

    fn mapping_expr(&mut self, node: Node) -> Expr {
        let entries = node.entries().unwrap_or_default();
        if let [(key, value)] = entries.as_slice() {
            if let Value::String(name) = key.value {
                let reserved = name
                    .get(..4)
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case("fn::"));
                if reserved {
                    if let Some(expr) = self.builtin(name, *key, *value) {
                        return expr;
                    }
                }
            }
        }

        self.object_expr(entries)
    }

    fn object_expr(&mut self, entries: Vec<(Node, Node)>) -> Expr {
        Expr::new(ExprKind::Object(
            entries
                .into_iter()
                .map(|(key, value)| ObjectProperty {
                    key: self.expr(key),
                    value: self.expr(value),
                })
                .collect(),
        ))
    }

    /// `None` when `name` is not a function, the entry is then read as a plain object
    fn builtin(&mut self, name: &str, key: Node, value: Node) -> Option<Expr> {
        let Some(builtin) = BUILTINS.iter().find(|builtin| builtin.eq_ignore_ascii_case(name)) else {
            if let Some(token) = invoke_shorthand(name) {
                return Some(
                    self.invoke_shorthand(name, token, key, value)
                        .map(|invoke| Expr::builtin(Builtin::Invoke(invoke)))
                        .unwrap_or_else(Expr::null),
                );
            }

            self.diags.push(
                Diagnostic::warning("'fn::' is a reserved prefix")
                    .with_detail(format!("'{name}' is not a known function"))
                    .with_range(key.range()),
            );
            return None;
        };

        if *builtin != name {
            self.diags
                .push(unexpected_casing(key.range(), builtin, name));
        }

        Some(
            self.builtin_call(builtin, value)
                .map(Expr::builtin)
                .unwrap_or_else(Expr::null),
        )
    }

    fn builtin_call(&mut self, name: &str, node: Node) -> Option<Builtin> {
        let asset = |kind, loader: &mut Self| Builtin::Asset {
            kind,
            source: loader.expr(node),
        };

        Some(match name {
            "fn::invoke" => Builtin::Invoke(self.invoke(node)?),
            "fn::join" => {
                let (delimiter, values) = self.pair(name, node)?;
                Builtin::Join { delimiter, values }
            }
            "fn::split" => {
                let (delimiter, source) = self.pair(name, node)?;
                Builtin::Split { delimiter, source }
            }
            "fn::select" => {
                let (index, values) = self.pair(name, node)?;
                Builtin::Select { index, values }
            }
            "fn::stackReference" => {
                let (stack, property) = self.pair(name, node)?;
                let Some(stack_name) = stack.as_str() else {
                    self.error(
                        "the first argument to fn::stackReference must be a string literal",
                        stack.range.as_ref(),
                    );
                    return None;
                };
                Builtin::StackReference {
                    stack: stack_name.to_string(),
                    property,
                }
            }
            "fn::toJSON" => Builtin::ToJson(self.expr(node)),
            "fn::toBase64" => Builtin::ToBase64(self.expr(node)),
            "fn::fromBase64" => Builtin::FromBase64(self.expr(node)),
            "fn::secret" => Builtin::Secret(self.expr(node)),
            "fn::readFile" => Builtin::ReadFile(self.expr(node)),
            "fn::rfc3339ToUnix" => Builtin::Rfc3339ToUnix(self.expr(node)),
            "fn::stringAsset" => asset(AssetKind::StringAsset, self),
            "fn::fileAsset" => asset(AssetKind::FileAsset, self),
            "fn::remoteAsset" => asset(AssetKind::RemoteAsset, self),
            "fn::fileArchive" => asset(AssetKind::FileArchive, self),
            "fn::remoteArchive" => asset(AssetKind::RemoteArchive, self),
            "fn::assetArchive" => self.asset_archive(node)?,
            _ => return None,
        })
    }

    fn pair(&mut self, name: &str, node: Node) -> Option<(Expr, Expr)> {
        match node.items().as_deref() {
            Some([first, second]) => Some((self.expr(*first), self.expr(*second))),
            _ => {
                self.error(
                    format!("the argument to {name} must be a two-valued list"),
                    node.range(),
                );
                None
            }
        }
    }

    fn invoke(&mut self, node: Node) -> Option<Invoke> {
        if !matches!(node.value, Value::Mapping(_)) {
            self.error(
                "the argument to fn::invoke must be an object containing 'function', 'arguments', 'options', and 'return'",
                node.range(),
            );
            return None;
        }

        let record = self.record("invoke", node, INVOKE_FIELDS);

        let Some(function) = record.get("function") else {
            self.error("missing function name ('function')", node.range());
            return None;
        };
        let token = match function.value {
            Value::String(token) if matches!(parse_string(token), Ok(ParsedString::Literal(_))) => {
                token.clone()
            }
            _ => {
                self.error("function name must be a string literal", function.range());
                return None;
            }
        };

        let mut invoke = Invoke {
            token,
            token_range: function.range().cloned(),
            arguments: None,
            options: InvokeOptions::default(),
            return_field: None,
        };

        if let Some(arguments) = record.get("arguments") {
            invoke.arguments = self.invoke_arguments("fn::invoke", *arguments);
        }

        if let Some(options) = record.get("options") {
            if matches!(options.value, Value::Mapping(_)) {
                for (field, value) in self.record("invoke options", *options, INVOKE_OPTION_FIELDS) {
                    let expr = Some(self.expr(value));
                    match field {
                        "parent" => invoke.options.parent = expr,
                        "provider" => invoke.options.provider = expr,
                        "dependsOn" => invoke.options.depends_on = expr,
                        "version" => invoke.options.version = expr,
                        "pluginDownloadURL" => invoke.options.plugin_download_url = expr,
                        _ => {}
                    }
                }
            } else {
                self.error("the options of fn::invoke must be an object", options.range());
            }
        }

        if let Some(return_field) = record.get("return") {
            match return_field.value {
                Value::String(field) => {
                    invoke.return_field = Some((field.clone(), return_field.range().cloned()))
                }
                _ => self.error(
                    "the return value of fn::invoke must be a string literal",
                    return_field.range(),
                ),
            }
        }

        Some(invoke)
    }

    fn invoke_shorthand(&mut self, name: &str, token: &str, key: Node, value: Node) -> Option<Invoke> {
        let arguments = if value.value.is_null() {
            None
        } else {
            Some(self.invoke_arguments(name, value)?)
        };

        Some(Invoke {
            token: token.to_string(),
            token_range: key.range().cloned(),
            arguments,
            options: InvokeOptions::default(),
            return_field: None,
        })
    }

    fn invoke_arguments(&mut self, name: &str, node: Node) -> Option<Expr> {
        match node.entries() {
            Some(arguments) => {
                let arguments = self.object_expr(arguments);
                Some(node.located(arguments))
            }
            None => {
                self.error(
                    format!("the arguments to {name} must be an object"),
                    node.range(),
                );
                None
            }
        }
    }

    fn asset_archive(&mut self, node: Node) -> Option<Builtin> {
        let Some(entries) = node.entries() else {
            self.error("the argument to fn::assetArchive must be an object", node.range());
            return None;
        };

        let mut archive = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let name = match key.value {
                Value::String(name) if matches!(parse_string(name), Ok(ParsedString::Literal(_))) => {
                    name.clone()
                }
                _ => {
                    self.error(
                        "keys in fn::assetArchive arguments must be string literals",
                        key.range(),
                    );
                    continue;
                }
            };

            let expr = self.expr(value);
            let is_asset = matches!(
                &expr.kind,
                ExprKind::Builtin(builtin)
                    if matches!(**builtin, Builtin::Asset { .. } | Builtin::AssetArchive(_))
            );
            if !is_asset {
                self.error(
                    format!("the value of '{name}' in fn::assetArchive must be an asset or an archive"),
                    value.range(),
                );
                continue;
            }

            archive.push((name, expr));
        }

        Some(Builtin::AssetArchive(archive))
    }
}

/// `fn::pkg:module(:name)` is shorthand for invoking `pkg:module(:name)`
fn invoke_shorthand(key: &str) -> Option<&str> {
    let token = key.get(4..)?;
    let parts: Vec<&str> = token.split(':').collect();
    let well_formed = matches!(parts.len(), 2 | 3) && parts.iter().all(|part| !part.is_empty());
    well_formed.then_some(token)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::access::Accessor;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> (Expr, Diagnostics) {
        expr_from_value(&serde_yaml::from_str(source).unwrap())
    }

    fn builtin(expr: &Expr) -> &Builtin {
        match &expr.kind {
            ExprKind::Builtin(builtin) => builtin,
            other => panic!("not a builtin: {other:?}"),
        }
    }

    #[test]
    fn full_template() {
        let (template, diags) = load_str(
            r#"
name: website
runtime: yaml
config:
  region:
    type: String
    default: us-east-1
  replicas: 3
variables:
  prefix: ${pulumi.stack}-site
resources:
  bucket:
    type: aws:s3:Bucket
    properties:
      acl: private
    options:
      protect: true
      dependsOn:
        - ${logs}
  logs:
    type: aws:s3:Bucket
outputs:
  url: ${bucket.websiteEndpoint}
"#,
        )
        .unwrap();

        assert!(diags.is_empty(), "{diags}");
        assert_eq!(template.project_name(), "website");
        assert_eq!(template.config.len(), 2);
        assert_eq!(
            template.config[0].type_name.as_ref().map(|(t, _)| t.as_str()),
            Some("String")
        );
        assert!(template.config[1].default.is_some());
        assert_eq!(template.variables[0].name, "prefix");
        assert!(matches!(
            template.variables[0].value.kind,
            ExprKind::Interpolate(_)
        ));

        let bucket = &template.resources[0];
        assert_eq!(bucket.decl.type_token, "aws:s3:Bucket");
        assert_eq!(bucket.decl.properties[0].key, "acl");
        let options: Vec<&str> = bucket.decl.options.iter().map(|(name, _)| name).collect();
        assert_eq!(options, vec!["dependsOn", "protect"]);
        assert_eq!(template.outputs[0].name, "url");
    }

    fn rendered(range: Option<&Range>) -> Option<String> {
        range.map(ToString::to_string)
    }

    #[test]
    fn declarations_and_expressions_carry_ranges() {
        let (template, diags) = load_source(
            r#"
variables:
  prefix: site
resources:
  bucket:
    type: aws:s3:Bucket
    properties:
      acl: ${policy.acl}
      tags: [a, '${prefix}']
"#,
            Some(Arc::from("main.yaml")),
        )
        .unwrap();
        assert!(diags.is_empty(), "{diags}");

        assert_eq!(
            rendered(template.variables[0].range.as_ref()).as_deref(),
            Some("main.yaml:3:3")
        );
        let bucket = &template.resources[0];
        assert_eq!(rendered(bucket.range.as_ref()).as_deref(), Some("main.yaml:5:3"));
        assert_eq!(
            rendered(bucket.decl.type_range.as_ref()).as_deref(),
            Some("main.yaml:6:11")
        );

        let acl = &bucket.decl.properties[0];
        assert_eq!(rendered(acl.key_range.as_ref()).as_deref(), Some("main.yaml:8:7"));
        assert_eq!(rendered(acl.value.range.as_ref()).as_deref(), Some("main.yaml:8:12"));

        let ExprKind::List(tags) = &bucket.decl.properties[1].value.kind else {
            panic!("expected a list");
        };
        assert_eq!(rendered(tags[1].range.as_ref()).as_deref(), Some("main.yaml:9:17"));
    }

    #[test]
    fn loader_diagnostics_point_at_the_source() {
        let (_, diags) = load_source(
            r#"
resources:
  bucket:
    type: aws:s3:Bucket
    propertes: {}
variables:
  broken: ${a
"#,
            Some(Arc::from("main.yaml")),
        )
        .unwrap();

        let rendered: Vec<String> = diags.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "main.yaml:5:5: warning: Object 'resource' has no field named 'propertes', did you mean 'properties'?; available fields are: type, defaultProvider, properties, options, get",
                r#"main.yaml:7:11: error: unterminated interpolation; in "${a""#,
            ]
        );
    }

    #[test]
    fn unknown_and_miscased_fields() {
        let (template, diags) = load_str(
            r#"
Resources:
  bucket:
    type: aws:s3:Bucket
    propertes:
      acl: private
"#,
        )
        .unwrap();

        assert_eq!(template.resources.len(), 1);
        assert_eq!(
            diags.summaries(),
            vec![
                "'Resources' looks like a miscapitalization of 'resources'",
                "Object 'resource' has no field named 'propertes', did you mean 'properties'?",
            ]
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn properties_and_get_are_exclusive() {
        let (_, diags) = load_str(
            r#"
resources:
  existing:
    type: aws:s3:Bucket
    properties: {}
    get:
      id: bucket-1234
"#,
        )
        .unwrap();

        assert_eq!(
            diags.summaries(),
            vec!["Resource fields properties and get are mutually exclusive"]
        );
    }

    #[test]
    fn builtins() {
        let (join, diags) = expr("fn::join: ['-', [a, b]]");
        assert!(diags.is_empty());
        assert!(matches!(builtin(&join), Builtin::Join { .. }));

        let (select, diags) = expr("fn::Select: [1, [a, b]]");
        assert!(matches!(builtin(&select), Builtin::Select { .. }));
        assert_eq!(
            diags.summaries(),
            vec!["'fn::Select' looks like a miscapitalization of 'fn::select'"]
        );

        let (reference, _) = expr("fn::stackReference: [other-stack, bucketName]");
        let Builtin::StackReference { stack, .. } = builtin(&reference) else {
            panic!("expected stack reference");
        };
        assert_eq!(stack, "other-stack");
    }

    #[test]
    fn builtin_argument_errors() {
        let (_, diags) = expr("fn::join: [a, b, c]");
        assert_eq!(
            diags.summaries(),
            vec!["the argument to fn::join must be a two-valued list"]
        );

        let (_, diags) = expr("fn::invoke: { arguments: {} }");
        assert_eq!(diags.summaries(), vec!["missing function name ('function')"]);

        let (_, diags) = expr("fn::invoke: { function: '${x}' }");
        assert_eq!(diags.summaries(), vec!["function name must be a string literal"]);

        let (_, diags) = expr("fn::assetArchive: { '${x}': { fn::stringAsset: hi } }");
        assert_eq!(
            diags.summaries(),
            vec!["keys in fn::assetArchive arguments must be string literals"]
        );
    }

    #[test]
    fn invoke_forms() {
        let (invoke, diags) = expr(
            r#"
fn::invoke:
  function: aws:index:getAmi
  arguments:
    owners: [amazon]
  return: id
"#,
        );
        assert!(diags.is_empty());
        let Builtin::Invoke(invoke) = builtin(&invoke) else {
            panic!("expected invoke");
        };
        assert_eq!(invoke.token, "aws:index:getAmi");
        assert_eq!(invoke.return_field.as_ref().map(|(f, _)| f.as_str()), Some("id"));
        assert_eq!(invoke.arguments.as_ref().and_then(Expr::as_object).map(<[_]>::len), Some(1));

        let (shorthand, diags) = expr("fn::aws:ec2:getVpc: { default: true }");
        assert!(diags.is_empty());
        let Builtin::Invoke(invoke) = builtin(&shorthand) else {
            panic!("expected invoke");
        };
        assert_eq!(invoke.token, "aws:ec2:getVpc");
    }

    #[test]
    fn reserved_prefix_is_a_plain_object() {
        let (object, diags) = expr("fn::unknown: 1");
        assert!(matches!(object.kind, ExprKind::Object(_)));
        assert_eq!(diags.summaries(), vec!["'fn::' is a reserved prefix"]);
    }

    #[test]
    fn interpolation_errors_are_reported() {
        let (symbol, diags) = expr("'${a.b[0]}'");
        assert!(diags.is_empty());
        let ExprKind::Symbol(access) = &symbol.kind else {
            panic!("expected symbol");
        };
        assert_eq!(access.accessors[2], Accessor::Index(0));

        let (_, diags) = expr("'${a'");
        assert_eq!(diags.summaries(), vec!["unterminated interpolation"]);
    }
}
