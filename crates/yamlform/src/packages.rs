//! package resolution
//!
//! A type token in a template (`cloud:storage:Bucket`) is resolved against the package named by its first
//! segment. Candidates are tried in order:
//!
//! 1. the token as written
//! 2. `pkg:name` expanded to `pkg:index:name`
//! 3. `pkg:mod:Name` expanded to `pkg:mod/name:Name` (lower camel case module member)
//!
//! `pulumi:providers:pkg` names the provider resource of `pkg`.
use crate::ast::{Builtin, Expr, ExprKind, Template};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{
    EnumMember, EnumType, FunctionType, ObjectType, Property, ResourceType, TokenType, Type,
};
use crate::visit::WalkExpressions;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const PROVIDER_PREFIX: &str = "pulumi:providers:";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("invalid type token {0:?}")]
    InvalidToken(String),
    #[error("resource provider {0:?} not found")]
    PackageNotFound(String),
    #[error("unable to find resource type {token:?} in resource provider {package:?}")]
    ResourceNotFound { token: String, package: String },
    #[error("unable to find function {token:?} in resource provider {package:?}")]
    FunctionNotFound { token: String, package: String },
    #[error("unable to load schema for package {name:?}: {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// Schema of one package
pub trait Package: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> Option<&str>;
    /// Exact lookup by canonical token
    fn resource(&self, token: &str) -> Option<Arc<ResourceType>>;
    /// Exact lookup by canonical token
    fn function(&self, token: &str) -> Option<Arc<FunctionType>>;
    fn provider(&self) -> Arc<ResourceType>;
}

pub trait PackageLoader: Send + Sync {
    fn load(&self, name: &str, version: Option<&str>) -> Result<Arc<dyn Package>, ResolveError>;
}

/// Package named by a type token
pub fn package_name(token: &str) -> Result<&str, ResolveError> {
    if let Some(package) = token.strip_prefix(PROVIDER_PREFIX) {
        return Ok(package);
    }

    match token.split_once(':') {
        Some((package, _)) if !package.is_empty() => Ok(package),
        _ => Err(ResolveError::InvalidToken(token.to_string())),
    }
}

pub fn is_provider_token(token: &str) -> bool {
    token.starts_with(PROVIDER_PREFIX)
}

/// Candidate canonical tokens, most specific first
fn candidates(token: &str) -> Result<Vec<String>, ResolveError> {
    let parts: Vec<&str> = token.split(':').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(ResolveError::InvalidToken(token.to_string()));
    }

    match parts.as_slice() {
        [package, name] => Ok(vec![token.to_string(), format!("{package}:index:{name}")]),
        [package, module, name] if !module.contains('/') => Ok(vec![
            token.to_string(),
            format!("{package}:{module}/{}:{name}", lower_camel(name)),
        ]),
        [_, _, _] => Ok(vec![token.to_string()]),
        _ => Err(ResolveError::InvalidToken(token.to_string())),
    }
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn resolve_resource(
    package: &dyn Package,
    token: &str,
) -> Result<Arc<ResourceType>, ResolveError> {
    if is_provider_token(token) {
        return Ok(package.provider());
    }

    for candidate in candidates(token)? {
        if let Some(resource) = package.resource(&candidate) {
            tracing::trace!(%token, %candidate, "resolved resource type");
            return Ok(resource);
        }
    }

    Err(ResolveError::ResourceNotFound {
        token: token.to_string(),
        package: package.name().to_string(),
    })
}

pub fn resolve_function(
    package: &dyn Package,
    token: &str,
) -> Result<Arc<FunctionType>, ResolveError> {
    for candidate in candidates(token)? {
        if let Some(function) = package.function(&candidate) {
            tracing::trace!(%token, %candidate, "resolved function");
            return Ok(function);
        }
    }

    Err(ResolveError::FunctionNotFound {
        token: token.to_string(),
        package: package.name().to_string(),
    })
}

/// In-memory set of loaded packages, one version per package
#[derive(Default, Clone)]
pub struct PackageMap {
    packages: IndexMap<String, Arc<dyn Package>>,
}

impl PackageMap {
    pub fn insert(&mut self, package: Arc<dyn Package>) {
        self.packages.insert(package.name().to_string(), package);
    }

    pub fn with(mut self, package: Arc<dyn Package>) -> Self {
        self.insert(package);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}

impl PackageLoader for PackageMap {
    fn load(&self, name: &str, _version: Option<&str>) -> Result<Arc<dyn Package>, ResolveError> {
        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::PackageNotFound(name.to_string()))
    }
}

/// Package schema document, as read from YAML or JSON
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub provider: Option<ResourceSpec>,
    #[serde(default)]
    pub resources: IndexMap<String, ResourceSpec>,
    #[serde(default)]
    pub functions: IndexMap<String, FunctionSpec>,
    #[serde(default)]
    pub types: IndexMap<String, TypeDefSpec>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default)]
    pub is_component: bool,
    #[serde(default)]
    pub input_properties: IndexMap<String, PropertySpec>,
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default)]
    pub properties: IndexMap<String, PropertySpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ObjectSpec {
    #[serde(default)]
    pub properties: IndexMap<String, PropertySpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    #[serde(default)]
    pub inputs: Option<ObjectSpec>,
    #[serde(default)]
    pub outputs: Option<ObjectSpec>,
    #[serde(default)]
    pub return_type: Option<TypeSpec>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSpec {
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub items: Option<Box<TypeSpec>>,
    #[serde(default)]
    pub additional_properties: Option<Box<TypeSpec>>,
    #[serde(default, rename = "$ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub one_of: Option<Vec<TypeSpec>>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PropertySpec {
    #[serde(flatten)]
    pub type_spec: TypeSpec,
    #[serde(default, rename = "const")]
    pub constant: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TypeDefSpec {
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub properties: IndexMap<String, PropertySpec>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<EnumValueSpec>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnumValueSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub value: serde_json::Value,
}

/// [Package] bound from a [PackageSpec]
#[derive(Debug)]
pub struct SchemaPackage {
    name: String,
    version: Option<String>,
    provider: Arc<ResourceType>,
    resources: HashMap<String, Arc<ResourceType>>,
    functions: HashMap<String, Arc<FunctionType>>,
}

impl SchemaPackage {
    pub fn new(spec: &PackageSpec) -> Self {
        let mut binder = Binder::new(spec);

        let provider_token = format!("{PROVIDER_PREFIX}{}", spec.name);
        let provider = match &spec.provider {
            Some(provider) => binder.resource(&provider_token, provider),
            None => ResourceType {
                token: provider_token,
                ..Default::default()
            },
        };

        let resources = spec
            .resources
            .iter()
            .map(|(token, resource)| (token.clone(), Arc::new(binder.resource(token, resource))))
            .collect();

        let functions = spec
            .functions
            .iter()
            .map(|(token, function)| (token.clone(), Arc::new(binder.function(token, function))))
            .collect();

        tracing::debug!(package = %spec.name, "package schema bound");
        Self {
            name: spec.name.clone(),
            version: spec.version.clone(),
            provider: Arc::new(provider),
            resources,
            functions,
        }
    }

    pub fn from_yaml(source: &str) -> Result<Self, ResolveError> {
        let spec: PackageSpec =
            serde_yaml::from_str(source).map_err(|e| ResolveError::InvalidSchema {
                name: "<unknown>".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(&spec))
    }
}

impl Package for SchemaPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn resource(&self, token: &str) -> Option<Arc<ResourceType>> {
        self.resources.get(token).cloned()
    }

    fn function(&self, token: &str) -> Option<Arc<FunctionType>> {
        self.functions.get(token).cloned()
    }

    fn provider(&self) -> Arc<ResourceType> {
        self.provider.clone()
    }
}

/// Turns type specs into [Type]s, memoizing named types
struct Binder<'a> {
    spec: &'a PackageSpec,
    bound: HashMap<String, Type>,
    in_progress: HashSet<String>,
}

impl<'a> Binder<'a> {
    fn new(spec: &'a PackageSpec) -> Self {
        Self {
            spec,
            bound: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    fn resource(&mut self, token: &str, spec: &ResourceSpec) -> ResourceType {
        ResourceType {
            token: token.to_string(),
            inputs: self.properties(&spec.input_properties, &spec.required_inputs),
            outputs: self.properties(&spec.properties, &spec.required),
            is_component: spec.is_component,
        }
    }

    fn function(&mut self, token: &str, spec: &FunctionSpec) -> FunctionType {
        let object = |spec: &Option<ObjectSpec>, suffix: &str, binder: &mut Self| {
            spec.as_ref().map(|object| {
                Arc::new(ObjectType::new(
                    format!("{token}{suffix}"),
                    binder.properties(&object.properties, &object.required),
                ))
            })
        };

        FunctionType {
            token: token.to_string(),
            inputs: object(&spec.inputs, "Args", self),
            outputs: object(&spec.outputs, "Result", self),
            return_type: spec.return_type.as_ref().map(|t| self.type_(t)),
        }
    }

    fn properties(
        &mut self,
        properties: &IndexMap<String, PropertySpec>,
        required: &[String],
    ) -> Vec<Property> {
        properties
            .iter()
            .map(|(name, spec)| Property {
                name: name.clone(),
                type_: self.type_(&spec.type_spec),
                required: required.contains(name),
                range: None,
                constant: spec.constant.clone(),
            })
            .collect()
    }

    fn type_(&mut self, spec: &TypeSpec) -> Type {
        if let Some(reference) = &spec.reference {
            return self.reference(reference);
        }
        if let Some(alternatives) = &spec.one_of {
            return Type::union(alternatives.iter().map(|t| self.type_(t)).collect::<Vec<_>>());
        }

        match spec.type_.as_deref() {
            Some("string") => Type::String,
            Some("number") => Type::Number,
            Some("integer") => Type::Int,
            Some("boolean") => Type::Bool,
            Some("array") => Type::array(
                spec.items
                    .as_ref()
                    .map(|items| self.type_(items))
                    .unwrap_or(Type::Any),
            ),
            Some("object") => Type::map(
                spec.additional_properties
                    .as_ref()
                    .map(|items| self.type_(items))
                    .unwrap_or(Type::Any),
            ),
            _ => Type::Any,
        }
    }

    fn reference(&mut self, reference: &str) -> Type {
        match reference {
            "pulumi.json#/Asset" => Type::Asset,
            "pulumi.json#/Archive" => Type::Archive,
            "pulumi.json#/Any" | "pulumi.json#/Json" => Type::Any,
            _ => {
                if let Some(token) = reference.strip_prefix("#/types/") {
                    self.named(token)
                } else if let Some(token) = reference.strip_prefix("#/resources/") {
                    Type::resource(token)
                } else {
                    Type::Any
                }
            }
        }
    }

    fn named(&mut self, token: &str) -> Type {
        if let Some(bound) = self.bound.get(token) {
            return bound.clone();
        }
        // recursive reference to a type still being bound
        if !self.in_progress.insert(token.to_string()) {
            return Type::Any;
        }

        let bound = match self.spec.types.get(token) {
            None => Type::Token(Arc::new(TokenType {
                token: token.to_string(),
                underlying: None,
            })),
            Some(def) => {
                let element = match def.type_.as_deref() {
                    Some("string") => Type::String,
                    Some("number") => Type::Number,
                    Some("integer") => Type::Int,
                    Some("boolean") => Type::Bool,
                    _ => Type::Any,
                };

                match &def.enum_values {
                    Some(values) => Type::Enum(Arc::new(EnumType {
                        token: token.to_string(),
                        element,
                        members: values.iter().filter_map(enum_member).collect(),
                    })),
                    None if def.type_.as_deref() == Some("object") => {
                        Type::Object(Arc::new(ObjectType::new(
                            token,
                            self.properties(&def.properties, &def.required),
                        )))
                    }
                    None => element,
                }
            }
        };

        self.in_progress.remove(token);
        self.bound.insert(token.to_string(), bound.clone());
        bound
    }
}

fn enum_member(spec: &EnumValueSpec) -> Option<EnumMember> {
    use crate::ast::Literal;

    let value = match &spec.value {
        serde_json::Value::String(s) => Literal::String(s.clone()),
        serde_json::Value::Number(n) => Literal::Number(n.as_f64()?),
        serde_json::Value::Bool(b) => Literal::Bool(*b),
        _ => return None,
    };

    Some(EnumMember {
        name: spec.name.clone(),
        value,
    })
}

/// A plugin a template needs, with the version it asks for
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PluginReference {
    pub package: String,
    pub version: Option<String>,
    pub download_url: Option<String>,
}

/// Plugins referenced by resources and invokes, in order of first use
pub fn referenced_plugins(template: &Template) -> (Vec<PluginReference>, Diagnostics) {
    let mut plugins: IndexMap<String, PluginReference> = IndexMap::new();
    let mut diags = Diagnostics::new();

    let mut reference = |token: &str, version: Option<&Expr>, url: Option<&Expr>| {
        let Ok(package) = package_name(token) else {
            return;
        };
        let version = version.and_then(Expr::as_str).map(str::to_string);
        let download_url = url.and_then(Expr::as_str).map(str::to_string);

        match plugins.get_mut(package) {
            None => {
                plugins.insert(
                    package.to_string(),
                    PluginReference {
                        package: package.to_string(),
                        version,
                        download_url,
                    },
                );
            }
            Some(existing) => {
                match (existing.version.clone(), version) {
                    (Some(declared), Some(version)) if declared != version => diags.push(
                        Diagnostic::error(format!(
                            "Provider {package} already declared with a conflicting version: {version}"
                        ))
                        .with_detail(format!("previously declared version: {declared}")),
                    ),
                    (None, Some(version)) => existing.version = Some(version),
                    _ => {}
                }
                if existing.download_url.is_none() {
                    existing.download_url = download_url;
                }
            }
        }
    };

    for resource in &template.resources {
        let options = &resource.decl.options;
        reference(
            &resource.decl.type_token,
            options.version.as_ref(),
            options.plugin_download_url.as_ref(),
        );
    }

    for expr in template.expressions() {
        expr.walk_post_order(&mut |expr: &Expr| {
            if let ExprKind::Builtin(builtin) = &expr.kind {
                if let Builtin::Invoke(invoke) = builtin.as_ref() {
                    reference(
                        &invoke.token,
                        invoke.options.version.as_ref(),
                        invoke.options.plugin_download_url.as_ref(),
                    );
                }
            }
        });
    }

    (plugins.into_values().collect(), diags)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::template;
    use pretty_assertions::assert_eq;

    pub(crate) const CLOUD_SCHEMA: &str = include_str!("../tests/schema/cloud.yaml");

    pub(crate) fn cloud_packages() -> PackageMap {
        let package = SchemaPackage::from_yaml(CLOUD_SCHEMA).expect("schema must load");
        PackageMap::default().with(Arc::new(package))
    }

    fn cloud() -> Arc<dyn Package> {
        cloud_packages().load("cloud", None).unwrap()
    }

    #[test]
    fn package_names() {
        assert_eq!(package_name("cloud:storage:Bucket"), Ok("cloud"));
        assert_eq!(package_name("pulumi:providers:cloud"), Ok("cloud"));
        assert_eq!(
            package_name("nocolon"),
            Err(ResolveError::InvalidToken("nocolon".to_string()))
        );
    }

    #[test]
    fn resource_token_precedence() {
        let cloud = cloud();
        let resolve = |token: &str| resolve_resource(cloud.as_ref(), token).map(|r| r.token.clone());

        assert_eq!(resolve("cloud:storage/bucket:Bucket").unwrap(), "cloud:storage/bucket:Bucket");
        assert_eq!(resolve("cloud:storage:Bucket").unwrap(), "cloud:storage/bucket:Bucket");
        assert_eq!(resolve("cloud:Network").unwrap(), "cloud:index:Network");
        assert_eq!(resolve("pulumi:providers:cloud").unwrap(), "pulumi:providers:cloud");
        assert_eq!(
            resolve("cloud:storage:Missing").unwrap_err().to_string(),
            r#"unable to find resource type "cloud:storage:Missing" in resource provider "cloud""#
        );
        assert_eq!(
            resolve("cloud::Bucket").unwrap_err(),
            ResolveError::InvalidToken("cloud::Bucket".to_string())
        );
    }

    #[test]
    fn function_tokens() {
        let cloud = cloud();
        let get_bucket = resolve_function(cloud.as_ref(), "cloud:storage:getBucket").unwrap();
        assert_eq!(get_bucket.token, "cloud:storage/getBucket:getBucket");
        assert_eq!(
            get_bucket.inputs.as_ref().map(|i| i.property_names()),
            Some(vec!["name".to_string()])
        );
        assert_eq!(
            resolve_function(cloud.as_ref(), "cloud:getQuota")
                .unwrap()
                .return_type,
            Some(Type::Number)
        );
    }

    #[test]
    fn schema_binding() {
        let bucket = cloud().resource("cloud:storage/bucket:Bucket").unwrap();
        let input = |name: &str| bucket.inputs.iter().find(|p| p.name == name).unwrap();

        assert_eq!(input("acl").type_.to_string(), "cloud:storage/Acl:Acl");
        assert_eq!(input("tags").type_.to_string(), "Map<string>");
        assert_eq!(input("size").type_, Type::Int);
        assert!(!input("name").required);

        let network = cloud().resource("cloud:index:Network").unwrap();
        assert_eq!(
            network.inputs[1].constant,
            Some(serde_json::Value::String("vpc".to_string()))
        );
        assert!(cloud().resource("cloud:compute:Cluster").unwrap().is_component);
    }

    #[test]
    fn plugin_versions() {
        let template = template!(
            r#"
resources:
  a:
    type: cloud:storage:Bucket
  b:
    type: cloud:storage:Bucket
    options:
      version: 2.4.0
  c:
    type: other:index:Thing
    options:
      pluginDownloadURL: https://example.com/plugins
variables:
  region:
    fn::invoke:
      function: cloud:index:getRegion
      options:
        version: 2.5.0
"#
        );

        let (plugins, diags) = referenced_plugins(&template);
        assert_eq!(
            plugins,
            vec![
                PluginReference {
                    package: "cloud".to_string(),
                    version: Some("2.4.0".to_string()),
                    download_url: None,
                },
                PluginReference {
                    package: "other".to_string(),
                    version: None,
                    download_url: Some("https://example.com/plugins".to_string()),
                },
            ]
        );
        assert_eq!(
            diags.summaries(),
            vec!["Provider cloud already declared with a conflicting version: 2.5.0"]
        );
    }
}
