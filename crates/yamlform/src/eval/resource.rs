//! config values and resource registration
use super::Evaluator;
use crate::ast::{ConfigParam, Expr, InvokeOptions, PropertyEntry, Resource, ResourceOptions};
use crate::config::{ConfigType, StackConfig};
use crate::engine::{
    CustomTimeouts, InvokeRequest, ReadRequest, RegisterOptions, RegisterRequest, ResourceHandle,
    ResourceKind,
};
use crate::output::{Output, Settled};
use crate::packages::{is_provider_token, package_name, resolve_resource, ResolveError, PROVIDER_PREFIX};
use crate::schema::ResourceType;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// `pkg:type` is short for `pkg:index:type`, `None` for malformed tokens
fn normalize_token(token: &str) -> Option<String> {
    if is_provider_token(token) {
        return (token.len() > PROVIDER_PREFIX.len()).then(|| token.to_string());
    }

    let parts: Vec<&str> = token.split(':').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    match parts.as_slice() {
        [package, name] => Some(format!("{package}:index:{name}")),
        [_, _, _] => Some(token.to_string()),
        _ => None,
    }
}

fn secret_if(secret: bool, value: Value) -> Value {
    if secret {
        Value::Output(Output::from_value(value).into_secret())
    } else {
        value
    }
}

impl Evaluator {
    pub(super) fn evaluate_config(&self, param: &ConfigParam, stack: &StackConfig) -> bool {
        let range = param.range.as_ref();
        let declared = param
            .type_name
            .as_ref()
            .and_then(|(name, _)| ConfigType::parse(name));

        let (value, secret) = match stack.get(&param.name, &self.ctx.project) {
            Some((raw, secret)) => {
                let value = match &declared {
                    Some(declared) => match declared.coerce(raw) {
                        Ok(value) => value,
                        Err(err) => {
                            self.error(
                                range,
                                format!(
                                    "invalid value for configuration variable '{}': {err}",
                                    param.name
                                ),
                            );
                            return false;
                        }
                    },
                    None => Value::from(raw.clone()),
                };
                (value, secret || param.secret)
            }
            None => match &param.default {
                Some(default) => match self.evaluate(default) {
                    Some(value) => (value, param.secret),
                    None => return false,
                },
                None => {
                    self.error(
                        range,
                        format!("missing required configuration variable '{}'", param.name),
                    );
                    return false;
                }
            },
        };

        tracing::trace!(name = %param.name, secret, "config value");
        self.ctx
            .symbols
            .lock()
            .config
            .insert(param.name.clone(), secret_if(secret, value));
        true
    }

    pub(super) fn evaluate_external_config(&self, key: &str, stack: &StackConfig) -> bool {
        let Some((raw, secret)) = stack.get(key, &self.ctx.project) else {
            self.error(None, format!("missing required configuration variable '{key}'"));
            return false;
        };
        self.ctx
            .symbols
            .lock()
            .config
            .insert(key.to_string(), secret_if(secret, Value::from(raw.clone())));
        true
    }

    fn resolve_resource(
        &self,
        token: &str,
        version: Option<&str>,
    ) -> Result<Arc<ResourceType>, ResolveError> {
        let package = self.ctx.packages.load(package_name(token)?, version)?;
        resolve_resource(package.as_ref(), token)
    }

    /// Registers (or reads) `resource` with the engine
    #[tracing::instrument(level = "trace", skip_all, fields(name = %resource.name))]
    pub(super) fn register_resource(&self, resource: &Resource) -> bool {
        let decl = &resource.decl;
        let range = resource.range.as_ref();
        let type_range = decl.type_range.as_ref().or(range);

        if normalize_token(&decl.type_token).is_none() {
            self.error(
                type_range,
                format!(
                    "invalid type token {:?} for resource {:?}",
                    decl.type_token, resource.name
                ),
            );
            return false;
        }

        // every part is evaluated before giving up to report as many problems as possible
        let options = self.register_options(&decl.options);
        let resource_type = match self.resolve_resource(
            &decl.type_token,
            options.as_ref().and_then(|options| options.version.as_deref()),
        ) {
            Ok(resource_type) => Some(resource_type),
            Err(err) => {
                self.error(
                    type_range,
                    format!("error resolving type of resource {}: {err}", resource.name),
                );
                None
            }
        };
        let properties = self.evaluate_entries(&decl.properties);
        let get = match &decl.get {
            Some(get) => {
                let id = self.known_value("the id of a resource read", &get.id);
                let state = self.evaluate_entries(&get.state);
                match (id, state) {
                    (Some(id), Some(state)) => Some(Some((id, state))),
                    _ => None,
                }
            }
            None => Some(None),
        };

        let (Some(mut options), Some(resource_type), Some(mut properties), Some(get)) =
            (options, resource_type, properties, get)
        else {
            return false;
        };

        let token = resource_type.token.clone();
        let kind = if is_provider_token(&token) {
            ResourceKind::Provider
        } else if resource_type.is_component {
            ResourceKind::Component
        } else {
            ResourceKind::Custom
        };
        let package = package_name(&token).unwrap_or_default().to_string();

        if kind == ResourceKind::Custom && options.provider.is_none() {
            if let Some(provider) = self.ctx.symbols.lock().default_providers.get(&package) {
                tracing::trace!(provider = %provider.name(), "using default provider");
                options.provider = Some(provider.clone());
            }
        }

        for input in &resource_type.inputs {
            if let Some(constant) = &input.constant {
                properties
                    .entry(input.name.clone())
                    .or_insert_with(|| Value::from(constant.clone()));
            }
        }

        let result = match get {
            Some((id, state)) => {
                tracing::debug!(%token, "reading resource");
                self.ctx.engine.read_resource(ReadRequest {
                    name: resource.name.clone(),
                    token,
                    id,
                    state,
                    options,
                })
            }
            None => {
                tracing::debug!(%token, ?kind, "registering resource");
                self.ctx.engine.register_resource(RegisterRequest {
                    name: resource.name.clone(),
                    token,
                    kind,
                    properties,
                    options,
                })
            }
        };

        match result {
            Ok(handle) => {
                self.watch(range, handle.outputs());
                let mut symbols = self.ctx.symbols.lock();
                if decl.default_provider && kind == ResourceKind::Provider {
                    symbols.default_providers.insert(package, handle.clone());
                }
                symbols.resources.insert(resource.name.clone(), handle);
                true
            }
            Err(err) => {
                self.error(range, err.to_string());
                false
            }
        }
    }

    /// Evaluates every entry, `None` if any failed
    fn evaluate_entries(&self, entries: &[PropertyEntry]) -> Option<IndexMap<String, Value>> {
        let mut overall_ok = true;
        let mut values = IndexMap::with_capacity(entries.len());
        for entry in entries {
            match self.evaluate(&entry.value) {
                Some(value) => {
                    values.insert(entry.key.clone(), value);
                }
                None => overall_ok = false,
            }
        }
        overall_ok.then_some(values)
    }

    /// Value of `expr`, which must not depend on anything still pending
    ///
    /// Deferred values that settled already are accepted.
    fn known_value(&self, what: &str, expr: &Expr) -> Option<Value> {
        let value = self.evaluate(expr)?;
        if !value.contains_output() {
            return Some(value);
        }
        match Output::from_value(value).peek() {
            Some(Settled::Known { value, .. }) => Some(value),
            _ => {
                self.error(
                    expr.range.as_ref(),
                    format!("{what} must be known at registration, found a deferred value"),
                );
                None
            }
        }
    }

    fn option_error(&self, expr: &Expr, name: &str, expected: &str, found: &Value) {
        self.error(
            expr.range.as_ref(),
            format!(
                "the {name} option must be {expected}, not {}",
                found.type_string()
            ),
        );
    }

    fn resource_option(&self, name: &str, expr: &Expr) -> Option<ResourceHandle> {
        match self.known_value(&format!("the {name} option"), expr)? {
            Value::Resource(handle) => Some(handle),
            other => {
                self.option_error(expr, name, "a resource", &other);
                None
            }
        }
    }

    /// A list of resources, a map of resources (`providers`) or a single resource
    fn resources_option(&self, name: &str, expr: &Expr) -> Option<Vec<ResourceHandle>> {
        let items = match self.known_value(&format!("the {name} option"), expr)? {
            Value::List(items) => items,
            Value::Object(entries) if name == "providers" => entries.into_values().collect(),
            handle @ Value::Resource(_) => vec![handle],
            other => {
                self.option_error(expr, name, "a list of resources", &other);
                return None;
            }
        };

        let mut handles = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Resource(handle) => handles.push(handle),
                other => {
                    self.option_error(expr, &format!("{name}[{index}]"), "a resource", &other);
                    return None;
                }
            }
        }
        Some(handles)
    }

    fn provider_option(&self, expr: &Expr, provider: ResourceHandle) -> Option<ResourceHandle> {
        if provider.is_provider() {
            Some(provider)
        } else {
            self.error(
                expr.range.as_ref(),
                "resource passed as provider was not a provider resource",
            );
            None
        }
    }

    fn bool_option(&self, name: &str, expr: &Expr) -> Option<bool> {
        match self.known_value(&format!("the {name} option"), expr)? {
            Value::Bool(value) => Some(value),
            other => {
                self.option_error(expr, name, "a boolean", &other);
                None
            }
        }
    }

    fn string_option(&self, name: &str, expr: &Expr) -> Option<String> {
        match self.known_value(&format!("the {name} option"), expr)? {
            Value::String(value) => Some(value),
            other => {
                self.option_error(expr, name, "a string", &other);
                None
            }
        }
    }

    fn strings_option(&self, name: &str, expr: &Expr) -> Option<Vec<String>> {
        let Value::List(items) = self.known_value(&format!("the {name} option"), expr)? else {
            self.error(
                expr.range.as_ref(),
                format!("the {name} option must be a list of strings"),
            );
            return None;
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::String(item) => Some(item),
                other => {
                    self.option_error(expr, name, "a list of strings", &other);
                    None
                }
            })
            .collect()
    }

    fn custom_timeouts(&self, expr: &Expr) -> Option<CustomTimeouts> {
        let Value::Object(mut entries) = self.known_value("the customTimeouts option", expr)? else {
            self.error(
                expr.range.as_ref(),
                "the customTimeouts option must be an object",
            );
            return None;
        };
        let mut field = |name: &str| match entries.swap_remove(name) {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(value)) => Some(Some(value)),
            Some(other) => {
                self.option_error(expr, &format!("customTimeouts.{name}"), "a string", &other);
                None
            }
        };
        Some(CustomTimeouts {
            create: field("create")?,
            update: field("update")?,
            delete: field("delete")?,
        })
    }

    /// Evaluates resource options, structural options must be known resources
    fn register_options(&self, options: &ResourceOptions) -> Option<RegisterOptions> {
        let mut result = RegisterOptions::default();
        let mut overall_ok = true;
        for (name, expr) in options.iter() {
            if self.register_option(&mut result, name, expr).is_none() {
                overall_ok = false;
            }
        }
        overall_ok.then_some(result)
    }

    fn register_option(&self, options: &mut RegisterOptions, name: &str, expr: &Expr) -> Option<()> {
        match name {
            "parent" => options.parent = Some(self.resource_option(name, expr)?),
            "provider" => {
                let provider = self.resource_option(name, expr)?;
                options.provider = Some(self.provider_option(expr, provider)?);
            }
            "providers" => {
                options.providers = self
                    .resources_option(name, expr)?
                    .into_iter()
                    .map(|provider| self.provider_option(expr, provider))
                    .collect::<Option<_>>()?;
            }
            "dependsOn" => options.depends_on = self.resources_option(name, expr)?,
            "deletedWith" => options.deleted_with = Some(self.resource_option(name, expr)?),
            "protect" => options.protect = Some(self.bool_option(name, expr)?),
            "deleteBeforeReplace" => {
                options.delete_before_replace = Some(self.bool_option(name, expr)?)
            }
            "retainOnDelete" => options.retain_on_delete = Some(self.bool_option(name, expr)?),
            "ignoreChanges" => options.ignore_changes = self.strings_option(name, expr)?,
            "replaceOnChanges" => options.replace_on_changes = self.strings_option(name, expr)?,
            "additionalSecretOutputs" => {
                options.additional_secret_outputs = self.strings_option(name, expr)?
            }
            // aliases may refer to urns that are still pending
            "aliases" => match self.evaluate(expr)? {
                Value::List(aliases) => options.aliases = aliases,
                other => {
                    self.option_error(expr, name, "a list", &other);
                    return None;
                }
            },
            "customTimeouts" => options.custom_timeouts = Some(self.custom_timeouts(expr)?),
            "import" => options.import = Some(self.string_option(name, expr)?),
            "version" => options.version = Some(self.string_option(name, expr)?),
            "pluginDownloadURL" => {
                options.plugin_download_url = Some(self.string_option(name, expr)?)
            }
            other => tracing::warn!(option = %other, "ignoring unknown resource option"),
        }
        Some(())
    }

    /// Evaluates the options of an invoke into a request without token and arguments
    pub(super) fn invoke_options(&self, options: &InvokeOptions) -> Option<InvokeRequest> {
        let mut request = InvokeRequest::default();
        let mut overall_ok = true;
        for (name, expr) in options.iter() {
            let ok = match name {
                "parent" => self
                    .resource_option(name, expr)
                    .map(|parent| request.parent = Some(parent)),
                "provider" => self
                    .resource_option(name, expr)
                    .and_then(|provider| self.provider_option(expr, provider))
                    .map(|provider| request.provider = Some(provider)),
                "dependsOn" => self
                    .resources_option(name, expr)
                    .map(|depends_on| request.depends_on = depends_on),
                "version" => self
                    .string_option(name, expr)
                    .map(|version| request.version = Some(version)),
                "pluginDownloadURL" => self
                    .string_option(name, expr)
                    .map(|url| request.plugin_download_url = Some(url)),
                _ => Some(()),
            };
            overall_ok &= ok.is_some();
        }
        overall_ok.then_some(request)
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{evaluate_program, evaluate_with, known, untyped};
    use super::super::Settings;
    use super::*;
    use crate::engine::MockEngine;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_normalization() {
        assert_eq!(normalize_token("cloud:Network").as_deref(), Some("cloud:index:Network"));
        assert_eq!(
            normalize_token("cloud:storage/bucket:Bucket").as_deref(),
            Some("cloud:storage/bucket:Bucket")
        );
        assert_eq!(
            normalize_token("pulumi:providers:cloud").as_deref(),
            Some("pulumi:providers:cloud")
        );
        assert_eq!(normalize_token("cloud"), None);
        assert_eq!(normalize_token("cloud::Bucket"), None);
        assert_eq!(normalize_token("a:b:c:d"), None);
    }

    #[test]
    fn registration() {
        let (evaluation, engine) = evaluate_program(
            r#"
resources:
  provider:
    type: pulumi:providers:cloud
    defaultProvider: true
    properties:
      region: eu-north-1
  net:
    type: cloud:Network
    properties:
      cidrBlocks: ["10.0.0.0/16"]
  cluster:
    type: cloud:compute:Cluster
    properties:
      network: ${net}
    options:
      dependsOn:
        - ${net}
      protect: true
"#,
            MockEngine::new(),
        );

        assert!(evaluation.diagnostics().is_empty(), "{}", evaluation.diagnostics());
        let registrations = engine.registrations();
        assert_eq!(
            registrations
                .iter()
                .map(|r| (r.name.as_str(), r.token.as_str(), r.kind))
                .collect::<Vec<_>>(),
            vec![
                ("provider", "pulumi:providers:cloud", ResourceKind::Provider),
                ("net", "cloud:index:Network", ResourceKind::Custom),
                ("cluster", "cloud:compute:Cluster", ResourceKind::Component),
            ]
        );

        let net = &registrations[1];
        assert_eq!(net.properties["kind"], Value::from("vpc"));
        assert_eq!(
            net.options.provider.as_ref().map(ResourceHandle::name),
            Some("provider")
        );

        let cluster = &registrations[2];
        assert_eq!(cluster.options.provider, None);
        assert_eq!(cluster.options.protect, Some(true));
        assert_eq!(
            cluster
                .options
                .depends_on
                .iter()
                .map(ResourceHandle::name)
                .collect::<Vec<_>>(),
            vec!["net"]
        );
        let Value::Resource(network) = &cluster.properties["network"] else {
            panic!("resources are passed as handles");
        };
        assert_eq!(network.name(), "net");
    }

    #[test]
    fn providers_must_be_provider_resources() {
        let (evaluation, engine) = evaluate_program(
            r#"
resources:
  net:
    type: cloud:Network
  bucket:
    type: cloud:storage:Bucket
    options:
      provider: ${net}
"#,
            MockEngine::new(),
        );

        assert_eq!(
            evaluation.diagnostics().summaries(),
            vec!["resource passed as provider was not a provider resource"]
        );
        assert_eq!(engine.registrations().len(), 1);
    }

    #[test]
    fn structural_options_must_be_known() {
        let engine = MockEngine::new()
            .queued(true)
            .with_invoke(|_, _| Ok([("name".to_string(), Value::from("eu"))].into()));
        let (evaluation, engine) = evaluate_with(
            r#"
variables:
  region:
    fn::invoke:
      function: cloud:getRegion
resources:
  bucket:
    type: cloud:storage:Bucket
    options:
      parent: ${region}
"#,
            engine,
            &StackConfig::default(),
            &untyped(),
        );

        assert_eq!(
            evaluation.diagnostics().summaries(),
            vec!["the parent option must be known at registration, found a deferred value"]
        );
        assert!(engine.registrations().is_empty());
    }

    #[test]
    fn read_existing_resources() {
        let (evaluation, engine) = evaluate_program(
            r#"
resources:
  logs:
    type: cloud:storage:Bucket
    get:
      id: bucket-1234
      state:
        name: logs
outputs:
  id: ${logs.id}
  name: ${logs.name}
"#,
            MockEngine::new(),
        );

        assert!(evaluation.diagnostics().is_empty(), "{}", evaluation.diagnostics());
        assert!(engine.registrations()[0].read);
        assert_eq!(
            evaluation.resolved().peek(),
            known(
                [("id", "bucket-1234"), ("name", "logs")]
                    .into_iter()
                    .collect::<Value>()
            )
        );
    }

    #[test]
    fn invalid_type_tokens() {
        let (evaluation, _) = evaluate_with(
            r#"
resources:
  thing:
    type: cloud
"#,
            MockEngine::new(),
            &StackConfig::default(),
            &untyped(),
        );

        assert_eq!(
            evaluation.diagnostics().summaries(),
            vec![r#"invalid type token "cloud" for resource "thing""#]
        );
    }

    #[test]
    fn config_values() {
        let mut stack = StackConfig::default();
        stack.assign("count=3").unwrap();
        stack.set_secret("password", "hunter2".into());
        stack.set("demo:extra", "yes".into());

        let (evaluation, _) = evaluate_with(
            r#"
name: demo
config:
  count:
    type: Int
  region:
    default: eu-north-1
  password:
    type: String
  required:
    type: String
outputs:
  count: ${count}
  region: ${region}
  password: ${password}
  extra: ${extra}
"#,
            MockEngine::new(),
            &stack,
            &Settings::default(),
        );

        assert_eq!(
            evaluation.diagnostics().summaries(),
            vec!["missing required configuration variable 'required'"]
        );
        assert_eq!(evaluation.outputs["count"], Value::Number(3.0));
        assert_eq!(evaluation.outputs["region"], Value::from("eu-north-1"));
        assert_eq!(evaluation.outputs["extra"], Value::from("yes"));
        let Value::Output(password) = &evaluation.outputs["password"] else {
            panic!("secret config values are outputs");
        };
        assert_eq!(
            password.peek(),
            Some(Settled::Known {
                value: Value::from("hunter2"),
                secret: true
            })
        );
    }

    #[test]
    fn invalid_config_values() {
        let mut stack = StackConfig::default();
        stack.assign("count=three").unwrap();

        let (evaluation, _) = evaluate_with(
            r#"
config:
  count:
    type: Int
"#,
            MockEngine::new(),
            &stack,
            &untyped(),
        );

        assert_eq!(
            evaluation.diagnostics().summaries(),
            vec![r#"invalid value for configuration variable 'count': "three" is not a valid Int"#]
        );
    }
}
