//! template declarations
use super::expr::Expr;
use crate::diagnostics::Range;

/// A whole program document
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub name: Option<String>,
    pub runtime: Option<String>,
    pub description: Option<String>,
    pub settings: Option<ProjectSettings>,
    pub config: Vec<ConfigParam>,
    pub variables: Vec<Variable>,
    pub resources: Vec<Resource>,
    pub outputs: Vec<OutputDecl>,
}

/// The `pulumi:` section
#[derive(Debug, Clone, Default)]
pub struct ProjectSettings {
    pub required_version: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: String,
    pub range: Option<Range>,
    /// declared type as written, e.g. `List<Number>`
    pub type_name: Option<(String, Option<Range>)>,
    pub default: Option<Expr>,
    pub secret: bool,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub range: Option<Range>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct OutputDecl {
    pub name: String,
    pub range: Option<Range>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub range: Option<Range>,
    pub decl: ResourceDecl,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceDecl {
    pub type_token: String,
    pub type_range: Option<Range>,
    pub default_provider: bool,
    pub properties: Vec<PropertyEntry>,
    pub options: ResourceOptions,
    pub get: Option<GetResource>,
}

/// `key: value` inside `properties`, `state` and similar maps
#[derive(Debug, Clone)]
pub struct PropertyEntry {
    pub key: String,
    pub key_range: Option<Range>,
    pub value: Expr,
}

impl PropertyEntry {
    pub fn new(key: impl Into<String>, value: Expr) -> Self {
        Self {
            key: key.into(),
            key_range: None,
            value,
        }
    }
}

/// Reads an existing resource instead of creating one
#[derive(Debug, Clone)]
pub struct GetResource {
    pub id: Expr,
    pub state: Vec<PropertyEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    pub additional_secret_outputs: Option<Expr>,
    pub aliases: Option<Expr>,
    pub custom_timeouts: Option<Expr>,
    pub delete_before_replace: Option<Expr>,
    pub depends_on: Option<Expr>,
    pub ignore_changes: Option<Expr>,
    pub import: Option<Expr>,
    pub parent: Option<Expr>,
    pub protect: Option<Expr>,
    pub provider: Option<Expr>,
    pub providers: Option<Expr>,
    pub version: Option<Expr>,
    pub plugin_download_url: Option<Expr>,
    pub replace_on_changes: Option<Expr>,
    pub retain_on_delete: Option<Expr>,
    pub deleted_with: Option<Expr>,
}

impl ResourceOptions {
    pub const FIELDS: &'static [&'static str] = &[
        "additionalSecretOutputs",
        "aliases",
        "customTimeouts",
        "deleteBeforeReplace",
        "dependsOn",
        "ignoreChanges",
        "import",
        "parent",
        "protect",
        "provider",
        "providers",
        "version",
        "pluginDownloadURL",
        "replaceOnChanges",
        "retainOnDelete",
        "deletedWith",
    ];

    /// Slot for an option by its document name
    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Option<Expr>> {
        Some(match name {
            "additionalSecretOutputs" => &mut self.additional_secret_outputs,
            "aliases" => &mut self.aliases,
            "customTimeouts" => &mut self.custom_timeouts,
            "deleteBeforeReplace" => &mut self.delete_before_replace,
            "dependsOn" => &mut self.depends_on,
            "ignoreChanges" => &mut self.ignore_changes,
            "import" => &mut self.import,
            "parent" => &mut self.parent,
            "protect" => &mut self.protect,
            "provider" => &mut self.provider,
            "providers" => &mut self.providers,
            "version" => &mut self.version,
            "pluginDownloadURL" => &mut self.plugin_download_url,
            "replaceOnChanges" => &mut self.replace_on_changes,
            "retainOnDelete" => &mut self.retain_on_delete,
            "deletedWith" => &mut self.deleted_with,
            _ => return None,
        })
    }

    /// Options that are set, in declaration order of [Self::FIELDS]
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Expr)> {
        [
            ("additionalSecretOutputs", &self.additional_secret_outputs),
            ("aliases", &self.aliases),
            ("customTimeouts", &self.custom_timeouts),
            ("deleteBeforeReplace", &self.delete_before_replace),
            ("dependsOn", &self.depends_on),
            ("ignoreChanges", &self.ignore_changes),
            ("import", &self.import),
            ("parent", &self.parent),
            ("protect", &self.protect),
            ("provider", &self.provider),
            ("providers", &self.providers),
            ("version", &self.version),
            ("pluginDownloadURL", &self.plugin_download_url),
            ("replaceOnChanges", &self.replace_on_changes),
            ("retainOnDelete", &self.retain_on_delete),
            ("deletedWith", &self.deleted_with),
        ]
        .into_iter()
        .filter_map(|(name, expr)| expr.as_ref().map(|expr| (name, expr)))
    }
}

impl ResourceDecl {
    pub fn new(type_token: impl Into<String>) -> Self {
        Self {
            type_token: type_token.into(),
            ..Default::default()
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: Expr) -> Self {
        self.properties.push(PropertyEntry::new(key, value));
        self
    }
}

impl Template {
    pub fn project_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Root expressions of every declaration
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut expressions = vec![];
        if let Some(version) = self.settings.as_ref().and_then(|s| s.required_version.as_ref()) {
            expressions.push(version);
        }
        expressions.extend(self.config.iter().filter_map(|c| c.default.as_ref()));
        expressions.extend(self.variables.iter().map(|v| &v.value));
        for resource in &self.resources {
            let decl = &resource.decl;
            expressions.extend(decl.properties.iter().map(|p| &p.value));
            expressions.extend(decl.options.iter().map(|(_, expr)| expr));
            if let Some(get) = &decl.get {
                expressions.push(&get.id);
                expressions.extend(get.state.iter().map(|p| &p.value));
            }
        }
        expressions.extend(self.outputs.iter().map(|o| &o.value));
        expressions
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn config_param(&self, name: &str) -> Option<&ConfigParam> {
        self.config.iter().find(|c| c.name == name)
    }

    pub fn add_resource(&mut self, name: impl Into<String>, decl: ResourceDecl) -> &mut Self {
        self.resources.push(Resource {
            name: name.into(),
            range: None,
            decl,
        });
        self
    }

    pub fn add_variable(&mut self, name: impl Into<String>, value: Expr) -> &mut Self {
        self.variables.push(Variable {
            name: name.into(),
            range: None,
            value,
        });
        self
    }

    pub fn add_output(&mut self, name: impl Into<String>, value: Expr) -> &mut Self {
        self.outputs.push(OutputDecl {
            name: name.into(),
            range: None,
            value,
        });
        self
    }
}
