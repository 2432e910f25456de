//! evaluation order
//!
//! Config entries, variables and resources share one namespace. Each declaration becomes a [Node] whose
//! dependencies are the root names of the property accesses inside it. Nodes are sorted depth first so that
//! every node comes after the nodes it references.
//!
//! Config is always first, in declaration order. The outer loop picks the first unvisited node in insertion
//! order so the result is stable for identical input.
use crate::ast::{ConfigParam, ProjectSettings, PropertyAccess, Resource, Template, Variable};
use crate::diagnostics::{Diagnostic, Diagnostics, Range};
use crate::packages::PROVIDER_PREFIX;
use crate::visit::VisitSymbols;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Name of the built-in settings object
pub const PULUMI: &str = "pulumi";

#[derive(Debug, Clone)]
pub enum Node<'t> {
    Config(&'t ConfigParam),
    /// value supplied by the stack without a declaration
    ExternalConfig(&'t str),
    Variable(&'t Variable),
    Resource(&'t Resource),
    Pulumi(&'t ProjectSettings),
    /// referenced but never declared
    Missing(String),
}

impl<'t> Node<'t> {
    pub fn key(&self) -> &str {
        match self {
            Node::Config(config) => &config.name,
            Node::ExternalConfig(key) => key,
            Node::Missing(key) => key,
            Node::Variable(variable) => &variable.name,
            Node::Resource(resource) => &resource.name,
            Node::Pulumi(_) => PULUMI,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Config(_) | Node::ExternalConfig(_) => "config",
            Node::Variable(_) => "variable",
            Node::Resource(_) => "resource",
            Node::Pulumi(_) => "pulumi",
            Node::Missing(_) => "missing node",
        }
    }

    pub fn range(&self) -> Option<&'t Range> {
        match self {
            Node::Config(config) => config.range.as_ref(),
            Node::Variable(variable) => variable.range.as_ref(),
            Node::Resource(resource) => resource.range.as_ref(),
            Node::ExternalConfig(_) | Node::Pulumi(_) | Node::Missing(_) => None,
        }
    }
}

/// Scheduling switches
#[derive(Debug, Clone, Copy, Default)]
pub struct SortOptions {
    /// unresolved references are errors instead of [Node::Missing] placeholders
    pub strict: bool,
}

/// Sorts the declarations of `template`
///
/// `external_config` lists config keys supplied by the stack. Nodes that fail (cycles, strict missing
/// references) are left out of the result together with everything depending on them.
#[tracing::instrument(level = "trace", skip_all)]
pub fn topological_sort<'t>(
    template: &'t Template,
    external_config: &'t [String],
    options: SortOptions,
) -> (Vec<Node<'t>>, Diagnostics) {
    let mut sorter = Sorter::new(template, options);

    for config in &template.config {
        sorter.declare_config(Node::Config(config));
    }
    for key in external_config {
        sorter.declare_config(Node::ExternalConfig(key));
    }

    if let Some(settings) = &template.settings {
        let mut dependencies = vec![];
        settings
            .required_version
            .visit_symbols(&mut |access: &PropertyAccess| {
                dependencies.push(access.root_name().to_string())
            });
        sorter.add(Node::Pulumi(settings), dependencies);
    }

    for resource in &template.resources {
        let node = Node::Resource(resource);
        if !sorter.check_unique(&node) {
            continue;
        }

        let decl = &resource.decl;
        if decl.default_provider {
            if let Some(package) = decl.type_token.strip_prefix(PROVIDER_PREFIX) {
                if let Some(existing) = sorter.default_providers.get(package) {
                    sorter.diags.push(
                        Diagnostic::error(format!(
                            "resource {} cannot be the default provider for package {package}, \
                             resource {existing} already is",
                            resource.name
                        ))
                        .with_range(resource.range.as_ref()),
                    );
                } else {
                    sorter
                        .default_providers
                        .insert(package.to_string(), resource.name.clone());
                }
            }
        }

        let mut dependencies = vec![];
        decl.visit_symbols(&mut |access: &PropertyAccess| {
            dependencies.push(access.root_name().to_string())
        });
        sorter.add(node, dependencies);
    }

    for variable in &template.variables {
        let node = Node::Variable(variable);
        if !sorter.check_unique(&node) {
            continue;
        }

        let mut dependencies = vec![];
        variable
            .value
            .visit_symbols(&mut |access: &PropertyAccess| {
                dependencies.push(access.root_name().to_string())
            });
        sorter.add(node, dependencies);
    }

    if sorter.diags.has_errors() {
        return (vec![], sorter.diags);
    }

    // repeatedly visit the first node that has not been visited
    loop {
        let next = sorter
            .nodes
            .keys()
            .find(|key| !sorter.visited.contains(*key) && !sorter.failed.contains(*key))
            .cloned();

        let Some(key) = next else {
            break;
        };

        if !sorter.visit(&key, None) {
            // everything on the failed path is abandoned
            let abandoned: Vec<String> = sorter.visiting.drain().collect();
            sorter.failed.extend(abandoned);
            sorter.failed.insert(key);
        }
    }

    tracing::debug!(nodes = sorter.sorted.len(), "sorted declarations");
    (sorter.sorted, sorter.diags)
}

struct Sorter<'t> {
    template: &'t Template,
    options: SortOptions,
    /// insertion ordered
    nodes: IndexMap<String, Node<'t>>,
    dependencies: HashMap<String, Vec<String>>,
    default_providers: HashMap<String, String>,
    visiting: HashSet<String>,
    visited: HashSet<String>,
    failed: HashSet<String>,
    /// undeclared names already reported in strict mode
    missing: HashSet<String>,
    sorted: Vec<Node<'t>>,
    diags: Diagnostics,
}

impl<'t> Sorter<'t> {
    fn new(template: &'t Template, options: SortOptions) -> Self {
        Self {
            template,
            options,
            nodes: IndexMap::new(),
            dependencies: HashMap::new(),
            default_providers: HashMap::new(),
            visiting: HashSet::new(),
            visited: HashSet::new(),
            failed: HashSet::new(),
            missing: HashSet::new(),
            sorted: vec![],
            diags: Diagnostics::new(),
        }
    }

    /// Config goes first and has no dependencies
    fn declare_config(&mut self, node: Node<'t>) {
        if !self.check_unique(&node) {
            return;
        }
        self.visited.insert(node.key().to_string());
        self.sorted.push(node.clone());
        self.add(node, vec![]);
    }

    fn add(&mut self, node: Node<'t>, dependencies: Vec<String>) {
        let key = node.key().to_string();
        self.dependencies.insert(key.clone(), dependencies);
        self.nodes.insert(key, node);
    }

    /// Reports reserved and duplicate names, true if `node` may be added
    fn check_unique(&mut self, node: &Node<'t>) -> bool {
        let name = node.key();
        if name == PULUMI {
            self.diags.push(
                Diagnostic::error(format!(
                    "{} {name} uses the reserved name pulumi",
                    node.kind()
                ))
                .with_range(node.range()),
            );
            return false;
        }

        let Some(other) = self.nodes.get(name) else {
            return true;
        };

        // a declared config entry may also be supplied by the stack
        if matches!(node, Node::ExternalConfig(_)) || matches!(other, Node::ExternalConfig(_)) {
            return false;
        }

        let summary = if node.kind() == other.kind() {
            format!("found duplicate {} {name}", node.kind())
        } else {
            format!(
                "{} {name} cannot have the same name as {} {name}",
                node.kind(),
                other.kind()
            )
        };
        self.diags
            .push(Diagnostic::error(summary).with_range(node.range()));
        false
    }

    /// Resolves a name referenced by the declaration at `referrer`, creating a missing node when lenient
    fn resolve(&mut self, name: &str, referrer: Option<&Range>) -> Option<String> {
        if self.nodes.contains_key(name) {
            return Some(name.to_string());
        }

        if let Some(stripped) = self
            .template
            .name
            .as_deref()
            .and_then(|project| name.strip_prefix(project))
            .and_then(|rest| rest.strip_prefix(':'))
        {
            if self.nodes.contains_key(stripped) {
                return Some(stripped.to_string());
            }
        }

        if self.options.strict {
            if self.missing.insert(name.to_string()) {
                self.diags.push(
                    Diagnostic::error(format!(
                        "resource, variable, or config value {name:?} not found"
                    ))
                    .with_range(referrer),
                );
            }
            return None;
        }

        tracing::debug!(%name, "reference to undeclared name");
        let key = name.to_string();
        self.dependencies.insert(key.clone(), vec![]);
        self.nodes.insert(key.clone(), Node::Missing(key.clone()));
        Some(key)
    }

    fn visit(&mut self, name: &str, referrer: Option<&Range>) -> bool {
        let Some(key) = self.resolve(name, referrer) else {
            return false;
        };

        if self.failed.contains(&key) {
            return false;
        }

        let Some(node) = self.nodes.get(&key).cloned() else {
            return false;
        };

        if self.visiting.contains(&key) {
            self.diags.push(
                Diagnostic::error(format!(
                    "circular dependency of {} '{key}' transitively on itself",
                    node.kind()
                ))
                .with_range(node.range()),
            );
            return false;
        }

        if self.visited.contains(&key) {
            return true;
        }

        self.visiting.insert(key.clone());

        let dependencies = self.dependencies.get(&key).cloned().unwrap_or_default();
        for dependency in dependencies {
            if dependency == PULUMI {
                continue;
            }
            if !self.visit(&dependency, node.range()) {
                return false;
            }
        }

        if let Node::Resource(resource) = node {
            let decl = &resource.decl;
            let package = decl.type_token.split(':').next().unwrap_or_default();
            if decl.options.provider.is_none() && !decl.default_provider {
                // the default provider is only a dependency when one was declared
                if let Some(provider) = self.default_providers.get(package).cloned() {
                    if !self.visit(&provider, node.range()) {
                        return false;
                    }
                }
            }
        }

        self.visiting.remove(&key);
        self.visited.insert(key);
        self.sorted.push(node);
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template;
    use pretty_assertions::assert_eq;

    fn order(template: &Template, strict: bool) -> (Vec<String>, Vec<String>) {
        let (nodes, diags) = topological_sort(template, &[], SortOptions { strict });
        (
            nodes.iter().map(|node| node.key().to_string()).collect(),
            diags.summaries(),
        )
    }

    #[test]
    fn dependencies_come_first() {
        let template = template!(
            r#"
config:
  prefix: string
resources:
  a:
    type: cloud:index:Network
    properties:
      foo: ${b.bar}
  b:
    type: cloud:index:Network
variables:
  name: ${prefix}-${a.id}
"#
        );

        assert_eq!(
            order(&template, false),
            (vec!["prefix".into(), "b".into(), "a".into(), "name".into()], vec![])
        );
    }

    #[test]
    fn stable_order() {
        let template = template!(
            r#"
variables:
  z: 1
  y: ${z}
  x: 2
  w: ${x}
"#
        );

        for _ in 0..10 {
            assert_eq!(order(&template, false).0, vec!["z", "y", "x", "w"]);
        }
    }

    #[test]
    fn cycles_are_reported_once() {
        let template = template!(
            r#"
resources:
  a:
    type: cloud:index:Network
    options:
      dependsOn: ["${b}"]
  b:
    type: cloud:index:Network
    properties:
      foo: ${a.id}
  c:
    type: cloud:index:Network
"#
        );

        assert_eq!(
            order(&template, false),
            (
                vec!["c".to_string()],
                vec!["circular dependency of resource 'a' transitively on itself".to_string()]
            )
        );
    }

    #[test]
    fn name_conflicts() {
        let template = template!(
            r#"
config:
  site: string
  pulumi: string
resources:
  site:
    type: cloud:index:Network
variables:
  site: 1
"#
        );

        assert_eq!(
            order(&template, false).1,
            vec![
                "config pulumi uses the reserved name pulumi",
                "resource site cannot have the same name as config site",
                "variable site cannot have the same name as config site",
            ]
        );
    }

    #[test]
    fn default_provider_edges() {
        let template = template!(
            r#"
resources:
  bucket:
    type: cloud:storage:Bucket
  explicit:
    type: cloud:storage:Bucket
    options:
      provider: ${other}
  other:
    type: pulumi:providers:cloud
  east:
    type: pulumi:providers:cloud
    defaultProvider: true
"#
        );

        assert_eq!(
            order(&template, false).0,
            vec!["east", "bucket", "other", "explicit"]
        );
    }

    #[test]
    fn second_default_provider() {
        let template = template!(
            r#"
resources:
  east:
    type: pulumi:providers:cloud
    defaultProvider: true
  west:
    type: pulumi:providers:cloud
    defaultProvider: true
"#
        );

        assert_eq!(
            order(&template, false).1,
            vec!["resource west cannot be the default provider for package cloud, resource east already is"]
        );
    }

    #[test]
    fn missing_references() {
        let template = template!(
            r#"
name: app
config:
  region: string
variables:
  a: ${app:region}
  b: ${nowhere}
"#
        );

        assert_eq!(
            order(&template, false),
            (
                vec!["region".into(), "a".into(), "nowhere".into(), "b".into()],
                vec![]
            )
        );
        assert_eq!(
            order(&template, true),
            (
                vec!["region".into(), "a".into()],
                vec![r#"resource, variable, or config value "nowhere" not found"#.into()]
            )
        );
    }

    #[test]
    fn strict_missing_names_are_reported_once_at_the_first_referrer() {
        let template = template!(
            r#"
variables:
  a: ${nowhere}
  b: ${nowhere.id}
resources:
  net:
    type: cloud:index:Network
    properties:
      name: ${nowhere}
"#
        );

        let (nodes, diags) = topological_sort(&template, &[], SortOptions { strict: true });
        assert!(nodes.is_empty());
        let rendered: Vec<String> = diags.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![r#"6:3: error: resource, variable, or config value "nowhere" not found"#]
        );
    }

    #[test]
    fn external_config() {
        let template = template!(
            r#"
config:
  region: string
variables:
  a: ${token}
"#
        );
        let external = vec!["region".to_string(), "token".to_string()];
        let (nodes, diags) = topological_sort(&template, &external, SortOptions::default());

        assert!(diags.is_empty());
        assert_eq!(
            nodes
                .iter()
                .map(|node| format!("{} {}", node.kind(), node.key()))
                .collect::<Vec<_>>(),
            vec!["config region", "config token", "variable a"]
        );
    }
}
