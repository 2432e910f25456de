//! evaluator
//!
//! [run] drives a template through the whole pipeline:
//!
//! 1. [topological_sort] orders config, variables and resources. Any scheduling error (cycles, conflicting
//!    names) stops here, before the engine sees a single request.
//! 2. [type_check] (unless disabled in [Settings]) reports type errors. Nodes with type errors are not
//!    evaluated and neither is anything depending on them, the rest of the template still is.
//! 3. Every node is evaluated in order. Resources are registered with the [Engine] as soon as their inputs
//!    are evaluated, which may well be before those inputs are known.
//! 4. Outputs are evaluated last, in declaration order.
//!
//! ## Deferred values
//!
//! Expressions evaluate to [Value]s that may contain [Output]s. Operators that need to look at a value
//! (`fn::join`, `fn::select`, property access, ...) go through [Evaluator::lift]: with known operands the
//! operator runs immediately, otherwise it is attached as a continuation to the joined operands and an
//! output of its eventual result is returned instead.
//!
//! Continuations run whenever the engine settles the outputs they wait for, possibly after [run] returned.
//! Their failures are pushed to the same [DiagnosticSink] and also logged to the engine.
mod builtins;
mod expr;
mod resource;

use crate::ast::Template;
use crate::config::StackConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, Range};
use crate::engine::{Engine, ResourceHandle};
use crate::graph::{topological_sort, Node, SortOptions, PULUMI};
use crate::output::{Output, OutputError};
use crate::packages::PackageLoader;
use crate::typing::{type_check, Typing};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// How a template is evaluated
#[derive(Debug, Clone)]
pub struct Settings {
    /// overrides the template's `name`
    pub project: Option<String>,
    pub stack: String,
    pub organization: String,
    /// base of relative paths, `fn::readFile` in particular
    pub root_directory: PathBuf,
    pub preview: bool,
    /// references to undeclared names fail scheduling instead of type checking
    pub strict_symbols: bool,
    pub type_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: None,
            stack: "dev".to_string(),
            organization: "organization".to_string(),
            root_directory: PathBuf::from("."),
            preview: false,
            strict_symbols: false,
            type_check: true,
        }
    }
}

/// Result of [run]
///
/// Diagnostics keep arriving while deferred values settle, [Evaluation::diagnostics] is a snapshot.
#[derive(Debug)]
pub struct Evaluation {
    pub outputs: IndexMap<String, Value>,
    sink: DiagnosticSink,
}

impl Evaluation {
    pub fn diagnostics(&self) -> Diagnostics {
        self.sink.snapshot()
    }

    pub fn has_errors(&self) -> bool {
        self.sink.has_errors()
    }

    /// All outputs as one object output
    pub fn resolved(&self) -> Output {
        Output::from_value(Value::Object(self.outputs.clone()))
    }
}

/// Config keys supplied by the stack, without the project namespace
fn external_config(template: &Template, stack: &StackConfig) -> Vec<String> {
    stack
        .keys(template.project_name())
        .map(str::to_string)
        .collect()
}

/// Schedules and type checks `template` without evaluating it
pub fn check(
    template: &Template,
    packages: &dyn PackageLoader,
    stack: &StackConfig,
    settings: &Settings,
) -> (Option<Typing>, Diagnostics) {
    let external = external_config(template, stack);
    let (order, mut diags) = topological_sort(
        template,
        &external,
        SortOptions {
            strict: settings.strict_symbols,
        },
    );
    if diags.has_errors() || !settings.type_check {
        return (None, diags);
    }

    let (typing, type_diags) = type_check(template, &order, packages, stack);
    diags.extend(type_diags);
    (Some(typing), diags)
}

/// Evaluates `template` against `engine`
#[tracing::instrument(level = "trace", skip_all, fields(stack = %settings.stack))]
pub fn run(
    template: &Template,
    packages: Arc<dyn PackageLoader>,
    engine: Arc<dyn Engine>,
    stack: &StackConfig,
    settings: &Settings,
) -> Evaluation {
    let sink = DiagnosticSink::default();
    let external = external_config(template, stack);
    let (order, diags) = topological_sort(
        template,
        &external,
        SortOptions {
            strict: settings.strict_symbols,
        },
    );
    let unschedulable = diags.has_errors();
    sink.extend(diags);
    if unschedulable {
        tracing::info!("template could not be scheduled, nothing is evaluated");
        return Evaluation {
            outputs: IndexMap::new(),
            sink,
        };
    }

    let typing = settings.type_check.then(|| {
        let (typing, diags) = type_check(template, &order, packages.as_ref(), stack);
        sink.extend(diags);
        typing
    });

    let project = settings
        .project
        .clone()
        .unwrap_or_else(|| template.project_name().to_string());
    tracing::info!(
        %project,
        preview = settings.preview || engine.is_preview(),
        "evaluating template"
    );
    let evaluator = Evaluator {
        ctx: Arc::new(Context {
            engine,
            packages,
            sink: sink.clone(),
            project,
            settings: settings.clone(),
            symbols: Mutex::new(Symbols::default()),
            stack_references: Mutex::new(HashMap::new()),
        }),
        deferred: false,
    };

    let outputs = evaluator.evaluate_template(template, &order, typing.as_ref(), stack);
    tracing::info!(outputs = outputs.len(), "evaluation finished");
    Evaluation { outputs, sink }
}

/// Everything a continuation needs, shared between the evaluator and its continuations
struct Context {
    engine: Arc<dyn Engine>,
    packages: Arc<dyn PackageLoader>,
    sink: DiagnosticSink,
    project: String,
    settings: Settings,
    symbols: Mutex<Symbols>,
    /// one stack reference resource per referenced stack
    stack_references: Mutex<HashMap<String, ResourceHandle>>,
}

#[derive(Default)]
struct Symbols {
    resources: HashMap<String, ResourceHandle>,
    config: HashMap<String, Value>,
    variables: HashMap<String, Value>,
    /// nodes that failed, references to them fail silently
    failed: HashSet<String>,
    /// by package name
    default_providers: HashMap<String, ResourceHandle>,
}

enum Symbol {
    Found(Value),
    /// declared but failed, already reported
    Failed,
    Missing,
}

#[derive(Clone)]
struct Evaluator {
    ctx: Arc<Context>,
    /// running inside a continuation, failures are also logged to the engine
    deferred: bool,
}

impl Evaluator {
    fn deferred(&self) -> Evaluator {
        Evaluator {
            ctx: self.ctx.clone(),
            deferred: true,
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        if self.deferred {
            self.ctx.engine.log(diagnostic.severity, &diagnostic.to_string());
        }
        self.ctx.sink.push(diagnostic);
    }

    /// Reports an error, the returned [OutputError] fails a continuation without reporting twice
    fn error(&self, range: Option<&Range>, message: impl Into<String>) -> OutputError {
        let message = message.into();
        self.report(Diagnostic::error(message.clone()).with_range(range));
        OutputError::Reported(message)
    }

    /// Runs `operator` on `operands` now when they are known, otherwise once all of them are
    ///
    /// Errors of the operator are reported at `range`. Unknown operands skip the operator and give an
    /// unknown result, secret operands give a secret result.
    fn lift(
        &self,
        range: Option<&Range>,
        operands: Vec<Value>,
        operator: impl FnOnce(Vec<Value>) -> Result<Value, String> + Send + 'static,
    ) -> Option<Value> {
        if !operands.iter().any(Value::contains_output) {
            return match operator(operands) {
                Ok(value) => Some(value),
                Err(message) => {
                    self.error(range, message);
                    None
                }
            };
        }

        let this = self.deferred();
        let range = range.cloned();
        let output = Output::from_value(Value::List(operands)).apply(move |operands| {
            let operands = match operands {
                Value::List(operands) => operands,
                other => vec![other],
            };
            operator(operands).map_err(|message| this.error(range.as_ref(), message))
        });
        Some(Value::Output(output))
    }

    fn lookup(&self, name: &str) -> Symbol {
        let prefix = format!("{}:", self.ctx.project);
        let unprefixed = name.strip_prefix(prefix.as_str()).unwrap_or(name);

        {
            let symbols = self.ctx.symbols.lock();
            if let Some(handle) = symbols.resources.get(name) {
                return Symbol::Found(Value::Resource(handle.clone()));
            }
            if let Some(value) = symbols
                .config
                .get(name)
                .or_else(|| symbols.config.get(unprefixed))
                .or_else(|| symbols.variables.get(name))
            {
                return Symbol::Found(value.clone());
            }
            if symbols.failed.contains(name) || symbols.failed.contains(unprefixed) {
                return Symbol::Failed;
            }
        }

        if name == PULUMI {
            return Symbol::Found(self.pulumi_object());
        }
        Symbol::Missing
    }

    /// Value of the built-in `pulumi` object
    fn pulumi_object(&self) -> Value {
        let settings = &self.ctx.settings;
        let cwd = std::env::current_dir()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        [
            ("cwd", cwd),
            ("project", self.ctx.project.clone()),
            ("stack", settings.stack.clone()),
            ("organization", settings.organization.clone()),
            (
                "rootDirectory",
                settings.root_directory.display().to_string(),
            ),
        ]
        .into_iter()
        .collect()
    }

    fn fail_node(&self, key: &str) {
        self.ctx.symbols.lock().failed.insert(key.to_string());
    }

    fn evaluate_template(
        &self,
        template: &Template,
        order: &[Node],
        typing: Option<&Typing>,
        stack: &StackConfig,
    ) -> IndexMap<String, Value> {
        for node in order {
            let key = node.key();
            if typing.is_some_and(|typing| typing.is_failed(key)) {
                tracing::debug!(%key, "skipping node that failed type checking");
                self.fail_node(key);
                continue;
            }

            tracing::trace!(kind = node.kind(), %key, "evaluating node");
            let ok = match node {
                Node::Config(param) => self.evaluate_config(param, stack),
                Node::ExternalConfig(key) => self.evaluate_external_config(key, stack),
                Node::Variable(variable) => match self.evaluate(&variable.value) {
                    Some(value) => {
                        self.ctx
                            .symbols
                            .lock()
                            .variables
                            .insert(variable.name.clone(), value);
                        true
                    }
                    None => false,
                },
                Node::Resource(resource) => self.register_resource(resource),
                Node::Pulumi(settings) => settings
                    .required_version
                    .as_ref()
                    .map_or(true, |version| self.evaluate(version).is_some()),
                Node::Missing(name) => {
                    self.error(
                        None,
                        format!("resource, variable, or config value {name:?} not found"),
                    );
                    false
                }
            };

            if !ok {
                tracing::debug!(%key, "node failed");
                self.fail_node(key);
            }
        }

        let mut outputs = IndexMap::new();
        for output in &template.outputs {
            if typing.is_some_and(|typing| typing.output_failed(&output.name)) {
                continue;
            }
            if let Some(value) = self.evaluate(&output.value) {
                outputs.insert(output.name.clone(), value);
            }
        }
        outputs
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::engine::MockEngine;
    use crate::output::Settled;
    use crate::packages::test::cloud_packages;
    use crate::template;

    pub(crate) fn evaluate_with(
        source: &str,
        engine: impl Into<Arc<MockEngine>>,
        stack: &StackConfig,
        settings: &Settings,
    ) -> (Evaluation, Arc<MockEngine>) {
        let engine = engine.into();
        let template = template!(source);
        let evaluation = run(
            &template,
            Arc::new(cloud_packages()),
            engine.clone(),
            stack,
            settings,
        );
        (evaluation, engine)
    }

    pub(crate) fn evaluate_program(
        source: &str,
        engine: impl Into<Arc<MockEngine>>,
    ) -> (Evaluation, Arc<MockEngine>) {
        evaluate_with(source, engine, &StackConfig::default(), &Settings::default())
    }

    pub(crate) fn untyped() -> Settings {
        Settings {
            type_check: false,
            ..Settings::default()
        }
    }

    pub(crate) fn known(value: impl Into<Value>) -> Option<Settled> {
        Some(Settled::Known {
            value: value.into(),
            secret: false,
        })
    }

    #[test]
    fn scheduling_errors_stop_evaluation() {
        let (evaluation, engine) = evaluate_program(
            r#"
variables:
  a: ${b}
  b: ${a}
resources:
  net:
    type: cloud:Network
"#,
            MockEngine::new(),
        );

        assert!(evaluation.has_errors());
        assert!(engine.registrations().is_empty());
        assert!(evaluation.outputs.is_empty());
    }

    #[test]
    fn type_errors_skip_dependents_only() {
        let (evaluation, engine) = evaluate_program(
            r#"
resources:
  bucket:
    type: cloud:storage:Bucket
    properties:
      size: large
  net:
    type: cloud:Network
outputs:
  arn: ${bucket.arn}
  net: ${net.id}
"#,
            MockEngine::new(),
        );

        assert_eq!(evaluation.diagnostics().errors().count(), 1);
        assert_eq!(
            engine
                .registrations()
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>(),
            vec!["net"]
        );
        assert_eq!(
            evaluation.outputs.keys().collect::<Vec<_>>(),
            vec!["net"]
        );
    }

    #[test]
    fn missing_symbols_without_type_checking() {
        let (evaluation, _) = evaluate_with(
            r#"
outputs:
  nothing: ${undeclared}
"#,
            MockEngine::new(),
            &StackConfig::default(),
            &untyped(),
        );

        assert_eq!(
            evaluation.diagnostics().summaries(),
            vec![r#"resource, variable, or config value "undeclared" not found"#]
        );
    }

    #[test]
    fn pulumi_variables() {
        let settings = Settings {
            project: Some("site".to_string()),
            stack: "prod".to_string(),
            ..Settings::default()
        };
        let (evaluation, _) = evaluate_with(
            r#"
name: ignored
outputs:
  where: ${pulumi.project}/${pulumi.stack}@${pulumi.organization}
"#,
            MockEngine::new(),
            &StackConfig::default(),
            &settings,
        );

        assert_eq!(
            evaluation.outputs["where"],
            Value::from("site/prod@organization")
        );
    }
}
