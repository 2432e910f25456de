mod cli;

use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;
use yamlform::ast::Template;
use yamlform::config::StackConfig;
use yamlform::diagnostics::Diagnostics;
use yamlform::engine::MockEngine;
use yamlform::eval::Settings;
use yamlform::packages::{PackageMap, SchemaPackage};
use yamlform::value::Value;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("YAMLFORM_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Check(check_cli) => check(check_cli),
        cli::Command::Preview(preview_cli) => preview(preview_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    match command_result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            for error in e.chain() {
                eprintln!("{error}")
            }
            std::process::exit(1);
        }
    }
}

/// Everything a template is checked and evaluated with
struct Inputs {
    template: Template,
    packages: PackageMap,
    stack: StackConfig,
    settings: Settings,
}

fn load(input: &cli::InputArgs) -> anyhow::Result<(Inputs, Diagnostics)> {
    let (template, diags) = load_template(&input.template)?;

    let mut packages = PackageMap::default();
    for path in &input.schemas {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?;
        let package = SchemaPackage::from_yaml(&contents)
            .with_context(|| format!("Failed to load schema {}", path.display()))?;
        packages.insert(Arc::new(package));
    }

    let mut stack = StackConfig::default();
    for path in &input.config_files {
        stack
            .load_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?;
    }
    for assignment in &input.config {
        stack.assign(assignment)?;
    }
    for key in &input.secrets {
        stack.mark_secret(key);
    }

    let root_directory = input
        .template
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(std::env::current_dir, |parent| parent.canonicalize())?;
    let settings = Settings {
        stack: input.stack.clone(),
        root_directory,
        strict_symbols: input.strict,
        ..Settings::default()
    };

    Ok((
        Inputs {
            template,
            packages,
            stack,
            settings,
        },
        diags,
    ))
}

fn load_template(path: &Path) -> anyhow::Result<(Template, Diagnostics)> {
    yamlform::ast::load_file(path)
        .with_context(|| format!("Failed to load template {}", path.display()))
}

fn print_diagnostics(diags: &Diagnostics) {
    for diagnostic in diags {
        eprintln!("{diagnostic}");
    }
}

/// Returns whether the template is free of errors
pub fn check(cli: cli::CheckCommand) -> anyhow::Result<bool> {
    let (inputs, mut diags) = load(&cli.input)?;
    if !diags.has_errors() {
        let (_, check_diags) = yamlform::eval::check(
            &inputs.template,
            &inputs.packages,
            &inputs.stack,
            &inputs.settings,
        );
        diags.extend(check_diags);
    }

    print_diagnostics(&diags);
    Ok(!diags.has_errors())
}

pub fn preview(cli: cli::PreviewCommand) -> anyhow::Result<bool> {
    let (mut inputs, diags) = load(&cli.input)?;
    if diags.has_errors() {
        print_diagnostics(&diags);
        return Ok(false);
    }

    inputs.settings.preview = true;
    inputs.settings.type_check = !cli.no_type_check;
    let engine = Arc::new(MockEngine::new().preview(inputs.settings.preview));
    let evaluation = yamlform::eval::run(
        &inputs.template,
        Arc::new(inputs.packages),
        engine.clone(),
        &inputs.stack,
        &inputs.settings,
    );
    engine.settle();

    print_diagnostics(&diags);
    print_diagnostics(&evaluation.diagnostics());
    output(&cli.output, &Value::Object(evaluation.outputs.clone()))?;
    Ok(!evaluation.has_errors())
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (yamlform-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<bool> {
    use cli::DevSubCommand::*;

    let (template, diags) = load_template(&cli.template)?;
    print_diagnostics(&diags);

    match cli.command {
        Order => {
            let (order, diags) = yamlform::graph::topological_sort(
                &template,
                &[],
                yamlform::graph::SortOptions::default(),
            );
            print_diagnostics(&diags);
            for node in order {
                println!("{} {}", node.kind(), node.key());
            }
        }
        Ast => println!("{template:#?}"),
        Plugins => {
            let (plugins, diags) = yamlform::packages::referenced_plugins(&template);
            print_diagnostics(&diags);
            serde_yaml::to_writer(std::io::stdout(), &plugins)?;
        }
    }

    Ok(!diags.has_errors())
}
