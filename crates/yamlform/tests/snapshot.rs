//! Snapshot tests
//!
//! Runs each program in /tests/programs/ against the mock engine and compares what was registered,
//! reported and exported.

use indexmap::IndexMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use yamlform::config::StackConfig;
use yamlform::engine::MockEngine;
use yamlform::eval::Settings;
use yamlform::packages::{PackageMap, SchemaPackage};
use yamlform::value::Value;

fn programs() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/programs")
}

fn packages() -> PackageMap {
    let package =
        SchemaPackage::from_yaml(include_str!("schema/cloud.yaml")).expect("schema must load");
    PackageMap::default().with(Arc::new(package))
}

fn engine(preview: bool) -> MockEngine {
    MockEngine::new().preview(preview).with_invoke(|token, _| match token {
        "cloud:index:getRegion" => Ok(IndexMap::from([
            ("name".to_string(), Value::from("eu-north-1")),
            ("zones".to_string(), Value::from(vec!["a", "b"])),
        ])),
        other => Err(format!("no mock for function {other}")),
    })
}

/// Registrations, diagnostics and outputs of a program, one section after the other
fn run(name: &str, stack: &StackConfig, preview: bool) -> String {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("YAMLFORM_LOG"))
        .with_writer(std::io::stderr)
        .try_init();

    let (template, diags) =
        yamlform::ast::load_file(&programs().join(name)).expect("program must load");
    assert!(diags.is_empty(), "{diags}");

    let engine = Arc::new(engine(preview));
    let settings = Settings {
        root_directory: programs(),
        preview,
        ..Settings::default()
    };
    let evaluation = yamlform::eval::run(
        &template,
        Arc::new(packages()),
        engine.clone(),
        stack,
        &settings,
    );
    engine.settle();

    let mut rendered = String::new();
    for registration in engine.registrations() {
        writeln!(
            rendered,
            "{:?} {} {}",
            registration.kind, registration.name, registration.token
        )
        .unwrap();
    }
    for diagnostic in &evaluation.diagnostics() {
        writeln!(rendered, "{}: {}", diagnostic.severity, diagnostic.summary).unwrap();
    }
    let outputs = Value::Object(evaluation.outputs.clone());
    rendered.push_str(&serde_json::to_string_pretty(&outputs).unwrap());
    rendered
}

#[test]
fn programs_load() {
    insta::glob!("programs/*.yaml", |path| {
        let (template, diags) = yamlform::ast::load_file(path).expect("program must load");
        assert!(!diags.has_errors(), "{}: {diags}", path.display());
        assert!(!template.project_name().is_empty());
    });
}

#[test]
fn website() {
    insta::assert_snapshot!(run("website.yaml", &StackConfig::default(), false), @r#"
    Provider provider pulumi:providers:cloud
    Custom bucket cloud:storage/bucket:Bucket
    Custom page cloud:storage/object:Object
    {
      "bucketName": "site-eu-north-1",
      "bucketId": "bucket-id",
      "url": "https://site-eu-north-1.example.com/index.html",
      "tags": "{\"owner\":\"web\"}"
    }
    "#);
}

#[test]
fn website_preview() {
    insta::assert_snapshot!(run("website.yaml", &StackConfig::default(), true), @r#"
    Provider provider pulumi:providers:cloud
    Custom bucket cloud:storage/bucket:Bucket
    Custom page cloud:storage/object:Object
    {
      "bucketName": "site-eu-north-1",
      "bucketId": "[unknown]",
      "url": "https://site-eu-north-1.example.com/index.html",
      "tags": "{\"owner\":\"web\"}"
    }
    "#);
}

#[test]
fn secrets() {
    let mut stack = StackConfig::default();
    stack.assign("user=admin").unwrap();
    stack.assign("secrets:password=hunter2").unwrap();

    insta::assert_snapshot!(run("secrets.yaml", &stack, false), @r#"
    {
      "user": "admin",
      "credentials": "[secret]",
      "hidden": "[secret]",
      "decoded": "hello"
    }
    "#);
}

#[test]
fn errors() {
    insta::assert_snapshot!(run("errors.yaml", &StackConfig::default(), false), @r#"
    Custom net cloud:index:Network
    error: size: Cannot assign type 'string' to type 'integer'
    {
      "second": "b",
      "netId": "net-id",
      "joined": "a,b"
    }
    "#);
}

#[test]
fn cycles_stop_evaluation() {
    insta::assert_snapshot!(run("cycle.yaml", &StackConfig::default(), false), @r#"
    error: circular dependency of variable 'a' transitively on itself
    {}
    "#);
}
