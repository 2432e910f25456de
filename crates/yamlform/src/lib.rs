//! # yamlform - declarative infrastructure programs in YAML
//!
//! ## Introduction for developers
//!
//! Read this to understand how `yamlform` works internally.
//!
//! ### Template terms
//!
//! A template is a single YAML mapping:
//! - `config`: values supplied per stack, optionally typed and with defaults
//! - `variables`: named expressions
//! - `resources`: infrastructure objects, each with a type token (`pkg:module:Type`), `properties` and
//!   `options`
//! - `outputs`: named expressions exported once everything is evaluated
//!
//! ```yaml
//! config:
//!   prefix:
//!     type: String
//!     default: site
//! variables:
//!   region:
//!     fn::invoke:
//!       function: cloud:getRegion
//!       return: name
//! resources:
//!   bucket:
//!     type: cloud:storage:Bucket
//!     properties:
//!       name: ${prefix}-${region}
//! outputs:
//!   arn: ${bucket.arn}
//! ```
//!
//! Config, variables and resources share one namespace. `${name.property[0]}` refers to them, either as a
//! whole string (the value itself) or inside a longer string (interpolated as text).
//!
//! ### Loading
//!
//! see [ast::load_file]
//!
//! The YAML document is turned into an [ast::Template]. Every expression becomes an [ast::Expr] carrying its
//! source range and a process-unique [ast::ExprId]. Builtins (`fn::join`, `fn::invoke`, ...) are recognized
//! here, so later passes never look at raw YAML. Unknown fields and miscapitalized keys are warnings, not
//! errors.
//!
//! ### Scheduling
//!
//! see [graph::topological_sort]
//!
//! Each declaration becomes a [graph::Node]. Its dependencies are the root names of all property accesses
//! inside it. The sort reports cycles, duplicate names and the reserved `pulumi` name. References to names
//! nobody declared become [graph::Node::Missing] unless strict mode is on.
//!
//! ### Type checking
//!
//! see [typing::type_check]
//!
//! Resource and function types come from package schemas ([packages::Package], loaded through a
//! [packages::PackageLoader]). Every expression gets a [schema::Type] and every assignment into a
//! resource property, function argument or config default is checked. Failures explain themselves as a
//! chain of reasons:
//!
//! ```text
//! Cannot assign type 'boolean' to type 'Union<number, archive>':
//!   Cannot assign type 'boolean' to type 'number'
//!   Cannot assign type 'boolean' to type 'archive'
//! ```
//!
//! ### Evaluation
//!
//! see [eval::run]
//!
//! Nodes are evaluated in scheduled order against an [engine::Engine]. Resource state is not known when a
//! resource is registered, so values may contain [output::Output]s that settle later. Operators on such
//! values are attached as continuations and everything downstream stays deferred until the engine
//! settles.
//!
//! [engine::MockEngine] is an in-memory engine, used by the `preview` command and throughout the tests.
//!
//! ### Output
//!
//! Once all outputs settled they are a plain [value::Value] which in turn gets serialized via [serde].
//! Secret values are masked, unknown values (during preview) are shown as such.
//!
pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod eval;
pub mod graph;
pub mod output;
pub mod packages;
pub mod schema;
pub mod typing;
pub mod value;
mod visit;
