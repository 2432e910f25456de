//! syntax tree of a template
//!
//! The tree is immutable once loaded. Expressions carry an [ExprId] so later passes can attach data
//! (such as inferred types) without touching the tree.
pub mod access;
pub mod expr;
mod load;
mod marks;
pub mod template;

pub use access::{Accessor, PropertyAccess};
pub use expr::{
    AssetKind, Builtin, Expr, ExprId, ExprKind, Interpolation, Invoke, InvokeOptions, Literal,
    ObjectProperty,
};
pub use load::{expr_from_value, load_file, load_str, template_from_value, LoadError};
pub use template::{
    ConfigParam, GetResource, OutputDecl, ProjectSettings, PropertyEntry, Resource, ResourceDecl,
    ResourceOptions, Template, Variable,
};
